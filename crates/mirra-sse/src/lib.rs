//! Per-provider SSE stream reconstruction.
//!
//! Three sibling parsers (`claude`, `openai`, `gemini`) share one contract:
//! given the recorded response body, produce a [`ParsedStream`] — the
//! logical text, the event inventory, and whatever metadata the wire format
//! carries. All three are pure functions: same input, same output, and the
//! empty string always yields an empty, error-free result.

mod claude;
mod event;
mod gemini;
mod openai;

pub use event::{ParsedStream, SseEvent};
use mirra_model::Provider;

/// Parse a recorded SSE body with the parser appropriate to `provider`.
///
/// There is no parser for [`Provider::Unknown`] — recordings are never
/// persisted with that provider, so callers that reach it have a bug
/// upstream rather than a malformed stream.
pub fn parse(provider: Provider, input: &str) -> Result<ParsedStream, UnsupportedProvider> {
    match provider {
        Provider::Claude => Ok(claude::parse(input)),
        Provider::OpenAi => Ok(openai::parse(input)),
        Provider::Gemini => Ok(gemini::parse(input)),
        Provider::Unknown => Err(UnsupportedProvider),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("no SSE parser is registered for an unknown provider")]
pub struct UnsupportedProvider;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_to_the_right_parser() {
        let parsed = parse(Provider::Claude, "").unwrap();
        assert_eq!(parsed.text, "");
        assert!(parse(Provider::Unknown, "").is_err());
    }
}
