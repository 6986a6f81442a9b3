//! Classifies an inbound request path into the upstream provider it targets.
//!
//! The proxy never inspects the request body to route — only the URL path
//! (no scheme or host) is consulted, in the fixed order documented on
//! [`classify`].

use mirra_model::Provider;

const GEMINI_VERSIONS: [&str; 3] = ["v1", "v1beta", "v1alpha"];
const GEMINI_RESOURCE_COLLECTIONS: [&str; 5] =
    ["files", "cachedContents", "corpora", "tunedModels", "batches"];

const OPENAI_PREFIXES: [&str; 6] = [
    "/v1/chat/completions",
    "/v1/completions",
    "/v1/embeddings",
    "/v1/models",
    "/v1/models/",
    "/v1/responses",
];

/// Classify `path` into the provider it targets, applying the rules in order:
///
/// 1. Gemini shapes (`:operation` suffix on a model, or one of the
///    Gemini-only resource collections under a versioned prefix).
/// 2. Claude's `/v1/messages[...]` and `/v1/complete`.
/// 3. OpenAI's chat/completions/embeddings/models/responses family.
/// 4. `Unknown` otherwise.
///
/// A colon after `models/<id>` always wins for Gemini, even on `/v1/models`,
/// which OpenAI otherwise claims.
pub fn classify(path: &str) -> Provider {
    if is_gemini_shape(path) {
        return Provider::Gemini;
    }
    if is_claude_shape(path) {
        return Provider::Claude;
    }
    if is_openai_shape(path) {
        return Provider::OpenAi;
    }
    Provider::Unknown
}

fn segments(path: &str) -> Vec<&str> {
    path.trim_start_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_gemini_shape(path: &str) -> bool {
    let segs = segments(path);

    let (version, rest) = if segs.first() == Some(&"upload") {
        match segs.get(1) {
            Some(v) if GEMINI_VERSIONS.contains(v) => (*v, &segs[2..]),
            _ => return false,
        }
    } else {
        match segs.first() {
            Some(v) if GEMINI_VERSIONS.contains(v) => (*v, &segs[1..]),
            _ => return false,
        }
    };
    let _ = version;

    match rest.first() {
        Some(&"models") => rest.get(1).is_some_and(|id| id.contains(':')),
        Some(collection) => GEMINI_RESOURCE_COLLECTIONS.contains(collection),
        None => false,
    }
}

fn is_claude_shape(path: &str) -> bool {
    path == "/v1/messages" || path.starts_with("/v1/messages/") || path == "/v1/complete"
}

fn is_openai_shape(path: &str) -> bool {
    OPENAI_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_colon_operation_wins_over_openai() {
        assert_eq!(classify("/v1/models/gemini-pro:generateContent"), Provider::Gemini);
        assert_eq!(classify("/v1beta/models/gemini-pro:streamGenerateContent"), Provider::Gemini);
    }

    #[test]
    fn openai_wins_on_v1_models_without_colon() {
        assert_eq!(classify("/v1/models/gemini-pro"), Provider::OpenAi);
        assert_eq!(classify("/v1/models"), Provider::OpenAi);
    }

    #[test]
    fn gemini_resource_collections() {
        assert_eq!(classify("/v1beta/files/abc123"), Provider::Gemini);
        assert_eq!(classify("/v1/cachedContents"), Provider::Gemini);
        assert_eq!(classify("/v1alpha/corpora/foo"), Provider::Gemini);
        assert_eq!(classify("/v1/tunedModels/x"), Provider::Gemini);
        assert_eq!(classify("/v1/batches/b1"), Provider::Gemini);
        assert_eq!(classify("/upload/v1beta/files"), Provider::Gemini);
    }

    #[test]
    fn claude_messages_and_complete() {
        assert_eq!(classify("/v1/messages"), Provider::Claude);
        assert_eq!(classify("/v1/messages/abc"), Provider::Claude);
        assert_eq!(classify("/v1/complete"), Provider::Claude);
    }

    #[test]
    fn openai_family() {
        assert_eq!(classify("/v1/chat/completions"), Provider::OpenAi);
        assert_eq!(classify("/v1/completions"), Provider::OpenAi);
        assert_eq!(classify("/v1/embeddings"), Provider::OpenAi);
        assert_eq!(classify("/v1/responses"), Provider::OpenAi);
    }

    #[test]
    fn unknown_for_unrecognized_shapes() {
        assert_eq!(classify("/v2/messages"), Provider::Unknown);
        assert_eq!(classify("/health"), Provider::Unknown);
        assert_eq!(classify("/"), Provider::Unknown);
    }
}
