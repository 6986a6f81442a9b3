use std::fmt;

use serde::{Deserialize, Serialize};

/// Upstream LLM provider a recorded exchange was routed to.
///
/// `Unknown` is never persisted as part of a [`crate::Recording`] — the proxy
/// rejects requests that classify as `Unknown` before a recording is built —
/// but it is kept in the enum so filters and listings have a value to
/// compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    OpenAi,
    Gemini,
    Unknown,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(Provider::Claude),
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            "unknown" => Ok(Provider::Unknown),
            _ => Err(()),
        }
    }
}
