use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::headers::HeaderMap;
use crate::provider::Provider;

/// A captured request or response body.
///
/// Decoded JSON is kept as a `serde_json::Value` so the on-disk line is a
/// real nested JSON object rather than a string of escaped JSON; anything
/// else (plain text, SSE text, the `"base64:..."` sentinel) is a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Body {
    Json(serde_json::Value),
    Text(String),
}

impl Body {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Body::Json(value) => Some(value),
            Body::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            Body::Json(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestRecord {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HeaderMap,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body: Option<Body>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseRecord {
    pub status: u16,
    pub headers: HeaderMap,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body: Option<Body>,
    pub streaming: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timing {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
    pub duration_ms: i64,
}

impl Timing {
    pub fn new(started_at: OffsetDateTime, completed_at: OffsetDateTime) -> Self {
        let duration_ms = ((completed_at - started_at).whole_milliseconds()).max(0) as i64;
        Self {
            started_at,
            completed_at,
            duration_ms,
        }
    }
}

/// Immutable snapshot of one proxied exchange.
///
/// Constructed exactly once, at response completion, and never mutated
/// afterwards — every downstream consumer (the recorder queue, the offset
/// index, the session index, the read API) only ever sees an owned copy or
/// a shared reference to this same value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recording {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub provider: Provider,
    pub request: RequestRecord,
    pub response: ResponseRecord,
    pub response_size: u64,
    pub timing: Timing,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl Recording {
    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty()) || self.response.status >= 400
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn duration_ms_is_never_negative() {
        let t = Timing::new(datetime!(2026-01-01 00:00:00 UTC), datetime!(2026-01-01 00:00:00 UTC));
        assert_eq!(t.duration_ms, 0);
    }

    #[test]
    fn body_round_trips_through_json_untagged_repr() {
        let json_body = Body::Json(serde_json::json!({"a": 1}));
        let encoded = serde_json::to_string(&json_body).unwrap();
        assert_eq!(encoded, r#"{"a":1}"#);
        let decoded: Body = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, json_body);

        let text_body = Body::Text("plain text".to_string());
        let encoded = serde_json::to_string(&text_body).unwrap();
        assert_eq!(encoded, r#""plain text""#);
    }
}
