use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::provider::Provider;

/// A bucket of recordings believed to share an application-level session,
/// discovered via `Sentry-Trace` or a session uuid embedded in `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionGroup {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    pub recording_ids: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub first_timestamp: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_timestamp: OffsetDateTime,
    pub request_count: u64,
    pub providers: Vec<Provider>,
    pub has_errors: bool,
}

impl SessionGroup {
    pub fn new(key_is_trace: bool, key: &str, timestamp: OffsetDateTime) -> Self {
        Self {
            trace_id: if key_is_trace { key.to_string() } else { String::new() },
            session_id: if key_is_trace { String::new() } else { key.to_string() },
            recording_ids: Vec::new(),
            first_timestamp: timestamp,
            last_timestamp: timestamp,
            request_count: 0,
            providers: Vec::new(),
            has_errors: false,
        }
    }
}

/// The whole on-disk `groups/sessions.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIndexFile {
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub total_groups: u64,
    pub groups: std::collections::BTreeMap<String, SessionGroup>,
}

pub const SESSION_INDEX_VERSION: &str = "1.0";
