use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::provider::Provider;

/// Fixed-size locator enabling O(1) retrieval of one recording without
/// scanning the day file it lives in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    pub filename: String,
    /// Byte offset of the first byte of the JSON line within `filename`.
    pub offset: u64,
    /// Length of the JSON line in bytes, not including the terminating newline.
    pub length: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub provider: Provider,
}
