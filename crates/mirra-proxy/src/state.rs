use std::path::PathBuf;
use std::sync::Arc;

use mirra_storage::{OffsetIndex, Recorder, SessionIndex};

/// Per-provider upstream base URL, e.g. `https://api.anthropic.com`.
#[derive(Debug, Clone)]
pub struct UpstreamUrls {
    pub claude: String,
    pub openai: String,
    pub gemini: String,
}

/// Maximum bytes of a request or response body kept in a `Recording`.
/// Bytes beyond this ceiling are still forwarded to the client but dropped
/// from the capture buffer.
pub const DEFAULT_RECORDING_CAP: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub upstreams: UpstreamUrls,
    pub recorder: Recorder,
    pub offset_index: Arc<OffsetIndex>,
    pub session_index: Arc<SessionIndex>,
    pub recordings_dir: PathBuf,
    pub recording_cap: usize,
    pub recording_enabled: bool,
}
