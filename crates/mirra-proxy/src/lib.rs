//! The HTTP surface: a reverse proxy that tees every exchange to the
//! recorder, and the read-only API over what has been captured.

mod body_capture;
mod hop_by_hop;
mod read_api;
mod redact;
mod reverse_proxy;
mod routes;
mod state;

pub use routes::build_router;
pub use state::{AppState, UpstreamUrls, DEFAULT_RECORDING_CAP};
