use axum::Router;
use axum::routing::get;

use crate::read_api::{get_recording, get_session, list_recordings, list_sessions, parse_recording};
use crate::reverse_proxy::proxy_handler;
use crate::state::AppState;

async fn health() -> &'static str {
    "OK"
}

/// Assemble the full HTTP surface: health check, the read API under
/// `/api/...`, and the catch-all reverse proxy for everything else.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/recordings", get(list_recordings))
        .route("/api/recordings/{id}", get(get_recording))
        .route("/api/recordings/{id}/parse", get(parse_recording))
        .route("/api/groups/sessions", get(list_sessions))
        .route("/api/groups/sessions/{trace_id}", get(get_session))
        .fallback(proxy_handler)
        .with_state(state)
}
