use axum::extract::State;
use axum::http::StatusCode;

use crate::state::AppState;

/// `GET /healthz` — `200 ok` once at least one worker is connected, `503`
/// otherwise. An LLM without a tool-capable worker behind it can't
/// meaningfully serve `/prompt`, so readiness tracks worker presence rather
/// than the process simply being up.
pub async fn healthz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.hub.worker_count() > 0 {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "no workers connected")
    }
}
