//! `GET /api/workers` — a snapshot of every connected worker: its tool
//! schemas, current busy/idle status, and which sessions it's bound to.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn list_workers(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.workers_info())
}
