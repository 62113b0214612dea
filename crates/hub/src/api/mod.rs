//! HTTP + WebSocket front: the full client-facing route table, binding
//! sessions to conversations and driving the agent loop in either blocking
//! or streaming mode.

mod chat;
mod health;
mod prompt;
mod sessions;
mod workers;

use axum::routing::get;
use axum::Router;

use crate::hub::ws::worker_ws;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/prompt", axum::routing::post(prompt::prompt))
        .route("/ws/chat", get(chat::ws_chat))
        .route("/ws/worker", get(worker_ws))
        .route("/api/workers", get(workers::list_workers))
        .route(
            "/sessions",
            get(sessions::list_sessions)
                .post(sessions::create_session)
                .delete(sessions::delete_all_sessions),
        )
        .route("/sessions/clear-all-history", axum::routing::post(sessions::clear_all_history))
        .route(
            "/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/sessions/:id/prompt", axum::routing::post(sessions::session_prompt))
        .route("/sessions/:id/clear", axum::routing::post(sessions::clear_session))
        .route("/sessions/:id/chat", get(chat::session_ws_chat))
        .with_state(state)
}
