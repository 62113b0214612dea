//! `/sessions*` — durable, session-bound conversations: create/list/load/
//! delete plus a per-session `/prompt` that replays history and persists
//! the updated transcript.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::agent;
use crate::conversation::Conversation;
use crate::state::AppState;

fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "session not found" })),
    )
}

fn parse_id(id: &str) -> Result<Uuid, impl IntoResponse> {
    Uuid::parse_str(id).map_err(|_| not_found().into_response())
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateSessionBody {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// `POST /sessions` — `201 {session_id}`. The body is optional; an empty
/// request creates a session with the configured defaults.
pub async fn create_session(State(state): State<AppState>, raw: axum::body::Bytes) -> impl IntoResponse {
    let body: CreateSessionBody = if raw.is_empty() {
        CreateSessionBody::default()
    } else {
        match serde_json::from_slice(&raw) {
            Ok(b) => b,
            Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        }
    };
    let model = body.model.unwrap_or_else(|| state.config.sessions.default_model.clone());
    let max_tokens = body.max_tokens.unwrap_or(state.config.sessions.default_max_tokens);

    match state.sessions.create(model, body.system, max_tokens) {
        Ok(record) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "session_id": record.session_id })),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `GET /sessions` — metadata-only listing, newest first.
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    match state.sessions.list_all() {
        Ok(summaries) => Json(summaries).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `DELETE /sessions` — delete every session on disk.
pub async fn delete_all_sessions(State(state): State<AppState>) -> impl IntoResponse {
    match state.sessions.delete_all() {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `POST /sessions/clear-all-history` — clear every session's transcript,
/// keeping header fields and files intact.
pub async fn clear_all_history(State(state): State<AppState>) -> impl IntoResponse {
    match state.sessions.clear_all_history() {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `GET /sessions/{id}` — the full record, including messages.
pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.sessions.load(id) {
        Ok(record) => Json(record).into_response(),
        Err(_) => not_found().into_response(),
    }
}

/// `DELETE /sessions/{id}`.
pub async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.sessions.delete(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => not_found().into_response(),
    }
}

/// `POST /sessions/{id}/clear` — clear one session's transcript.
pub async fn clear_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.sessions.clear_history(id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => not_found().into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionPromptBody {
    pub prompt: String,
}

/// `POST /sessions/{id}/prompt` — load the session's transcript, run one
/// agent turn against it with session-affinity-aware tool dispatch, and
/// persist the updated transcript.
pub async fn session_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SessionPromptBody>,
) -> impl IntoResponse {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if state.hub.worker_count() == 0 {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "no workers connected" })),
        )
            .into_response();
    }

    let record = match state.sessions.load(id) {
        Ok(r) => r,
        Err(_) => return not_found().into_response(),
    };

    let mut conv = Conversation::new(Arc::clone(&state.provider), record.model, record.system, record.max_tokens)
        .with_messages(record.messages);
    let session_id = id.to_string();
    state.hub.register_tools_on(&mut conv, Some(&session_id));

    let result = match agent::run_blocking(&mut conv, &body.prompt).await {
        Ok(result) => result,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    if let Err(e) = state.sessions.save(id, conv.messages.clone()) {
        tracing::warn!(session_id = %id, error = %e, "failed to persist session after /prompt");
    }

    Json(serde_json::json!({ "result": result })).into_response()
}
