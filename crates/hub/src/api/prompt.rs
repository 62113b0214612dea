//! `POST /prompt` — a one-shot, session-less agent turn. The conversation
//! lives only for the duration of the request; nothing is persisted.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::agent;
use crate::conversation::Conversation;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PromptBody {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// `POST /prompt` per the distilled spec's client HTTP surface: `503` when
/// no worker is connected (tool execution would be a no-op), otherwise
/// `{result}` once the agent loop reaches a terminal `stop_reason`.
pub async fn prompt(State(state): State<AppState>, Json(body): Json<PromptBody>) -> impl IntoResponse {
    if state.hub.worker_count() == 0 {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "no workers connected" })),
        )
            .into_response();
    }

    let model = body.model.unwrap_or_else(|| state.config.sessions.default_model.clone());
    let max_tokens = body.max_tokens.unwrap_or(state.config.sessions.default_max_tokens);

    let mut conv = Conversation::new(Arc::clone(&state.provider), model, body.system, max_tokens);
    state.hub.register_tools_on(&mut conv, None);

    match agent::run_blocking(&mut conv, &body.prompt).await {
        Ok(result) => Json(serde_json::json!({ "result": result })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
