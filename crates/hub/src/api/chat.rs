//! Client WebSocket endpoints — `/ws/chat` (ephemeral) and
//! `/sessions/{id}/chat` (session-bound), both driving [`agent::run_streaming`].
//!
//! Only one agent task may run concurrently per socket: a new `message`
//! frame cancels whatever turn is already in flight before starting the
//! next one, and a bare `cancel` frame just cancels without starting
//! anything new.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use sa_protocol::{ClientEvent, ClientMessage};

use crate::agent;
use crate::cancel::CancelToken;
use crate::conversation::Conversation;
use crate::hub::SharedConversation;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ChatQuery {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// `GET /ws/chat` — a fresh, unpersisted conversation for the life of the
/// socket.
pub async fn ws_chat(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
) -> impl IntoResponse {
    let model = query.model.unwrap_or_else(|| state.config.sessions.default_model.clone());
    let max_tokens = query.max_tokens.unwrap_or(state.config.sessions.default_max_tokens);
    let mut conv = Conversation::new(Arc::clone(&state.provider), model, query.system, max_tokens);
    state.hub.register_tools_on(&mut conv, None);
    let conv: SharedConversation = Arc::new(tokio::sync::Mutex::new(conv));
    state.hub.track_conversation(&conv);

    ws.on_upgrade(move |socket| run_chat_socket(socket, conv, None))
}

/// `GET /sessions/{id}/chat` — rehydrates the session's transcript and
/// persists it back after every turn (including on cancellation).
/// Per the distilled spec's error table, an unknown session on this
/// endpoint isn't a plain HTTP 404: the socket is upgraded first, then a
/// `{type:"error"}` frame is sent and the connection closed — so the
/// client always gets a WS-framed error rather than a bare HTTP status
/// it would have to special-case.
pub async fn session_ws_chat(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let session_id = Uuid::parse_str(&id).ok();
    let record = session_id.and_then(|sid| state.sessions.load(sid).ok());

    let Some((session_id, record)) = session_id.zip(record) else {
        return ws
            .on_upgrade(|socket| async move { send_error_and_close(socket, "session not found").await })
            .into_response();
    };

    let mut conv = Conversation::new(Arc::clone(&state.provider), record.model, record.system, record.max_tokens)
        .with_messages(record.messages);
    state.hub.register_tools_on(&mut conv, Some(&id));
    let conv: SharedConversation = Arc::new(tokio::sync::Mutex::new(conv));
    state.hub.track_conversation(&conv);

    let session = Some((Arc::clone(&state.sessions), session_id));
    ws.on_upgrade(move |socket| run_chat_socket(socket, conv, session))
        .into_response()
}

async fn send_error_and_close(mut socket: WebSocket, content: &str) {
    let event = ClientEvent::Error { content: content.to_string() };
    if let Ok(json) = serde_json::to_string(&event) {
        let _ = socket.send(Message::Text(json)).await;
    }
    let _ = socket.close().await;
}

type Session = (Arc<sa_sessions::SessionStore>, Uuid);

/// Shared reader/writer loop for both chat endpoints: an outbound task
/// drains a `ClientEvent` channel onto the socket while the inbound loop
/// parses `ClientMessage` frames and starts/cancels agent turns.
async fn run_chat_socket(socket: WebSocket, conv: SharedConversation, session: Option<Session>) {
    let (mut sink, mut stream) = socket.split();
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();

    let writer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let mut current: Option<(CancelToken, JoinHandle<()>)> = None;

    while let Some(frame) = stream.next().await {
        let msg = match frame {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "client websocket error");
                break;
            }
        };
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Message { content }) => {
                if let Some((cancel, handle)) = current.take() {
                    cancel.cancel();
                    let _ = handle.await;
                }
                let cancel = CancelToken::new();
                let task_cancel = cancel.clone();
                let task_conv = conv.clone();
                let task_events = events_tx.clone();
                let task_session = session.clone();
                let handle = tokio::spawn(async move {
                    agent::run_streaming(task_conv, content, task_cancel, task_events, task_session).await;
                });
                current = Some((cancel, handle));
            }
            Ok(ClientMessage::Cancel) => {
                if let Some((cancel, _)) = &current {
                    cancel.cancel();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed client frame, ignoring");
            }
        }
    }

    if let Some((cancel, _handle)) = current.take() {
        // The client is gone, so there's no one left to stream tool_use/
        // tool_result/done events to — cancel the in-flight turn rather
        // than let it run unobserved. `run_streaming`'s own cancellation
        // path still persists whatever partial transcript exists.
        cancel.cancel();
    }
    writer.abort();
}
