//! `GET /ws/worker` — accepts a worker connection, processes its `register`
//! handshake frame, and then runs a writer/reader task split for the rest
//! of the connection's life, mirroring the teacher's node WebSocket
//! handler: split the socket, spawn a task draining an outbound channel,
//! and read inbound frames on the task that owns the upgrade.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};

use sa_protocol::{Register, WorkerMessage, MAX_FRAME_BYTES};

use crate::state::AppState;

pub async fn worker_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let register = match wait_for_register(&mut stream).await {
        Some(r) => r,
        None => {
            tracing::warn!("worker socket closed before sending a register frame");
            return;
        }
    };

    let worker_id = register
        .worker_id
        .unwrap_or_else(|| format!("{:08x}", rand::random::<u32>()));

    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    state.hub.connect_worker(&worker_id, outbound_tx);
    state.hub.register_tools(&worker_id, register.tools);
    tracing::info!(worker_id = %worker_id, "worker registered");

    let writer = tokio::spawn(async move {
        while let Some(json) = outbound_rx.recv().await {
            if sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let msg = match frame {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(worker_id = %worker_id, error = %e, "worker websocket error");
                break;
            }
        };
        match msg {
            Message::Text(text) => handle_frame(&state, &worker_id, text),
            Message::Close(_) => break,
            _ => {}
        }
    }

    writer.abort();
    state.hub.disconnect_worker(&worker_id).await;
    tracing::info!(worker_id = %worker_id, "worker disconnected");
}

/// Malformed frames are logged and ignored — the connection stays open, as
/// the distilled spec requires — rather than torn down over one bad frame.
fn handle_frame(state: &AppState, worker_id: &str, text: String) {
    if text.len() > MAX_FRAME_BYTES {
        tracing::warn!(worker_id, bytes = text.len(), "inbound frame too large, ignoring");
        return;
    }
    match serde_json::from_str::<WorkerMessage>(&text) {
        Ok(WorkerMessage::ToolResult(result)) => {
            state.hub.complete_call(&result.call_id, result.content);
        }
        Ok(WorkerMessage::Register(r)) => {
            // A worker that re-sends register mid-connection (e.g. to add
            // tools after startup) is treated additively.
            state.hub.register_tools(worker_id, r.tools);
        }
        Ok(WorkerMessage::ToolCall(_)) => {
            tracing::warn!(worker_id, "ignoring tool_call frame received from a worker");
        }
        Err(e) => {
            tracing::warn!(worker_id, error = %e, "malformed worker frame, ignoring");
        }
    }
}

async fn wait_for_register(stream: &mut SplitStream<WebSocket>) -> Option<Register> {
    let frame = stream.next().await?;
    let msg = frame.ok()?;
    let Message::Text(text) = msg else {
        return None;
    };
    match serde_json::from_str::<WorkerMessage>(&text) {
        Ok(WorkerMessage::Register(r)) => Some(r),
        _ => None,
    }
}
