//! Core worker client — owns the WebSocket connection to the hub, performs
//! the `register` handshake, and dispatches inbound `tool_call` frames to
//! a [`ToolRegistry`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use sa_protocol::{Register, ToolCall, WorkerMessage, MAX_FRAME_BYTES};
use tokio_tungstenite::tungstenite::Message;

use crate::reconnect::ReconnectBackoff;
use crate::registry::ToolRegistry;
use crate::types::WorkerSdkError;

/// A fully-configured worker client ready to connect to the hub.
///
/// Create via [`WorkerClientBuilder`](crate::builder::WorkerClientBuilder).
pub struct WorkerClient {
    pub(crate) server_url: String,
    pub(crate) worker_id: Option<String>,
    pub(crate) reconnect_backoff: ReconnectBackoff,
    /// Flipped to reflect the current connection state, readable from a
    /// `/healthz` handler running alongside this client.
    pub(crate) connected: Arc<AtomicBool>,
}

impl WorkerClient {
    /// Start a new builder.
    pub fn builder() -> crate::builder::WorkerClientBuilder {
        crate::builder::WorkerClientBuilder::new()
    }

    /// A shared flag reflecting whether the connection to the hub is
    /// currently up, suitable for a health endpoint.
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    /// Run the worker client forever: connect, register, serve tool calls,
    /// and reconnect with backoff on disconnect — mirroring the reference
    /// worker's `while True: try ... except ConnectionClosed` loop.
    ///
    /// Returns only if the reconnect policy gives up.
    pub async fn run(self, registry: ToolRegistry) -> Result<(), WorkerSdkError> {
        let registry = Arc::new(registry);
        let mut attempt: u32 = 0;

        loop {
            match self.connect_and_serve(&registry).await {
                Ok(()) => {
                    tracing::info!(server = %self.server_url, "connection closed gracefully");
                }
                Err(e) => {
                    tracing::warn!(server = %self.server_url, error = %e, "connection lost");
                }
            }
            self.connected.store(false, Ordering::SeqCst);

            if self.reconnect_backoff.should_give_up(attempt) {
                return Err(WorkerSdkError::ReconnectExhausted(attempt));
            }

            let delay = self.reconnect_backoff.delay_for_attempt(attempt);
            tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn connect_and_serve(&self, registry: &Arc<ToolRegistry>) -> Result<(), anyhow::Error> {
        tracing::info!(server = %self.server_url, "connecting to hub");
        let (ws, _response) = tokio_tungstenite::connect_async(&self.server_url).await?;
        let (mut sink, mut stream) = ws.split();

        let register = WorkerMessage::Register(Register {
            worker_id: self.worker_id.clone(),
            tools: registry.schemas(),
        });
        sink.send(Message::Text(serde_json::to_string(&register)?)).await?;
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(
            worker_id = ?self.worker_id,
            tools = registry.schemas().len(),
            "registered with hub"
        );

        let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::channel::<WorkerMessage>(64);

        let writer_task = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize outbound message");
                        continue;
                    }
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        });

        while let Some(frame) = stream.next().await {
            let msg = match frame {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "websocket error, dropping connection");
                    break;
                }
            };

            match msg {
                Message::Text(text) => {
                    if text.len() > MAX_FRAME_BYTES {
                        tracing::warn!(bytes = text.len(), "inbound frame too large, ignoring");
                        continue;
                    }
                    match serde_json::from_str::<WorkerMessage>(&text) {
                        Ok(WorkerMessage::ToolCall(call)) => {
                            dispatch_tool_call(registry.clone(), outbound_tx.clone(), call);
                        }
                        Ok(_) => {
                            tracing::debug!("ignoring non-tool_call frame from hub");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "malformed frame from hub, ignoring");
                        }
                    }
                }
                Message::Close(_) => {
                    tracing::info!("hub closed connection");
                    break;
                }
                _ => {}
            }
        }

        writer_task.abort();
        Ok(())
    }
}

/// Run one tool call on its own task, matching the reference worker's
/// `asyncio.create_task(handle_call(...))` — calls run concurrently and
/// each sends its own `tool_result` frame whenever it completes.
fn dispatch_tool_call(
    registry: Arc<ToolRegistry>,
    outbound_tx: tokio::sync::mpsc::Sender<WorkerMessage>,
    call: ToolCall,
) {
    tokio::spawn(async move {
        let content = match registry.get(&call.name) {
            Some(handler) => match handler.call(call.input).await {
                Ok(value) => match value.as_str() {
                    Some(s) => s.to_string(),
                    None => serde_json::to_string(&value).unwrap_or_default(),
                },
                Err(e) => format!("Error: {e}"),
            },
            None => format!("Error: unknown tool '{}'", call.name),
        };

        let result = WorkerMessage::ToolResult(sa_protocol::ToolResult {
            call_id: call.call_id,
            content,
        });
        let _ = outbound_tx.send(result).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> WorkerClient {
        WorkerClient {
            server_url: "ws://localhost:9600".into(),
            worker_id: Some("w1".into()),
            reconnect_backoff: ReconnectBackoff::default(),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn connected_flag_starts_false() {
        let client = test_client();
        assert!(!client.connected_flag().load(Ordering::SeqCst));
    }
}
