//! Wire protocol between the hub and worker processes over WebSocket.
//!
//! A worker connects, sends `register` as its first frame, then answers
//! `tool_call` frames with `tool_result` frames. There is no handshake
//! acknowledgement and no heartbeat at this layer — workers that go silent
//! are detected by their socket closing, not by a missed ping.

use serde::{Deserialize, Serialize};

use sa_domain::tool::ToolDefinition;

/// Frame sizes above this are rejected before JSON parsing, so a
/// misbehaving worker can't wedge the hub's parser on an unbounded buffer.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Worker → hub: the mandatory first frame on a new connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Register {
    /// Stable identifier. If omitted, the hub assigns an 8-hex-char id.
    #[serde(default)]
    pub worker_id: Option<String>,
    pub tools: Vec<ToolDefinition>,
}

/// Hub → worker: dispatch a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Worker → hub: the result of a previously dispatched tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
}

/// The tagged envelope actually sent over the wire. Worker and hub both
/// parse into this; `Register`/`ToolResult` flow worker→hub, `ToolCall`
/// flows hub→worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Register(Register),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

/// Client → hub, over `/ws/chat` or `/sessions/{id}/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Message { content: String },
    Cancel,
}

/// Hub → client, streamed while an agent turn runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    Done {
        content: String,
    },
    Cancelled,
    Error {
        content: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_serializes_with_type_tag() {
        let msg = WorkerMessage::Register(Register {
            worker_id: Some("w1".into()),
            tools: vec![],
        });
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "register");
        assert_eq!(v["worker_id"], "w1");
    }

    #[test]
    fn tool_call_round_trips() {
        let msg = WorkerMessage::ToolCall(ToolCall {
            call_id: "c1".into(),
            name: "echo".into(),
            input: serde_json::json!({"text": "hi"}),
        });
        let raw = serde_json::to_string(&msg).unwrap();
        let back: WorkerMessage = serde_json::from_str(&raw).unwrap();
        match back {
            WorkerMessage::ToolCall(tc) => assert_eq!(tc.name, "echo"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn register_without_worker_id_omits_default() {
        let raw = r#"{"type":"register","tools":[]}"#;
        let msg: WorkerMessage = serde_json::from_str(raw).unwrap();
        match msg {
            WorkerMessage::Register(r) => assert!(r.worker_id.is_none()),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn client_message_cancel_has_no_payload() {
        let raw = r#"{"type":"cancel"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, ClientMessage::Cancel));
    }

    #[test]
    fn client_event_done_serializes_with_tag() {
        let event = ClientEvent::Done { content: "hi".into() };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "done");
        assert_eq!(v["content"], "hi");
    }
}
