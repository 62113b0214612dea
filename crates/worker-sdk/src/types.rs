//! Core types for tool handling: result and error shapes sent back to the hub.

/// Result type for tool handlers. `Ok` becomes the `tool_result.content`
/// string (JSON-encoded if not already a string); `Err` is rendered as
/// `"Error: {message}"`, matching the worker prototype's behavior of
/// stuffing failures into the same content field rather than a side
/// channel — the hub has no notion of a failed vs. successful tool_result.
pub type ToolResult = Result<serde_json::Value, ToolError>;

/// Errors a tool handler can return.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("{0}")]
    Failed(String),
}

/// Top-level SDK error.
#[derive(thiserror::Error, Debug)]
pub enum WorkerSdkError {
    #[error("config: {0}")]
    Config(String),
    #[error("websocket: {0}")]
    WebSocket(String),
    #[error("reconnect exhausted after {0} attempts")]
    ReconnectExhausted(u32),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
