//! `sa-worker-sdk` — building blocks for processes that connect to the
//! hub as tool-execution workers.
//!
//! A worker is any process that dials the hub's `/ws/worker` endpoint,
//! registers a set of tool schemas, and answers `tool_call` frames with
//! `tool_result` frames. This crate provides the connection management,
//! reconnect policy, and dispatch plumbing so worker authors only need to
//! implement [`WorkerTool`] for each tool they expose.
//!
//! # Connection flow
//!
//! 1. Connect to the hub's WebSocket endpoint.
//! 2. Send `register { worker_id?, tools }` as the first frame.
//! 3. Loop: on `tool_call`, dispatch to the matching handler (concurrently
//!    — each call runs on its own task) and send back `tool_result`.
//! 4. On disconnect, reconnect with jittered exponential backoff.
//!
//! ```rust,no_run
//! # async fn run() -> anyhow::Result<()> {
//! use sa_worker_sdk::{ToolRegistry, ToolResult, WorkerClient, WorkerTool};
//! use sa_domain::tool::ToolDefinition;
//!
//! struct Echo;
//! #[async_trait::async_trait]
//! impl WorkerTool for Echo {
//!     async fn call(&self, args: serde_json::Value) -> ToolResult {
//!         Ok(args)
//!     }
//! }
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(
//!     ToolDefinition {
//!         name: "echo".into(),
//!         description: "echoes its input".into(),
//!         parameters: serde_json::json!({"type": "object"}),
//!     },
//!     Echo,
//! );
//!
//! let client = WorkerClient::builder()
//!     .server_url("ws://localhost:9600/ws/worker")
//!     .build()?;
//! client.run(registry).await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod reconnect;
pub mod registry;
pub mod types;

pub use builder::WorkerClientBuilder;
pub use client::WorkerClient;
pub use reconnect::ReconnectBackoff;
pub use registry::{ToolRegistry, WorkerTool};
pub use types::{ToolError, ToolResult, WorkerSdkError};

pub use sa_protocol::MAX_FRAME_BYTES;
