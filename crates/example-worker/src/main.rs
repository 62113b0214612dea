//! Reference tool-execution worker for the hub.
//!
//! Connects to the hub's `/ws/worker` endpoint, advertises three tools, and
//! answers `tool_call` frames through `sa-worker-sdk`:
//!
//! - `ping`          — echo back a pong with a timestamp
//! - `echo`          — echo the arguments back
//! - `fs_read_text`  — read a text file from an allowlisted directory
//!
//! Also serves `GET /healthz` on `--health-port`, returning 200 iff the
//! worker's WebSocket connection to the hub is currently up — this is the
//! endpoint the pool manager polls per worker.
//!
//! Usage:
//!   example-worker --server ws://localhost:9600/ws/worker --health-port 8081
//!
//! Env vars:
//!   EXAMPLE_WORKER_ID          — worker id sent in the register frame (default: hub-assigned)
//!   EXAMPLE_WORKER_ALLOWED_DIR — directory allowed for fs_read_text (default: ".")

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use clap::Parser;
use sa_domain::tool::ToolDefinition;
use sa_worker_sdk::{ToolError, ToolRegistry, ToolResult, WorkerClient, WorkerTool};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "example-worker", about = "Reference tool-execution worker")]
struct Cli {
    /// WebSocket URL of the hub's worker endpoint.
    #[arg(long, default_value = "ws://localhost:9600/ws/worker")]
    server: String,
    /// Port to serve GET /healthz on. 0 disables the health server.
    #[arg(long, default_value_t = 8081)]
    health_port: u16,
    /// Stable worker id sent in the register frame. Falls back to
    /// `EXAMPLE_WORKER_ID`, then to a hub-assigned id if neither is set.
    #[arg(long)]
    id: Option<String>,
}

struct Ping;

#[async_trait::async_trait]
impl WorkerTool for Ping {
    async fn call(&self, _args: serde_json::Value) -> ToolResult {
        Ok(serde_json::json!({
            "pong": true,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        }))
    }
}

struct Echo;

#[async_trait::async_trait]
impl WorkerTool for Echo {
    async fn call(&self, args: serde_json::Value) -> ToolResult {
        Ok(args)
    }
}

/// Reads a UTF-8 text file from `allowed_dir`, rejecting any path that
/// escapes it after canonicalization.
struct FsReadText {
    allowed_dir: PathBuf,
}

#[async_trait::async_trait]
impl WorkerTool for FsReadText {
    async fn call(&self, args: serde_json::Value) -> ToolResult {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArgs("missing 'path' argument".into()))?;

        let canonical_dir = self
            .allowed_dir
            .canonicalize()
            .map_err(|e| ToolError::Failed(format!("allowed dir error: {e}")))?;
        let canonical_file = self
            .allowed_dir
            .join(path)
            .canonicalize()
            .map_err(|e| ToolError::Failed(format!("file not found: {e}")))?;
        if !canonical_file.starts_with(&canonical_dir) {
            return Err(ToolError::Failed("path traversal outside allowed directory".into()));
        }

        let content = tokio::fs::read_to_string(&canonical_file)
            .await
            .map_err(|e| ToolError::Failed(format!("read error: {e}")))?;
        Ok(serde_json::json!({
            "path": canonical_file.display().to_string(),
            "content": content,
        }))
    }
}

fn tool_registry(allowed_dir: &Path) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(
        ToolDefinition {
            name: "ping".into(),
            description: "Echo back a pong with the current timestamp".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        },
        Ping,
    );
    registry.register(
        ToolDefinition {
            name: "echo".into(),
            description: "Echo the given arguments back unchanged".into(),
            parameters: serde_json::json!({"type": "object"}),
        },
        Echo,
    );
    registry.register(
        ToolDefinition {
            name: "fs_read_text".into(),
            description: "Read a text file from the allowed directory".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"],
            }),
        },
        FsReadText { allowed_dir: allowed_dir.to_path_buf() },
    );
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let allowed_dir = PathBuf::from(
        std::env::var("EXAMPLE_WORKER_ALLOWED_DIR").unwrap_or_else(|_| ".".into()),
    );

    let mut builder = WorkerClient::builder().server_url(cli.server.clone());
    if let Some(id) = cli.id.or_else(|| std::env::var("EXAMPLE_WORKER_ID").ok()) {
        builder = builder.worker_id(id);
    }
    let client = builder.build()?;
    let connected = client.connected_flag();

    if cli.health_port != 0 {
        tokio::spawn(serve_health(cli.health_port, connected));
    }

    tracing::info!(url = %cli.server, allowed_dir = %allowed_dir.display(), "starting example worker");
    client.run(tool_registry(&allowed_dir)).await?;
    Ok(())
}

/// `GET /healthz` — 200 iff this worker's WebSocket to the hub is
/// currently connected, else 503. Polled by the pool manager's
/// `get_all_status`.
async fn serve_health(port: u16, connected: Arc<std::sync::atomic::AtomicBool>) {
    async fn healthz(State(connected): State<Arc<std::sync::atomic::AtomicBool>>) -> (StatusCode, &'static str) {
        if connected.load(Ordering::SeqCst) {
            (StatusCode::OK, "ok")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "not connected to hub")
        }
    }

    let app = axum::Router::new()
        .route("/healthz", get(healthz))
        .with_state(connected);

    match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => {
            tracing::info!(port, "worker health endpoint listening");
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "worker health server exited");
            }
        }
        Err(e) => {
            tracing::warn!(port, error = %e, "failed to bind worker health endpoint");
        }
    }
}
