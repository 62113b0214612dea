//! Builder pattern for constructing a [`WorkerClient`].

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::client::WorkerClient;
use crate::reconnect::ReconnectBackoff;
use crate::types::WorkerSdkError;

/// Fluent builder for [`WorkerClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use sa_worker_sdk::WorkerClientBuilder;
/// let client = WorkerClientBuilder::new()
///     .server_url("ws://localhost:9600")
///     .worker_id("w1")
///     .build()
///     .unwrap();
/// ```
pub struct WorkerClientBuilder {
    server_url: String,
    worker_id: Option<String>,
    reconnect_backoff: ReconnectBackoff,
}

impl WorkerClientBuilder {
    pub fn new() -> Self {
        Self {
            server_url: "ws://localhost:9600".into(),
            worker_id: None,
            reconnect_backoff: ReconnectBackoff::default(),
        }
    }

    /// WebSocket URL of the hub (e.g. `ws://localhost:9600/ws/worker`).
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Stable worker identifier sent in the `register` frame. If unset,
    /// the hub assigns one.
    pub fn worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = Some(id.into());
        self
    }

    /// Override the reconnect backoff policy.
    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.reconnect_backoff = cfg;
        self
    }

    /// Build the [`WorkerClient`].
    pub fn build(self) -> Result<WorkerClient, WorkerSdkError> {
        if self.server_url.is_empty() {
            return Err(WorkerSdkError::Config("server_url is required".into()));
        }

        Ok(WorkerClient {
            server_url: self.server_url,
            worker_id: self.worker_id,
            reconnect_backoff: self.reconnect_backoff,
            connected: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl Default for WorkerClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
