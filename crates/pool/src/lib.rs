//! `sa-pool` — the Worker Pool Manager: supervises local worker child
//! processes on behalf of a hub, grounded 1:1 in the original prototype's
//! `worker_manager.py`.

pub mod api;
pub mod config;
pub mod manager;
pub mod process;

pub use config::{PoolConfig, WorkerEntry, DEFAULT_CONFIG_FILE};
pub use manager::{PoolManager, ScaleResult, WorkerHealth, WorkerStatus};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: {0}")]
    Config(String),
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}
