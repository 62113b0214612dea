//! The pool manager itself — tracks worker entries, persists them to
//! `worker_pool.json`, and supervises their child processes.
//!
//! Grounded directly in `worker_manager.py`'s `PoolManager` class: the
//! method names and control flow (`add_worker`, `remove_worker`,
//! `remove_all`, `scale_to`, `get_all_status`) are a 1:1 port.

use std::path::{Path, PathBuf};

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{PoolConfig, WorkerEntry};
use crate::process;
use crate::PoolError;

pub struct PoolManager {
    config_path: PathBuf,
    logs_dir: PathBuf,
    config: Mutex<PoolConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub id: String,
    pub port: u16,
    pub pid: u32,
    pub alive: bool,
    pub health: WorkerHealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerHealth {
    Connected,
    Disconnected,
    Unreachable,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScaleResult {
    pub added: Vec<WorkerEntry>,
    pub removed: Vec<String>,
    pub total: usize,
}

impl PoolManager {
    /// Load (or default-initialize) the pool config at `config_path`.
    /// `logs_dir` holds each worker's stdout/stderr log file.
    pub fn load(config_path: impl Into<PathBuf>, logs_dir: impl Into<PathBuf>) -> Result<Self, PoolError> {
        let config_path = config_path.into();
        let config = PoolConfig::load(&config_path).map_err(PoolError::Io)?;
        Ok(Self {
            config_path,
            logs_dir: logs_dir.into(),
            config: Mutex::new(config),
        })
    }

    pub fn hub_url(&self) -> String {
        self.config.lock().hub_url.clone()
    }

    pub fn base_port(&self) -> u16 {
        self.config.lock().base_port
    }

    pub fn workers(&self) -> Vec<WorkerEntry> {
        self.config.lock().workers.clone()
    }

    pub fn set_config(&self, hub_url: String, base_port: u16) -> Result<(), PoolError> {
        let mut cfg = self.config.lock();
        cfg.hub_url = hub_url;
        cfg.base_port = base_port;
        cfg.save(&self.config_path).map_err(PoolError::Io)
    }

    fn next_worker_id(cfg: &PoolConfig) -> String {
        let existing: std::collections::HashSet<&str> =
            cfg.workers.iter().map(|w| w.id.as_str()).collect();
        let mut n = 1;
        loop {
            let candidate = format!("w{n}");
            if !existing.contains(candidate.as_str()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Spawn one worker process and persist its entry.
    pub fn add_worker(&self) -> Result<WorkerEntry, PoolError> {
        let mut cfg = self.config.lock();
        if cfg.hub_url.is_empty() {
            return Err(PoolError::Config("hub_url not configured".into()));
        }

        let id = Self::next_worker_id(&cfg);
        let used_ports: Vec<u16> = cfg.workers.iter().map(|w| w.port).collect();
        let port = process::find_free_port(cfg.base_port, &used_ports);
        let log_path = self.logs_dir.join(format!("worker-{id}.log"));

        let pid = process::spawn_worker(&cfg.worker_command, &cfg.hub_url, port, &log_path)?;
        let entry = WorkerEntry { id, port, pid };
        cfg.workers.push(entry.clone());
        cfg.save(&self.config_path).map_err(PoolError::Io)?;
        Ok(entry)
    }

    /// Kill and forget a single worker by id. Returns `false` if unknown.
    pub fn remove_worker(&self, worker_id: &str) -> Result<bool, PoolError> {
        let mut cfg = self.config.lock();
        let Some(pos) = cfg.workers.iter().position(|w| w.id == worker_id) else {
            return Ok(false);
        };
        let worker = cfg.workers.remove(pos);
        process::kill_process(worker.pid);
        cfg.save(&self.config_path).map_err(PoolError::Io)?;
        Ok(true)
    }

    /// Kill every tracked worker and clear the pool.
    pub fn remove_all(&self) -> Result<usize, PoolError> {
        let mut cfg = self.config.lock();
        let count = cfg.workers.len();
        for w in cfg.workers.drain(..) {
            process::kill_process(w.pid);
        }
        cfg.save(&self.config_path).map_err(PoolError::Io)?;
        Ok(count)
    }

    /// Grow or shrink the pool to `target` workers.
    pub fn scale_to(&self, target: usize) -> Result<ScaleResult, PoolError> {
        let current = self.workers().len();
        let mut added = Vec::new();
        let mut removed = Vec::new();

        if target > current {
            for _ in 0..(target - current) {
                added.push(self.add_worker()?);
            }
        } else if target < current {
            let to_remove: Vec<String> = {
                let mut ids: Vec<String> = self.workers().into_iter().map(|w| w.id).collect();
                ids.reverse();
                ids.truncate(current - target);
                ids
            };
            for id in to_remove {
                self.remove_worker(&id)?;
                removed.push(id);
            }
        }

        Ok(ScaleResult { total: self.workers().len(), added, removed })
    }

    async fn worker_status(worker: WorkerEntry) -> WorkerStatus {
        let alive = process::is_alive(worker.pid);
        let health = if !alive {
            WorkerHealth::Unreachable
        } else {
            match reqwest::Client::new()
                .get(format!("http://127.0.0.1:{}/healthz", worker.port))
                .timeout(std::time::Duration::from_secs(2))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => WorkerHealth::Connected,
                Ok(_) => WorkerHealth::Disconnected,
                Err(_) => WorkerHealth::Unreachable,
            }
        };
        WorkerStatus { id: worker.id, port: worker.port, pid: worker.pid, alive, health }
    }

    /// Poll `/healthz` on every tracked worker concurrently.
    pub async fn get_all_status(&self) -> Vec<WorkerStatus> {
        let workers = self.workers();
        join_all(workers.into_iter().map(Self::worker_status)).await
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
