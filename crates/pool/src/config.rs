//! Persisted pool configuration — a JSON sibling of the original
//! prototype's `worker_pool.json`, loaded/saved atomically.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "worker_pool.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerEntry {
    pub id: String,
    pub port: u16,
    pub pid: u32,
}

/// `worker_command` generalizes the original prototype's hardcoded
/// `[sys.executable, "worker.py"]` invocation into an argv prefix any
/// worker binary can be substituted into. Defaults to the `example-worker`
/// binary this workspace produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub hub_url: String,
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    #[serde(default = "default_worker_command")]
    pub worker_command: Vec<String>,
    #[serde(default)]
    pub workers: Vec<WorkerEntry>,
}

fn default_base_port() -> u16 {
    8081
}

fn default_worker_command() -> Vec<String> {
    vec![resolve_example_worker_binary()]
}

/// Look for `example-worker` next to the currently running binary first
/// (covers `cargo run`/`target/debug` layouts), falling back to a bare
/// name so the OS `PATH` is searched.
fn resolve_example_worker_binary() -> String {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("example-worker");
            if candidate.exists() {
                return candidate.to_string_lossy().into_owned();
            }
        }
    }
    "example-worker".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            hub_url: String::new(),
            base_port: default_base_port(),
            worker_command: default_worker_command(),
            workers: Vec::new(),
        }
    }
}

impl PoolConfig {
    pub fn load(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Write to a temp file in the same directory, then rename over the
    /// destination so readers never see a partially-written config.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = tmp_path_for(path);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "worker_pool".to_string());
    path.with_file_name(format!("{file_name}.tmp-{}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_hub_url() {
        let cfg = PoolConfig::default();
        assert!(cfg.hub_url.is_empty());
        assert_eq!(cfg.base_port, 8081);
        assert!(cfg.workers.is_empty());
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        let mut cfg = PoolConfig::default();
        cfg.hub_url = "ws://localhost:9600/ws/worker".into();
        cfg.workers.push(WorkerEntry { id: "w1".into(), port: 8081, pid: 4242 });
        cfg.save(&path).unwrap();

        let loaded = PoolConfig::load(&path).unwrap();
        assert_eq!(loaded.hub_url, cfg.hub_url);
        assert_eq!(loaded.workers, cfg.workers);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.json");
        let cfg = PoolConfig::load(&path).unwrap();
        assert!(cfg.hub_url.is_empty());
    }
}
