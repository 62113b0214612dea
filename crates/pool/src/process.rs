//! Process lifecycle helpers: spawning worker children and tearing them
//! down with a SIGINT-then-SIGKILL sequence.

use std::net::TcpListener;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::PoolError;

/// Is `pid` a live process? `kill(pid, 0)` sends no signal, just checks.
pub fn is_alive(pid: u32) -> bool {
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    ret == 0
}

/// Send SIGINT, wait up to 2s for the process to exit, then SIGKILL.
/// Mirrors the original prototype's `_kill_process`.
pub fn kill_process(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGINT);
    }
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

/// Is `port` free to bind on `127.0.0.1`?
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Find the first free port at or above `base_port` that isn't already
/// claimed by another tracked worker.
pub fn find_free_port(base_port: u16, used: &[u16]) -> u16 {
    let mut port = base_port;
    loop {
        if !used.contains(&port) && is_port_available(port) {
            return port;
        }
        port += 1;
    }
}

/// Spawn a worker child process: `worker_command` argv, with
/// `--server <hub_url> --health-port <port>` appended, stdout/stderr
/// redirected to a per-worker log file.
pub fn spawn_worker(
    worker_command: &[String],
    hub_url: &str,
    port: u16,
    log_path: &std::path::Path,
) -> Result<u32, PoolError> {
    let Some((program, rest)) = worker_command.split_first() else {
        return Err(PoolError::Config("worker_command is empty".into()));
    };

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent).map_err(PoolError::Io)?;
    }
    let log_file = std::fs::File::create(log_path).map_err(PoolError::Io)?;
    let log_file_err = log_file.try_clone().map_err(PoolError::Io)?;

    let child = Command::new(program)
        .args(rest)
        .arg("--server")
        .arg(hub_url)
        .arg("--health-port")
        .arg(port.to_string())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_file_err))
        .spawn()
        .map_err(|e| PoolError::Spawn(format!("{program}: {e}")))?;

    Ok(child.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn bogus_pid_is_not_alive() {
        // PID 1 belongs to init; a very high PID is most likely unused.
        assert!(!is_alive(u32::MAX - 1));
    }

    #[test]
    fn find_free_port_skips_used() {
        let port = find_free_port(40000, &[40000, 40001]);
        assert!(port >= 40002);
    }
}
