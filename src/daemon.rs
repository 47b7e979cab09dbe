// ABOUTME: Daemon mode support for running sync as a background service
// ABOUTME: Pid file bookkeeping plus unix detach/stop/status

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::state;

/// Path to the PID file under ~/.crm-replicator/.
pub fn pid_file_path() -> Result<PathBuf> {
    Ok(state::get_state_dir()?.join("sync.pid"))
}

/// Path to the log file the detached daemon writes to.
pub fn log_file_path() -> Result<PathBuf> {
    Ok(state::get_state_dir()?.join("sync.log"))
}

#[cfg(unix)]
fn is_process_running(pid: i32) -> bool {
    // Signal 0 probes for existence without delivering anything
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_running(_pid: i32) -> bool {
    false
}

/// Read the PID from the PID file.
pub fn read_pid() -> Result<Option<i32>> {
    let pid_file = pid_file_path()?;

    if !pid_file.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&pid_file)
        .with_context(|| format!("Failed to read PID file: {:?}", pid_file))?;

    let pid: i32 = content
        .trim()
        .parse()
        .with_context(|| format!("Invalid PID in file: {}", content.trim()))?;

    Ok(Some(pid))
}

pub fn remove_pid_file() -> Result<()> {
    let pid_file = pid_file_path()?;
    if pid_file.exists() {
        fs::remove_file(&pid_file)
            .with_context(|| format!("Failed to remove PID file: {:?}", pid_file))?;
    }
    Ok(())
}

/// Status information about the daemon.
#[derive(Debug)]
pub struct DaemonStatus {
    pub running: bool,
    pub pid: Option<i32>,
}

pub fn check_status() -> Result<DaemonStatus> {
    match read_pid()? {
        Some(pid) if is_process_running(pid) => Ok(DaemonStatus {
            running: true,
            pid: Some(pid),
        }),
        Some(pid) => {
            // Stale PID file from a killed process
            tracing::debug!("Removing stale PID file for dead process {}", pid);
            remove_pid_file()?;
            Ok(DaemonStatus {
                running: false,
                pid: None,
            })
        }
        None => Ok(DaemonStatus {
            running: false,
            pid: None,
        }),
    }
}

/// Detach from the terminal and write the PID file. The child continues in
/// the caller's control flow; stdout/stderr are redirected to the log file.
#[cfg(unix)]
pub fn detach() -> Result<()> {
    let status = check_status()?;
    if status.running {
        anyhow::bail!(
            "A sync daemon is already running (pid {}). Stop it with `crm-replicator sync --stop`",
            status.pid.unwrap_or_default()
        );
    }

    let pid_file = pid_file_path()?;
    let log_path = log_file_path()?;
    let log = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open daemon log file: {:?}", log_path))?;
    let log_err = log
        .try_clone()
        .context("Failed to clone daemon log handle")?;

    println!("Starting sync daemon...");
    println!("PID file: {:?}", pid_file);
    println!("Log file: {:?}", log_path);

    daemonize::Daemonize::new()
        .pid_file(&pid_file)
        .working_directory(std::env::current_dir().context("Failed to get working directory")?)
        .stdout(log)
        .stderr(log_err)
        .start()
        .context("Failed to daemonize")?;

    tracing::info!("Sync daemon started (pid {})", std::process::id());
    Ok(())
}

#[cfg(not(unix))]
pub fn detach() -> Result<()> {
    anyhow::bail!("Daemon mode is only supported on unix platforms")
}

/// Stop a running daemon by PID.
#[cfg(unix)]
pub fn stop() -> Result<bool> {
    let Some(pid) = read_pid()? else {
        return Ok(false);
    };

    if !is_process_running(pid) {
        remove_pid_file()?;
        return Ok(false);
    }

    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result != 0 {
        anyhow::bail!("Failed to send SIGTERM to daemon process {}", pid);
    }

    remove_pid_file()?;
    Ok(true)
}

#[cfg(not(unix))]
pub fn stop() -> Result<bool> {
    anyhow::bail!("Daemon mode is only supported on unix platforms")
}
