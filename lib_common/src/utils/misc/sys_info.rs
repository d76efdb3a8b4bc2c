//! Process and host information, logged once at startup and reused for
//! naming the rolling log files.

use std::path::{Path, PathBuf};
use std::{env, fmt};

use hostname::get;
use local_ip_address::local_ip;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessInfoError {
    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("environment variable error: {0}")]
    VarError(#[from] env::VarError),

    #[error("failed to resolve host information: {0}")]
    HostError(String),
}

/// Information about the current running process and its environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// The full path to the current executable.
    pub process_current_exe: String,
    /// The base name of the executable (filename without extension).
    pub process_basename: String,
    /// The directory where the executable is located.
    pub process_location: String,
    /// The process ID (PID) of the current process.
    pub process_pid: i64,
    /// The user name of the user running the process.
    pub process_user: String,
    /// The hostname of the machine running the process.
    pub process_host: String,
    /// The local IP address of the machine running the process.
    pub process_host_ip: String,
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProcessInfo
    Current exe: {},
    Basename: {},
    Location: {},
    Pid: {},
    User name: {},
    Host: {},
    Host ip: {}
",
            self.process_current_exe,
            self.process_basename,
            self.process_location,
            self.process_pid,
            self.process_user,
            self.process_host,
            self.process_host_ip,
        )
    }
}

/// Collects information about the current process: executable path and
/// basename, PID, user, hostname and local IP.
pub fn get_process_info() -> Result<ProcessInfo, ProcessInfoError> {
    let current_exe: PathBuf = env::current_exe()?;
    let basename = process_basename(&current_exe)?;
    let location = process_location(&current_exe)?;

    let user = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = get()
        .map(|h| h.to_string_lossy().into_owned())
        .map_err(|e| ProcessInfoError::HostError(e.to_string()))?;
    let host_ip = local_ip()
        .map(|ip| ip.to_string())
        .map_err(|e| ProcessInfoError::HostError(e.to_string()))?;

    Ok(ProcessInfo {
        process_current_exe: current_exe.to_string_lossy().into_owned(),
        process_basename: basename,
        process_location: location,
        process_pid: std::process::id() as i64,
        process_user: user,
        process_host: host,
        process_host_ip: host_ip,
    })
}

fn process_basename(exe_path: &Path) -> Result<String, ProcessInfoError> {
    exe_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ProcessInfoError::IoError(std::io::Error::other("failed to get the process basename"))
        })
}

fn process_location(exe_path: &Path) -> Result<String, ProcessInfoError> {
    exe_path
        .parent()
        .and_then(|dir| dir.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ProcessInfoError::IoError(std::io::Error::other("failed to get the process location"))
        })
}
