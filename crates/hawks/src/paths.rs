//! File system paths for Hawks.

use crate::error::{HawksError, HawksResult};
use std::path::{Path, PathBuf};

/// Overrides the per-user state directory.
pub const ENV_BASE_DIR: &str = "UNBOUND_BASE_DIR";

/// Daemon decision socket filename under the base directory.
const HAWKS_SOCKET_NAME: &str = "hawks.sock";
/// Pub/sub sidecar socket filename under the base directory.
const ABLY_SOCKET_NAME: &str = "ably.sock";

/// Resolves runtime paths under the per-user state directory (`~/.unbound`).
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Uses `UNBOUND_BASE_DIR` when set, otherwise `~/.unbound`.
    pub fn new() -> HawksResult<Self> {
        if let Some(dir) = std::env::var_os(ENV_BASE_DIR).filter(|v| !v.is_empty()) {
            return Ok(Self::with_base_dir(PathBuf::from(dir)));
        }

        let home = dirs::home_dir()
            .ok_or_else(|| HawksError::Config("Could not determine home directory".to_string()))?;

        Ok(Self::with_base_dir(home.join(".unbound")))
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Socket the daemon listens on for command frames (~/.unbound/hawks.sock).
    pub fn hawks_socket_file(&self) -> PathBuf {
        self.base_dir.join(HAWKS_SOCKET_NAME)
    }

    /// Pub/sub sidecar socket (~/.unbound/ably.sock).
    pub fn ably_socket_file(&self) -> PathBuf {
        self.base_dir.join(ABLY_SOCKET_NAME)
    }

    /// Get the logs directory (~/.unbound/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// JSONL log file (~/.unbound/logs/hawks.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("hawks.jsonl")
    }
}
