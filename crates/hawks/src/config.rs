//! Configuration for Hawks.

use crate::error::{HawksError, HawksResult};
use crate::paths::Paths;
use crate::protocol::{DEFAULT_MAX_FRAME_BYTES, HEADER_SIZE};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon socket override.
pub const ENV_HAWKS_SOCKET: &str = "HAWKS_SOCKET";
/// Pub/sub sidecar socket override.
pub const ENV_ABLY_SOCKET: &str = "UNBOUND_ABLY_SOCKET";
/// Daemon response timeout, in seconds.
pub const ENV_DAEMON_TIMEOUT: &str = "HAWKS_DAEMON_TIMEOUT";
/// Shutdown grace period, in seconds.
pub const ENV_SHUTDOWN_TIMEOUT: &str = "HAWKS_SHUTDOWN_TIMEOUT";
/// Maximum frame size, in bytes.
pub const ENV_MAX_FRAME_BYTES: &str = "HAWKS_MAX_FRAME_BYTES";

pub const DEFAULT_DAEMON_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_EVENT_NAME: &str = "remote.command.v1";
pub const DEFAULT_ACK_EVENT_NAME: &str = "remote.command.ack.v1";

const MAX_DEVICE_ID_LEN: usize = 128;

/// Hawks configuration.
#[derive(Debug, Clone)]
pub struct HawksConfig {
    /// Device whose channel this instance consumes
    pub device_id: String,

    /// Path to the daemon's decision socket
    pub socket_path: PathBuf,

    /// Path to the pub/sub sidecar socket
    pub ably_socket_path: PathBuf,

    /// Timeout for daemon response (fail-open escape hatch)
    pub daemon_timeout: Duration,

    /// Grace period for an in-flight exchange once shutdown is requested
    pub shutdown_timeout: Duration,

    /// Upper bound for a frame's `total_len`
    pub max_frame_bytes: usize,

    /// Inbound event carrying encrypted commands
    pub event_name: String,

    /// Outbound event carrying command receipts
    pub ack_event_name: String,

    /// Subscription identifier (unique per instance)
    pub subscription_id: String,

    /// Verbose logging
    pub debug: bool,
}

impl HawksConfig {
    /// Create a new HawksConfig with the given device ID.
    ///
    /// Uses default values for other settings, which can be overridden
    /// via environment variables.
    pub fn new(device_id: String) -> HawksResult<Self> {
        let paths = Paths::new()?;
        Self::from_lookup(device_id, &paths, |key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(device_id: String, paths: &Paths, lookup: F) -> HawksResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let socket_path = var(ENV_HAWKS_SOCKET)
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.hawks_socket_file());

        let ably_socket_path = var(ENV_ABLY_SOCKET)
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.ably_socket_file());

        let daemon_timeout = match var(ENV_DAEMON_TIMEOUT) {
            Some(raw) => Duration::from_secs(parse_number(ENV_DAEMON_TIMEOUT, &raw)?),
            None => DEFAULT_DAEMON_TIMEOUT,
        };

        let shutdown_timeout = match var(ENV_SHUTDOWN_TIMEOUT) {
            Some(raw) => Duration::from_secs(parse_number(ENV_SHUTDOWN_TIMEOUT, &raw)?),
            None => DEFAULT_SHUTDOWN_TIMEOUT,
        };

        let max_frame_bytes = match var(ENV_MAX_FRAME_BYTES) {
            Some(raw) => parse_number(ENV_MAX_FRAME_BYTES, &raw)? as usize,
            None => DEFAULT_MAX_FRAME_BYTES,
        };

        Ok(Self {
            device_id,
            socket_path,
            ably_socket_path,
            daemon_timeout,
            shutdown_timeout,
            max_frame_bytes,
            event_name: DEFAULT_EVENT_NAME.to_string(),
            ack_event_name: DEFAULT_ACK_EVENT_NAME.to_string(),
            subscription_id: format!("hawks-{}", uuid::Uuid::new_v4()),
            debug: false,
        })
    }

    /// Get the pub/sub channel name for this device.
    pub fn channel_name(&self) -> String {
        format!("remote:{}:commands", self.device_id)
    }

    /// Check that all required configuration is present and sane.
    pub fn validate(&self) -> HawksResult<()> {
        validate_device_id(&self.device_id)?;

        if self.socket_path.as_os_str().is_empty() {
            return Err(HawksError::Config("socket path is required".into()));
        }
        if self.ably_socket_path.as_os_str().is_empty() {
            return Err(HawksError::Config(format!(
                "{ENV_ABLY_SOCKET} must not be empty"
            )));
        }
        if self.daemon_timeout.is_zero() {
            return Err(HawksError::Config("daemon timeout must be positive".into()));
        }
        if self.shutdown_timeout.is_zero() {
            return Err(HawksError::Config("shutdown timeout must be positive".into()));
        }
        // Even an empty command needs the full header after the length prefix.
        if self.max_frame_bytes < HEADER_SIZE || self.max_frame_bytes > u32::MAX as usize {
            return Err(HawksError::Config(format!(
                "max frame bytes must be between {} and {}",
                HEADER_SIZE,
                u32::MAX
            )));
        }
        if self.event_name.is_empty() || self.ack_event_name.is_empty() {
            return Err(HawksError::Config("event names are required".into()));
        }

        Ok(())
    }
}

/// Device IDs become part of the channel name, so only a conservative
/// character set is accepted.
pub fn validate_device_id(device_id: &str) -> HawksResult<()> {
    if device_id.is_empty() {
        return Err(HawksError::Config("device ID is required".into()));
    }
    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(HawksError::Config(format!(
            "device ID longer than {MAX_DEVICE_ID_LEN} characters"
        )));
    }
    if let Some(bad) = device_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(HawksError::Config(format!(
            "malformed device ID {device_id:?}: unexpected character {bad:?}"
        )));
    }
    Ok(())
}

fn parse_number(key: &str, raw: &str) -> HawksResult<u64> {
    raw.trim()
        .parse()
        .map_err(|e| HawksError::Config(format!("invalid {key}={raw:?}: {e}")))
}
