//! Unix Domain Socket link to the local daemon.
//!
//! One call to [`DaemonLink::exchange`] writes one command frame and reads
//! back one decision frame. The connection is opened lazily and thrown away
//! on any failure or timeout, so a half-read frame can never leak into the
//! next exchange. Retries are left to the caller.

use crate::error::{HawksError, HawksResult, ProtocolError};
use crate::protocol::{CommandFrame, DecisionFrame, FrameReader};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

const READ_CHUNK_SIZE: usize = 4096;

/// Result of one exchange with the daemon.
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// A decision frame arrived before the deadline. Its `command_id` has not
    /// been checked against the command; that is the caller's job.
    Decided(DecisionFrame),
    /// The deadline elapsed first.
    TimedOut,
    /// Connect, write, read or decode failed.
    Failed(HawksError),
}

struct Connection {
    stream: UnixStream,
    frames: FrameReader,
}

impl Connection {
    async fn open(socket_path: &Path, max_frame_bytes: usize) -> HawksResult<Self> {
        let stream = UnixStream::connect(socket_path).await.map_err(|e| {
            HawksError::DaemonConnection(format!(
                "Failed to connect to daemon at {}: {}",
                socket_path.display(),
                e
            ))
        })?;

        debug!(path = %socket_path.display(), "Connected to daemon");

        Ok(Self {
            stream,
            frames: FrameReader::new(max_frame_bytes),
        })
    }

    async fn round_trip(&mut self, command: &CommandFrame) -> HawksResult<DecisionFrame> {
        self.stream
            .write_all(&command.encode())
            .await
            .map_err(|e| HawksError::DaemonConnection(format!("Failed to write to daemon: {}", e)))?;

        debug!(command_id = %command.command_id, "Sent command frame to daemon");

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(body) = self.frames.next_frame()? {
                return Ok(DecisionFrame::decode(&body)?);
            }

            let n = self.stream.read(&mut chunk).await.map_err(|e| {
                HawksError::DaemonConnection(format!("Failed to read from daemon: {}", e))
            })?;

            if n == 0 {
                return Err(HawksError::DaemonConnection(
                    "Daemon closed connection".to_string(),
                ));
            }

            self.frames.extend(&chunk[..n]);
        }
    }
}

/// Exclusively owned link to the daemon's decision socket.
pub struct DaemonLink {
    socket_path: PathBuf,
    max_frame_bytes: usize,
    conn: Option<Connection>,
}

impl DaemonLink {
    pub fn new(socket_path: impl Into<PathBuf>, max_frame_bytes: usize) -> Self {
        Self {
            socket_path: socket_path.into(),
            max_frame_bytes,
            conn: None,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Drop the current connection; the next exchange reconnects.
    pub fn disconnect(&mut self) {
        if self.conn.take().is_some() {
            debug!(path = %self.socket_path.display(), "Disconnected from daemon");
        }
    }

    /// Deliver one command and wait for its decision until `deadline`.
    ///
    /// Connecting counts against the deadline. On `TimedOut` and `Failed` the
    /// connection has already been discarded.
    pub async fn exchange(&mut self, command: &CommandFrame, deadline: Instant) -> ExchangeOutcome {
        if command.total_len() > self.max_frame_bytes {
            return ExchangeOutcome::Failed(
                ProtocolError::FrameTooLarge {
                    size: command.total_len(),
                    max: self.max_frame_bytes,
                }
                .into(),
            );
        }

        match timeout_at(deadline, self.exchange_inner(command)).await {
            Ok(Ok(decision)) => ExchangeOutcome::Decided(decision),
            Ok(Err(e)) => {
                self.disconnect();
                ExchangeOutcome::Failed(e)
            }
            Err(_) => {
                self.disconnect();
                ExchangeOutcome::TimedOut
            }
        }
    }

    async fn exchange_inner(&mut self, command: &CommandFrame) -> HawksResult<DecisionFrame> {
        // The connection is held by this future and only handed back on
        // success; dropping the future (timeout, shutdown) closes it.
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => Connection::open(&self.socket_path, self.max_frame_bytes).await?,
        };

        let decision = conn.round_trip(command).await?;
        self.conn = Some(conn);
        Ok(decision)
    }
}
