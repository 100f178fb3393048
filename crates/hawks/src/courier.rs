//! Main courier loop orchestration.

use crate::channel::{AckReceipt, AckStatus, ChannelConsumer, ChannelMessage};
use crate::config::HawksConfig;
use crate::daemon_link::{DaemonLink, ExchangeOutcome};
use crate::error::{ChannelError, HawksError, HawksResult, ProtocolError};
use crate::protocol::{CommandFrame, Outcome};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Pause after a transient channel error before pulling again.
const CHANNEL_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Where the courier is in its per-message cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourierState {
    /// Waiting for the next channel message.
    Idle,
    /// A message was pulled; its command is being built.
    Pulled,
    /// A command is outstanding at the daemon.
    Exchanging,
    /// Acting on the exchange result.
    Deciding,
    /// Terminal.
    ShuttingDown,
}

/// What happens to a channel message once its exchange resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge the message, recording why.
    Acknowledge(AckStatus),
    /// Leave the message unacknowledged for redelivery.
    Release,
}

impl Disposition {
    /// Decision table for an exchange result.
    ///
    /// Timeouts and transport failures fail open. A decision answering a
    /// different command counts as a transport failure.
    pub fn from_outcome(command_id: Uuid, outcome: &ExchangeOutcome) -> Self {
        match outcome {
            ExchangeOutcome::Decided(decision) if decision.command_id != command_id => {
                Disposition::Acknowledge(AckStatus::Unreachable)
            }
            ExchangeOutcome::Decided(decision) => match decision.outcome {
                Outcome::Acknowledge => Disposition::Acknowledge(AckStatus::Accepted),
                Outcome::DoNotAcknowledge => Disposition::Release,
            },
            ExchangeOutcome::TimedOut => Disposition::Acknowledge(AckStatus::Timeout),
            ExchangeOutcome::Failed(_) => Disposition::Acknowledge(AckStatus::Unreachable),
        }
    }

    pub fn status(self) -> AckStatus {
        match self {
            Disposition::Acknowledge(status) => status,
            Disposition::Release => AckStatus::Rejected,
        }
    }
}

/// How an in-flight delivery ended relative to a shutdown request.
enum InFlight {
    Completed(HawksResult<AckStatus>),
    CompletedDuringShutdown(HawksResult<AckStatus>),
    Abandoned,
}

/// The Hawks courier.
///
/// Pulls one message at a time from the channel, hands it to the daemon and
/// settles it according to the daemon's decision. At most one exchange is
/// ever outstanding.
pub struct Courier<C: ChannelConsumer> {
    config: HawksConfig,
    channel: C,
    link: DaemonLink,
    state: CourierState,
}

impl<C: ChannelConsumer> Courier<C> {
    pub fn new(config: HawksConfig, channel: C) -> Self {
        let link = DaemonLink::new(config.socket_path.clone(), config.max_frame_bytes);

        Self {
            config,
            channel,
            link,
            state: CourierState::Idle,
        }
    }

    pub fn state(&self) -> CourierState {
        self.state
    }

    pub fn config(&self) -> &HawksConfig {
        &self.config
    }

    fn set_state(&mut self, next: CourierState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Courier state transition");
            self.state = next;
        }
    }

    /// Run the courier loop until `shutdown` fires or the channel closes.
    ///
    /// Shutdown stops pulling immediately. An exchange already in flight gets
    /// `shutdown_timeout` to finish; if it does not, its message is left
    /// unacknowledged. Fatal channel errors are returned.
    pub async fn run(&mut self, mut shutdown: oneshot::Receiver<()>) -> HawksResult<()> {
        info!(
            device_id = %self.config.device_id,
            channel = %self.config.channel_name(),
            socket = %self.link.socket_path().display(),
            timeout_ms = self.config.daemon_timeout.as_millis() as u64,
            "Starting Hawks courier loop"
        );

        loop {
            let pulled = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested while idle");
                    self.set_state(CourierState::ShuttingDown);
                    return Ok(());
                }
                pulled = self.pull() => pulled,
            };

            let message = match pulled {
                Ok(Some(message)) => message,
                Ok(None) => {
                    info!("Channel closed, stopping courier");
                    self.set_state(CourierState::ShuttingDown);
                    return Ok(());
                }
                Err(e) => {
                    self.on_channel_error(e)?;
                    tokio::select! {
                        _ = &mut shutdown => {
                            info!("Shutdown requested while paused");
                            self.set_state(CourierState::ShuttingDown);
                            return Ok(());
                        }
                        _ = tokio::time::sleep(CHANNEL_ERROR_PAUSE) => continue,
                    }
                }
            };

            let grace = self.config.shutdown_timeout;
            let in_flight = {
                let delivery = self.deliver(message);
                tokio::pin!(delivery);

                tokio::select! {
                    result = &mut delivery => InFlight::Completed(result),
                    _ = &mut shutdown => {
                        info!(
                            grace_ms = grace.as_millis() as u64,
                            "Shutdown requested with exchange in flight"
                        );
                        match timeout(grace, &mut delivery).await {
                            Ok(result) => InFlight::CompletedDuringShutdown(result),
                            Err(_) => InFlight::Abandoned,
                        }
                    }
                }
            };

            match in_flight {
                InFlight::Completed(Ok(_)) => {}
                InFlight::Completed(Err(e)) => {
                    // Settling failed; the channel will redeliver the message.
                    self.on_channel_error(e)?;
                }
                InFlight::CompletedDuringShutdown(result) => {
                    if let Err(e) = result {
                        warn!(error = %e, "In-flight message could not be settled before shutdown");
                    }
                    self.set_state(CourierState::ShuttingDown);
                    return Ok(());
                }
                InFlight::Abandoned => {
                    warn!(
                        grace_ms = grace.as_millis() as u64,
                        "Abandoned in-flight exchange at shutdown; message left for redelivery"
                    );
                    self.link.disconnect();
                    self.set_state(CourierState::ShuttingDown);
                    return Ok(());
                }
            }
        }
    }

    /// Pull, exchange and settle exactly one message.
    ///
    /// Returns the receipt status, or `None` if the channel is closed.
    pub async fn process_one(&mut self) -> HawksResult<Option<AckStatus>> {
        match self.pull().await? {
            Some(message) => self.deliver(message).await.map(Some),
            None => Ok(None),
        }
    }

    async fn pull(&mut self) -> HawksResult<Option<ChannelMessage>> {
        self.set_state(CourierState::Idle);
        let message = self.channel.next().await?;
        if message.is_some() {
            self.set_state(CourierState::Pulled);
        }
        Ok(message)
    }

    /// Log a channel-side error, passing fatal ones through.
    fn on_channel_error(&mut self, err: HawksError) -> HawksResult<()> {
        self.set_state(CourierState::Idle);
        match err {
            HawksError::Channel(ChannelError::Fatal(msg)) => {
                error!(error = %msg, "Fatal channel error, stopping courier");
                self.set_state(CourierState::ShuttingDown);
                Err(HawksError::Channel(ChannelError::Fatal(msg)))
            }
            other => {
                warn!(error = %other, "Channel error, continuing");
                Ok(())
            }
        }
    }

    async fn deliver(&mut self, message: ChannelMessage) -> HawksResult<AckStatus> {
        let command_id = Uuid::new_v4();
        let command = CommandFrame::new(command_id, message.encrypted_payload.clone());

        debug!(
            message_id = %message.message_id,
            command_id = %command_id,
            payload_len = command.encrypted_payload.len(),
            "Forwarding command to daemon"
        );

        self.set_state(CourierState::Exchanging);
        let deadline = Instant::now() + self.config.daemon_timeout;
        let outcome = self.link.exchange(&command, deadline).await;

        self.set_state(CourierState::Deciding);
        let disposition = Disposition::from_outcome(command_id, &outcome);

        let result = match outcome {
            ExchangeOutcome::Decided(decision) if decision.command_id != command_id => {
                let mismatch = ProtocolError::CommandIdMismatch {
                    expected: command_id,
                    got: decision.command_id,
                };
                error!(
                    message_id = %message.message_id,
                    command_id = %command_id,
                    error = %mismatch,
                    "Daemon answered a different command, applying fail-open ACK"
                );
                self.link.disconnect();
                Vec::new()
            }
            ExchangeOutcome::Decided(decision) => {
                info!(
                    message_id = %message.message_id,
                    command_id = %command_id,
                    outcome = %decision.outcome,
                    result_len = decision.result.len(),
                    "Daemon decided"
                );
                decision.result
            }
            ExchangeOutcome::TimedOut => {
                warn!(
                    message_id = %message.message_id,
                    command_id = %command_id,
                    timeout_ms = self.config.daemon_timeout.as_millis() as u64,
                    "Daemon timeout, applying fail-open ACK"
                );
                Vec::new()
            }
            ExchangeOutcome::Failed(e) => {
                error!(
                    message_id = %message.message_id,
                    command_id = %command_id,
                    error = %e,
                    "Daemon unreachable, applying fail-open ACK"
                );
                Vec::new()
            }
        };

        let receipt = AckReceipt {
            command_id,
            status: disposition.status(),
            result,
        };

        match disposition {
            Disposition::Acknowledge(status) => {
                self.channel.acknowledge(&message, &receipt).await?;
                info!(
                    message_id = %message.message_id,
                    command_id = %command_id,
                    status = %status,
                    "Message acknowledged"
                );
            }
            Disposition::Release => {
                self.channel.reject(&message, &receipt).await?;
                info!(
                    message_id = %message.message_id,
                    command_id = %command_id,
                    "Message left unacknowledged (daemon declined)"
                );
            }
        }

        self.set_state(CourierState::Idle);
        Ok(receipt.status)
    }
}
