//! Channel consumer contract.
//!
//! The courier sees the device's pub/sub channel as a pull-based, ordered
//! sequence of messages plus a per-message acknowledgement. Connection loss,
//! redelivery and backoff belong to the transport behind the implementation.

use crate::error::ChannelError;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

/// A message pulled from the device's channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    /// Transport-assigned message identifier.
    pub message_id: String,
    /// The encrypted payload bytes, never inspected.
    pub encrypted_payload: Vec<u8>,
    /// When the transport received the message (unix millis), if known.
    pub received_at_ms: Option<i64>,
}

/// Why a message is being acknowledged or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// Daemon answered ACKNOWLEDGE.
    Accepted,
    /// Daemon answered DO_NOT_ACKNOWLEDGE.
    Rejected,
    /// Daemon did not answer before the deadline (fail-open).
    Timeout,
    /// Daemon could not be reached or spoke garbage (fail-open).
    Unreachable,
}

impl AckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AckStatus::Accepted => "accepted",
            AckStatus::Rejected => "rejected",
            AckStatus::Timeout => "timeout",
            AckStatus::Unreachable => "unreachable",
        }
    }
}

impl std::fmt::Display for AckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the courier learned from one exchange, handed to the consumer along
/// with the message it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckReceipt {
    pub command_id: Uuid,
    pub status: AckStatus,
    /// Opaque daemon result, empty when there was no decision.
    pub result: Vec<u8>,
}

/// Pull-based view of one device's command channel.
#[async_trait]
pub trait ChannelConsumer: Send {
    /// Wait for the next inbound message.
    ///
    /// `Ok(None)` means the consumer is closed and no more messages will come.
    async fn next(&mut self) -> Result<Option<ChannelMessage>, ChannelError>;

    /// Mark `message` as consumed. Acknowledging the same message twice is a
    /// no-op.
    async fn acknowledge(
        &mut self,
        message: &ChannelMessage,
        receipt: &AckReceipt,
    ) -> Result<(), ChannelError>;

    /// Called instead of `acknowledge` when the daemon declined the command.
    /// The message stays unacknowledged.
    async fn reject(
        &mut self,
        message: &ChannelMessage,
        receipt: &AckReceipt,
    ) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_status_wire_names() {
        assert_eq!(AckStatus::Accepted.to_string(), "accepted");
        assert_eq!(AckStatus::Rejected.to_string(), "rejected");
        assert_eq!(AckStatus::Timeout.to_string(), "timeout");
        assert_eq!(AckStatus::Unreachable.to_string(), "unreachable");
        assert_eq!(
            serde_json::to_string(&AckStatus::Timeout).unwrap(),
            "\"timeout\""
        );
    }
}
