//! Hawks: Stateless, crash-safe courier for encrypted remote commands.
//!
//! Hawks moves encrypted commands from a device's pub/sub channel to the
//! local daemon, one at a time, and acknowledges each message only when the
//! daemon says so or when the daemon fails to answer in time.
//!
//! # Core Invariants
//!
//! 1. **Content-Agnostic**: payloads are forwarded byte-for-byte, never inspected
//! 2. **One In-Flight**: a second command is never sent before the first resolves
//! 3. **Fail-Open**: a timed-out or unreachable daemon never stalls the channel
//! 4. **Crash-Safe**: nothing is persisted; unacknowledged messages are redelivered
//!
//! # Architecture
//!
//! ```text
//! pub/sub sidecar -> Hawks -> daemon (hawks.sock)
//!        ^                      |
//!        |____ receipt <________|
//! ```

pub mod ably;
pub mod channel;
pub mod config;
pub mod courier;
pub mod daemon_link;
pub mod error;
pub mod logging;
pub mod paths;
pub mod protocol;

#[cfg(test)]
mod tests;

pub use ably::{AblyChannelConsumer, AblyConsumerOptions};
pub use channel::{AckReceipt, AckStatus, ChannelConsumer, ChannelMessage};
pub use config::HawksConfig;
pub use courier::{Courier, CourierState, Disposition};
pub use daemon_link::{DaemonLink, ExchangeOutcome};
pub use error::{ChannelError, HawksError, HawksResult, ProtocolError};
pub use paths::Paths;
pub use protocol::{CommandFrame, DecisionFrame, Outcome};
