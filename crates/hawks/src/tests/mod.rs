//! Integration tests for the Hawks courier.
//!
//! - `harness.rs`          - mock daemon, mock channel and config helpers
//! - `ack.rs`              - acknowledge on ACKNOWLEDGE, never on DO_NOT_ACKNOWLEDGE
//! - `timeout.rs`          - fail-open when the daemon hangs, late responses ignored
//! - `ordering.rs`         - one command in flight, decisions in pull order
//! - `content.rs`          - payload bytes forwarded untouched
//! - `transport_failure.rs` - unreachable daemon, bad correlation, channel errors
//! - `shutdown.rs`         - idle and in-flight shutdown

mod ack;
mod content;
