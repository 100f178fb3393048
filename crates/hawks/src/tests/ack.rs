//! Acknowledgement on daemon approval, none on daemon rejection.

use super::harness::{test_config, DaemonResponse, MockChannel, MockDaemon};
use crate::channel::AckStatus;
use crate::courier::{Courier, CourierState};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

#[tokio::test]
async fn happy_path_acknowledges_exactly_once() {
    let mut daemon = MockDaemon::new();
    daemon.start();

    let channel = MockChannel::with_messages(&[b"\x01\x02\x03"]);
    let mut courier = Courier::new(
        test_config(daemon.socket_path(), Duration::from_secs(5)),
        channel.clone(),
    );

    let (_tx, rx) = oneshot::channel();
    courier.run(rx).await.unwrap();

    let acks = channel.acks();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].message_id, "m-1");
    assert_eq!(acks[0].receipt.status, AckStatus::Accepted);
    assert!(channel.rejects().is_empty());

    let received = daemon.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].payload, vec![0x01, 0x02, 0x03]);
    assert_eq!(acks[0].receipt.command_id, received[0].command_id);
    assert_eq!(courier.state(), CourierState::ShuttingDown);
}

#[tokio::test]
async fn daemon_rejection_is_never_acknowledged() {
    let mut daemon = MockDaemon::new();
    daemon.queue_response(DaemonResponse::DoNotAck);
    daemon.start();

    let channel = MockChannel::with_messages(&[b"\x01\x02\x03", b"next"]);
    let mut courier = Courier::new(
        test_config(daemon.socket_path(), Duration::from_secs(5)),
        channel.clone(),
    );

    let started = Instant::now();
    let (_tx, rx) = oneshot::channel();
    courier.run(rx).await.unwrap();

    // The loop moved straight on to the next message.
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(channel.acked_ids(), vec!["m-2".to_string()]);

    let rejects = channel.rejects();
    assert_eq!(rejects.len(), 1);
    assert_eq!(rejects[0].message_id, "m-1");
    assert_eq!(rejects[0].receipt.status, AckStatus::Rejected);
    assert_eq!(daemon.received_count(), 2);
}

#[tokio::test]
async fn daemon_result_is_carried_in_receipt() {
    let mut daemon = MockDaemon::new();
    daemon.queue_response(DaemonResponse::AckWithResult(b"sealed-result".to_vec()));
    daemon.start();

    let channel = MockChannel::with_messages(&[b"cmd"]);
    let mut courier = Courier::new(
        test_config(daemon.socket_path(), Duration::from_secs(5)),
        channel.clone(),
    );

    let status = courier.process_one().await.unwrap();
    assert_eq!(status, Some(AckStatus::Accepted));
    assert_eq!(courier.state(), CourierState::Idle);
    assert_eq!(channel.acks()[0].receipt.result, b"sealed-result".to_vec());

    // Queue drained and closed.
    assert_eq!(courier.process_one().await.unwrap(), None);
}

#[tokio::test]
async fn each_message_gets_a_fresh_command_id() {
    let mut daemon = MockDaemon::new();
    daemon.start();

    let channel = MockChannel::with_messages(&[b"same", b"same"]);
    let mut courier = Courier::new(
        test_config(daemon.socket_path(), Duration::from_secs(5)),
        channel.clone(),
    );

    let (_tx, rx) = oneshot::channel();
    courier.run(rx).await.unwrap();

    let received = daemon.received();
    assert_eq!(received.len(), 2);
    assert_ne!(received[0].command_id, received[1].command_id);
    // Both exchanges shared one connection.
    assert_eq!(daemon.accept_count(), 1);
}
