//! Payloads are forwarded byte-for-byte.

use super::harness::{test_config, MockChannel, MockDaemon};
use crate::courier::Courier;
use std::time::Duration;
use tokio::sync::oneshot;

async fn forward(payloads: &[&[u8]]) -> Vec<Vec<u8>> {
    let mut daemon = MockDaemon::new();
    daemon.start();

    let channel = MockChannel::with_messages(payloads);
    let mut courier = Courier::new(
        test_config(daemon.socket_path(), Duration::from_secs(5)),
        channel.clone(),
    );

    let (_tx, rx) = oneshot::channel();
    courier.run(rx).await.unwrap();

    assert_eq!(channel.acks().len(), payloads.len());
    daemon.received().into_iter().map(|r| r.payload).collect()
}

#[tokio::test]
async fn non_utf8_bytes_arrive_unmodified() {
    let garbage: &[u8] = &[0xFF, 0xFE, 0x00, 0x80, 0xC3, 0x28, 0x0A, 0x0D];
    let received = forward(&[garbage]).await;
    assert_eq!(received, vec![garbage.to_vec()]);
}

#[tokio::test]
async fn json_lookalike_is_not_interpreted() {
    let almost_json: &[u8] = b"{\"type\":\"shutdown\",\"outcome\":2";
    let frame_lookalike: &[u8] = &[0x05, 0x00, 0x00, 0x00, 0x02, 0x02, 0x00, 0x00, 0x00];
    let received = forward(&[almost_json, frame_lookalike]).await;
    assert_eq!(received, vec![almost_json.to_vec(), frame_lookalike.to_vec()]);
}

#[tokio::test]
async fn empty_and_large_payloads_arrive_unmodified() {
    let large: Vec<u8> = (0..512 * 1024).map(|i| (i % 251) as u8).collect();
    let received = forward(&[b"", &large]).await;
    assert_eq!(received.len(), 2);
    assert!(received[0].is_empty());
    assert_eq!(received[1], large);
}
