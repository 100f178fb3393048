//! Channel consumer backed by the local pub/sub sidecar.
//!
//! The sidecar owns the realtime connection (auth, reconnects, backoff) and
//! exposes it over a Unix socket speaking newline-delimited JSON:
//!
//! ```text
//! -> {"op":"subscribe.v1","request_id":..,"subscription_id":..,"channel":..,"event":..}
//! <- {"op":"subscribe.ack.v1","request_id":..,"ok":true}
//! <- {"op":"message.v1","subscription_id":..,"message_id":..,"event":..,"payload_b64":..}
//! -> {"op":"publish.ack.v1","request_id":..,"channel":..,"event":..,"payload_b64":..}
//! <- {"op":"publish.ack.v1","request_id":..,"ok":true}
//! ```
//!
//! Acknowledging a message publishes a receipt on the same channel.

use crate::channel::{AckReceipt, AckStatus, ChannelConsumer, ChannelMessage};
use crate::config::HawksConfig;
use crate::error::{ChannelError, HawksError, HawksResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

const OP_SUBSCRIBE: &str = "subscribe.v1";
const OP_PUBLISH_ACK: &str = "publish.ack.v1";

/// Receipt payload schema version.
const RECEIPT_SCHEMA_VERSION: u32 = 1;

/// How many acknowledged message ids are remembered for idempotency.
const ACKED_HISTORY: usize = 256;

/// Settings for [`AblyChannelConsumer`].
#[derive(Debug, Clone)]
pub struct AblyConsumerOptions {
    pub socket_path: PathBuf,
    pub channel: String,
    /// Only messages with this event name are yielded; empty accepts all.
    pub event: String,
    pub ack_event: String,
    pub subscription_id: String,
    /// Longest accepted JSON line.
    pub max_line_bytes: usize,
    /// Bound on waiting for a sidecar reply.
    pub request_timeout: Duration,
    pub reconnect_delay: Duration,
    /// Consecutive failed reconnects before the error becomes fatal.
    pub max_reconnect_attempts: u32,
}

impl AblyConsumerOptions {
    pub fn from_config(config: &HawksConfig) -> Self {
        Self {
            socket_path: config.ably_socket_path.clone(),
            channel: config.channel_name(),
            event: config.event_name.clone(),
            ack_event: config.ack_event_name.clone(),
            subscription_id: config.subscription_id.clone(),
            // base64 inflates payloads by 4/3, plus envelope fields
            max_line_bytes: config.max_frame_bytes.saturating_mul(2).max(64 * 1024),
            request_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
        }
    }
}

#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    op: &'static str,
    request_id: String,
    subscription_id: &'a str,
    channel: &'a str,
    event: &'a str,
}

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    op: &'static str,
    request_id: String,
    channel: &'a str,
    event: &'a str,
    payload_b64: String,
    timeout_ms: u64,
}

#[derive(Debug, Serialize)]
struct CommandReceipt {
    schema_version: u32,
    command_id: String,
    status: AckStatus,
    created_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_b64: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequestAck {
    request_id: String,
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    subscription_id: String,
    message_id: String,
    #[serde(default)]
    event: String,
    payload_b64: String,
    #[serde(default)]
    received_at_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op")]
enum Inbound {
    #[serde(rename = "subscribe.ack.v1")]
    SubscribeAck(RequestAck),
    #[serde(rename = "publish.ack.v1")]
    PublishAck(RequestAck),
    #[serde(rename = "message.v1")]
    Message(MessageEnvelope),
}

struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    line: Vec<u8>,
    /// Dropping the rest of an oversized line.
    discarding: bool,
}

impl Session {
    async fn write_json<T: Serialize>(&mut self, value: &T) -> HawksResult<()> {
        let mut encoded = serde_json::to_vec(value)?;
        encoded.push(b'\n');
        self.writer.write_all(&encoded).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read the next well-formed envelope. `Ok(None)` on EOF.
    ///
    /// Oversized and unparseable lines are skipped. Partially read lines stay
    /// buffered, so this is safe to cancel.
    async fn read_envelope(&mut self, max_line_bytes: usize) -> HawksResult<Option<Inbound>> {
        loop {
            let limit = (max_line_bytes + 1).saturating_sub(self.line.len()) as u64;
            let n = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.line)
                .await?;
            let complete = self.line.ends_with(b"\n");

            if self.discarding {
                self.line.clear();
                if complete {
                    self.discarding = false;
                } else if n == 0 {
                    return Ok(None);
                }
                continue;
            }

            if !complete {
                if self.line.len() > max_line_bytes {
                    warn!(max_line_bytes, "Skipping oversized sidecar line");
                    self.line.clear();
                    self.discarding = true;
                    continue;
                }
                if n == 0 {
                    return Ok(None);
                }
                continue;
            }

            let line = std::mem::take(&mut self.line);
            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_slice::<Inbound>(trimmed) {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(e) => {
                    warn!(error = %e, "Skipping unrecognised sidecar frame");
                }
            }
        }
    }
}

/// [`ChannelConsumer`] over the pub/sub sidecar socket.
pub struct AblyChannelConsumer {
    options: AblyConsumerOptions,
    session: Option<Session>,
    inbox: VecDeque<ChannelMessage>,
    acked: VecDeque<String>,
    failed_reconnects: u32,
}

impl AblyChannelConsumer {
    /// Connect to the sidecar and subscribe to the device's channel.
    ///
    /// Failure here is a startup failure; the caller should not retry.
    pub async fn connect(options: AblyConsumerOptions) -> HawksResult<Self> {
        let mut consumer = Self {
            options,
            session: None,
            inbox: VecDeque::new(),
            acked: VecDeque::with_capacity(ACKED_HISTORY),
            failed_reconnects: 0,
        };
        consumer.open_session().await?;
        Ok(consumer)
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn open_session(&mut self) -> HawksResult<()> {
        let stream = UnixStream::connect(&self.options.socket_path)
            .await
            .map_err(|e| {
                ChannelError::Transient(format!(
                    "Failed to connect to pub/sub sidecar at {}: {}",
                    self.options.socket_path.display(),
                    e
                ))
            })?;

        let (reader, writer) = stream.into_split();
        let mut session = Session {
            reader: BufReader::new(reader),
            writer,
            line: Vec::new(),
            discarding: false,
        };

        let request_id = Uuid::new_v4().to_string();
        session
            .write_json(&SubscribeRequest {
                op: OP_SUBSCRIBE,
                request_id: request_id.clone(),
                subscription_id: &self.options.subscription_id,
                channel: &self.options.channel,
                event: &self.options.event,
            })
            .await?;

        let ack = timeout(
            self.options.request_timeout,
            self.await_reply(&mut session, &request_id, false),
        )
        .await
        .map_err(|_| ChannelError::Transient("Timed out waiting for subscribe ack".into()))??;

        if !ack.ok {
            // The sidecar refused the subscription (bad credentials, capability)
            return Err(ChannelError::Fatal(format!(
                "Subscription to {} rejected: {}",
                self.options.channel,
                ack.error.unwrap_or_else(|| "no reason given".into())
            ))
            .into());
        }

        info!(
            channel = %self.options.channel,
            subscription_id = %self.options.subscription_id,
            "Subscribed to command channel"
        );

        self.session = Some(session);
        Ok(())
    }

    /// Read until the reply for `request_id` arrives, queueing any messages.
    async fn await_reply(
        &mut self,
        session: &mut Session,
        request_id: &str,
        publish: bool,
    ) -> HawksResult<RequestAck> {
        loop {
            let envelope = session
                .read_envelope(self.options.max_line_bytes)
                .await?
                .ok_or_else(|| ChannelError::Transient("Sidecar closed connection".into()))?;

            match envelope {
                Inbound::SubscribeAck(ack) if !publish && ack.request_id == request_id => {
                    return Ok(ack)
                }
                Inbound::PublishAck(ack) if publish && ack.request_id == request_id => {
                    return Ok(ack)
                }
                Inbound::Message(message) => {
                    if let Some(message) = self.accept(message) {
                        self.inbox.push_back(message);
                    }
                }
                other => debug!(envelope = ?other, "Ignoring unrelated sidecar reply"),
            }
        }
    }

    /// Filter and decode an inbound message envelope.
    fn accept(&self, envelope: MessageEnvelope) -> Option<ChannelMessage> {
        if envelope.subscription_id != self.options.subscription_id {
            debug!(
                subscription_id = %envelope.subscription_id,
                "Skipping message for another subscription"
            );
            return None;
        }
        if !self.options.event.is_empty() && envelope.event != self.options.event {
            debug!(
                message_id = %envelope.message_id,
                event = %envelope.event,
                "Skipping non-command event"
            );
            return None;
        }

        match BASE64.decode(envelope.payload_b64.as_bytes()) {
            Ok(encrypted_payload) => Some(ChannelMessage {
                message_id: envelope.message_id,
                encrypted_payload,
                received_at_ms: envelope.received_at_ms,
            }),
            Err(e) => {
                warn!(
                    message_id = %envelope.message_id,
                    error = %e,
                    "Dropping message with invalid payload_b64"
                );
                None
            }
        }
    }

    async fn reconnect(&mut self) -> Result<(), ChannelError> {
        tokio::time::sleep(self.options.reconnect_delay).await;

        match self.open_session().await {
            Ok(()) => {
                self.failed_reconnects = 0;
                Ok(())
            }
            Err(HawksError::Channel(err)) if err.is_fatal() => Err(err),
            Err(e) => {
                self.failed_reconnects += 1;
                if self.failed_reconnects >= self.options.max_reconnect_attempts {
                    return Err(ChannelError::Fatal(format!(
                        "Gave up reconnecting to pub/sub sidecar after {} attempts: {}",
                        self.failed_reconnects, e
                    )));
                }
                Err(ChannelError::Transient(format!(
                    "Reconnect attempt {} failed: {}",
                    self.failed_reconnects, e
                )))
            }
        }
    }

    async fn publish_receipt(&mut self, receipt: &AckReceipt) -> HawksResult<()> {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| ChannelError::Transient("Not connected to pub/sub sidecar".into()))?;

        let payload = CommandReceipt {
            schema_version: RECEIPT_SCHEMA_VERSION,
            command_id: receipt.command_id.to_string(),
            status: receipt.status,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
            result_b64: (!receipt.result.is_empty()).then(|| BASE64.encode(&receipt.result)),
        };

        let request_id = Uuid::new_v4().to_string();
        let request = PublishRequest {
            op: OP_PUBLISH_ACK,
            request_id: request_id.clone(),
            channel: &self.options.channel,
            event: &self.options.ack_event,
            payload_b64: BASE64.encode(serde_json::to_vec(&payload)?),
            timeout_ms: self.options.request_timeout.as_millis() as u64,
        };

        // On any early return `session` is dropped and the next pull
        // reconnects; a half-finished round trip leaves the stream unusable.
        session.write_json(&request).await?;

        let request_timeout = self.options.request_timeout;
        let ack = timeout(
            request_timeout,
            self.await_reply(&mut session, &request_id, true),
        )
        .await
        .map_err(|_| ChannelError::Transient("Timed out waiting for publish ack".into()))??;

        self.session = Some(session);

        if ack.ok {
            Ok(())
        } else {
            Err(ChannelError::Transient(format!(
                "Sidecar rejected receipt publish: {}",
                ack.error.unwrap_or_default()
            ))
            .into())
        }
    }
}

fn to_channel_error(err: HawksError) -> ChannelError {
    match err {
        HawksError::Channel(err) => err,
        other => ChannelError::Transient(other.to_string()),
    }
}

#[async_trait]
impl ChannelConsumer for AblyChannelConsumer {
    async fn next(&mut self) -> Result<Option<ChannelMessage>, ChannelError> {
        loop {
            if let Some(message) = self.inbox.pop_front() {
                return Ok(Some(message));
            }

            if self.session.is_none() {
                self.reconnect().await?;
            }

            let Some(mut session) = self.session.take() else {
                continue;
            };

            match session.read_envelope(self.options.max_line_bytes).await {
                Ok(Some(Inbound::Message(envelope))) => {
                    self.session = Some(session);
                    if let Some(message) = self.accept(envelope) {
                        debug!(
                            message_id = %message.message_id,
                            payload_len = message.encrypted_payload.len(),
                            "Received command message"
                        );
                        return Ok(Some(message));
                    }
                }
                Ok(Some(other)) => {
                    self.session = Some(session);
                    debug!(envelope = ?other, "Ignoring stray sidecar reply");
                }
                Ok(None) => {
                    warn!("Pub/sub sidecar closed connection");
                    return Err(ChannelError::Transient(
                        "Pub/sub sidecar closed connection".into(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Pub/sub sidecar read failed");
                    return Err(to_channel_error(e));
                }
            }
        }
    }

    async fn acknowledge(
        &mut self,
        message: &ChannelMessage,
        receipt: &AckReceipt,
    ) -> Result<(), ChannelError> {
        if self.acked.contains(&message.message_id) {
            debug!(message_id = %message.message_id, "Message already acknowledged");
            return Ok(());
        }

        self.publish_receipt(receipt)
            .await
            .map_err(to_channel_error)?;

        if self.acked.len() == ACKED_HISTORY {
            self.acked.pop_front();
        }
        self.acked.push_back(message.message_id.clone());

        debug!(
            message_id = %message.message_id,
            command_id = %receipt.command_id,
            status = %receipt.status,
            "Published command receipt"
        );
        Ok(())
    }

    async fn reject(
        &mut self,
        message: &ChannelMessage,
        receipt: &AckReceipt,
    ) -> Result<(), ChannelError> {
        self.publish_receipt(receipt)
            .await
            .map_err(to_channel_error)?;

        debug!(
            message_id = %message.message_id,
            command_id = %receipt.command_id,
            "Published rejection receipt"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use tempfile::{tempdir, TempDir};
    use tokio::net::UnixListener;

    const SUBSCRIPTION: &str = "hawks-test";

    fn options(dir: &TempDir) -> AblyConsumerOptions {
        AblyConsumerOptions {
            socket_path: dir.path().join("ably.sock"),
            channel: "remote:device-1:commands".into(),
            event: "remote.command.v1".into(),
            ack_event: "remote.command.ack.v1".into(),
            subscription_id: SUBSCRIPTION.into(),
            max_line_bytes: 64 * 1024,
            request_timeout: Duration::from_secs(2),
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_attempts: 2,
        }
    }

    fn message_line(message_id: &str, event: &str, payload: &[u8]) -> String {
        json!({
            "op": "message.v1",
            "subscription_id": SUBSCRIPTION,
            "message_id": message_id,
            "channel": "remote:device-1:commands",
            "event": event,
            "payload_b64": BASE64.encode(payload),
            "received_at_ms": 1_700_000_000_000i64,
        })
        .to_string()
    }

    /// Accepts one connection, acks the subscription, writes `after_subscribe`
    /// lines, then acks every publish (recording it) and optionally pushes one
    /// more message before each publish ack.
    fn spawn_sidecar(
        listener: UnixListener,
        subscribe_ok: bool,
        after_subscribe: Vec<String>,
        before_publish_ack: Option<String>,
        published: Arc<Mutex<Vec<Value>>>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();

            let subscribe: Value =
                serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            assert_eq!(subscribe["op"], "subscribe.v1");
            assert_eq!(subscribe["channel"], "remote:device-1:commands");
            assert_eq!(subscribe["event"], "remote.command.v1");
            let mut ack = json!({
                "op": "subscribe.ack.v1",
                "request_id": subscribe["request_id"],
                "ok": subscribe_ok,
            });
            if !subscribe_ok {
                ack["error"] = json!("token capability denied");
            }
            writer
                .write_all(format!("{ack}\n").as_bytes())
                .await
                .unwrap();

            for line in after_subscribe {
                writer.write_all(format!("{line}\n").as_bytes()).await.unwrap();
            }

            let mut extra = before_publish_ack;
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                published.lock().unwrap().push(request.clone());
                if let Some(message) = extra.take() {
                    writer
                        .write_all(format!("{message}\n").as_bytes())
                        .await
                        .unwrap();
                }
                let reply = json!({
                    "op": "publish.ack.v1",
                    "request_id": request["request_id"],
                    "ok": true,
                });
                writer
                    .write_all(format!("{reply}\n").as_bytes())
                    .await
                    .unwrap();
            }
        })
    }

    fn receipt(status: AckStatus) -> AckReceipt {
        AckReceipt {
            command_id: Uuid::new_v4(),
            status,
            result: vec![],
        }
    }

    fn decode_receipt(request: &Value) -> Value {
        let raw = BASE64
            .decode(request["payload_b64"].as_str().unwrap())
            .unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_yields_command_messages_in_order() {
        let dir = tempdir().unwrap();
        let opts = options(&dir);
        let listener = UnixListener::bind(&opts.socket_path).unwrap();

        let foreign = json!({
            "op": "message.v1",
            "subscription_id": "someone-else",
            "message_id": "m-x",
            "event": "remote.command.v1",
            "payload_b64": BASE64.encode(b"nope"),
        })
        .to_string();

        let server = spawn_sidecar(
            listener,
            true,
            vec![
                message_line("m-1", "remote.command.v1", &[0xFF, 0x00, 0x01]),
                message_line("m-2", "presence.v1", b"ignored"),
                foreign,
                "not json at all".to_string(),
                message_line("m-3", "remote.command.v1", b"second"),
            ],
            None,
            Arc::new(Mutex::new(Vec::new())),
        );

        let mut consumer = AblyChannelConsumer::connect(opts).await.unwrap();

        let first = consumer.next().await.unwrap().unwrap();
        assert_eq!(first.message_id, "m-1");
        assert_eq!(first.encrypted_payload, vec![0xFF, 0x00, 0x01]);
        assert_eq!(first.received_at_ms, Some(1_700_000_000_000));

        let second = consumer.next().await.unwrap().unwrap();
        assert_eq!(second.message_id, "m-3");
        assert_eq!(second.encrypted_payload, b"second".to_vec());

        server.abort();
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped_without_dropping_session() {
        let dir = tempdir().unwrap();
        let mut opts = options(&dir);
        opts.max_line_bytes = 1024;
        let listener = UnixListener::bind(&opts.socket_path).unwrap();

        let server = spawn_sidecar(
            listener,
            true,
            vec![
                message_line("m-big", "remote.command.v1", &[0xAB; 4096]),
                message_line("m-after", "remote.command.v1", b"after"),
            ],
            None,
            Arc::new(Mutex::new(Vec::new())),
        );

        let mut consumer = AblyChannelConsumer::connect(opts).await.unwrap();

        let next = consumer.next().await.unwrap().unwrap();
        assert_eq!(next.message_id, "m-after");
        assert_eq!(next.encrypted_payload, b"after".to_vec());
        assert!(consumer.is_connected());

        server.abort();
    }

    #[tokio::test]
    async fn test_acknowledge_publishes_receipt_once() {
        let dir = tempdir().unwrap();
        let opts = options(&dir);
        let listener = UnixListener::bind(&opts.socket_path).unwrap();
        let published = Arc::new(Mutex::new(Vec::new()));

        let server = spawn_sidecar(
            listener,
            true,
            vec![message_line("m-1", "remote.command.v1", b"cmd")],
            None,
            published.clone(),
        );

        let mut consumer = AblyChannelConsumer::connect(opts).await.unwrap();
        let message = consumer.next().await.unwrap().unwrap();

        let mut accepted = receipt(AckStatus::Accepted);
        accepted.result = vec![1, 2, 3];
        consumer.acknowledge(&message, &accepted).await.unwrap();
        consumer.acknowledge(&message, &accepted).await.unwrap();

        let published = published.lock().unwrap().clone();
        assert_eq!(published.len(), 1, "second acknowledge must be a no-op");
        assert_eq!(published[0]["op"], "publish.ack.v1");
        assert_eq!(published[0]["channel"], "remote:device-1:commands");
        assert_eq!(published[0]["event"], "remote.command.ack.v1");

        let body = decode_receipt(&published[0]);
        assert_eq!(body["schema_version"], 1);
        assert_eq!(body["status"], "accepted");
        assert_eq!(body["command_id"], accepted.command_id.to_string());
        assert_eq!(body["result_b64"], BASE64.encode([1u8, 2, 3]));

        server.abort();
    }

    #[tokio::test]
    async fn test_message_during_publish_is_queued() {
        let dir = tempdir().unwrap();
        let opts = options(&dir);
        let listener = UnixListener::bind(&opts.socket_path).unwrap();
        let published = Arc::new(Mutex::new(Vec::new()));

        let server = spawn_sidecar(
            listener,
            true,
            vec![message_line("m-1", "remote.command.v1", b"one")],
            Some(message_line("m-2", "remote.command.v1", b"two")),
            published.clone(),
        );

        let mut consumer = AblyChannelConsumer::connect(opts).await.unwrap();
        let first = consumer.next().await.unwrap().unwrap();
        consumer
            .reject(&first, &receipt(AckStatus::Rejected))
            .await
            .unwrap();

        let second = consumer.next().await.unwrap().unwrap();
        assert_eq!(second.message_id, "m-2");
        assert_eq!(second.encrypted_payload, b"two".to_vec());

        let body = decode_receipt(&published.lock().unwrap()[0]);
        assert_eq!(body["status"], "rejected");
        assert!(body.get("result_b64").is_none());

        server.abort();
    }

    #[tokio::test]
    async fn test_rejected_subscription_is_fatal() {
        let dir = tempdir().unwrap();
        let opts = options(&dir);
        let listener = UnixListener::bind(&opts.socket_path).unwrap();
        let server = spawn_sidecar(listener, false, vec![], None, Arc::new(Mutex::new(vec![])));

        let err = AblyChannelConsumer::connect(opts).await.err().unwrap();
        assert!(matches!(err, HawksError::Channel(ChannelError::Fatal(msg)) if msg.contains("token capability denied")));

        server.abort();
    }

    #[tokio::test]
    async fn test_missing_sidecar_fails_connect() {
        let dir = tempdir().unwrap();
        let result = AblyChannelConsumer::connect(options(&dir)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_lost_sidecar_becomes_fatal_after_bounded_reconnects() {
        let dir = tempdir().unwrap();
        let opts = options(&dir);
        let socket_path = opts.socket_path.clone();
        let listener = UnixListener::bind(&socket_path).unwrap();

        // Subscribe, then hang up.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            let subscribe: Value =
                serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
            let ack = json!({"op": "subscribe.ack.v1", "request_id": subscribe["request_id"], "ok": true});
            writer.write_all(format!("{ack}\n").as_bytes()).await.unwrap();
        });

        let mut consumer = AblyChannelConsumer::connect(opts).await.unwrap();
        server.await.unwrap();
        std::fs::remove_file(&socket_path).unwrap();

        let first = consumer.next().await.unwrap_err();
        assert!(matches!(first, ChannelError::Transient(_)));
        assert!(!consumer.is_connected());

        let second = consumer.next().await.unwrap_err();
        assert!(matches!(second, ChannelError::Transient(_)));

        let third = consumer.next().await.unwrap_err();
        assert!(third.is_fatal());
    }
}
