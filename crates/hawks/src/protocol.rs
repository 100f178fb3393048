//! Binary framing protocol for Hawks-Daemon communication.
//!
//! All frames use little-endian byte order. Every frame starts with a 4-byte
//! length prefix covering everything after itself, followed by a fixed
//! 24-byte header and a variable-length body:
//!
//! ```text
//! Command:  [4: total_len][1: type=0x01][1: flags][2: reserved][16: command_id][4: payload_len][N: payload]
//! Decision: [4: total_len][1: type=0x02][1: outcome][2: reserved][16: command_id][4: result_len][N: result]
//! ```
//!
//! This module performs no I/O and keeps no state between calls, apart from
//! the explicit buffer owned by a [`FrameReader`].

use crate::error::ProtocolError;
use uuid::Uuid;

/// Frame type identifier for [`CommandFrame`].
pub const FRAME_TYPE_COMMAND: u8 = 0x01;

/// Frame type identifier for [`DecisionFrame`].
pub const FRAME_TYPE_DECISION: u8 = 0x02;

/// Outcome byte: the command was consumed.
pub const OUTCOME_ACKNOWLEDGE: u8 = 0x01;

/// Outcome byte: the command was not consumed.
pub const OUTCOME_DO_NOT_ACKNOWLEDGE: u8 = 0x02;

/// Size of the length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Header size in bytes (type + flags/outcome + reserved + command_id + body_len).
pub const HEADER_SIZE: usize = 1 + 1 + 2 + 16 + 4;

/// Default upper bound for `total_len`.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 2 * 1024 * 1024;

/// The daemon's verdict on a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Command was consumed; the upstream message may be acknowledged.
    Acknowledge,
    /// Command was not consumed; the upstream message must stay available.
    DoNotAcknowledge,
}

impl Outcome {
    /// Convert from wire format byte.
    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            OUTCOME_ACKNOWLEDGE => Ok(Outcome::Acknowledge),
            OUTCOME_DO_NOT_ACKNOWLEDGE => Ok(Outcome::DoNotAcknowledge),
            other => Err(ProtocolError::UnknownOutcome(other)),
        }
    }

    /// Convert to wire format byte.
    pub fn to_byte(self) -> u8 {
        match self {
            Outcome::Acknowledge => OUTCOME_ACKNOWLEDGE,
            Outcome::DoNotAcknowledge => OUTCOME_DO_NOT_ACKNOWLEDGE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Acknowledge => "ACKNOWLEDGE",
            Outcome::DoNotAcknowledge => "DO_NOT_ACKNOWLEDGE",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command frame sent from Hawks to the daemon.
///
/// The flags byte is always written as zero and ignored on read, so it is not
/// represented here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// Correlation identifier, fresh for every pulled message.
    pub command_id: Uuid,
    /// The encrypted command payload (opaque to Hawks).
    pub encrypted_payload: Vec<u8>,
}

impl CommandFrame {
    pub fn new(command_id: Uuid, encrypted_payload: Vec<u8>) -> Self {
        Self {
            command_id,
            encrypted_payload,
        }
    }

    /// Value of the length prefix this frame will carry.
    pub fn total_len(&self) -> usize {
        HEADER_SIZE + self.encrypted_payload.len()
    }

    /// Encode the frame to bytes (including length prefix).
    pub fn encode(&self) -> Vec<u8> {
        encode_frame(
            FRAME_TYPE_COMMAND,
            0,
            self.command_id,
            &self.encrypted_payload,
        )
    }

    /// Decode a CommandFrame from bytes (excluding length prefix).
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (_, command_id, body) = decode_body("CommandFrame", FRAME_TYPE_COMMAND, data)?;
        Ok(Self {
            command_id,
            encrypted_payload: body.to_vec(),
        })
    }

    /// Decode a complete frame (including length prefix).
    pub fn parse(frame: &[u8], max_frame_bytes: usize) -> Result<Self, ProtocolError> {
        Self::decode(exact_body("CommandFrame", frame, max_frame_bytes)?)
    }
}

/// Decision frame sent from the daemon to Hawks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionFrame {
    /// The command this decision answers.
    pub command_id: Uuid,
    pub outcome: Outcome,
    /// Informational result bytes, never interpreted by Hawks.
    pub result: Vec<u8>,
}

impl DecisionFrame {
    pub fn new(command_id: Uuid, outcome: Outcome) -> Self {
        Self {
            command_id,
            outcome,
            result: Vec::new(),
        }
    }

    pub fn with_result(command_id: Uuid, outcome: Outcome, result: Vec<u8>) -> Self {
        Self {
            command_id,
            outcome,
            result,
        }
    }

    /// Encode the frame to bytes (including length prefix).
    pub fn encode(&self) -> Vec<u8> {
        encode_frame(
            FRAME_TYPE_DECISION,
            self.outcome.to_byte(),
            self.command_id,
            &self.result,
        )
    }

    /// Decode a DecisionFrame from bytes (excluding length prefix).
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let (outcome, command_id, body) =
            decode_body("DecisionFrame", FRAME_TYPE_DECISION, data)?;
        Ok(Self {
            command_id,
            outcome: Outcome::from_byte(outcome)?,
            result: body.to_vec(),
        })
    }

    /// Decode a complete frame (including length prefix).
    pub fn parse(frame: &[u8], max_frame_bytes: usize) -> Result<Self, ProtocolError> {
        Self::decode(exact_body("DecisionFrame", frame, max_frame_bytes)?)
    }
}

fn encode_frame(frame_type: u8, second: u8, command_id: Uuid, body: &[u8]) -> Vec<u8> {
    let total_len = HEADER_SIZE + body.len();
    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + total_len);

    // Length prefix (excludes itself)
    buf.extend_from_slice(&(total_len as u32).to_le_bytes());
    buf.push(frame_type);
    buf.push(second);
    // Reserved
    buf.extend_from_slice(&[0u8, 0u8]);
    buf.extend_from_slice(command_id.as_bytes());
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(body);

    buf
}

/// Validate the fixed header and return (second byte, command_id, body).
fn decode_body<'a>(
    frame: &'static str,
    expected_type: u8,
    data: &'a [u8],
) -> Result<(u8, Uuid, &'a [u8]), ProtocolError> {
    if data.len() < HEADER_SIZE {
        return Err(ProtocolError::TooShort {
            frame,
            got: data.len(),
            need: HEADER_SIZE,
        });
    }

    if data[0] != expected_type {
        return Err(ProtocolError::UnknownFrameType {
            expected: expected_type,
            got: data[0],
        });
    }

    // Reserved bytes at [2..4] are ignored
    let mut id = [0u8; 16];
    id.copy_from_slice(&data[4..20]);
    let command_id = Uuid::from_bytes(id);

    let body_len = read_u32_le(&data[20..24]) as usize;
    let declared = HEADER_SIZE + body_len;
    if data.len() != declared {
        return Err(ProtocolError::LengthMismatch {
            frame,
            declared,
            actual: data.len(),
        });
    }

    Ok((data[1], command_id, &data[HEADER_SIZE..]))
}

/// Check that a whole frame's length prefix matches the bytes present.
fn exact_body<'a>(
    frame: &'static str,
    buf: &'a [u8],
    max_frame_bytes: usize,
) -> Result<&'a [u8], ProtocolError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::TooShort {
            frame,
            got: buf.len(),
            need: LENGTH_PREFIX_SIZE + HEADER_SIZE,
        });
    }

    let total_len = read_u32_le(&buf[..LENGTH_PREFIX_SIZE]) as usize;
    if total_len > max_frame_bytes {
        return Err(ProtocolError::FrameTooLarge {
            size: total_len,
            max: max_frame_bytes,
        });
    }

    let available = buf.len() - LENGTH_PREFIX_SIZE;
    if total_len != available {
        return Err(ProtocolError::LengthMismatch {
            frame,
            declared: total_len,
            actual: available,
        });
    }

    Ok(&buf[LENGTH_PREFIX_SIZE..])
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

/// Splits an ordered byte stream into length-prefixed frames.
///
/// Bytes are appended with [`FrameReader::extend`]; [`FrameReader::next_frame`]
/// yields one frame body (length prefix stripped) once it is complete. An
/// oversized declaration is rejected as soon as the prefix arrives, so the
/// buffer never grows past `max_frame_bytes` plus one read chunk.
#[derive(Debug)]
pub struct FrameReader {
    buf: Vec<u8>,
    max_frame_bytes: usize,
}

impl FrameReader {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            max_frame_bytes,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let total_len = read_u32_le(&self.buf[..LENGTH_PREFIX_SIZE]) as usize;
        if total_len > self.max_frame_bytes {
            return Err(ProtocolError::FrameTooLarge {
                size: total_len,
                max: self.max_frame_bytes,
            });
        }

        let end = LENGTH_PREFIX_SIZE + total_len;
        if self.buf.len() < end {
            return Ok(None);
        }

        let body = self.buf[LENGTH_PREFIX_SIZE..end].to_vec();
        self.buf.drain(..end);
        Ok(Some(body))
    }
}
