//! # Wire Header
//!
//! Fixed-layout envelope prefix carried by every framed message.
//!
//! ```text
//! [Marker(2)] [StreamType(10)] [Length(4)] [Direction(4)] [Body(Length)]
//! ```
//!
//! All integers are big-endian. The marker is validated before any other field is
//! trusted; bounding the length against a buffer's capacity is the caller's job
//! (see [`MessageBuffer::decode_header`](crate::core::buffer::MessageBuffer::decode_header)).

use crate::error::constants::{ERR_INVALID_MARKER, ERR_TRUNCATED_HEADER, ERR_UNKNOWN_DIRECTION};
use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel identifying a valid envelope.
pub const MARKER: u16 = 0xA55A;

/// Width of the ASCII stream-type tag.
pub const STREAM_TYPE_LEN: usize = 10;

/// Total header size in bytes.
pub const HEADER_SIZE: usize = 2 + STREAM_TYPE_LEN + 4 + 4;

const TAG_OFFSET: usize = 2;
const LENGTH_OFFSET: usize = TAG_OFFSET + STREAM_TYPE_LEN;
const DIRECTION_OFFSET: usize = LENGTH_OFFSET + 4;

/// Data direction of a server or of an individual envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Data flows from the peer into the server.
    #[default]
    Input,
    /// Data flows from the server out to the peer.
    Output,
    /// Requests in, responses out.
    Bidirectional,
}

impl Direction {
    pub fn as_u32(self) -> u32 {
        match self {
            Direction::Input => 0,
            Direction::Output => 1,
            Direction::Bidirectional => 2,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Direction::Input),
            1 => Some(Direction::Output),
            2 => Some(Direction::Bidirectional),
            _ => None,
        }
    }

    /// Whether a server in this direction consumes inbound messages.
    pub fn reads_input(self) -> bool {
        matches!(self, Direction::Input | Direction::Bidirectional)
    }

    /// Whether a server in this direction produces outbound messages.
    pub fn writes_output(self) -> bool {
        matches!(self, Direction::Output | Direction::Bidirectional)
    }
}

/// Zero-padded ASCII tag naming the kind of stream carried in the body.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamType([u8; STREAM_TYPE_LEN]);

impl StreamType {
    /// Build a tag from `name`, keeping at most [`STREAM_TYPE_LEN`] bytes.
    pub fn new(name: &str) -> Self {
        let mut tag = [0u8; STREAM_TYPE_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(STREAM_TYPE_LEN);
        tag[..len].copy_from_slice(&bytes[..len]);
        Self(tag)
    }

    pub fn from_bytes(bytes: [u8; STREAM_TYPE_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; STREAM_TYPE_LEN] {
        &self.0
    }

    /// Tag text without the zero padding.
    pub fn as_str(&self) -> String {
        let end = self
            .0
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(STREAM_TYPE_LEN);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl fmt::Debug for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamType({:?})", self.as_str())
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl From<&str> for StreamType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Decoded envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    pub stream_type: StreamType,
    pub length: u32,
    pub direction: Direction,
}

impl WireHeader {
    pub fn new(stream_type: StreamType, length: u32, direction: Direction) -> Self {
        Self {
            stream_type,
            length,
            direction,
        }
    }

    /// Serialize into the first [`HEADER_SIZE`] bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`HEADER_SIZE`].
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[..TAG_OFFSET].copy_from_slice(&MARKER.to_be_bytes());
        buf[TAG_OFFSET..LENGTH_OFFSET].copy_from_slice(self.stream_type.as_bytes());
        buf[LENGTH_OFFSET..DIRECTION_OFFSET].copy_from_slice(&self.length.to_be_bytes());
        buf[DIRECTION_OFFSET..HEADER_SIZE].copy_from_slice(&self.direction.as_u32().to_be_bytes());
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Parse a header from the start of `buf`.
    ///
    /// The marker is checked first; the length is returned as-is.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::InvalidHeader(ERR_TRUNCATED_HEADER));
        }
        if !has_marker(buf) {
            return Err(ProtocolError::InvalidHeader(ERR_INVALID_MARKER));
        }

        let mut tag = [0u8; STREAM_TYPE_LEN];
        tag.copy_from_slice(&buf[TAG_OFFSET..LENGTH_OFFSET]);

        let mut word = [0u8; 4];
        word.copy_from_slice(&buf[LENGTH_OFFSET..DIRECTION_OFFSET]);
        let length = u32::from_be_bytes(word);

        word.copy_from_slice(&buf[DIRECTION_OFFSET..HEADER_SIZE]);
        let direction = Direction::from_u32(u32::from_be_bytes(word))
            .ok_or(ProtocolError::InvalidHeader(ERR_UNKNOWN_DIRECTION))?;

        Ok(Self {
            stream_type: StreamType::from_bytes(tag),
            length,
            direction,
        })
    }
}

/// True if `buf` starts with the envelope marker.
#[inline]
pub fn has_marker(buf: &[u8]) -> bool {
    buf.len() >= 2 && buf[..2] == MARKER.to_be_bytes()
}
