//! # Envelope Codec
//!
//! Tokio codec framing [`Envelope`] values over an async byte stream, for embedding
//! code that talks to a server from its own runtime.
//!
//! Decoding checks the marker before trusting the length, rejects lengths above
//! `max_payload`, and leaves the buffer untouched while a frame is incomplete.
//! Control tokens are not envelopes; write them to the raw stream instead.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::header::{Direction, StreamType, WireHeader, HEADER_SIZE};
use crate::error::{ProtocolError, Result};

/// Default payload ceiling for the codec.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One framed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub stream_type: StreamType,
    pub direction: Direction,
    pub payload: Bytes,
}

impl Envelope {
    pub fn new(stream_type: StreamType, direction: Direction, payload: impl Into<Bytes>) -> Self {
        Self {
            stream_type,
            direction,
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    max_payload: usize,
}

impl EnvelopeCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Envelope>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = WireHeader::decode(&src[..HEADER_SIZE])?;
        let len = header.length as usize;
        if len > self.max_payload {
            return Err(ProtocolError::OversizedPayload {
                len,
                capacity: self.max_payload,
            });
        }

        if src.len() < HEADER_SIZE + len {
            src.reserve(HEADER_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(len).freeze();
        Ok(Some(Envelope {
            stream_type: header.stream_type,
            direction: header.direction,
            payload,
        }))
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<()> {
        let len = item.payload.len();
        if len > self.max_payload {
            return Err(ProtocolError::OversizedPayload {
                len,
                capacity: self.max_payload,
            });
        }
        let header = WireHeader::new(item.stream_type, len as u32, item.direction);
        dst.reserve(HEADER_SIZE + len);
        dst.put_slice(&header.encode());
        dst.put_slice(&item.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_frame_preserves_buffer() {
        let mut codec = EnvelopeCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(Envelope::new(StreamType::new("AUD"), Direction::Input, &b"abcdef"[..]), &mut buf)
            .unwrap();
        let full = buf.clone();

        let mut partial = BytesMut::from(&full[..HEADER_SIZE + 2]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.len(), HEADER_SIZE + 2);

        let mut whole = full;
        let env = codec.decode(&mut whole).unwrap().unwrap();
        assert_eq!(&env.payload[..], b"abcdef");
        assert!(whole.is_empty());
    }

    #[test]
    fn oversized_length_rejected() {
        let mut codec = EnvelopeCodec::new(8);
        let header = WireHeader::new(StreamType::new("AUD"), 9, Direction::Input);
        let mut buf = BytesMut::from(&header.encode()[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::OversizedPayload { len: 9, capacity: 8 })
        ));
    }

    #[test]
    fn back_to_back_frames() {
        let mut codec = EnvelopeCodec::default();
        let mut buf = BytesMut::new();
        for body in [&b"one"[..], &b"two"[..]] {
            codec
                .encode(Envelope::new(StreamType::new("CTL"), Direction::Output, body), &mut buf)
                .unwrap();
        }
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&first.payload[..], b"one");
        assert_eq!(&second.payload[..], b"two");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
