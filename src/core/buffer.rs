//! # Message Buffer
//!
//! One contiguous region holding an envelope header followed by its body.
//!
//! The region is sized once at allocation and never grows. The first
//! [`HEADER_SIZE`] bytes are the header region, the rest is the body region.
//! A buffer tracks the current body length and an "updated" flag meaning
//! "unconsumed data is staged"; the flag is the hand-off signal between the
//! dispatch thread and the embedding application.
//!
//! ```rust
//! use media_stream_io::core::buffer::MessageBuffer;
//! use media_stream_io::core::header::{Direction, StreamType, HEADER_SIZE};
//!
//! let mut buf = MessageBuffer::allocate(64).unwrap();
//! buf.set_body(b"PING").unwrap();
//! buf.encode_header(&StreamType::new("CTL"), Direction::Output);
//! assert_eq!(buf.frame().len(), HEADER_SIZE + 4);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::header::{Direction, StreamType, WireHeader, HEADER_SIZE};
use crate::error::{ProtocolError, Result};

/// Smallest region accepted by [`MessageBuffer::allocate`].
pub const MIN_BUFFER_SIZE: usize = HEADER_SIZE + 2;

/// Header region plus body region, allocated once.
#[derive(Debug, Clone)]
pub struct MessageBuffer {
    region: Vec<u8>,
    body_len: usize,
    updated: bool,
}

impl MessageBuffer {
    /// Reserve a region of `max_size` bytes.
    pub fn allocate(max_size: usize) -> Result<Self> {
        if max_size < MIN_BUFFER_SIZE {
            return Err(ProtocolError::BufferTooSmall {
                requested: max_size,
                minimum: MIN_BUFFER_SIZE,
            });
        }
        Ok(Self {
            region: vec![0u8; max_size],
            body_len: 0,
            updated: false,
        })
    }

    /// Total size of the region.
    pub fn capacity(&self) -> usize {
        self.region.len()
    }

    /// Largest body this buffer can hold.
    pub fn body_capacity(&self) -> usize {
        self.region.len() - HEADER_SIZE
    }

    pub fn body_len(&self) -> usize {
        self.body_len
    }

    pub fn is_empty(&self) -> bool {
        self.body_len == 0
    }

    /// Current body.
    pub fn body(&self) -> &[u8] {
        &self.region[HEADER_SIZE..HEADER_SIZE + self.body_len]
    }

    /// Header bytes followed by the current body, ready for one send.
    pub fn frame(&self) -> &[u8] {
        &self.region[..HEADER_SIZE + self.body_len]
    }

    pub(crate) fn header_region_mut(&mut self) -> &mut [u8] {
        &mut self.region[..HEADER_SIZE]
    }

    /// Body bytes `[0, len)` for a transport to fill; `len` must already be validated.
    pub(crate) fn body_region_mut(&mut self, len: usize) -> &mut [u8] {
        &mut self.region[HEADER_SIZE..HEADER_SIZE + len]
    }

    pub(crate) fn region(&self) -> &[u8] {
        &self.region
    }

    pub(crate) fn region_mut(&mut self) -> &mut [u8] {
        &mut self.region
    }

    /// Replace the body. On failure the previous content and length are kept.
    pub fn set_body(&mut self, data: &[u8]) -> Result<()> {
        let capacity = self.body_capacity();
        if data.len() > capacity {
            return Err(ProtocolError::OversizedPayload {
                len: data.len(),
                capacity,
            });
        }
        self.region[HEADER_SIZE..HEADER_SIZE + data.len()].copy_from_slice(data);
        self.body_len = data.len();
        Ok(())
    }

    /// Append to the body. On failure the previous content and length are kept.
    pub fn append_body(&mut self, data: &[u8]) -> Result<()> {
        let remaining = self.body_capacity() - self.body_len;
        if data.len() > remaining {
            return Err(ProtocolError::OversizedPayload {
                len: data.len(),
                capacity: remaining,
            });
        }
        let start = HEADER_SIZE + self.body_len;
        self.region[start..start + data.len()].copy_from_slice(data);
        self.body_len += data.len();
        Ok(())
    }

    /// Write marker, tag, current body length and direction into the header region.
    pub fn encode_header(&mut self, stream_type: &StreamType, direction: Direction) {
        // wire length is 32 bits
        let length = u32::try_from(self.body_len).unwrap_or(u32::MAX);
        WireHeader::new(*stream_type, length, direction).encode_into(&mut self.region[..HEADER_SIZE]);
    }

    /// Validate the header region and adopt its length.
    ///
    /// Fails if the marker is wrong, the direction is unknown, or the declared
    /// length exceeds the body capacity. The body length is only updated on success.
    pub fn decode_header(&mut self) -> Result<WireHeader> {
        let header = WireHeader::decode(&self.region[..HEADER_SIZE])?;
        let len = header.length as usize;
        let capacity = self.body_capacity();
        if len > capacity {
            return Err(ProtocolError::OversizedPayload { len, capacity });
        }
        self.body_len = len;
        Ok(header)
    }

    /// Zero the whole region and reset length and updated flag.
    pub fn clear(&mut self) {
        self.region.fill(0);
        self.body_len = 0;
        self.updated = false;
    }

    pub fn is_updated(&self) -> bool {
        self.updated
    }

    pub fn mark_updated(&mut self) {
        self.updated = true;
    }

    /// Return the updated flag and reset it.
    pub fn take_updated(&mut self) -> bool {
        std::mem::take(&mut self.updated)
    }

    /// Copy up to `target.len()` body bytes; returns the number copied.
    pub fn copy_body_to(&self, target: &mut [u8]) -> usize {
        let n = self.body_len.min(target.len());
        target[..n].copy_from_slice(&self.body()[..n]);
        n
    }
}

/// A [`MessageBuffer`] shared between the dispatch thread and embedding code.
///
/// Access goes through [`SharedBuffer::lock`], which returns a scoped guard;
/// the lock is released when the guard goes out of scope on every path.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    inner: Arc<Mutex<MessageBuffer>>,
}

impl SharedBuffer {
    pub fn allocate(max_size: usize) -> Result<Self> {
        Ok(Self::from(MessageBuffer::allocate(max_size)?))
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, MessageBuffer>> {
        self.inner.lock().map_err(|_| ProtocolError::LockPoisoned)
    }
}

impl From<MessageBuffer> for SharedBuffer {
    fn from(buffer: MessageBuffer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }
}
