//! # Core Protocol Components
//!
//! Envelope layout, control tokens, message buffers and the async codec.
//!
//! ## Components
//! - **Header**: fixed 20-byte envelope prefix with explicit (de)serialization
//! - **Control**: raw `exit` / `beat` / `ack` tokens
//! - **Buffer**: single-allocation header+body region and its shared, locked form
//! - **Codec**: Tokio codec for framing envelopes over async byte streams
//!
//! ## Wire Format
//! ```text
//! [Marker(2)] [StreamType(10)] [Length(4)] [Direction(4)] [Body(Length)]
//! ```
//!
//! ## Validation
//! - The marker is checked before the length is trusted
//! - Lengths are bounded by the receiving buffer's body capacity

pub mod buffer;
pub mod codec;
pub mod control;
pub mod header;
