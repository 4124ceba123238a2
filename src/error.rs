//! # Error Types
//!
//! Error handling for the framing protocol, client endpoints and servers.
//!
//! ## Error Categories
//! - **Configuration Errors**: invalid ports, buffer sizes or timings, rejected at setup
//! - **Resolution/Connect Errors**: name resolution or connect failures from `open()`
//! - **Transport Errors**: socket faults, short reads, timeouts; close one session only
//! - **Protocol Errors**: bad marker, unknown direction, payload larger than the buffer
//! - **Liveness Errors**: heartbeat timeout or missing `ack`
//! - **Graceful Shutdown**: the peer sent the `exit` token
//!
//! Every variant maps to a stable negative status code through [`ProtocolError::code`],
//! so callers that prefer integer status values can keep using them.
//!
//! ## Example Usage
//! ```rust,no_run
//! use media_stream_io::transport::tcp_client::TcpClient;
//! use tracing::{error, info};
//!
//! let mut client = TcpClient::new(1024).expect("valid buffer size");
//! client.set_uri("127.0.0.1");
//! client.set_port(9000);
//! match client.open() {
//!     Ok(()) => info!("connected"),
//!     Err(e) => error!(code = e.code(), error = %e, "connect failed"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    pub const ERR_INVALID_MARKER: &str = "Invalid envelope marker";
    pub const ERR_UNKNOWN_DIRECTION: &str = "Unknown direction tag";
    pub const ERR_TRUNCATED_HEADER: &str = "Truncated envelope header";
    pub const ERR_SHORT_DATAGRAM: &str = "Datagram shorter than envelope header";
    pub const ERR_ADDRESS_UNRESOLVED: &str = "Address did not resolve to any socket address";
}

/// Stable negative status codes, one per error family.
pub mod codes {
    pub const GENERAL_FAILURE: i32 = -1;
    pub const TRANSPORT: i32 = -2;
    pub const CONNECTION_CLOSED: i32 = -3;
    pub const PEER_EXIT: i32 = -4;
    pub const NOT_CONNECTED: i32 = -5;
    pub const INVALID_HEADER: i32 = -6;
    pub const OVERSIZED_PAYLOAD: i32 = -7;
    pub const NOTHING_STAGED: i32 = -8;
    pub const TIMEOUT: i32 = -9;
    pub const HEARTBEAT: i32 = -10;
    pub const RESOLVE: i32 = -11;
    pub const CONFIG: i32 = -12;
    pub const STATE: i32 = -13;
}

// ProtocolError is the primary error type for all framework operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to resolve {0}")]
    Resolve(String),

    #[error("Endpoint is not connected")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Peer requested orderly shutdown")]
    PeerExit,

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Invalid envelope header: {0}")]
    InvalidHeader(&'static str),

    #[error("Payload of {len} bytes exceeds body capacity of {capacity} bytes")]
    OversizedPayload { len: usize, capacity: usize },

    #[error("Buffer size {requested} is below the minimum of {minimum} bytes")]
    BufferTooSmall { requested: usize, minimum: usize },

    #[error("No staged data to send")]
    NothingStaged,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Heartbeat timeout: no message for {0} ms")]
    HeartbeatTimeout(u64),

    #[error("Heartbeat probe was not acknowledged")]
    MissingAck,

    #[error("Server buffers are not initialized")]
    NotInitialized,

    #[error("Server is already running")]
    AlreadyRunning,

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Processor rejected message: {0}")]
    Processor(String),

    #[error("Dispatch thread panicked")]
    DispatchPanicked,
}

impl ProtocolError {
    /// Negative status code for this error.
    pub fn code(&self) -> i32 {
        match self {
            ProtocolError::Io(_) | ProtocolError::ShortRead { .. } => codes::TRANSPORT,
            ProtocolError::Resolve(_) => codes::RESOLVE,
            ProtocolError::NotConnected => codes::NOT_CONNECTED,
            ProtocolError::ConnectionClosed => codes::CONNECTION_CLOSED,
            ProtocolError::PeerExit => codes::PEER_EXIT,
            ProtocolError::InvalidHeader(_) => codes::INVALID_HEADER,
            ProtocolError::OversizedPayload { .. } => codes::OVERSIZED_PAYLOAD,
            ProtocolError::NothingStaged => codes::NOTHING_STAGED,
            ProtocolError::Timeout => codes::TIMEOUT,
            ProtocolError::HeartbeatTimeout(_) | ProtocolError::MissingAck => codes::HEARTBEAT,
            ProtocolError::BufferTooSmall { .. } | ProtocolError::ConfigError(_) => codes::CONFIG,
            ProtocolError::NotInitialized | ProtocolError::AlreadyRunning => codes::STATE,
            ProtocolError::LockPoisoned
            | ProtocolError::Processor(_)
            | ProtocolError::DispatchPanicked => codes::GENERAL_FAILURE,
        }
    }

    /// True for faults of the underlying socket, as opposed to protocol, liveness
    /// or orderly-shutdown conditions.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::ConnectionClosed
                | ProtocolError::NotConnected
                | ProtocolError::ShortRead { .. }
                | ProtocolError::Timeout
        )
    }

    /// Map a blocking socket read error, folding timeouts into [`ProtocolError::Timeout`].
    pub(crate) fn from_read(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => ProtocolError::Timeout,
            io::ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
            _ => ProtocolError::Io(err),
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_negative_and_distinct_for_exit() {
        let exit = ProtocolError::PeerExit.code();
        assert!(exit < 0);
        assert_ne!(exit, ProtocolError::ConnectionClosed.code());
        assert_ne!(exit, ProtocolError::Io(io::Error::other("boom")).code());
    }

    #[test]
    fn read_errors_fold_timeouts() {
        let err = ProtocolError::from_read(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(matches!(err, ProtocolError::Timeout));
        let err = ProtocolError::from_read(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }

    #[test]
    fn transport_classification() {
        assert!(ProtocolError::ConnectionClosed.is_transport());
        assert!(!ProtocolError::PeerExit.is_transport());
        assert!(!ProtocolError::MissingAck.is_transport());
    }
}
