//! # Transport Layer
//!
//! Client endpoints and the per-connection session used by servers.
//!
//! ## Components
//! - **TCP client**: blocking stream endpoint with orderly `exit` on close
//! - **UDP client**: blocking datagram endpoint with staged resend
//! - **Session**: async header-then-body transactions over an accepted socket

pub mod session;
pub mod tcp_client;
pub mod udp_client;

pub use session::{FrameIo, Probe, Session, TcpIo, UdpIo};
pub use tcp_client::TcpClient;
pub use udp_client::UdpClient;
