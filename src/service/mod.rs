//! # Service Layer
//!
//! Servers hosting framed sessions on a background dispatch thread.
//!
//! ## Components
//! - **Server**: generic accept loop, session policy and heartbeat
//! - **TCP server**: stream listener, one session serviced at a time
//! - **UDP server**: datagram socket, one peer per session

pub mod server;
pub mod tcp_server;
pub mod udp_server;

pub use server::{Acceptor, MessageProcessor, PassThrough, Server, ServerState};
pub use tcp_server::{TcpAcceptor, TcpServer};
pub use udp_server::{UdpAcceptor, UdpServer};
