//! # media-stream-io
//!
//! Framed TCP and UDP client and server endpoints with session lifecycle
//! management and heartbeat liveness.
//!
//! Every message travels in an envelope:
//!
//! ```text
//! [Marker 0xA55A (2)] [StreamType (10)] [Length (4)] [Direction (4)] [Body (Length)]
//! ```
//!
//! Control tokens (`exit`, `beat`, `ack`) travel raw on the same channel.
//!
//! ## Layout
//! - [`core`]: envelope header, control tokens, message buffers, async codec
//! - [`transport`]: blocking client endpoints and the server-side session
//! - [`service`]: TCP and UDP servers with a dispatch thread per instance
//! - [`config`]: TOML/env configuration with validation
//! - [`error`]: error type and negative status codes
//! - [`utils`]: logging setup, metrics, timeouts, dispatch thread
//!
//! ## Example
//! ```rust,no_run
//! use media_stream_io::config::ServerConfig;
//! use media_stream_io::service::TcpServer;
//! use media_stream_io::transport::TcpClient;
//!
//! let mut server = TcpServer::new(ServerConfig { port: 0, ..ServerConfig::default() }).unwrap();
//! server.initialize(1024).unwrap();
//! server.start().unwrap();
//! let port = server.local_addr().unwrap().port();
//!
//! let mut client = TcpClient::new(1024).unwrap();
//! client.set_port(port);
//! client.set_stream_type("AUD");
//! client.open().unwrap();
//! client.write(Some(b"sixteen byte pcm")).unwrap();
//! client.close();
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::{ClientConfig, LoggingConfig, NetworkConfig, ServerConfig};
pub use error::{ProtocolError, Result};
