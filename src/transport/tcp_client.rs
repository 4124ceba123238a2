//! # TCP Client Endpoint
//!
//! Blocking stream endpoint speaking the envelope protocol.
//!
//! ## Behaviour
//! - `open()` resolves the target and connects once; it never retries
//! - `read()` probes without blocking and returns `Ok(0)` when nothing is pending
//! - a pending `beat` is answered with `ack`; a pending `exit` ends the connection
//!   with [`ProtocolError::PeerExit`]
//! - `write(None)` re-sends whatever the buffer currently holds
//! - `close()` sends `exit` before shutting down so the peer sees an orderly end
//!
//! Every failure is returned as a [`ProtocolError`] and kept as [`TcpClient::last_error`].
//!
//! ## Example
//! ```rust,no_run
//! use media_stream_io::transport::tcp_client::TcpClient;
//!
//! let mut client = TcpClient::new(1024).unwrap();
//! client.set_uri("127.0.0.1");
//! client.set_port(9000);
//! client.set_stream_type("AUD");
//! client.open().unwrap();
//! client.write(Some(&[0u8; 16])).unwrap();
//! client.close();
//! ```

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::core::buffer::MessageBuffer;
use crate::core::control::{ControlToken, TokenMatch};
use crate::core::header::{Direction, StreamType, HEADER_SIZE};
use crate::error::constants::ERR_ADDRESS_UNRESOLVED;
use crate::error::{ProtocolError, Result};

pub struct TcpClient {
    host: String,
    port: u16,
    stream_type: StreamType,
    direction: Direction,
    connect_timeout: Duration,
    read_timeout: Duration,
    no_delay: bool,
    stream: Option<TcpStream>,
    buffer: MessageBuffer,
    last_error: Option<String>,
}

impl TcpClient {
    /// Create an unopened endpoint whose buffer holds `buffer_size` bytes, header included.
    pub fn new(buffer_size: usize) -> Result<Self> {
        Self::from_config(&ClientConfig {
            buffer_size,
            ..ClientConfig::default()
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let buffer = MessageBuffer::allocate(config.buffer_size)?;
        config.validate_strict()?;
        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            stream_type: config.stream_type(),
            direction: config.direction,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            no_delay: config.no_delay,
            stream: None,
            buffer,
            last_error: None,
        })
    }

    /// Target host; takes effect on the next `open()`.
    pub fn set_uri(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

    /// Target port; takes effect on the next `open()`.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn set_stream_type(&mut self, stream_type: &str) {
        self.stream_type = StreamType::new(stream_type);
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The endpoint's message buffer.
    pub fn buffer(&self) -> &MessageBuffer {
        &self.buffer
    }

    pub fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let result = self.connect();
        self.track(result)
    }

    fn connect(&mut self) -> Result<()> {
        let target = format!("{}:{}", self.host, self.port);
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ProtocolError::Resolve(format!("{target}: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(ProtocolError::Resolve(format!("{target}: {ERR_ADDRESS_UNRESOLVED}")));
        }

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(self.no_delay)?;
                    stream.set_read_timeout(Some(self.read_timeout))?;
                    info!(peer = %addr, "TCP client connected");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    debug!(peer = %addr, error = %e, "Connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.map_or_else(
            || ProtocolError::Resolve(format!("{target}: {ERR_ADDRESS_UNRESOLVED}")),
            ProtocolError::Io,
        ))
    }

    /// Send `exit`, shut down the send half and release the socket.
    ///
    /// Failures during this shutdown are ignored.
    pub fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        let _ = stream.write_all(ControlToken::Exit.as_bytes());
        let _ = stream.flush();
        let _ = stream.shutdown(Shutdown::Write);
        info!(host = %self.host, port = self.port, "TCP client closed");
    }

    /// Read one pending message and copy up to `target.len()` payload bytes.
    ///
    /// Returns `Ok(0)` when nothing is pending.
    pub fn read(&mut self, target: &mut [u8]) -> Result<usize> {
        let result = self.read_message(target);
        self.track(result)
    }

    fn read_message(&mut self, target: &mut [u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(ProtocolError::NotConnected)?;

        loop {
            let mut pending = [0u8; 4];
            let n = peek_pending(stream, &mut pending)?;
            if n == 0 {
                return Ok(0);
            }
            match ControlToken::match_prefix(&pending[..n]) {
                TokenMatch::Full(ControlToken::Exit) => {
                    stream.read_exact(&mut pending).map_err(ProtocolError::from_read)?;
                    info!(host = %self.host, port = self.port, "Peer sent exit");
                    self.stream = None;
                    return Err(ProtocolError::PeerExit);
                }
                TokenMatch::Full(ControlToken::Beat) => {
                    stream.read_exact(&mut pending).map_err(ProtocolError::from_read)?;
                    stream.write_all(ControlToken::Ack.as_bytes())?;
                    debug!("Answered heartbeat probe");
                }
                TokenMatch::Full(ControlToken::Ack) => {
                    let mut ack = [0u8; 3];
                    stream.read_exact(&mut ack).map_err(ProtocolError::from_read)?;
                }
                TokenMatch::Partial => return Ok(0),
                TokenMatch::None => break,
            }
        }

        stream
            .read_exact(self.buffer.header_region_mut())
            .map_err(ProtocolError::from_read)?;
        let header = match self.buffer.decode_header() {
            Ok(header) => header,
            Err(ProtocolError::OversizedPayload { len, capacity }) => {
                // skip the body so the next header lines up
                io::copy(&mut Read::by_ref(stream).take(len as u64), &mut io::sink())
                    .map_err(ProtocolError::from_read)?;
                return Err(ProtocolError::OversizedPayload { len, capacity });
            }
            Err(e) => {
                // the stream position is unknown
                self.stream = None;
                return Err(e);
            }
        };
        let len = header.length as usize;
        stream
            .read_exact(self.buffer.body_region_mut(len))
            .map_err(ProtocolError::from_read)?;
        debug!(bytes = len, stream_type = %header.stream_type, "TCP client received message");
        Ok(self.buffer.copy_body_to(target))
    }

    /// Frame `source` (or the current buffer when `None`) and send it in one write.
    ///
    /// Returns header plus payload bytes written.
    pub fn write(&mut self, source: Option<&[u8]>) -> Result<usize> {
        let result = self.write_message(source);
        self.track(result)
    }

    fn write_message(&mut self, source: Option<&[u8]>) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(ProtocolError::NotConnected)?;
        if let Some(data) = source {
            self.buffer.set_body(data)?;
        }
        self.buffer.encode_header(&self.stream_type, self.direction);
        let frame = self.buffer.frame();
        stream.write_all(frame)?;
        stream.flush()?;
        debug!(bytes = frame.len() - HEADER_SIZE, stream_type = %self.stream_type, "TCP client sent message");
        Ok(frame.len())
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            if !matches!(e, ProtocolError::PeerExit) {
                error!(code = e.code(), error = %e, "TCP client operation failed");
            }
            self.last_error = Some(e.to_string());
            if e.is_transport() {
                self.stream = None;
            }
        }
        result
    }
}

/// Peek at pending bytes without blocking; 0 means nothing is pending.
fn peek_pending(stream: &TcpStream, buf: &mut [u8]) -> Result<usize> {
    stream.set_nonblocking(true)?;
    let peeked = stream.peek(buf);
    stream.set_nonblocking(false)?;
    match peeked {
        Ok(0) => Err(ProtocolError::ConnectionClosed),
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e.into()),
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.close();
    }
}
