//! UDP client endpoint.
//!
//! Each message is one datagram carrying header and body. Data can be staged with
//! [`UdpClient::set_buffer`] / [`UdpClient::append_buffer`] and sent later with
//! `write(None)`, which fails with [`ProtocolError::NothingStaged`] when no data
//! was staged. `close()` releases the socket without notifying the peer.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::ClientConfig;
use crate::core::buffer::MessageBuffer;
use crate::core::control::ControlToken;
use crate::core::header::{Direction, StreamType, HEADER_SIZE};
use crate::error::constants::{ERR_ADDRESS_UNRESOLVED, ERR_SHORT_DATAGRAM};
use crate::error::{ProtocolError, Result};

pub struct UdpClient {
    host: String,
    port: u16,
    stream_type: StreamType,
    direction: Direction,
    read_timeout: Duration,
    socket: Option<UdpSocket>,
    buffer: MessageBuffer,
    last_error: Option<String>,
}

impl UdpClient {
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
            read_timeout: config.read_timeout,
            socket: None,
            buffer,
            last_error: None,
        })
    }

    pub fn set_uri(&mut self, host: impl Into<String>) {
        self.host = host.into();
    }

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
        self.socket.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn buffer(&self) -> &MessageBuffer {
        &self.buffer
    }

    /// Stage `data` as the next datagram body, replacing what was staged.
    pub fn set_buffer(&mut self, data: &[u8]) -> Result<()> {
        let result = self.buffer.set_body(data);
        self.track(result)
    }

    /// Append `data` to the staged body.
    pub fn append_buffer(&mut self, data: &[u8]) -> Result<()> {
        let result = self.buffer.append_body(data);
        self.track(result)
    }

    /// Resolve the target, bind an ephemeral local port and connect to the target.
    pub fn open(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let result = self.bind();
        self.track(result)
    }

    fn bind(&mut self) -> Result<()> {
        let target = format!("{}:{}", self.host, self.port);
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ProtocolError::Resolve(format!("{target}: {e}")))?
            .next()
            .ok_or_else(|| ProtocolError::Resolve(format!("{target}: {ERR_ADDRESS_UNRESOLVED}")))?;

        let local: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(addr)?;
        socket.set_read_timeout(Some(self.read_timeout))?;
        info!(peer = %addr, local = %socket.local_addr()?, "UDP client opened");
        self.socket = Some(socket);
        Ok(())
    }

    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(host = %self.host, port = self.port, "UDP client closed");
        }
    }

    /// Receive one datagram and copy up to `target.len()` payload bytes.
    ///
    /// Returns `Ok(0)` when the read timeout expires or a control token arrived.
    pub fn read(&mut self, target: &mut [u8]) -> Result<usize> {
        let result = self.read_datagram(target);
        self.track(result)
    }

    fn read_datagram(&mut self, target: &mut [u8]) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(ProtocolError::NotConnected)?;
        let n = match socket.recv(self.buffer.region_mut()) {
            Ok(n) => n,
            Err(e) => {
                return match ProtocolError::from_read(e) {
                    ProtocolError::Timeout => Ok(0),
                    other => Err(other),
                };
            }
        };

        let region = &self.buffer.region()[..n];
        if let Some(token) = ControlToken::from_exact(region) {
            return match token {
                ControlToken::Exit => {
                    info!(host = %self.host, port = self.port, "Peer sent exit");
                    Err(ProtocolError::PeerExit)
                }
                ControlToken::Beat => {
                    socket.send(ControlToken::Ack.as_bytes())?;
                    debug!("Answered heartbeat probe");
                    Ok(0)
                }
                ControlToken::Ack => Ok(0),
            };
        }

        if n < HEADER_SIZE {
            return Err(ProtocolError::InvalidHeader(ERR_SHORT_DATAGRAM));
        }
        let header = self.buffer.decode_header()?;
        let expected = HEADER_SIZE + header.length as usize;
        if n < expected {
            return Err(ProtocolError::ShortRead { expected, actual: n });
        }
        debug!(bytes = header.length, stream_type = %header.stream_type, "UDP client received message");
        Ok(self.buffer.copy_body_to(target))
    }

    /// Send `source` as one datagram, or the staged buffer when `None`.
    ///
    /// Returns header plus payload bytes sent.
    pub fn write(&mut self, source: Option<&[u8]>) -> Result<usize> {
        let result = self.write_datagram(source);
        self.track(result)
    }

    fn write_datagram(&mut self, source: Option<&[u8]>) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(ProtocolError::NotConnected)?;
        match source {
            Some(data) => self.buffer.set_body(data)?,
            None if self.buffer.is_empty() => return Err(ProtocolError::NothingStaged),
            None => {}
        }
        self.buffer.encode_header(&self.stream_type, self.direction);
        let frame = self.buffer.frame();
        let sent = socket.send(frame)?;
        if sent != frame.len() {
            return Err(ProtocolError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated to {sent} of {} bytes", frame.len()),
            )));
        }
        debug!(bytes = frame.len() - HEADER_SIZE, stream_type = %self.stream_type, "UDP client sent message");
        Ok(sent)
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            if !matches!(e, ProtocolError::PeerExit) {
                error!(code = e.code(), error = %e, "UDP client operation failed");
            }
            self.last_error = Some(e.to_string());
        }
        result
    }
}

impl Drop for UdpClient {
    fn drop(&mut self) {
        self.close();
    }
}
