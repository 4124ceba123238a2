//! # Session
//!
//! One accepted connection (TCP) or one datagram exchange with a single peer (UDP),
//! driven by a server's dispatch thread.
//!
//! Every read or write is a transaction on a caller-supplied [`MessageBuffer`]:
//! header then body for reads, header+body as one unit for writes. The session
//! lock is held for the whole transaction and every transaction is bounded by the
//! configured I/O timeout.
//!
//! Transports plug in through [`FrameIo`]; [`TcpIo`] and [`UdpIo`] are provided.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};

use crate::core::buffer::MessageBuffer;
use crate::core::control::{ControlToken, TokenMatch};
use crate::core::header::{Direction, StreamType, WireHeader, HEADER_SIZE};
use crate::error::constants::ERR_SHORT_DATAGRAM;
use crate::error::{ProtocolError, Result};
use crate::utils::timeout::with_timeout_error;

/// Longest control token, in bytes.
const TOKEN_PROBE_LEN: usize = 4;

/// Pause between peeks while the rest of a split token is in flight.
const PARTIAL_TOKEN_RETRY: Duration = Duration::from_millis(1);

/// Async byte transport underneath a [`Session`].
///
/// The futures run on the owning server's current-thread runtime and are never
/// moved across threads.
#[allow(async_fn_in_trait)]
pub trait FrameIo {
    /// True for byte streams, where a control token can arrive split across reads.
    /// Datagram transports deliver a token whole or not at all.
    const STREAMED: bool;

    /// Wait for inbound bytes and copy them into `buf` without consuming them.
    /// Returns 0 when the peer has closed the connection.
    async fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Read one complete envelope into `buffer`.
    async fn read_frame(&mut self, buffer: &mut MessageBuffer) -> Result<WireHeader>;

    /// Consume `len` pending bytes (a control token).
    async fn discard(&mut self, len: usize) -> io::Result<()>;

    /// Send `bytes` as one transport operation.
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Shut down the send half, if the transport has one.
    async fn shutdown(&mut self) -> io::Result<()>;

    /// False once the remote endpoint can no longer be resolved.
    fn peer_alive(&self) -> bool;
}

/// Result of a [`Session::probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Nothing pending within the wait.
    Idle,
    /// The peer closed the connection.
    Closed,
    /// A complete control token is pending.
    Token(ControlToken),
    /// Envelope bytes are pending; the count is what was peeked.
    Data(usize),
}

pub struct Session<T: FrameIo> {
    io: tokio::sync::Mutex<T>,
    peer: SocketAddr,
    io_timeout: Duration,
    last_error: Mutex<Option<String>>,
}

impl<T: FrameIo> Session<T> {
    pub fn new(io: T, peer: SocketAddr, io_timeout: Duration) -> Self {
        Self {
            io: tokio::sync::Mutex::new(io),
            peer,
            io_timeout,
            last_error: Mutex::new(None),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Text of the most recent failure on this session.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }

    fn record(&self, err: ProtocolError) -> ProtocolError {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = Some(err.to_string());
        }
        err
    }

    /// Read one message (header, then body) into `buffer`.
    pub async fn read_msg_data(&self, buffer: &mut MessageBuffer) -> Result<WireHeader> {
        let mut io = self.io.lock().await;
        with_timeout_error(io.read_frame(buffer), self.io_timeout)
            .await
            .map_err(|e| self.record(e))
    }

    /// Encode the header from the buffer's body length and send header+body.
    /// Returns the number of bytes written.
    pub async fn write_msg_data(
        &self,
        buffer: &mut MessageBuffer,
        stream_type: &StreamType,
        direction: Direction,
    ) -> Result<usize> {
        buffer.encode_header(stream_type, direction);
        let mut io = self.io.lock().await;
        let frame = buffer.frame();
        let send = async { io.write_all(frame).await.map_err(ProtocolError::from) };
        with_timeout_error(send, self.io_timeout)
            .await
            .map_err(|e| self.record(e))?;
        Ok(frame.len())
    }

    /// Wait at most `wait` for inbound bytes and classify them. Never consumes.
    pub async fn probe(&self, wait: Duration) -> Result<Probe> {
        let deadline = Instant::now() + wait;
        loop {
            let mut pending = [0u8; TOKEN_PROBE_LEN];
            let remaining = deadline.saturating_duration_since(Instant::now());
            let peeked = {
                let mut io = self.io.lock().await;
                timeout(remaining, io.peek(&mut pending)).await
            };
            let n = match peeked {
                Err(_) => return Ok(Probe::Idle),
                Ok(Ok(0)) => return Ok(Probe::Closed),
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(self.record(e.into())),
            };
            match ControlToken::match_prefix(&pending[..n]) {
                TokenMatch::Full(token) => return Ok(Probe::Token(token)),
                // a datagram never grows; the frame reader rejects it
                TokenMatch::Partial if !T::STREAMED => return Ok(Probe::Data(n)),
                TokenMatch::Partial => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(Probe::Idle);
                    }
                    tokio::time::sleep(PARTIAL_TOKEN_RETRY.min(remaining)).await;
                }
                TokenMatch::None => return Ok(Probe::Data(n)),
            }
        }
    }

    /// Remove a token reported by [`Session::probe`].
    pub async fn consume_token(&self, token: ControlToken) -> Result<()> {
        let mut io = self.io.lock().await;
        let discard = async { io.discard(token.wire_len()).await.map_err(ProtocolError::from) };
        with_timeout_error(discard, self.io_timeout)
            .await
            .map_err(|e| self.record(e))
    }

    pub async fn send_token(&self, token: ControlToken) -> Result<()> {
        trace!(peer = %self.peer, ?token, "Sending control token");
        let mut io = self.io.lock().await;
        let send = async { io.write_all(token.as_bytes()).await.map_err(ProtocolError::from) };
        with_timeout_error(send, self.io_timeout)
            .await
            .map_err(|e| self.record(e))
    }

    /// Wait up to `wait` for `expected` and consume it.
    ///
    /// An `exit` in its place yields [`ProtocolError::PeerExit`]; any other reply,
    /// or none, yields [`ProtocolError::MissingAck`].
    pub async fn await_token(&self, expected: ControlToken, wait: Duration) -> Result<()> {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.record(ProtocolError::MissingAck));
            }
            match self.probe(remaining).await? {
                Probe::Idle => continue,
                Probe::Closed => return Err(self.record(ProtocolError::ConnectionClosed)),
                Probe::Token(token) if token == expected => return self.consume_token(token).await,
                Probe::Token(ControlToken::Exit) => {
                    self.consume_token(ControlToken::Exit).await?;
                    return Err(ProtocolError::PeerExit);
                }
                Probe::Token(other) => {
                    debug!(peer = %self.peer, ?expected, received = ?other, "Unexpected control token");
                    self.consume_token(other).await?;
                    return Err(self.record(ProtocolError::MissingAck));
                }
                Probe::Data(_) => return Err(self.record(ProtocolError::MissingAck)),
            }
        }
    }

    pub async fn peer_alive(&self) -> bool {
        self.io.lock().await.peer_alive()
    }

    /// Best-effort shutdown of the send half.
    pub async fn shutdown(&self) {
        let mut io = self.io.lock().await;
        if let Err(e) = io.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Shutdown failed");
        }
    }
}

/// Reliable stream transport.
pub struct TcpIo {
    stream: TcpStream,
}

impl TcpIo {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Read exactly [`HEADER_SIZE`] bytes into the header region and decode them.
    pub async fn read_msg_header(&mut self, buffer: &mut MessageBuffer) -> Result<WireHeader> {
        read_full(&mut self.stream, buffer.header_region_mut()).await?;
        buffer.decode_header()
    }

    /// Read exactly `len` body bytes; `len` comes from a decoded header.
    pub async fn read_msg_body(&mut self, buffer: &mut MessageBuffer, len: usize) -> Result<()> {
        read_full(&mut self.stream, buffer.body_region_mut(len)).await
    }
}

async fn read_full(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(ProtocolError::ShortRead {
                expected: buf.len(),
                actual: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

impl FrameIo for TcpIo {
    const STREAMED: bool = true;

    async fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.peek(buf).await
    }

    async fn read_frame(&mut self, buffer: &mut MessageBuffer) -> Result<WireHeader> {
        let header = self.read_msg_header(buffer).await?;
        self.read_msg_body(buffer, header.length as usize).await?;
        Ok(header)
    }

    async fn discard(&mut self, len: usize) -> io::Result<()> {
        let mut scratch = [0u8; TOKEN_PROBE_LEN];
        let len = len.min(scratch.len());
        self.stream.read_exact(&mut scratch[..len]).await?;
        Ok(())
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    fn peer_alive(&self) -> bool {
        self.stream.peer_addr().is_ok()
    }
}

/// Datagram transport bound to one peer of a shared socket.
///
/// Datagrams from any other address are dropped while the session lasts.
pub struct UdpIo {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpIo {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }

    async fn drop_foreign(&self, from: SocketAddr) -> io::Result<()> {
        let mut scratch = [0u8; 1];
        self.socket.recv_from(&mut scratch).await?;
        trace!(from = %from, peer = %self.peer, "Dropped datagram from foreign peer");
        Ok(())
    }
}

impl FrameIo for UdpIo {
    const STREAMED: bool = false;

    async fn peek(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let (n, from) = self.socket.peek_from(buf).await?;
            if from != self.peer {
                self.drop_foreign(from).await?;
                continue;
            }
            if n == 0 {
                // empty datagram carries nothing; the socket stays usable
                self.socket.recv_from(buf).await?;
                continue;
            }
            return Ok(n);
        }
    }

    async fn read_frame(&mut self, buffer: &mut MessageBuffer) -> Result<WireHeader> {
        loop {
            let (n, from) = self.socket.recv_from(buffer.region_mut()).await?;
            if from != self.peer {
                trace!(from = %from, peer = %self.peer, "Dropped datagram from foreign peer");
                continue;
            }
            if n < HEADER_SIZE {
                return Err(ProtocolError::InvalidHeader(ERR_SHORT_DATAGRAM));
            }
            let header = buffer.decode_header()?;
            let expected = HEADER_SIZE + header.length as usize;
            if n < expected {
                return Err(ProtocolError::ShortRead { expected, actual: n });
            }
            return Ok(header);
        }
    }

    async fn discard(&mut self, _len: usize) -> io::Result<()> {
        let mut scratch = [0u8; TOKEN_PROBE_LEN];
        loop {
            let (_, from) = self.socket.recv_from(&mut scratch).await?;
            if from == self.peer {
                return Ok(());
            }
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let sent = self.socket.send_to(bytes, self.peer).await?;
        if sent != bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated to {sent} of {} bytes", bytes.len()),
            ));
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn peer_alive(&self) -> bool {
        true
    }
}
