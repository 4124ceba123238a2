//! UDP server.
//!
//! A session starts with the first datagram from a peer and lasts until that peer
//! sends `exit`, fails a heartbeat or the server stops. Datagrams from other peers
//! are dropped meanwhile.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::debug;

use crate::config::ServerConfig;
use crate::core::header::HEADER_SIZE;
use crate::error::Result;
use crate::service::server::{bind_addr, Acceptor, Server};
use crate::transport::session::UdpIo;

pub type UdpServer = Server<UdpAcceptor>;

pub struct UdpAcceptor {
    socket: Arc<UdpSocket>,
}

impl Acceptor for UdpAcceptor {
    type Io = UdpIo;

    const PROTOCOL: &'static str = "udp";

    fn bind(config: &ServerConfig) -> Result<Self> {
        let socket = std::net::UdpSocket::bind(bind_addr(config)?)?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket)?;
        debug!(local = %socket.local_addr()?, "UDP socket bound");
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Wait for a datagram and adopt its sender; the datagram stays queued.
    async fn accept(&mut self) -> io::Result<(UdpIo, SocketAddr)> {
        let mut head = [0u8; HEADER_SIZE];
        let (_, peer) = self.socket.peek_from(&mut head).await?;
        debug!(%peer, "UDP peer adopted");
        Ok((UdpIo::new(Arc::clone(&self.socket), peer), peer))
    }
}
