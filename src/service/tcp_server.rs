//! TCP server: one listening socket, one session at a time.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket};
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::service::server::{bind_addr, Acceptor, Server};
use crate::transport::session::TcpIo;

/// Pending-connection queue length of the listening socket.
const LISTEN_BACKLOG: u32 = 1024;

/// Framed TCP server.
///
/// ```rust,no_run
/// use media_stream_io::config::ServerConfig;
/// use media_stream_io::service::TcpServer;
///
/// let mut server = TcpServer::new(ServerConfig::default()).unwrap();
/// server.initialize(64 * 1024).unwrap();
/// server.start().unwrap();
///
/// let mut payload = [0u8; 1024];
/// let n = server.read_input_data(&mut payload).unwrap();
/// println!("received {n} bytes");
/// server.stop().unwrap();
/// ```
pub type TcpServer = Server<TcpAcceptor>;

pub struct TcpAcceptor {
    listener: TcpListener,
    no_delay: bool,
}

impl Acceptor for TcpAcceptor {
    type Io = TcpIo;

    const PROTOCOL: &'static str = "tcp";

    fn bind(config: &ServerConfig) -> Result<Self> {
        let addr = bind_addr(config)?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        // accepted sockets inherit SO_KEEPALIVE from the listener
        socket.set_keepalive(config.keep_alive)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        debug!(local = %listener.local_addr()?, "TCP listener bound");
        Ok(Self {
            listener,
            no_delay: config.no_delay,
        })
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    async fn accept(&mut self) -> io::Result<(TcpIo, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(self.no_delay)?;
        debug!(%peer, "TCP connection accepted");
        Ok((TcpIo::new(stream), peer))
    }
}
