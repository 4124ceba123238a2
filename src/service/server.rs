//! # Server
//!
//! Generic server shared by the TCP and UDP variants.
//!
//! A server owns a listening endpoint and one named dispatch thread. The thread
//! runs a current-thread Tokio runtime whose only task is the accept loop; each
//! accepted connection is serviced to completion before the next one is accepted.
//!
//! ## Lifecycle
//! ```text
//! Stopped -> Starting -> Listening -> Accepting -> SessionActive -> SessionClosing
//!                           ^                                              |
//!                           +----------------------------------------------+
//! Listening -> Stopping -> Stopped
//! ```
//!
//! ## Data exchange
//! Embedding code never touches sockets. It reads what sessions received with
//! [`Server::read_input_data`], stages outbound data with
//! [`Server::write_output_data`] and hands it to the session with
//! [`Server::send_output`]. On bidirectional servers every received message also
//! passes through the installed [`MessageProcessor`].
//!
//! ## Liveness
//! With a non-zero heartbeat interval, input and bidirectional sessions are torn
//! down after that long without inbound traffic, while output sessions send `beat`
//! every interval and require `ack` within the ack timeout.

use std::io;
use std::marker::PhantomData;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::ServerConfig;
use crate::core::buffer::{MessageBuffer, SharedBuffer};
use crate::core::control::ControlToken;
use crate::core::header::{Direction, StreamType, HEADER_SIZE};
use crate::error::{ProtocolError, Result};
use crate::transport::session::{FrameIo, Probe, Session};
use crate::utils::dispatch::DispatchThread;
use crate::utils::metrics::{Metrics, Timer};

/// Hook invoked once per received message on bidirectional servers.
///
/// Setting the output body and marking it updated makes the session transmit it.
/// The default implementation does nothing and always succeeds.
pub trait MessageProcessor: Send + Sync {
    fn process_input_msg(&self, input: &MessageBuffer, output: &mut MessageBuffer) -> Result<()> {
        let _ = (input, output);
        Ok(())
    }
}

/// Processor that leaves the output untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl MessageProcessor for PassThrough {}

impl<F> MessageProcessor for F
where
    F: Fn(&MessageBuffer, &mut MessageBuffer) -> Result<()> + Send + Sync,
{
    fn process_input_msg(&self, input: &MessageBuffer, output: &mut MessageBuffer) -> Result<()> {
        self(input, output)
    }
}

/// Observable server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Stopped = 0,
    Starting = 1,
    Listening = 2,
    Accepting = 3,
    SessionActive = 4,
    SessionClosing = 5,
    Stopping = 6,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ServerState::Starting,
            2 => ServerState::Listening,
            3 => ServerState::Accepting,
            4 => ServerState::SessionActive,
            5 => ServerState::SessionClosing,
            6 => ServerState::Stopping,
            _ => ServerState::Stopped,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn set(&self, state: ServerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn get(&self) -> ServerState {
        ServerState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Listening side of a transport.
///
/// `bind` is called with the server's runtime entered; `accept` futures run on
/// that runtime's single thread.
#[allow(async_fn_in_trait)]
pub trait Acceptor: Send + Sized + 'static {
    type Io: FrameIo;

    /// Short protocol name used in thread names and logs.
    const PROTOCOL: &'static str;

    fn bind(config: &ServerConfig) -> Result<Self>;

    fn local_addr(&self) -> Result<SocketAddr>;

    /// Wait for the next peer.
    async fn accept(&mut self) -> io::Result<(Self::Io, SocketAddr)>;
}

/// Socket address for `config.bind_address` and `config.port`.
pub(crate) fn bind_addr(config: &ServerConfig) -> Result<SocketAddr> {
    let ip: IpAddr = config.bind_address.parse().map_err(|_| {
        ProtocolError::ConfigError(format!("Invalid bind address: {}", config.bind_address))
    })?;
    Ok(SocketAddr::new(ip, config.port))
}

pub struct Server<A: Acceptor> {
    config: ServerConfig,
    processor: Arc<dyn MessageProcessor>,
    input: Option<SharedBuffer>,
    output: Option<SharedBuffer>,
    metrics: Arc<Metrics>,
    state: StateCell,
    dispatch: Option<DispatchThread>,
    local_addr: Option<SocketAddr>,
    _acceptor: PhantomData<fn() -> A>,
}

impl<A: Acceptor> Server<A> {
    /// Validate `config` and create a stopped server without buffers.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate_strict()?;
        Ok(Self {
            config,
            processor: Arc::new(PassThrough),
            input: None,
            output: None,
            metrics: Arc::new(Metrics::new()),
            state: StateCell::default(),
            dispatch: None,
            local_addr: None,
            _acceptor: PhantomData,
        })
    }

    pub fn with_processor<P>(mut self, processor: P) -> Self
    where
        P: MessageProcessor + 'static,
    {
        self.processor = Arc::new(processor);
        self
    }

    /// Allocate the buffers the configured direction needs.
    ///
    /// Nothing is kept if any allocation fails.
    pub fn initialize(&mut self, buffer_size: usize) -> Result<()> {
        if self.is_running() {
            return Err(ProtocolError::AlreadyRunning);
        }
        let direction = self.config.direction;
        let input = direction
            .reads_input()
            .then(|| SharedBuffer::allocate(buffer_size))
            .transpose()?;
        let output = direction
            .writes_output()
            .then(|| SharedBuffer::allocate(buffer_size))
            .transpose()?;
        self.input = input;
        self.output = output;
        self.config.buffer_size = buffer_size;
        debug!(buffer_size, ?direction, "Server buffers allocated");
        Ok(())
    }

    #[instrument(skip(self), fields(protocol = A::PROTOCOL, port = self.config.port))]
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(ProtocolError::AlreadyRunning);
        }
        if let Some(mut finished) = self.dispatch.take() {
            finished.stop()?;
        }
        let direction = self.config.direction;
        if (direction.reads_input() && self.input.is_none())
            || (direction.writes_output() && self.output.is_none())
        {
            return Err(ProtocolError::NotInitialized);
        }

        self.state.set(ServerState::Starting);
        self.launch().inspect_err(|e| {
            self.state.set(ServerState::Stopped);
            error!(code = e.code(), error = %e, "Server failed to start");
        })
    }

    fn launch(&mut self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let acceptor = {
            let _entered = runtime.enter();
            A::bind(&self.config)?
        };
        let local_addr = acceptor.local_addr()?;

        let cancel = CancellationToken::new();
        let ctx = SessionContext {
            config: self.config.clone(),
            stream_type: self.config.stream_type(),
            input: self.input.clone(),
            output: self.output.clone(),
            processor: Arc::clone(&self.processor),
            metrics: Arc::clone(&self.metrics),
            state: self.state.clone(),
            cancel: cancel.clone(),
        };

        self.state.set(ServerState::Listening);
        let name = format!("{}-dispatch-{}", A::PROTOCOL, local_addr.port());
        let dispatch = DispatchThread::start(name, cancel, move || {
            runtime.block_on(accept_loop(acceptor, ctx));
        })?;
        self.dispatch = Some(dispatch);
        self.local_addr = Some(local_addr);

        info!(
            %local_addr,
            direction = ?self.config.direction,
            persistent = self.config.persistent,
            heartbeat_ms = self.config.heartbeat_interval.as_millis() as u64,
            "Server listening"
        );
        Ok(())
    }

    /// Cancel the accept loop, join the dispatch thread and release the socket.
    #[instrument(skip(self), fields(protocol = A::PROTOCOL))]
    pub fn stop(&mut self) -> Result<()> {
        let Some(mut dispatch) = self.dispatch.take() else {
            return Ok(());
        };
        self.state.set(ServerState::Stopping);
        let joined = dispatch.stop();
        self.local_addr = None;
        self.state.set(ServerState::Stopped);
        self.metrics.log_metrics();
        info!("Server stopped");
        joined
    }

    /// Copy the latest received message into `target` if it has not been read yet.
    ///
    /// Returns the number of bytes copied, 0 when nothing new arrived.
    pub fn read_input_data(&self, target: &mut [u8]) -> Result<usize> {
        let input = self.input.as_ref().ok_or(ProtocolError::NotInitialized)?;
        let mut staged = input.lock()?;
        if !staged.take_updated() {
            return Ok(0);
        }
        Ok(staged.copy_body_to(target))
    }

    /// Stage `data` as the next outbound body. Not sent until [`Server::send_output`].
    pub fn write_output_data(&self, data: &[u8]) -> Result<()> {
        let output = self.output.as_ref().ok_or(ProtocolError::NotInitialized)?;
        output.lock()?.set_body(data)
    }

    /// Mark the staged output for transmission by the active session.
    pub fn send_output(&self) -> Result<()> {
        let output = self.output.as_ref().ok_or(ProtocolError::NotInitialized)?;
        output.lock()?.mark_updated();
        Ok(())
    }

    pub fn num_active_sessions(&self) -> usize {
        self.metrics.active_sessions() as usize
    }

    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.dispatch.as_ref().is_some_and(DispatchThread::is_running)
    }
}

impl<A: Acceptor> Drop for Server<A> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Everything the dispatch thread needs, detached from the `Server` handle.
struct SessionContext {
    config: ServerConfig,
    stream_type: StreamType,
    input: Option<SharedBuffer>,
    output: Option<SharedBuffer>,
    processor: Arc<dyn MessageProcessor>,
    metrics: Arc<Metrics>,
    state: StateCell,
    cancel: CancellationToken,
}

async fn accept_loop<A: Acceptor>(mut acceptor: A, ctx: SessionContext) {
    debug!(protocol = A::PROTOCOL, "Accept loop running");
    loop {
        ctx.state.set(ServerState::Listening);
        let accepted = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            accepted = acceptor.accept() => accepted,
        };
        match accepted {
            Ok((io, peer)) => {
                ctx.state.set(ServerState::Accepting);
                let session = Session::new(io, peer, ctx.config.io_timeout);
                run_session(&ctx, session).await;
            }
            Err(e) => {
                ctx.metrics.transport_error();
                error!(error = %e, "Accept failed");
                tokio::select! {
                    _ = ctx.cancel.cancelled() => break,
                    _ = tokio::time::sleep(ctx.config.accept_retry_delay) => {}
                }
            }
        }
    }
    debug!(protocol = A::PROTOCOL, "Accept loop exited");
}

async fn run_session<T: FrameIo>(ctx: &SessionContext, session: Session<T>) {
    let active = ctx.metrics.session_opened();
    let timer = Timer::start("session");
    let peer = session.peer();

    if !session.peer_alive().await {
        warn!(%peer, "Accepted socket is not connected");
        return;
    }
    let mut worker = match SessionWorker::new(ctx, &session) {
        Ok(worker) => worker,
        Err(e) => {
            error!(%peer, error = %e, "Session setup failed");
            return;
        }
    };

    ctx.state.set(ServerState::SessionActive);
    info!(%peer, "Session opened");
    let end = worker.run().await;

    ctx.state.set(ServerState::SessionClosing);
    if end != SessionEnd::PeerExit {
        if let Err(e) = session.send_token(ControlToken::Exit).await {
            debug!(%peer, error = %e, "Exit token not delivered");
        }
    }
    session.shutdown().await;
    drop(worker);
    drop(session);
    drop(timer);
    drop(active);
    info!(%peer, ?end, "Session closed");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The peer sent `exit`.
    PeerExit,
    /// One message exchanged on a non-persistent server.
    Completed,
    /// The server is stopping.
    Stopped,
    PeerUnreachable,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Idle,
    Exchanged,
}

struct SessionWorker<'a, T: FrameIo> {
    ctx: &'a SessionContext,
    session: &'a Session<T>,
    inbound: MessageBuffer,
    outbound: MessageBuffer,
    last_rx: Instant,
    last_beat: Instant,
}

impl<'a, T: FrameIo> SessionWorker<'a, T> {
    fn new(ctx: &'a SessionContext, session: &'a Session<T>) -> Result<Self> {
        let now = Instant::now();
        Ok(Self {
            ctx,
            session,
            inbound: MessageBuffer::allocate(ctx.config.buffer_size)?,
            outbound: MessageBuffer::allocate(ctx.config.buffer_size)?,
            last_rx: now,
            last_beat: now,
        })
    }

    async fn run(&mut self) -> SessionEnd {
        let mut exchanged = false;
        loop {
            if self.ctx.cancel.is_cancelled() {
                return SessionEnd::Stopped;
            }
            if exchanged && !self.ctx.config.persistent {
                return SessionEnd::Completed;
            }
            if !self.session.peer_alive().await {
                return SessionEnd::PeerUnreachable;
            }
            let step = match self.ctx.config.direction {
                Direction::Input => self.input_step().await,
                Direction::Output => self.output_step().await,
                Direction::Bidirectional => self.bidirectional_step().await,
            };
            match step {
                Ok(Step::Idle) => {}
                Ok(Step::Exchanged) => exchanged = true,
                Err(err) => return self.classify(err),
            }
        }
    }

    async fn input_step(&mut self) -> Result<Step> {
        self.check_deadline()?;
        match self.session.probe(self.ctx.config.poll_interval).await? {
            Probe::Idle => Ok(Step::Idle),
            Probe::Data(_) => {
                self.receive().await?;
                Ok(Step::Exchanged)
            }
            probe => {
                self.handle_control(probe).await?;
                Ok(Step::Idle)
            }
        }
    }

    async fn output_step(&mut self) -> Result<Step> {
        self.heartbeat_probe().await?;
        match self.session.probe(self.probe_wait()?).await? {
            Probe::Idle => {}
            Probe::Data(_) => {
                self.receive().await?;
                debug!(peer = %self.session.peer(), "Discarded inbound message on output session");
            }
            probe => self.handle_control(probe).await?,
        }
        Ok(if self.transmit().await? {
            Step::Exchanged
        } else {
            Step::Idle
        })
    }

    async fn bidirectional_step(&mut self) -> Result<Step> {
        self.check_deadline()?;
        let mut received = false;
        match self.session.probe(self.probe_wait()?).await? {
            Probe::Idle => {}
            Probe::Data(_) => {
                self.receive().await?;
                self.process()?;
                received = true;
            }
            probe => self.handle_control(probe).await?,
        }
        let sent = self.transmit().await?;
        Ok(if received || sent {
            Step::Exchanged
        } else {
            Step::Idle
        })
    }

    /// Don't wait for inbound bytes while output is staged.
    fn probe_wait(&self) -> Result<Duration> {
        let pending = match &self.ctx.output {
            Some(output) => output.lock()?.is_updated(),
            None => false,
        };
        Ok(if pending {
            Duration::ZERO
        } else {
            self.ctx.config.poll_interval
        })
    }

    /// Passive heartbeat: fail once the peer has been silent longer than the interval.
    fn check_deadline(&self) -> Result<()> {
        let interval = self.ctx.config.heartbeat_interval;
        if interval.is_zero() {
            return Ok(());
        }
        let silent = self.last_rx.elapsed();
        if silent > interval {
            let millis = u64::try_from(silent.as_millis()).unwrap_or(u64::MAX);
            return Err(ProtocolError::HeartbeatTimeout(millis));
        }
        Ok(())
    }

    /// Active heartbeat: send `beat` each interval and require `ack`.
    async fn heartbeat_probe(&mut self) -> Result<()> {
        let interval = self.ctx.config.heartbeat_interval;
        if interval.is_zero() || self.last_beat.elapsed() < interval {
            return Ok(());
        }
        self.session.send_token(ControlToken::Beat).await?;
        self.ctx.metrics.heartbeat_sent();
        self.session
            .await_token(ControlToken::Ack, self.ctx.config.ack_timeout)
            .await?;
        self.last_beat = Instant::now();
        trace!(peer = %self.session.peer(), "Heartbeat acknowledged");
        Ok(())
    }

    async fn handle_control(&mut self, probe: Probe) -> Result<()> {
        match probe {
            Probe::Closed => Err(ProtocolError::ConnectionClosed),
            Probe::Token(ControlToken::Exit) => {
                self.session.consume_token(ControlToken::Exit).await?;
                Err(ProtocolError::PeerExit)
            }
            Probe::Token(ControlToken::Beat) => {
                self.session.consume_token(ControlToken::Beat).await?;
                self.session.send_token(ControlToken::Ack).await?;
                self.last_rx = Instant::now();
                Ok(())
            }
            Probe::Token(ControlToken::Ack) => {
                self.session.consume_token(ControlToken::Ack).await?;
                self.last_rx = Instant::now();
                Ok(())
            }
            Probe::Idle | Probe::Data(_) => Ok(()),
        }
    }

    /// Read one message and publish it to the shared input buffer.
    async fn receive(&mut self) -> Result<()> {
        let header = self.session.read_msg_data(&mut self.inbound).await?;
        self.last_rx = Instant::now();
        let bytes = self.inbound.body_len();
        self.ctx.metrics.message_received((HEADER_SIZE + bytes) as u64);
        debug!(
            peer = %self.session.peer(),
            bytes,
            stream_type = %header.stream_type,
            "Message received"
        );
        if let Some(input) = &self.ctx.input {
            let mut shared = input.lock()?;
            shared.set_body(self.inbound.body())?;
            shared.mark_updated();
        }
        Ok(())
    }

    fn process(&self) -> Result<()> {
        let (Some(input), Some(output)) = (&self.ctx.input, &self.ctx.output) else {
            return Err(ProtocolError::NotInitialized);
        };
        let input = input.lock()?;
        let mut output = output.lock()?;
        self.ctx.processor.process_input_msg(&input, &mut output)
    }

    /// Send the shared output if it is marked updated. Returns whether anything was sent.
    async fn transmit(&mut self) -> Result<bool> {
        let Some(output) = &self.ctx.output else {
            return Ok(false);
        };
        {
            let mut shared = output.lock()?;
            if !shared.take_updated() {
                return Ok(false);
            }
            self.outbound.set_body(shared.body())?;
        }
        let sent = self
            .session
            .write_msg_data(&mut self.outbound, &self.ctx.stream_type, Direction::Output)
            .await?;
        self.ctx.metrics.message_sent(sent as u64);
        debug!(
            peer = %self.session.peer(),
            bytes = sent - HEADER_SIZE,
            stream_type = %self.ctx.stream_type,
            "Message sent"
        );
        Ok(true)
    }

    fn classify(&self, err: ProtocolError) -> SessionEnd {
        let peer = self.session.peer();
        let metrics = &self.ctx.metrics;
        match err {
            ProtocolError::PeerExit => {
                info!(%peer, "Peer sent exit");
                metrics.graceful_close();
                SessionEnd::PeerExit
            }
            ProtocolError::HeartbeatTimeout(_) | ProtocolError::MissingAck => {
                warn!(%peer, error = %err, "Liveness check failed");
                metrics.heartbeat_failure();
                SessionEnd::Failed
            }
            ProtocolError::InvalidHeader(_)
            | ProtocolError::OversizedPayload { .. }
            | ProtocolError::Processor(_) => {
                error!(%peer, code = err.code(), error = %err, "Protocol error");
                metrics.protocol_error();
                SessionEnd::Failed
            }
            err => {
                error!(%peer, code = err.code(), error = %err, "Transport error");
                metrics.transport_error();
                SessionEnd::Failed
            }
        }
    }
}
