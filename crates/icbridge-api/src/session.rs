//! Persistent TCP session with fixed-delay reconnect.
//!
//! [`Session::connect`] performs the first connection (socket + optional
//! login) inline so configuration mistakes surface to the caller, then
//! spawns one background task that owns the socket. That task feeds reads
//! through a [`FrameAssembler`], decodes each line, and forwards results as
//! [`SessionEvent`]s over a single ordered channel. Outbound requests are
//! queued and written by the same task.
//!
//! When the connection drops the task waits `reconnect_delay`, reconnects,
//! and bumps the connection generation. Consumers use the generation to
//! discard work that belongs to an older connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use strum::Display;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{self, Credentials};
use crate::codec::{self, Message, Request};
use crate::error::Error;
use crate::frame::{DEFAULT_MAX_BUFFER, FrameAssembler};

/// Default controller protocol port.
pub const DEFAULT_PORT: u16 = 6681;

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const READ_BUFFER_SIZE: usize = 16 * 1024;

// ── SessionConfig ────────────────────────────────────────────────────

/// Connection parameters for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// `None` skips the login handshake entirely.
    pub credentials: Option<Credentials>,
    pub connect_timeout: Duration,
    /// How long to wait for a login prompt before assuming none is coming.
    pub login_timeout: Duration,
    /// Fixed delay between a disconnect and the next connect attempt.
    pub reconnect_delay: Duration,
    pub max_buffer_size: usize,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            credentials: None,
            connect_timeout: Duration::from_millis(1500),
            login_timeout: Duration::from_secs(2),
            reconnect_delay: Duration::from_secs(30),
            max_buffer_size: DEFAULT_MAX_BUFFER,
        }
    }
}

// ── State & events ───────────────────────────────────────────────────

/// Transport lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Connecting,
    Connected,
    /// Waiting out the reconnect delay.
    Disconnected,
    /// Shut down; no further reconnects.
    Closed,
}

/// Everything the session reports, in socket order.
#[derive(Debug)]
pub enum SessionEvent {
    /// A connection (first or reconnect) is ready for traffic.
    Connected { generation: u64 },
    /// One decoded inbound line.
    Message { generation: u64, message: Message },
    /// The connection dropped; a reconnect is scheduled.
    Disconnected { generation: u64, reason: String },
    /// A line failed to decode and was dropped.
    DecodeFailed { generation: u64, error: Error },
    /// Pending bytes exceeded the buffer limit and were discarded.
    FrameOverflow { generation: u64, limit: usize },
    /// An outbound request could not be written.
    SendFailed { message_id: String, error: Error },
    /// A reconnect attempt failed; another follows after the delay.
    ReconnectFailed { error: Error },
}

// ── Session ──────────────────────────────────────────────────────────

/// Cloneable write handle onto a session's outbound queue.
#[derive(Debug, Clone)]
pub struct SessionSender {
    outbound: mpsc::UnboundedSender<Request>,
}

impl SessionSender {
    /// Queue a request for sending. Never blocks and never fails inline;
    /// write failures arrive as [`SessionEvent::SendFailed`].
    pub fn send(&self, request: Request) {
        if let Err(err) = self.outbound.send(request) {
            tracing::warn!(message_id = %err.0.message_id, "session closed, dropping request");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Handle to a running session task.
#[derive(Debug)]
pub struct Session {
    outbound: SessionSender,
    generation: Arc<AtomicU64>,
    state: watch::Receiver<SessionState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Session {
    /// Connect, log in, and spawn the background session task.
    ///
    /// Fails with [`Error::Connect`], [`Error::Timeout`] or
    /// [`Error::Authentication`] if the first connection cannot be
    /// established. Later failures are reported as events and retried.
    pub async fn connect(
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>), Error> {
        let connection = establish(&config).await?;

        let generation = Arc::new(AtomicU64::new(1));
        let (state_tx, state_rx) = watch::channel(SessionState::Connected);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(session_loop(
            config,
            connection,
            Arc::clone(&generation),
            state_tx,
            event_tx,
            out_rx,
            cancel.clone(),
        ));

        Ok((
            Self {
                outbound: SessionSender { outbound: out_tx },
                generation,
                state: state_rx,
                cancel,
                task,
            },
            event_rx,
        ))
    }

    /// Queue a request for sending. See [`SessionSender::send`].
    pub fn send(&self, request: Request) {
        self.outbound.send(request);
    }

    pub fn sender(&self) -> SessionSender {
        self.outbound.clone()
    }

    /// Generation of the current (or most recent) connection.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Stop the session task. No further reconnects are scheduled.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Shut down and wait for the task to finish.
    pub async fn close(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "session task ended abnormally");
        }
    }
}

// ── Connection setup ─────────────────────────────────────────────────

struct Connection {
    stream: TcpStream,
    /// Protocol bytes read during the login handshake.
    leftover: Vec<u8>,
}

async fn establish(config: &SessionConfig) -> Result<Connection, Error> {
    let addr = config.addr();
    tracing::info!(%addr, "connecting to controller");

    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::Timeout {
            timeout_ms: millis(config.connect_timeout),
            during: "connecting",
        })?
        .map_err(|source| Error::Connect {
            addr: addr.clone(),
            source,
        })?;
    stream.set_nodelay(true)?;

    let mut stream = stream;
    let leftover =
        auth::login(&mut stream, config.credentials.as_ref(), config.login_timeout).await?;

    tracing::info!(%addr, "controller connection ready");
    Ok(Connection { stream, leftover })
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Background task ──────────────────────────────────────────────────

enum Ended {
    /// Socket closed or errored; reconnect.
    Dropped(String),
    /// Shutdown requested, or nobody is listening any more.
    Stop,
}

/// Main loop: run connection → on drop, wait → reconnect.
async fn session_loop(
    config: SessionConfig,
    first: Connection,
    generation: Arc<AtomicU64>,
    state_tx: watch::Sender<SessionState>,
    event_tx: mpsc::Sender<SessionEvent>,
    mut out_rx: mpsc::UnboundedReceiver<Request>,
    cancel: CancellationToken,
) {
    let mut next = Some(first);

    loop {
        let connection = if let Some(connection) = next.take() {
            connection
        } else {
            state_tx.send_replace(SessionState::Connecting);
            let attempt = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = establish(&config) => result,
            };
            match attempt {
                Ok(connection) => {
                    generation.fetch_add(1, Ordering::SeqCst);
                    connection
                }
                Err(error) => {
                    tracing::warn!(%error, "reconnect failed");
                    if event_tx
                        .send(SessionEvent::ReconnectFailed { error })
                        .await
                        .is_err()
                    {
                        break;
                    }
                    state_tx.send_replace(SessionState::Disconnected);
                    if !wait_before_reconnect(&config, &event_tx, &mut out_rx, &cancel).await {
                        break;
                    }
                    continue;
                }
            }
        };

        let current = generation.load(Ordering::SeqCst);
        state_tx.send_replace(SessionState::Connected);
        if event_tx
            .send(SessionEvent::Connected {
                generation: current,
            })
            .await
            .is_err()
        {
            break;
        }

        let reason = match run_connection(connection, current, &config, &event_tx, &mut out_rx, &cancel).await
        {
            Ended::Dropped(reason) => reason,
            Ended::Stop => break,
        };

        state_tx.send_replace(SessionState::Disconnected);
        tracing::warn!(
            generation = current,
            %reason,
            delay_secs = config.reconnect_delay.as_secs(),
            "controller connection lost, waiting before reconnect"
        );
        if event_tx
            .send(SessionEvent::Disconnected {
                generation: current,
                reason,
            })
            .await
            .is_err()
        {
            break;
        }
        if !wait_before_reconnect(&config, &event_tx, &mut out_rx, &cancel).await {
            break;
        }
    }

    state_tx.send_replace(SessionState::Closed);
    tracing::debug!("session task exiting");
}

/// Sleep out the reconnect delay. Requests queued meanwhile are failed
/// rather than replayed onto the next connection. Returns `false` when
/// the session should stop instead of reconnecting.
async fn wait_before_reconnect(
    config: &SessionConfig,
    event_tx: &mpsc::Sender<SessionEvent>,
    out_rx: &mut mpsc::UnboundedReceiver<Request>,
    cancel: &CancellationToken,
) -> bool {
    let sleep = tokio::time::sleep(config.reconnect_delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return false,
            () = &mut sleep => return true,
            request = out_rx.recv() => {
                let Some(request) = request else { return false };
                let event = SessionEvent::SendFailed {
                    message_id: request.message_id,
                    error: Error::NotConnected,
                };
                if event_tx.send(event).await.is_err() {
                    return false;
                }
            }
        }
    }
}

/// Pump one established connection until it drops or we are told to stop.
async fn run_connection(
    connection: Connection,
    generation: u64,
    config: &SessionConfig,
    event_tx: &mpsc::Sender<SessionEvent>,
    out_rx: &mut mpsc::UnboundedReceiver<Request>,
    cancel: &CancellationToken,
) -> Ended {
    let (mut reader, mut writer) = connection.stream.into_split();
    let mut assembler = FrameAssembler::new(config.max_buffer_size);

    if !connection.leftover.is_empty()
        && !forward_chunk(&mut assembler, &connection.leftover, generation, event_tx).await
    {
        return Ended::Stop;
    }

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                flush_pending(&mut writer, out_rx).await;
                return Ended::Stop;
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => return Ended::Dropped("closed by controller".into()),
                Ok(n) => {
                    if !forward_chunk(&mut assembler, &buf[..n], generation, event_tx).await {
                        return Ended::Stop;
                    }
                }
                Err(e) => return Ended::Dropped(e.to_string()),
            },
            request = out_rx.recv() => {
                let Some(request) = request else { return Ended::Stop };
                let message_id = request.message_id.clone();
                if let Err(error) = write_request(&mut writer, &request).await {
                    let reason = error.to_string();
                    let fatal = error.is_transient();
                    tracing::warn!(%message_id, %error, "failed to send request");
                    if event_tx.send(SessionEvent::SendFailed { message_id, error }).await.is_err() {
                        return Ended::Stop;
                    }
                    if fatal {
                        return Ended::Dropped(reason);
                    }
                }
            }
        }
    }
}

/// Write requests already queued when the session is closed, so that a
/// command issued just before `close` still reaches the controller.
async fn flush_pending(writer: &mut OwnedWriteHalf, out_rx: &mut mpsc::UnboundedReceiver<Request>) {
    while let Ok(request) = out_rx.try_recv() {
        if let Err(error) = write_request(writer, &request).await {
            tracing::debug!(message_id = %request.message_id, %error, "dropping queued request on close");
            return;
        }
    }
}

async fn write_request(writer: &mut OwnedWriteHalf, request: &Request) -> Result<(), Error> {
    let line = codec::encode(request)?;
    tracing::debug!(
        message_id = %request.message_id,
        command = %request.command,
        "sending request"
    );
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Frame, decode and forward one chunk. Returns `false` if the event
/// receiver is gone.
async fn forward_chunk(
    assembler: &mut FrameAssembler,
    chunk: &[u8],
    generation: u64,
    event_tx: &mpsc::Sender<SessionEvent>,
) -> bool {
    let lines = match assembler.feed(chunk) {
        Ok(lines) => lines,
        Err(Error::FrameOverflow { limit }) => {
            tracing::error!(limit, "exceeded max buffer size without a newline, discarding buffer");
            return event_tx
                .send(SessionEvent::FrameOverflow { generation, limit })
                .await
                .is_ok();
        }
        Err(error) => {
            tracing::warn!(%error, "unexpected framing error");
            return true;
        }
    };

    for line in lines {
        let event = match codec::decode_line(&line) {
            Ok(message) => {
                tracing::trace!(generation, message_id = ?message.message_id(), "received message");
                SessionEvent::Message {
                    generation,
                    message,
                }
            }
            Err(error) => {
                tracing::warn!(%error, "dropping undecodable line");
                SessionEvent::DecodeFailed { generation, error }
            }
        };
        if event_tx.send(event).await.is_err() {
            return false;
        }
    }
    true
}
