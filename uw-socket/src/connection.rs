//! Socket connection lifecycle.
//!
//! A [`Connection`] owns one transport for its whole life. A background
//! driver task performs the handshake, sends the queued authentication token,
//! then reads frames strictly in order, decoding each one and handing events
//! to the single [`EventStream`] through a rendezvous channel. Writers share
//! the transport's write half behind one lock so every frame goes out whole.
//!
//! State only moves forward:
//! `Connecting -> Open -> Closing -> Closed`, with `Failed` reachable from any
//! non-terminal state. Terminal states are never left.

use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use uw_core::config::ConnectionConfig;
use uw_core::constants;
use uw_core::error::{UwError, UwResult};

use crate::handoff::{self, HandoffReceiver, HandoffSender};
use crate::message::{decode, encode, DecodeError, InboundEvent, OutboundCommand};
use crate::transport::{Connector, Frame, FrameSink, FrameSource};
use crate::ws::WsConnector;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Bidirectional traffic.
    Open,
    /// Close handshake started by either side.
    Closing,
    /// Closed in an orderly way.
    Closed,
    /// Ended by a transport error.
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closing => 2,
            Self::Closed | Self::Failed => 3,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why the event stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Orderly close, initiated by either side.
    Closed,
    /// Transport failure.
    Failed(String),
}

impl StreamEnd {
    /// The error every consumer observes once the stream has ended.
    pub fn to_error(&self) -> UwError {
        match self {
            Self::Closed => UwError::Closed,
            Self::Failed(reason) => UwError::Transport(reason.clone()),
        }
    }
}

impl From<UwError> for StreamEnd {
    fn from(e: UwError) -> Self {
        match e {
            UwError::Closed => Self::Closed,
            UwError::Transport(reason) => Self::Failed(reason),
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Connection tuning.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Upper bound on the transport handshake.
    pub connect_timeout: Duration,
    /// How long `close` waits for the reader before forcing `Closed`.
    pub close_timeout: Duration,
    /// Buffered decode failure reports per observer.
    pub decode_report_capacity: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(constants::DEFAULT_CONNECT_TIMEOUT_MS),
            close_timeout: Duration::from_millis(constants::DEFAULT_CLOSE_TIMEOUT_MS),
            decode_report_capacity: constants::DEFAULT_DECODE_REPORT_CAPACITY,
        }
    }
}

impl From<&ConnectionConfig> for ConnectionOptions {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            close_timeout: config.close_timeout(),
            decode_report_capacity: config.decode_report_capacity,
        }
    }
}

/// Write side. The token lives under the same lock as the sink so that a
/// token queued during the handshake is always the first frame written.
struct Outbound {
    sink: Option<Box<dyn FrameSink>>,
    token: Option<String>,
}

struct Shared {
    url: String,
    options: ConnectionOptions,
    outbound: Mutex<Outbound>,
    state_tx: watch::Sender<ConnectionState>,
    decode_tx: broadcast::Sender<DecodeError>,
    /// First terminal reason wins.
    terminal: StdMutex<Option<StreamEnd>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Move forward to `next`. Backward moves and moves out of a terminal
    /// state are ignored.
    fn transition(&self, next: ConnectionState) -> bool {
        let mut from = None;
        self.state_tx.send_if_modified(|state| {
            if next.rank() <= state.rank() {
                return false;
            }
            from = Some(*state);
            *state = next;
            true
        });
        match from {
            Some(from) => {
                info!("socket state: {from} -> {next}");
                true
            }
            None => false,
        }
    }

    fn end(&self, reason: StreamEnd) {
        let next = match reason {
            StreamEnd::Closed => ConnectionState::Closed,
            StreamEnd::Failed(_) => ConnectionState::Failed,
        };
        {
            let mut terminal = self.terminal.lock().unwrap_or_else(PoisonError::into_inner);
            if terminal.is_some() {
                return;
            }
            *terminal = Some(reason);
        }
        self.transition(next);
    }

    fn end_reason(&self) -> Option<StreamEnd> {
        self.terminal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn wait_until(&self, pred: impl Fn(ConnectionState) -> bool) {
        let mut rx = self.state_tx.subscribe();
        // The sender lives as long as `self`, so this only returns on a match.
        let _ = rx.wait_for(|state| pred(*state)).await.map(|_| ());
    }

    /// The error for an operation that needs `Open` but found `state`.
    fn unavailable(&self, state: ConnectionState) -> UwError {
        match state {
            ConnectionState::Connecting | ConnectionState::Open => {
                UwError::NotOpen(state.to_string())
            }
            ConnectionState::Closing | ConnectionState::Closed => UwError::Closed,
            ConnectionState::Failed => self
                .end_reason()
                .map(|end| end.to_error())
                .unwrap_or_else(|| UwError::Transport("connection failed".into())),
        }
    }

    fn ensure_open(&self) -> UwResult<()> {
        match self.state() {
            ConnectionState::Open => Ok(()),
            other => Err(self.unavailable(other)),
        }
    }

    /// Write one frame under the writer lock. Abandoned as soon as the
    /// connection leaves `Open`; a write error fails the connection.
    async fn write(&self, frame: &str) -> UwResult<()> {
        let result = tokio::select! {
            biased;
            _ = self.wait_until(|s| s != ConnectionState::Open) => {
                return Err(self.unavailable(self.state()));
            }
            result = self.write_locked(frame) => result,
        };

        if let Err(UwError::Transport(reason)) = &result {
            warn!("socket write failed: {reason}");
            self.end(StreamEnd::Failed(reason.clone()));
        }
        result
    }

    async fn write_locked(&self, frame: &str) -> UwResult<()> {
        let mut outbound = self.outbound.lock().await;
        self.ensure_open()?;
        match outbound.sink.as_mut() {
            Some(sink) => sink.send_text(frame).await,
            None => Err(UwError::Closed),
        }
    }
}

/// One long-lived socket connection.
pub struct Connection {
    shared: Arc<Shared>,
    events: StdMutex<Option<HandoffReceiver<InboundEvent>>>,
    driver: JoinHandle<()>,
}

impl Connection {
    /// Connect to `url` over WebSocket.
    ///
    /// Returns immediately in `Connecting`; the handshake runs in the
    /// background. Must be called from within a Tokio runtime.
    pub fn connect(url: impl Into<String>, options: ConnectionOptions) -> Self {
        Self::with_connector(url, WsConnector::new(), options)
    }

    /// Connect to `url` through any transport.
    pub fn with_connector(
        url: impl Into<String>,
        connector: impl Connector + 'static,
        options: ConnectionOptions,
    ) -> Self {
        let url = url.into();
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let (decode_tx, _) = broadcast::channel(options.decode_report_capacity.max(1));
        let (events_tx, events_rx) = handoff::channel();

        info!("socket connecting to {url}");
        let shared = Arc::new(Shared {
            url,
            options,
            outbound: Mutex::new(Outbound {
                sink: None,
                token: None,
            }),
            state_tx,
            decode_tx,
            terminal: StdMutex::new(None),
        });

        let driver = tokio::spawn(drive(shared.clone(), Box::new(connector), events_tx));

        Self {
            shared,
            events: StdMutex::new(Some(events_rx)),
            driver,
        }
    }

    /// The URL this connection dials.
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watch state changes. The current state is marked as seen.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Wait for the handshake to finish.
    ///
    /// Fails with the connection's error if it never became `Open`, or if it
    /// has already moved past `Open`.
    pub async fn wait_open(&self) -> UwResult<()> {
        self.shared
            .wait_until(|s| s != ConnectionState::Connecting)
            .await;
        self.shared.ensure_open()
    }

    /// The token stored by the last [`authenticate`](Self::authenticate).
    pub async fn auth_token(&self) -> Option<String> {
        self.shared.outbound.lock().await.token.clone()
    }

    /// Why the connection ended, once it has.
    pub fn end_reason(&self) -> Option<StreamEnd> {
        self.shared.end_reason()
    }

    /// Authenticate the session.
    ///
    /// The token is kept for the lifetime of the connection and written as a
    /// raw frame. While `Connecting` it is queued to be the first frame after
    /// the handshake; while `Open` it is written now.
    pub async fn authenticate(&self, token: impl Into<String>) -> UwResult<()> {
        let token = token.into();
        {
            let mut outbound = self.shared.outbound.lock().await;
            outbound.token = Some(token.clone());
            if self.shared.state() == ConnectionState::Connecting {
                debug!("auth token queued until the socket opens");
                return Ok(());
            }
        }
        self.shared.ensure_open()?;
        debug!("sending auth token");
        self.shared.write(&token).await
    }

    /// Encode `command` and write it as one frame.
    ///
    /// Fails unless the connection is `Open`. A write failure fails the
    /// whole connection.
    pub async fn send(&self, command: &OutboundCommand) -> UwResult<()> {
        self.shared.ensure_open()?;
        debug!(command = command.tag(), "sending command");
        self.shared.write(&encode(command)).await
    }

    /// Take the event stream. Only the first call succeeds.
    pub fn events(&self) -> UwResult<EventStream> {
        let rx = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(UwError::StreamTaken)?;
        Ok(EventStream {
            rx,
            shared: self.shared.clone(),
        })
    }

    /// Observe frames that failed to decode. They never reach the event
    /// stream and never end the session.
    pub fn decode_failures(&self) -> broadcast::Receiver<DecodeError> {
        self.shared.decode_tx.subscribe()
    }

    /// Close the connection.
    ///
    /// Starts the close handshake, then waits up to the close timeout for the
    /// reader to finish before forcing `Closed`. Closing an ended connection
    /// is a no-op.
    pub async fn close(&self) -> UwResult<()> {
        if self.shared.state().is_terminal() {
            return Ok(());
        }
        self.shared.transition(ConnectionState::Closing);

        let budget = self.shared.options.close_timeout;
        let shared = &self.shared;
        let graceful = tokio::time::timeout(budget, async {
            let sink = shared.outbound.lock().await.sink.take();
            if let Some(mut sink) = sink {
                if let Err(e) = sink.close().await {
                    debug!("close handshake failed: {e}");
                }
            }
            shared.wait_until(ConnectionState::is_terminal).await;
        })
        .await;

        if graceful.is_err() {
            warn!("socket did not close within {budget:?}; forcing");
            self.shared.end(StreamEnd::Closed);
            self.driver.abort();
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.end(StreamEnd::Closed);
        self.driver.abort();
    }
}

/// The ordered stream of decoded events of one connection.
///
/// Each event is handed over only when `recv` takes it, so a slow consumer
/// holds back the reader. After the connection ends, every call returns the
/// same terminal error.
pub struct EventStream {
    rx: HandoffReceiver<InboundEvent>,
    shared: Arc<Shared>,
}

impl EventStream {
    /// Next event, or the terminal error once the connection has ended:
    /// [`UwError::Closed`] after an orderly close, a transport error after a
    /// failure.
    pub async fn recv(&mut self) -> UwResult<InboundEvent> {
        let shared = &self.shared;
        // Every event sent before the end was already taken, so anything
        // still parked once the state is terminal belongs to an abandoned send.
        tokio::select! {
            biased;
            _ = shared.wait_until(ConnectionState::is_terminal) => {}
            event = self.rx.recv() => {
                if let Some(event) = event {
                    return Ok(event);
                }
            }
        }
        Err(shared.end_reason().unwrap_or(StreamEnd::Closed).to_error())
    }

    /// Why the stream ended. `Closed` while it is still running.
    pub fn end_reason(&self) -> StreamEnd {
        self.shared.end_reason().unwrap_or(StreamEnd::Closed)
    }

    /// Adapt into a `Stream` that yields events, then the terminal error once.
    pub fn into_stream(self) -> impl Stream<Item = UwResult<InboundEvent>> + Send {
        futures_util::stream::unfold(Some(self), |stream| async move {
            let Some(mut stream) = stream else {
                return None;
            };
            match stream.recv().await {
                Ok(event) => Some((Ok(event), Some(stream))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

async fn drive(
    shared: Arc<Shared>,
    connector: Box<dyn Connector>,
    events: HandoffSender<InboundEvent>,
) {
    let end = match establish(&shared, connector.as_ref()).await {
        Ok(Some(source)) => read_loop(&shared, source, &events).await,
        Ok(None) => StreamEnd::Closed,
        Err(e) => StreamEnd::from(e),
    };

    match &end {
        StreamEnd::Closed => info!("socket closed"),
        StreamEnd::Failed(reason) => warn!("socket failed: {reason}"),
    }
    // Record the reason before the stream can observe its end.
    shared.end(end);
    drop(events);

    let sink = shared.outbound.lock().await.sink.take();
    if let Some(mut sink) = sink {
        match tokio::time::timeout(shared.options.close_timeout, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("closing transport failed: {e}"),
            Err(_) => debug!("closing transport timed out"),
        }
    }
}

/// Run the handshake and send the queued token. `Ok(None)` when the
/// connection was closed before it opened.
async fn establish(
    shared: &Shared,
    connector: &dyn Connector,
) -> UwResult<Option<Box<dyn FrameSource>>> {
    let timeout = shared.options.connect_timeout;
    let handshake = tokio::time::timeout(timeout, connector.connect(&shared.url));

    let (mut sink, source) = tokio::select! {
        _ = shared.wait_until(|s| s != ConnectionState::Connecting) => {
            debug!("handshake abandoned");
            return Ok(None);
        }
        result = handshake => match result {
            Ok(halves) => halves?,
            Err(_) => {
                return Err(UwError::Timeout(format!(
                    "handshake with {} took longer than {timeout:?}",
                    shared.url
                )));
            }
        },
    };

    let mut outbound = shared.outbound.lock().await;
    if shared.state() != ConnectionState::Connecting {
        return Ok(None);
    }
    if let Some(token) = &outbound.token {
        sink.send_text(token).await?;
        debug!("sent queued auth token");
    }
    outbound.sink = Some(sink);
    shared.transition(ConnectionState::Open);
    Ok(Some(source))
}

async fn read_loop(
    shared: &Shared,
    mut source: Box<dyn FrameSource>,
    events: &HandoffSender<InboundEvent>,
) -> StreamEnd {
    let ended = || shared.end_reason().unwrap_or(StreamEnd::Closed);

    loop {
        let next = tokio::select! {
            _ = shared.wait_until(ConnectionState::is_terminal) => return ended(),
            next = source.recv() => next,
        };

        match next {
            Some(Ok(Frame::Text(text))) => match decode(&text) {
                Ok(Some(event)) => {
                    trace!(event = event.tag(), "frame decoded");
                    tokio::select! {
                        _ = shared.wait_until(ConnectionState::is_terminal) => return ended(),
                        delivered = events.send(event) => {
                            if delivered.is_err() {
                                debug!("event stream dropped; discarding event");
                            }
                        }
                    }
                }
                Ok(None) => trace!("frame carried no event"),
                Err(e) => {
                    warn!("dropping undecodable frame: {e}");
                    let _ = shared.decode_tx.send(e);
                }
            },
            Some(Ok(Frame::Close { code, reason })) => {
                info!("server closed the socket ({code}) {reason}");
                shared.transition(ConnectionState::Closing);
                return StreamEnd::Closed;
            }
            Some(Err(e)) if shared.state() == ConnectionState::Closing => {
                debug!("read error while closing: {e}");
                return StreamEnd::Closed;
            }
            Some(Err(e)) => return StreamEnd::from(e),
            None if shared.state() == ConnectionState::Closing => return StreamEnd::Closed,
            None => return StreamEnd::Failed("connection dropped".into()),
        }
    }
}
