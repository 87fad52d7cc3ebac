//! In-process transport.
//!
//! [`pair`] returns a connector and the server end it connects to. The server
//! end scripts inbound traffic (text frames, close frames, read errors,
//! end of stream) and observes what the client wrote. Used to embed the
//! client without a network and to drive the connection deterministically
//! in tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use uw_core::error::{UwError, UwResult};

use crate::transport::{Connector, Frame, FrameSink, FrameSource};

/// Normal closure.
const CLOSE_NORMAL: u16 = 1000;

/// What the client wrote, as seen by the server end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Text(String),
    Close,
}

enum Inbound {
    Frame(Frame),
    Error(String),
    Eof,
}

struct Shared {
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Inbound>>>,
    outbound_tx: mpsc::UnboundedSender<ClientFrame>,
    stalled: watch::Sender<bool>,
    pending: AtomicUsize,
}

/// Create a connector and the server end it talks to.
pub fn pair() -> (MemoryConnector, MemoryServer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (stalled, _) = watch::channel(false);

    let shared = Arc::new(Shared {
        inbound_tx,
        inbound_rx: Mutex::new(Some(inbound_rx)),
        outbound_tx,
        stalled,
        pending: AtomicUsize::new(0),
    });

    let connector = MemoryConnector {
        shared: shared.clone(),
        gate: Mutex::new(None),
    };
    let server = MemoryServer {
        shared,
        outbound_rx,
    };
    (connector, server)
}

/// Client side of an in-process transport. Connects once.
pub struct MemoryConnector {
    shared: Arc<Shared>,
    gate: Mutex<Option<oneshot::Receiver<bool>>>,
}

impl MemoryConnector {
    /// Hold the handshake until the returned gate is opened.
    pub fn with_handshake_gate(self) -> (Self, HandshakeGate) {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
        (self, HandshakeGate { tx: Some(tx) })
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> UwResult<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        let gate = self
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(gate) = gate {
            if !gate.await.unwrap_or(false) {
                return Err(UwError::Transport(format!("handshake with {url} refused")));
            }
        }

        let rx = self
            .shared
            .inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| UwError::Transport("memory transport already connected".into()))?;
        debug!("memory transport connected to {url}");

        let sink = MemorySink {
            shared: self.shared.clone(),
            closed: AtomicBool::new(false),
        };
        Ok((Box::new(sink), Box::new(MemorySource { rx, ended: false })))
    }
}

/// Decides the outcome of a gated handshake. Dropping it refuses.
pub struct HandshakeGate {
    tx: Option<oneshot::Sender<bool>>,
}

impl HandshakeGate {
    pub fn open(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(true);
        }
    }

    pub fn refuse(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(false);
        }
    }
}

/// Server end of an in-process transport.
pub struct MemoryServer {
    shared: Arc<Shared>,
    outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
}

impl MemoryServer {
    /// Push a text frame to the client.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push(Inbound::Frame(Frame::Text(text.into())));
    }

    /// Start the close handshake from the server side.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        self.push(Inbound::Frame(Frame::Close {
            code,
            reason: reason.into(),
        }));
    }

    /// Make the client's next read fail.
    pub fn fail(&self, reason: impl Into<String>) {
        self.push(Inbound::Error(reason.into()));
    }

    /// End the client's read stream without a close frame.
    pub fn disconnect(&self) {
        self.push(Inbound::Eof);
    }

    /// Next frame the client wrote, or `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<ClientFrame> {
        self.outbound_rx.recv().await
    }

    /// Hold client writes until called again with `false`.
    pub fn stall_writes(&self, stalled: bool) {
        self.shared.stalled.send_replace(stalled);
    }

    /// Number of client writes currently held by [`stall_writes`](Self::stall_writes).
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    fn push(&self, item: Inbound) {
        // Fails only once the client source is gone; nothing left to tell.
        let _ = self.shared.inbound_tx.send(item);
    }
}

impl Drop for MemoryServer {
    fn drop(&mut self) {
        self.push(Inbound::Eof);
    }
}

struct MemorySink {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

/// Counts a stalled write for as long as it waits.
struct PendingWrite<'a>(&'a AtomicUsize);

impl<'a> PendingWrite<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: &str) -> UwResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(UwError::Transport("memory transport closed".into()));
        }

        let mut stalled = self.shared.stalled.subscribe();
        if *stalled.borrow_and_update() {
            let _pending = PendingWrite::new(&self.shared.pending);
            stalled
                .wait_for(|s| !*s)
                .await
                .map_err(|_| UwError::Transport("memory transport dropped".into()))?;
        }

        self.shared
            .outbound_tx
            .send(ClientFrame::Text(text.to_string()))
            .map_err(|_| UwError::Transport("memory server dropped".into()))
    }

    async fn close(&mut self) -> UwResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.shared.outbound_tx.send(ClientFrame::Close);
        // The server end answers the handshake immediately.
        let _ = self.shared.inbound_tx.send(Inbound::Frame(Frame::Close {
            code: CLOSE_NORMAL,
            reason: String::new(),
        }));
        Ok(())
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<Inbound>,
    ended: bool,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn recv(&mut self) -> Option<UwResult<Frame>> {
        if self.ended {
            return None;
        }
        match self.rx.recv().await {
            Some(Inbound::Frame(frame)) => Some(Ok(frame)),
            Some(Inbound::Error(reason)) => Some(Err(UwError::Transport(reason))),
            Some(Inbound::Eof) | None => {
                self.ended = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, mut server) = pair();
        let (mut sink, mut source) = connector.connect("memory://room").await.unwrap();

        server.push_text("hello");
        assert_eq!(
            source.recv().await.unwrap().unwrap(),
            Frame::Text("hello".into())
        );

        sink.send_text("world").await.unwrap();
        assert_eq!(server.recv().await, Some(ClientFrame::Text("world".into())));
    }

    #[tokio::test]
    async fn test_connects_only_once() {
        let (connector, _server) = pair();
        assert!(connector.connect("memory://a").await.is_ok());
        assert!(connector.connect("memory://a").await.is_err());
    }

    #[tokio::test]
    async fn test_refused_gate_fails_handshake() {
        let (connector, _server) = pair();
        let (connector, gate) = connector.with_handshake_gate();
        gate.refuse();
        let err = connector.connect("memory://a").await.err().unwrap();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_close_is_echoed_once() {
        let (connector, mut server) = pair();
        let (mut sink, mut source) = connector.connect("memory://a").await.unwrap();

        sink.close().await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(server.recv().await, Some(ClientFrame::Close));
        assert!(matches!(
            source.recv().await,
            Some(Ok(Frame::Close { code: 1000, .. }))
        ));
        assert!(sink.send_text("late").await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_ends_source() {
        let (connector, server) = pair();
        let (_sink, mut source) = connector.connect("memory://a").await.unwrap();
        server.fail("reset");
        server.disconnect();
        assert!(matches!(source.recv().await, Some(Err(_))));
        assert!(source.recv().await.is_none());
        assert!(source.recv().await.is_none());
    }
}
