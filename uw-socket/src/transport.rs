//! Transport seam between the connection and the wire.
//!
//! A [`Connector`] performs the handshake and hands back independent write
//! and read halves, so the connection can read and write from separate tasks.

use async_trait::async_trait;

use uw_core::error::UwResult;

/// A frame received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// The server started the close handshake.
    Close { code: u16, reason: String },
}

/// Write half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one whole text frame.
    async fn send_text(&mut self, text: &str) -> UwResult<()>;

    /// Start (or answer) the close handshake. Closing twice is not an error.
    async fn close(&mut self) -> UwResult<()>;
}

/// Read half of a transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` when the underlying stream has ended.
    async fn recv(&mut self) -> Option<UwResult<Frame>>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Perform the handshake against `url`.
    async fn connect(&self, url: &str) -> UwResult<(Box<dyn FrameSink>, Box<dyn FrameSource>)>;
}
