//! WebSocket transport over `tokio-tungstenite`.
//!
//! [`WsConnector`] handles URL to request building, header insertion and TLS
//! negotiation, then splits the stream into the [`FrameSink`] and
//! [`FrameSource`] halves the connection drives.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

use uw_core::error::{UwError, UwResult};

use crate::transport::{Connector, Frame, FrameSink, FrameSource};

/// Concrete WebSocket stream type.
type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Close code reported when the server's close frame carries none.
const NO_STATUS_CODE: u16 = 1005;

/// Dials WebSocket servers.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    headers: Vec<(String, String)>,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header to the handshake request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> UwResult<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        use tungstenite::client::IntoClientRequest;

        let mut request = url
            .into_client_request()
            .map_err(|e| UwError::InvalidUrl(format!("{url}: {e}")))?;

        for (name, value) in &self.headers {
            let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| UwError::Config(format!("invalid header name {name}: {e}")))?;
            let header_value = tungstenite::http::HeaderValue::from_str(value)
                .map_err(|e| UwError::Config(format!("invalid header value for {name}: {e}")))?;
            request.headers_mut().insert(header_name, header_value);
        }

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| UwError::Transport(format!("websocket connect failed: {e}")))?;
        debug!("websocket handshake complete: {}", response.status());

        let (sink, stream) = stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsSource { stream })))
    }
}

/// Write half of a WebSocket connection.
pub struct WsSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: &str) -> UwResult<()> {
        self.sink
            .send(Message::text(text))
            .await
            .map_err(|e| UwError::Transport(format!("websocket write failed: {e}")))
    }

    async fn close(&mut self) -> UwResult<()> {
        match self.sink.close().await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(UwError::Transport(format!("websocket close failed: {e}"))),
        }
    }
}

/// Read half of a WebSocket connection.
pub struct WsSource {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Option<UwResult<Frame>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(Frame::Text(text.to_string()))),
                Some(Ok(Message::Close(close_frame))) => {
                    let (code, reason) = close_frame
                        .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                        .unwrap_or((NO_STATUS_CODE, String::new()));
                    return Some(Ok(Frame::Close { code, reason }));
                }
                // tungstenite answers pings itself; the protocol carries no binary data.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {
                    continue
                }
                Some(Err(tungstenite::Error::ConnectionClosed)) | None => return None,
                Some(Err(e)) => {
                    return Some(Err(UwError::Transport(format!("websocket read failed: {e}"))))
                }
            }
        }
    }
}
