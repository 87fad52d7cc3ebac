//! The client facade.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use uw_core::config::AppConfig;
use uw_core::error::UwResult;
use uw_socket::{
    Connection, ConnectionOptions, ConnectionState, Connector, DecodeError, OutboundCommand,
    StreamEnd,
};

use crate::endpoint::ServerEndpoint;
use crate::hub::{EventHub, Subscription};

/// One connection to one uWave server, shared by any number of subscribers.
///
/// Adds no protocol logic of its own: commands go straight to the
/// connection, and the connection's single event stream is fanned out
/// through an [`EventHub`].
pub struct UwaveClient {
    endpoint: ServerEndpoint,
    connection: Connection,
    hub: EventHub,
    pump: JoinHandle<()>,
}

impl UwaveClient {
    /// Connect to `endpoint` over WebSocket. Returns while still connecting.
    pub fn connect(endpoint: ServerEndpoint, options: ConnectionOptions) -> UwResult<Self> {
        let connection = Connection::connect(endpoint.socket_url(), options);
        Self::from_connection(endpoint, connection)
    }

    /// Connect through a custom transport.
    pub fn with_connector(
        endpoint: ServerEndpoint,
        connector: impl Connector + 'static,
        options: ConnectionOptions,
    ) -> UwResult<Self> {
        let connection = Connection::with_connector(endpoint.socket_url(), connector, options);
        Self::from_connection(endpoint, connection)
    }

    /// Connect to the server named in `config`.
    pub fn from_config(config: &AppConfig) -> UwResult<Self> {
        let endpoint = ServerEndpoint::from_config(&config.server)?;
        Self::connect(endpoint, ConnectionOptions::from(&config.connection))
    }

    fn from_connection(endpoint: ServerEndpoint, connection: Connection) -> UwResult<Self> {
        let stream = connection.events()?;
        let hub = EventHub::new();
        let pump = tokio::spawn(hub.clone().pump(stream, connection.state_receiver()));
        info!("client created for {endpoint}");

        Ok(Self {
            endpoint,
            connection,
            hub,
            pump,
        })
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Wait for the socket to open.
    pub async fn wait_open(&self) -> UwResult<()> {
        self.connection.wait_open().await
    }

    /// Receive every event from now on.
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// Observe frames the connection could not decode.
    pub fn decode_failures(&self) -> broadcast::Receiver<DecodeError> {
        self.connection.decode_failures()
    }

    pub async fn authenticate(&self, token: impl Into<String>) -> UwResult<()> {
        self.connection.authenticate(token).await
    }

    pub async fn send(&self, command: &OutboundCommand) -> UwResult<()> {
        self.connection.send(command).await
    }

    /// Vote on the current track: 1 for up, -1 for down.
    pub async fn vote(&self, value: i32) -> UwResult<()> {
        self.send(&OutboundCommand::vote(value)).await
    }

    pub async fn send_chat(&self, message: impl Into<String>) -> UwResult<()> {
        self.send(&OutboundCommand::chat(message)).await
    }

    /// Close the connection. Subscribers then observe [`UwError::Closed`](uw_core::error::UwError::Closed).
    pub async fn close(&self) -> UwResult<()> {
        self.connection.close().await?;
        // The pump may still hold an event; subscribers must not see it.
        self.hub
            .finish(self.connection.end_reason().unwrap_or(StreamEnd::Closed));
        Ok(())
    }
}

impl Drop for UwaveClient {
    fn drop(&mut self) {
        self.pump.abort();
        self.hub.finish(StreamEnd::Closed);
    }
}
