//! uWave Socket - the client side of the uWave WebSocket protocol.
//!
//! This crate provides:
//! - The message model: outbound user commands and inbound server events,
//!   with their JSON wire encoding
//! - The connection: one long-lived socket, its state machine, atomic
//!   frame writes and an ordered event stream with rendezvous backpressure
//! - A transport seam with a WebSocket implementation and an in-process
//!   memory transport

pub mod connection;
pub mod handoff;
pub mod memory;
pub mod message;
pub mod transport;
pub mod ws;

// Re-export key types
pub use connection::{Connection, ConnectionOptions, ConnectionState, EventStream, StreamEnd};
pub use message::{decode, encode, DecodeError, InboundEvent, OutboundCommand, PlaybackEntry};
pub use transport::{Connector, Frame, FrameSink, FrameSource};
pub use ws::WsConnector;
