//! uWave Client - the entry point external collaborators talk to.
//!
//! Composes one socket [`Connection`](uw_socket::Connection) with the
//! [`ServerEndpoint`] it was opened against, and fans the connection's event
//! stream out to any number of subscribers through an [`EventHub`].

pub mod client;
pub mod endpoint;
pub mod hub;
pub mod user;

pub use client::UwaveClient;
pub use endpoint::ServerEndpoint;
pub use hub::{EventHub, Subscription};
pub use user::User;
