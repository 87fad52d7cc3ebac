//! Global error types for the uWave client.
//!
//! All error categories across the workspace are unified into a single
//! `UwError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using UwError.
pub type UwResult<T> = Result<T, UwError>;

/// Unified error type covering all error categories in uWave.
#[derive(Error, Debug)]
pub enum UwError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// A server URL could not be used.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    // -- Transport errors --
    /// Socket-level failure: refused connect, failed write, abrupt close.
    #[error("transport error: {0}")]
    Transport(String),

    /// The connection is not in a state that accepts outbound frames.
    #[error("connection not open (state: {0})")]
    NotOpen(String),

    /// The connection was closed, either locally or by the server.
    #[error("connection closed")]
    Closed,

    /// A transport operation did not finish in time.
    #[error("timed out: {0}")]
    Timeout(String),

    // -- Stream errors --
    /// The single event stream of a connection was already taken.
    #[error("event stream already taken")]
    StreamTaken,

    /// An inbound frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl UwError {
    /// Whether this error means the connection can no longer carry frames.
    ///
    /// Callers treat these as "connection lost" and build a new connection
    /// if they want to keep going.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::NotOpen(_) | Self::Closed | Self::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for UwError {
    fn from(e: serde_json::Error) -> Self {
        UwError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for UwError {
    fn from(e: toml::de::Error) -> Self {
        UwError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(UwError::Transport("reset".into()).is_transport());
        assert!(UwError::NotOpen("connecting".into()).is_transport());
        assert!(UwError::Closed.is_transport());
        assert!(UwError::Timeout("connect".into()).is_transport());

        assert!(!UwError::Decode("bad".into()).is_transport());
        assert!(!UwError::StreamTaken.is_transport());
        assert!(!UwError::Config("bad".into()).is_transport());
    }

    #[test]
    fn test_uw_error_display() {
        let err = UwError::NotOpen("connecting".to_string());
        assert_eq!(err.to_string(), "connection not open (state: connecting)");
        assert_eq!(UwError::Closed.to_string(), "connection closed");
    }

    #[test]
    fn test_json_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: UwError = parse.into();
        assert!(matches!(err, UwError::Serialization(_)));
    }
}
