//! uWave Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the other uWave crates:
//! - Application configuration (server endpoints, auth token, timeouts)
//! - A unified error type covering transport, decode and config failures
//! - Structured logging with tracing
//! - Platform directory lookup
//! - Common constants

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod platform;

// Re-export commonly used items at the crate root
pub use config::AppConfig;
pub use error::{UwError, UwResult};
pub use logging::init_logging;
pub use platform::Platform;
