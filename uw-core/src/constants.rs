//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "uWave";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Keep-alive frame pushed by the server. Never carries an event.
pub const KEEPALIVE_FRAME: &str = "-";

/// Default socket handshake timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default time a close waits for the server's close reply, in milliseconds.
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 5_000;

/// Default capacity of the decode failure report channel.
pub const DEFAULT_DECODE_REPORT_CAPACITY: usize = 32;

/// File name prefix for rolling log files.
pub const LOG_FILE_NAME: &str = "uwave.log";

/// Path suffix the server mounts its HTTP API under.
pub const API_PATH_SUFFIX: &str = "/api";
