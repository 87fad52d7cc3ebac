//! Application configuration management.
//!
//! Handles loading, saving, and accessing the client configuration: the
//! server endpoint pair, the authentication token, connection timeouts and
//! logging preferences. Configuration is persisted as TOML on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::constants;
use crate::error::{UwError, UwResult};
use crate::platform::Platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server endpoint and credentials.
    #[serde(default)]
    pub server: ServerConfig,

    /// Socket connection tuning.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API root (e.g., "https://wlk.yt/api").
    #[serde(default)]
    pub api_url: String,

    /// WebSocket URL. Derived from `api_url` when empty.
    #[serde(default)]
    pub socket_url: String,

    /// Session token sent as the first socket frame.
    #[serde(default)]
    pub auth_token: String,
}

/// Socket connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// How long a close waits for the server before forcing, in milliseconds.
    #[serde(default = "default_close_timeout")]
    pub close_timeout_ms: u64,

    /// Buffered decode failure reports per observer.
    #[serde(default = "default_decode_report_capacity")]
    pub decode_report_capacity: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output in the log file.
    #[serde(default)]
    pub json_output: bool,
}

// Default value functions for serde

fn default_connect_timeout() -> u64 {
    constants::DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_close_timeout() -> u64 {
    constants::DEFAULT_CLOSE_TIMEOUT_MS
}

fn default_decode_report_capacity() -> usize {
    constants::DEFAULT_DECODE_REPORT_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            close_timeout_ms: default_close_timeout(),
            decode_report_capacity: default_decode_report_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl ConnectionConfig {
    /// Handshake timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Close timeout as a Duration.
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

impl ServerConfig {
    /// The socket URL to dial: the configured one, or one derived from the
    /// API URL by switching to the ws(s) scheme and dropping the `/api` path.
    pub fn effective_socket_url(&self) -> String {
        if !self.socket_url.trim().is_empty() {
            return http_to_ws_scheme(&sanitize_address(&self.socket_url, "wss"));
        }
        let api = sanitize_address(&self.api_url, "https");
        let origin = api.strip_suffix(constants::API_PATH_SUFFIX).unwrap_or(&api);
        http_to_ws_scheme(origin)
    }
}

impl AppConfig {
    /// Load configuration from `path`, or the defaults when no file exists.
    pub fn load_or_default(path: &Path) -> UwResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> UwResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> UwResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| UwError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> UwResult<PathBuf> {
        Ok(Platform::config_dir()?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> UwResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Ok(Platform::data_dir()?.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Check whether a server to connect to is configured.
    pub fn is_server_configured(&self) -> bool {
        !self.server.api_url.trim().is_empty() || !self.server.socket_url.trim().is_empty()
    }
}

/// Sanitize and normalize a server address.
///
/// Trims whitespace and stray quotes, prefixes `default_scheme` when the
/// address has none, and strips trailing slashes.
pub fn sanitize_address(address: &str, default_scheme: &str) -> String {
    let trimmed = address.trim().trim_matches('"').trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("{default_scheme}://{trimmed}")
    };

    with_scheme.trim_end_matches('/').to_string()
}

/// Convert an HTTP(S) URL to the WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
pub fn http_to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

/// Thread-safe configuration holder for shared access.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Save the current configuration to a file.
    pub async fn save_to(&self, path: &Path) -> UwResult<()> {
        let config = self.inner.read().await;
        config.save_to_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.connection.connect_timeout_ms, 10_000);
        assert_eq!(config.connection.close_timeout(), Duration::from_secs(5));
        assert_eq!(config.logging.level, "info");
        assert!(!config.is_server_configured());
    }

    #[test]
    fn test_sanitize_address() {
        assert_eq!(
            sanitize_address("wlk.yt/api/", "https"),
            "https://wlk.yt/api"
        );
        assert_eq!(
            sanitize_address("  \"http://192.168.1.10:6042/\"  ", "https"),
            "http://192.168.1.10:6042"
        );
        assert_eq!(sanitize_address("   ", "https"), "");
    }

    #[test]
    fn test_http_to_ws_scheme() {
        assert_eq!(http_to_ws_scheme("https://wlk.yt"), "wss://wlk.yt");
        assert_eq!(http_to_ws_scheme("http://localhost:6042"), "ws://localhost:6042");
        assert_eq!(http_to_ws_scheme("wss://wlk.yt"), "wss://wlk.yt");
    }

    #[test]
    fn test_socket_url_derived_from_api_url() {
        let server = ServerConfig {
            api_url: "https://wlk.yt/api".into(),
            ..Default::default()
        };
        assert_eq!(server.effective_socket_url(), "wss://wlk.yt");

        let local = ServerConfig {
            api_url: "http://localhost:6042/api/".into(),
            ..Default::default()
        };
        assert_eq!(local.effective_socket_url(), "ws://localhost:6042");
    }

    #[test]
    fn test_explicit_socket_url_wins() {
        let server = ServerConfig {
            api_url: "https://wlk.yt/api".into(),
            socket_url: "https://ws.wlk.yt/".into(),
            auth_token: String::new(),
        };
        assert_eq!(server.effective_socket_url(), "wss://ws.wlk.yt");
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = AppConfig::default();
        config.server.api_url = "https://wlk.yt/api".into();
        config.connection.close_timeout_ms = 250;
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.server.api_url, "https://wlk.yt/api");
        assert_eq!(deserialized.connection.close_timeout_ms, 250);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            api_url = "https://wlk.yt/api"
            "#,
        )
        .unwrap();
        assert!(config.is_server_configured());
        assert_eq!(config.connection.decode_report_capacity, 32);
        assert_eq!(config.logging.level, "info");
    }
}
