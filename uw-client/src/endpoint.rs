//! The server a client talks to.

use std::fmt;

use uw_core::config::{sanitize_address, ServerConfig};
use uw_core::error::{UwError, UwResult};

/// HTTP API root and socket URL of one uWave server. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    api_url: String,
    socket_url: String,
}

impl ServerEndpoint {
    /// Build an endpoint from explicit URLs.
    ///
    /// The socket URL must use `ws` or `wss`. The API URL may be empty;
    /// otherwise it must use `http` or `https`.
    pub fn new(api_url: impl Into<String>, socket_url: impl Into<String>) -> UwResult<Self> {
        let api_url = api_url.into();
        let socket_url = socket_url.into();

        if !api_url.is_empty() {
            check_url(&api_url, &["http", "https"])?;
        }
        check_url(&socket_url, &["ws", "wss"])?;

        Ok(Self {
            api_url,
            socket_url,
        })
    }

    /// Build an endpoint from configuration, deriving the socket URL from
    /// the API URL when it is not set.
    pub fn from_config(server: &ServerConfig) -> UwResult<Self> {
        if server.api_url.trim().is_empty() && server.socket_url.trim().is_empty() {
            return Err(UwError::MissingConfig(
                "server.api_url or server.socket_url".into(),
            ));
        }
        Self::new(
            sanitize_address(&server.api_url, "https"),
            server.effective_socket_url(),
        )
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn socket_url(&self) -> &str {
        &self.socket_url
    }
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.socket_url)
    }
}

fn check_url(url: &str, schemes: &[&str]) -> UwResult<()> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| UwError::InvalidUrl(format!("{url}: missing scheme")))?;
    if !schemes.contains(&scheme) {
        return Err(UwError::InvalidUrl(format!(
            "{url}: expected one of {}",
            schemes.join(", ")
        )));
    }
    if rest.is_empty() || rest.starts_with('/') {
        return Err(UwError::InvalidUrl(format!("{url}: missing host")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_urls() {
        let endpoint = ServerEndpoint::new("https://wlk.yt/api", "wss://wlk.yt").unwrap();
        assert_eq!(endpoint.api_url(), "https://wlk.yt/api");
        assert_eq!(endpoint.socket_url(), "wss://wlk.yt");
        assert_eq!(endpoint.to_string(), "wss://wlk.yt");
    }

    #[test]
    fn test_rejects_bad_socket_urls() {
        assert!(matches!(
            ServerEndpoint::new("", "https://wlk.yt"),
            Err(UwError::InvalidUrl(_))
        ));
        assert!(matches!(
            ServerEndpoint::new("", "wlk.yt"),
            Err(UwError::InvalidUrl(_))
        ));
        assert!(matches!(
            ServerEndpoint::new("", "ws://"),
            Err(UwError::InvalidUrl(_))
        ));
        assert!(matches!(
            ServerEndpoint::new("ftp://wlk.yt", "wss://wlk.yt"),
            Err(UwError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_from_config_derives_socket_url() {
        let server = ServerConfig {
            api_url: "wlk.yt/api/".into(),
            ..Default::default()
        };
        let endpoint = ServerEndpoint::from_config(&server).unwrap();
        assert_eq!(endpoint.api_url(), "https://wlk.yt/api");
        assert_eq!(endpoint.socket_url(), "wss://wlk.yt");
    }

    #[test]
    fn test_from_config_socket_only() {
        let server = ServerConfig {
            socket_url: "ws://localhost:6042".into(),
            ..Default::default()
        };
        let endpoint = ServerEndpoint::from_config(&server).unwrap();
        assert_eq!(endpoint.api_url(), "");
        assert_eq!(endpoint.socket_url(), "ws://localhost:6042");
    }

    #[test]
    fn test_from_empty_config_fails() {
        assert!(matches!(
            ServerEndpoint::from_config(&ServerConfig::default()),
            Err(UwError::MissingConfig(_))
        ));
    }
}
