//! CLI command implementations.

pub mod config;
pub mod listen;
pub mod send;

use chrono::{DateTime, Local, Utc};
use clap::Args;
use console::style;
use dialoguer::Password;

use uw_client::{ServerEndpoint, UwaveClient};
use uw_core::config::{sanitize_address, ConfigHandle};
use uw_core::error::{UwError, UwResult};
use uw_socket::ConnectionOptions;

/// Server selection shared by every command that connects.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// HTTP API URL (overrides config), e.g. https://wlk.yt/api.
    #[arg(short, long)]
    pub api_url: Option<String>,
    /// Socket URL (overrides config). Derived from the API URL when unset.
    #[arg(short, long)]
    pub socket_url: Option<String>,
    /// Session token (overrides config).
    #[arg(short, long)]
    pub token: Option<String>,
}

/// Apply command-line overrides to the shared config.
pub async fn apply_overrides(config: &ConfigHandle, args: &ConnectArgs) {
    let mut cfg = config.write().await;
    if let Some(api_url) = &args.api_url {
        cfg.server.api_url = sanitize_address(api_url, "https");
        // A new API URL implies its own socket unless one is given too.
        if args.socket_url.is_none() {
            cfg.server.socket_url.clear();
        }
    }
    if let Some(socket_url) = &args.socket_url {
        cfg.server.socket_url = sanitize_address(socket_url, "wss");
    }
    if let Some(token) = &args.token {
        cfg.server.auth_token = token.clone();
    }
}

/// Start connecting to the configured server, queueing the token when one
/// is known. Returns while the socket is still opening, so callers can
/// subscribe before any event arrives; see [`wait_open`].
///
/// With `require_token`, prompts for a token when none is configured.
pub async fn open_client(
    config: &ConfigHandle,
    args: &ConnectArgs,
    require_token: bool,
) -> UwResult<UwaveClient> {
    apply_overrides(config, args).await;

    let (endpoint, options, mut token) = {
        let cfg = config.read().await;
        let endpoint = ServerEndpoint::from_config(&cfg.server)?;
        let options = ConnectionOptions::from(&cfg.connection);
        let token = Some(cfg.server.auth_token.clone()).filter(|t| !t.is_empty());
        (endpoint, options, token)
    };

    if token.is_none() && require_token {
        let entered = Password::new()
            .with_prompt("Session token")
            .interact()
            .map_err(|e| UwError::Internal(e.to_string()))?;
        config.write().await.server.auth_token = entered.clone();
        token = Some(entered);
    }

    println!(
        "{} Connecting to {}...",
        style("[1/2]").bold().dim(),
        endpoint.socket_url()
    );
    let client = UwaveClient::connect(endpoint, options)?;
    if let Some(token) = token {
        client.authenticate(token).await?;
    }
    Ok(client)
}

/// Wait for the socket opened by [`open_client`] and report the outcome.
pub async fn wait_open(client: &UwaveClient) -> UwResult<()> {
    match client.wait_open().await {
        Ok(()) => println!("  {} Socket is open.", style("OK").green().bold()),
        Err(e) => {
            println!("  {} Failed to connect: {e}", style("FAIL").red().bold());
            return Err(e);
        }
    }
    Ok(())
}

/// Format an epoch-millisecond timestamp as local wall-clock time.
pub fn format_time(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

/// Truncate a string to at most `max_chars` characters, appending an
/// ellipsis if truncated.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uw_core::config::AppConfig;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a rather long message", 10), "a rathe...");
        assert_eq!(truncate("ünïcödé text", 8), "ünïcö...");
    }

    #[test]
    fn test_format_time_out_of_range() {
        assert_eq!(format_time(i64::MAX), "--:--:--");
        assert_eq!(format_time(0).len(), 8);
    }

    #[tokio::test]
    async fn test_overrides_replace_derived_socket() {
        let mut config = AppConfig::default();
        config.server.api_url = "https://old.example/api".into();
        config.server.socket_url = "wss://old.example".into();
        let handle = ConfigHandle::new(config);

        let args = ConnectArgs {
            api_url: Some("wlk.yt/api".into()),
            token: Some("tok".into()),
            ..Default::default()
        };
        apply_overrides(&handle, &args).await;

        let cfg = handle.read().await;
        assert_eq!(cfg.server.api_url, "https://wlk.yt/api");
        assert_eq!(cfg.server.effective_socket_url(), "wss://wlk.yt");
        assert_eq!(cfg.server.auth_token, "tok");
    }
}
