//! Config commands.

use std::path::Path;

use clap::Subcommand;
use console::style;

use uw_core::config::{AppConfig, ConfigHandle};
use uw_core::error::UwResult;

use crate::OutputFormat;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration. The token is masked.
    Show,
    /// Print the config file path.
    Path,
}

/// Run a config command.
pub async fn run(
    config: ConfigHandle,
    action: ConfigAction,
    path: &Path,
    format: OutputFormat,
) -> UwResult<()> {
    match action {
        ConfigAction::Show => {
            let cfg = masked(&*config.read().await);
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&cfg)?),
                OutputFormat::Text => print_text(&cfg),
            }
        }
        ConfigAction::Path => match format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "path": path })),
            OutputFormat::Text => println!("{}", path.display()),
        },
    }
    Ok(())
}

fn masked(config: &AppConfig) -> AppConfig {
    let mut cfg = config.clone();
    if !cfg.server.auth_token.is_empty() {
        cfg.server.auth_token = "********".into();
    }
    cfg
}

fn print_text(cfg: &AppConfig) {
    let unset = || style("(not set)").dim().to_string();
    let or_unset = |s: &str| if s.is_empty() { unset() } else { s.to_string() };

    println!("{}", style("Server").bold());
    println!("  API URL:        {}", or_unset(&cfg.server.api_url));
    println!("  Socket URL:     {}", or_unset(&cfg.server.effective_socket_url()));
    println!("  Token:          {}", or_unset(&cfg.server.auth_token));
    println!("{}", style("Connection").bold());
    println!("  Connect timeout: {} ms", cfg.connection.connect_timeout_ms);
    println!("  Close timeout:   {} ms", cfg.connection.close_timeout_ms);
    println!("{}", style("Logging").bold());
    println!("  Level:          {}", cfg.logging.level);
    println!("  Directory:      {}", or_unset(&cfg.logging.directory));
    println!("  JSON output:    {}", cfg.logging.json_output);
}
