//! uWave CLI - command-line client for uWave servers.
//!
//! Listens to a room's live event stream, casts votes and posts chat
//! messages from the terminal. Useful for headless operation, scripting and
//! debugging a server's socket traffic.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use uw_core::config::{AppConfig, ConfigHandle};
use uw_core::error::UwResult;
use uw_core::logging;
use uw_core::platform::Platform;

use commands::listen::EventFilter;
use commands::ConnectArgs;

/// uWave - collaborative listening from the terminal.
#[derive(Parser)]
#[command(
    name = "uwave",
    version,
    about = "uWave collaborative listening client",
    long_about = "A command-line client for uWave servers.\n\
                  Follow a room's chat, waitlist and booth in real time, vote and chat."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the server and print events as they arrive.
    Listen {
        #[command(flatten)]
        connect: ConnectArgs,
        /// Only show some events.
        #[arg(long, default_value = "all")]
        filter: EventFilter,
        /// Save the server settings to the config file once connected.
        #[arg(long)]
        save: bool,
    },
    /// Vote on the current track ("up"/"1" or "down"/"-1").
    Vote {
        #[command(flatten)]
        connect: ConnectArgs,
        #[arg(allow_hyphen_values = true, value_parser = commands::send::parse_vote)]
        value: i32,
    },
    /// Post a chat message.
    Chat {
        #[command(flatten)]
        connect: ConnectArgs,
        message: String,
    },
    /// Inspect the configuration.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> UwResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = match cli.config {
        Some(path) => path,
        None => AppConfig::default_config_path()?,
    };
    let mut config = AppConfig::load_or_default(&config_path)?;
    if cli.verbose {
        config.logging.level = "debug".into();
    }

    // Initialize logging
    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| PathBuf::from("logs"));
    let _guard = logging::init_logging(&config.logging, &log_dir)?;

    info!(
        "uWave CLI v{} ({})",
        uw_core::constants::APP_VERSION,
        Platform::current()
    );

    let config_handle = ConfigHandle::new(config);

    // Dispatch to command handlers
    match cli.command {
        Commands::Listen {
            connect,
            filter,
            save,
        } => {
            let save_path = save.then_some(config_path);
            commands::listen::run(config_handle, connect, filter, save_path, cli.format).await
        }
        Commands::Vote { connect, value } => {
            commands::send::vote(config_handle, connect, value, cli.format).await
        }
        Commands::Chat { connect, message } => {
            commands::send::chat(config_handle, connect, message, cli.format).await
        }
        Commands::Config { action } => {
            commands::config::run(config_handle, action, &config_path, cli.format).await
        }
    }
}
