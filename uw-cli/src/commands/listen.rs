//! Listen command - follow a room's live event stream.

use std::path::PathBuf;

use console::style;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use uw_core::config::ConfigHandle;
use uw_core::error::{UwError, UwResult};
use uw_socket::{InboundEvent, PlaybackEntry};

use super::ConnectArgs;
use crate::OutputFormat;

/// Which events to print.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum EventFilter {
    #[default]
    All,
    Chat,
    Waitlist,
}

impl EventFilter {
    pub fn matches(self, event: &InboundEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Chat => event.is_chat_event(),
            EventFilter::Waitlist => event.is_waitlist_event(),
        }
    }
}

/// Run the listen command.
pub async fn run(
    config: ConfigHandle,
    args: ConnectArgs,
    filter: EventFilter,
    save_path: Option<PathBuf>,
    format: OutputFormat,
) -> UwResult<()> {
    let client = super::open_client(&config, &args, false).await?;
    let mut events = client.subscribe();
    let mut failures = client.decode_failures();
    super::wait_open(&client).await?;

    if let Some(path) = save_path {
        config.save_to(&path).await?;
        println!("  {} Config saved to {}", style("OK").green(), path.display());
    }

    tokio::spawn(async move {
        loop {
            match failures.recv().await {
                Ok(e) => eprintln!("  {} {e}", style("SKIPPED").yellow()),
                Err(RecvError::Lagged(n)) => warn!("missed {n} decode failure reports"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!(
        "{} Listening for events... (Ctrl+C to stop)",
        style("[2/2]").bold().dim()
    );
    println!();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) if filter.matches(&event) => print_event(&event, format)?,
                Ok(_) => {}
                Err(UwError::Closed) => {
                    println!("\n  Connection closed by the server.");
                    break;
                }
                Err(e) => {
                    println!("\n  {} {e}", style("FAIL").red().bold());
                    return Err(e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\n  Disconnecting...");
                client.close().await?;
                break;
            }
        }
    }

    Ok(())
}

fn print_event(event: &InboundEvent, format: OutputFormat) -> UwResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
        OutputFormat::Text => println!("  {}", describe(event)),
    }
    Ok(())
}

/// One human-readable line for an event.
fn describe(event: &InboundEvent) -> String {
    let tag = style(format!("[{}]", event.tag())).cyan();
    match event {
        InboundEvent::ChatPosted {
            user_id,
            message,
            timestamp,
            ..
        } => format!(
            "{} {} {}",
            style(super::format_time(*timestamp)).dim(),
            style(format!("<{user_id}>")).bold(),
            message
        ),
        InboundEvent::ChatClearedAll => format!("{tag} chat cleared"),
        InboundEvent::ChatClearedOne { id } => format!("{tag} message {id} deleted"),
        InboundEvent::ChatClearedByUser { user_id } => {
            format!("{tag} messages by {user_id} deleted")
        }
        InboundEvent::UserLeft { user_id } => format!("{tag} {user_id} left"),
        InboundEvent::UserRenamed { user_id, username } => {
            format!("{tag} {user_id} is now {username}")
        }
        InboundEvent::VoteCast { user_id, value } => {
            let vote = if *value > 0 {
                style("woot").green()
            } else {
                style("meh").red()
            };
            format!("{tag} {user_id} {vote}")
        }
        InboundEvent::Favorited { user_id, .. } => format!("{tag} {user_id} grabbed the track"),
        InboundEvent::PlaylistCycled { playlist_id } => {
            format!("{tag} playlist {playlist_id} cycled")
        }
        InboundEvent::WaitlistJoined { user_id, waitlist }
        | InboundEvent::WaitlistLeft { user_id, waitlist }
        | InboundEvent::WaitlistAdded { user_id, waitlist }
        | InboundEvent::WaitlistRemoved { user_id, waitlist } => {
            format!("{tag} {user_id} ({} waiting)", waitlist.len())
        }
        InboundEvent::WaitlistUpdated { waitlist } => {
            format!("{tag} {}", waitlist.join(", "))
        }
        InboundEvent::WaitlistLocked { locked } => {
            format!("{tag} {}", if *locked { "locked" } else { "unlocked" })
        }
        InboundEvent::WaitlistCleared => format!("{tag} waitlist cleared"),
        InboundEvent::Advanced { entry: Some(entry) } => format!("{tag} {}", now_playing(entry)),
        InboundEvent::Advanced { entry: None } => format!("{tag} nothing playing"),
    }
}

fn now_playing(entry: &PlaybackEntry) -> String {
    let track = super::truncate(&format!("{} - {}", entry.artist, entry.title), 60);
    match &entry.user_id {
        Some(dj) => format!("{track} ({}:{}, played by {dj})", entry.source_type, entry.source_id),
        None => format!("{track} ({}:{})", entry.source_type, entry.source_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches() {
        let chat = InboundEvent::ChatClearedAll;
        let lock = InboundEvent::WaitlistLocked { locked: false };
        let left = InboundEvent::UserLeft {
            user_id: "u1".into(),
        };

        assert!(EventFilter::All.matches(&left));
        assert!(EventFilter::Chat.matches(&chat));
        assert!(!EventFilter::Chat.matches(&lock));
        assert!(EventFilter::Waitlist.matches(&lock));
        assert!(!EventFilter::Waitlist.matches(&left));
    }

    #[test]
    fn test_describe_mentions_details() {
        console::set_colors_enabled(false);
        let line = describe(&InboundEvent::UserRenamed {
            user_id: "u1".into(),
            username: "Rena".into(),
        });
        assert_eq!(line, "[nameChange] u1 is now Rena");

        let entry = PlaybackEntry {
            history_id: None,
            user_id: Some("dj".into()),
            artist: "Hiroshi Yoshimura".into(),
            title: "Blink".into(),
            start: 0,
            end: None,
            source_type: "youtube".into(),
            source_id: "abc".into(),
            played_at: None,
        };
        assert_eq!(
            now_playing(&entry),
            "Hiroshi Yoshimura - Blink (youtube:abc, played by dj)"
        );
    }
}
