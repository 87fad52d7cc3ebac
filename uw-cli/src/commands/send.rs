//! Vote and chat commands - send one command and disconnect.

use console::style;
use serde_json::json;

use uw_core::config::ConfigHandle;
use uw_core::error::UwResult;

use super::ConnectArgs;
use crate::OutputFormat;

/// Parse a vote argument.
pub fn parse_vote(s: &str) -> Result<i32, String> {
    match s.trim().to_lowercase().as_str() {
        "up" | "woot" | "1" | "+1" => Ok(1),
        "down" | "meh" | "-1" => Ok(-1),
        other => Err(format!("expected up/1 or down/-1, got {other:?}")),
    }
}

/// Run the vote command.
pub async fn vote(
    config: ConfigHandle,
    args: ConnectArgs,
    value: i32,
    format: OutputFormat,
) -> UwResult<()> {
    let client = super::open_client(&config, &args, true).await?;
    super::wait_open(&client).await?;
    let result = client.vote(value).await;
    client.close().await?;
    result?;

    report(format, "vote", json!(value));
    Ok(())
}

/// Run the chat command.
pub async fn chat(
    config: ConfigHandle,
    args: ConnectArgs,
    message: String,
    format: OutputFormat,
) -> UwResult<()> {
    let client = super::open_client(&config, &args, true).await?;
    super::wait_open(&client).await?;
    let result = client.send_chat(message.as_str()).await;
    client.close().await?;
    result?;

    report(format, "sendChat", json!(message));
    Ok(())
}

fn report(format: OutputFormat, command: &str, data: serde_json::Value) {
    match format {
        OutputFormat::Json => println!("{}", json!({ "sent": command, "data": data })),
        OutputFormat::Text => println!(
            "{} Sent {} {}",
            style("[2/2]").bold().dim(),
            style(command).cyan(),
            data
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vote() {
        assert_eq!(parse_vote("up"), Ok(1));
        assert_eq!(parse_vote("+1"), Ok(1));
        assert_eq!(parse_vote("DOWN"), Ok(-1));
        assert_eq!(parse_vote("-1"), Ok(-1));
        assert!(parse_vote("0").is_err());
        assert!(parse_vote("2").is_err());
    }
}
