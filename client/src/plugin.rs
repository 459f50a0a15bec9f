//! Simulated plugin: print received commands and optionally ack them
//!
//! Used by `poll` and `subscribe` to exercise the bridge without Figma.

use anyhow::{Context, Result};
use figbridge_shared::protocol::{CommandResult, PushMessage, QueuedCommand, ToolOutcome};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{error, info, warn};

use crate::api::BridgeClient;

/// Result sent back in echo mode: the command's own payload
pub fn echo_result(command: &QueuedCommand) -> CommandResult {
    CommandResult {
        command_id: command.id.clone(),
        result: ToolOutcome::ok(command.payload.clone()),
    }
}

fn print_command(command: &QueuedCommand) {
    match serde_json::to_string_pretty(command) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{:?}", command),
    }
}

/// Poll once, or forever with `follow`
pub async fn poll(client: &BridgeClient, follow: bool, interval: Duration, echo: bool) -> Result<()> {
    loop {
        let batch = client.poll().await?;
        for command in &batch {
            print_command(command);
            if echo {
                let ack = client.ack(&echo_result(command)).await?;
                info!("Acked {} (caller waiting: {})", ack.command_id, ack.matched);
            }
        }

        if !follow {
            if batch.is_empty() {
                println!("No queued commands");
            }
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                return Ok(());
            }
        }
    }
}

/// Hold the push channel open and handle pushed batches
pub async fn subscribe(client: &BridgeClient, echo: bool) -> Result<()> {
    let url = client.subscribe_url();
    info!("Subscribing to {}", url);

    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .context("Failed to connect to bridge push channel")?;
    let (mut write, mut read) = ws_stream.split();
    println!("Subscribed. Press Ctrl+C to stop\n");

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PushMessage>(&text) {
                            Ok(PushMessage::Commands { commands }) => {
                                for command in &commands {
                                    print_command(command);
                                    if echo {
                                        let frame = serde_json::to_string(&PushMessage::Result(echo_result(command)))?;
                                        write.send(Message::Text(frame)).await?;
                                    }
                                }
                            }
                            Ok(PushMessage::Error { message }) => warn!("Bridge rejected frame: {}", message),
                            Ok(other) => warn!("Unexpected frame: {:?}", other),
                            Err(e) => warn!("Invalid frame from bridge: {}", e),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Connection closed");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                write.send(Message::Close(None)).await?;
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use figbridge_shared::protocol::CommandType;
    use serde_json::json;

    #[test]
    fn test_echo_result_mirrors_command() {
        let command = QueuedCommand {
            id: "cmd-7-1".into(),
            kind: CommandType::ToolCall,
            tool: Some("create_text".into()),
            payload: json!({"text": "hello"}),
            timestamp: Utc::now(),
        };
        let result = echo_result(&command);
        assert_eq!(result.command_id, "cmd-7-1");
        assert!(result.result.success);
        assert_eq!(result.result.data, Some(json!({"text": "hello"})));
        assert!(result.result.error.is_none());
    }
}
