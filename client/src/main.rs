use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figbridge_shared::protocol::{CommandResult, ToolOutcome};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

mod api;
mod config;
mod plugin;

use api::BridgeClient;
use config::CliConfig;

#[derive(Parser)]
#[command(name = "figbridge")]
#[command(author = "FigBridge Team")]
#[command(version = "0.1.0")]
#[command(about = "Call tools through a FigBridge relay or act as its plugin", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Bridge base URL
    #[arg(short, long, env = "FIGBRIDGE_URL")]
    bridge: Option<String>,

    /// Path to figbridge-cli.yml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a tool call
    Call {
        /// Tool name
        tool: String,

        /// Arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,

        /// Block until the plugin posts a result
        #[arg(short, long)]
        wait: bool,
    },
    /// Queue a create-node command
    CreateNode {
        /// Node description as a JSON object
        #[arg(short, long)]
        payload: Option<String>,
    },
    /// Drain queued commands (plugin side)
    Poll {
        /// Keep polling until Ctrl+C
        #[arg(short, long)]
        follow: bool,

        /// Seconds between polls
        #[arg(short, long)]
        interval: Option<u64>,

        /// Ack every command with its own payload
        #[arg(long)]
        echo: bool,
    },
    /// Post a result for a command
    Ack {
        /// Command id
        id: String,

        /// Result data as JSON
        #[arg(short, long, conflicts_with = "error")]
        data: Option<String>,

        /// Report a failure with this message
        #[arg(short, long)]
        error: Option<String>,
    },
    /// Collect the result of a command
    Result {
        /// Command id
        id: String,

        /// Block until the result is recorded
        #[arg(short, long)]
        wait: bool,
    },
    /// Receive commands over the push channel (plugin side)
    Subscribe {
        /// Ack every command with its own payload
        #[arg(long)]
        echo: bool,
    },
    /// Set or clear the bridge's public tunnel URL
    Tunnel {
        /// Public URL; omit to clear
        url: Option<String>,
    },
    /// Show bridge status
    Status,
    /// Check bridge liveness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    let config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::discover()?,
    };
    let bridge = cli.bridge.clone().unwrap_or_else(|| config.bridge.clone());
    let client = BridgeClient::new(&bridge);

    match cli.command {
        Commands::Call { tool, args, wait } => {
            let data = client.call_tool(&tool, parse_json_arg(args.as_deref())?).await?;
            let queued_id = data.get("commandId").and_then(Value::as_str).map(String::from);
            match queued_id {
                Some(id) if wait => {
                    info!("Queued as {}, waiting for the plugin", id);
                    print_json(&client.result(&id, true).await?)?;
                }
                _ => print_json(&data)?,
            }
        }
        Commands::CreateNode { payload } => {
            let receipt = client.create_node(&parse_json_arg(payload.as_deref())?).await?;
            print_json(&receipt)?;
        }
        Commands::Poll { follow, interval, echo } => {
            let interval = Duration::from_secs(interval.unwrap_or(config.poll_interval_secs).max(1));
            plugin::poll(&client, follow, interval, echo).await?;
        }
        Commands::Ack { id, data, error } => {
            let result = CommandResult {
                command_id: id,
                result: match error {
                    Some(message) => ToolOutcome::err(message),
                    None => ToolOutcome::ok(parse_json_arg(data.as_deref())?),
                },
            };
            print_json(&client.ack(&result).await?)?;
        }
        Commands::Result { id, wait } => {
            print_json(&client.result(&id, wait).await?)?;
        }
        Commands::Subscribe { echo } => {
            plugin::subscribe(&client, echo).await?;
        }
        Commands::Tunnel { url } => {
            print_json(&client.set_tunnel(url).await?)?;
        }
        Commands::Status => print_json(&client.status().await?)?,
        Commands::Health => print_json(&client.health().await?)?,
    }

    Ok(())
}

/// Parse a JSON flag value; absent means an empty object
fn parse_json_arg(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(Value::Object(Default::default())),
        Some(text) => serde_json::from_str(text).with_context(|| format!("Invalid JSON: {}", text)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json_arg() {
        assert_eq!(parse_json_arg(None).unwrap(), json!({}));
        assert_eq!(parse_json_arg(Some(r#"{"x": 1}"#)).unwrap(), json!({"x": 1}));
        assert!(parse_json_arg(Some("{oops")).is_err());
    }

    #[test]
    fn test_cli_parses_call() {
        let cli = Cli::parse_from(["figbridge", "call", "create_frame", "--args", "{}", "--wait"]);
        match cli.command {
            Commands::Call { tool, wait, .. } => {
                assert_eq!(tool, "create_frame");
                assert!(wait);
            }
            _ => panic!("expected call"),
        }
    }
}
