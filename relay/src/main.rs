use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use figbridge_relay::config::{BridgeConfig, FileConfig, Overrides};
use figbridge_relay::{create_router, AppState};

#[derive(Parser)]
#[command(name = "figbridge-relay")]
#[command(author = "FigBridge Team")]
#[command(version = "0.1.0")]
#[command(about = "Relay tool calls to a polling Figma plugin", long_about = None)]
struct Cli {
    /// Interface to listen on
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Public tunnel URL exposing this bridge
    #[arg(long, env = "TUNNEL_URL")]
    tunnel_url: Option<String>,

    /// Path to figbridge.yml
    #[arg(short, long, env = "FIGBRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("figbridge_relay=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            std::process::exit(1);
        }
    };

    let addr = config.listen_addr();
    let state = AppState::new(config);
    let app = create_router(state.clone());

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to listen on {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!(
        "FigBridge Relay on {} (tunnel: {})",
        listener.local_addr().context("reading bound address")?,
        state.tunnel_url().await.as_deref().unwrap_or("none")
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("FigBridge Relay stopped");
    Ok(())
}

fn load_config(cli: Cli) -> Result<BridgeConfig> {
    // Checked first so a missing token never gets as far as binding
    let token = BridgeConfig::figma_token_from_env()?;

    let file = match cli.config.or_else(FileConfig::find_config) {
        Some(path) => {
            info!("Using config file {}", path.display());
            FileConfig::load(&path)?
        }
        None => FileConfig::default(),
    };

    let overrides = Overrides {
        host: cli.host,
        port: cli.port,
        tunnel_url: cli.tunnel_url,
    };

    Ok(BridgeConfig::resolve(file, overrides, token)?)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down...");
}
