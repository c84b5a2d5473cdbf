//! PyRunner daemon
//!
//! Serves the script manager web API and websocket on the configured
//! address until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pyr_core::config::{self, RunnerConfig};
use pyr_orchestrator::{server, signals};
use pyr_orchestrator::AppState;

#[derive(Parser)]
#[command(name = "pyrunnerd")]
#[command(about = "PyRunner script manager daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("PyRunner starting...");

    let config = if let Some(config_path) = &args.config {
        config::load_config::<RunnerConfig>(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
                RunnerConfig::default()
            })
        } else {
            tracing::info!("Using default configuration");
            RunnerConfig::default()
        }
    };

    let bind_addr = args.bind.unwrap_or_else(|| config.bind_address.clone());

    config
        .ensure_dirs()
        .context("Failed to create scripts and log directories")?;

    let state = Arc::new(AppState::new(config));
    tracing::info!("Host: {}", state.hostname);

    signals::cancel_on_shutdown_signal(state.shutdown_token());

    server::serve(state, &bind_addr).await?;

    tracing::info!("PyRunner shutdown complete");
    Ok(())
}
