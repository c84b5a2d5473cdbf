//! Serve command implementation

use std::sync::Arc;

use anyhow::{Context, Result};

use pyr_core::config::RunnerConfig;
use pyr_orchestrator::{server, signals, AppState};

use crate::output::print_info;

/// Run the web service in the foreground until Ctrl+C or SIGTERM
pub async fn serve_command(config: RunnerConfig, bind: Option<String>) -> Result<()> {
    let bind_addr = bind.unwrap_or_else(|| config.bind_address.clone());

    config
        .ensure_dirs()
        .context("Failed to create scripts and log directories")?;

    let state = Arc::new(AppState::new(config));

    print_info(&format!("PyRunner on {}", state.hostname));
    print_info(&format!("URL:  http://{}", bind_addr));
    print_info(&format!("Code: {}", state.config.scripts_dir.display()));

    signals::cancel_on_shutdown_signal(state.shutdown_token());
    server::serve(state, &bind_addr).await?;

    tracing::info!("PyRunner shutdown complete");
    Ok(())
}
