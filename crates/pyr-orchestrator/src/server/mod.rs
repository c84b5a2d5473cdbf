//! HTTP and websocket server
//!
//! One axum router serves the JSON control plane under `/api` and the
//! streaming channel at `/ws`.

mod client;
mod http;
mod ws;

pub use client::{error_event, ClientSession, Utf8Decoder, OUTBOUND_CAPACITY};
pub use http::{ApiError, ScriptDetail, ScriptListing, UploadResponse};

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use crate::state::AppState;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/api/hostname", get(http::hostname))
        .route("/api/scripts", get(http::list_scripts))
        .route(
            "/api/scripts/{name}",
            get(http::get_script).delete(http::delete_script),
        )
        .route("/api/scripts/{name}/log", get(http::get_log))
        .route("/api/scripts/{name}/autoboot", post(http::set_autoboot))
        .route("/api/upload", post(http::upload))
        .route("/api/config/blocked", get(http::blocked))
        .route("/ws", get(ws::ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve until the state's shutdown token fires, then stop every running
/// script
pub async fn serve(state: Arc<AppState>, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    tracing::info!("Scripts directory: {}", state.config.scripts_dir.display());
    tracing::info!("Log directory: {}", state.config.log_dir.display());

    let shutdown = state.shutdown_token();
    axum::serve(listener, router(Arc::clone(&state)))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Server error")?;

    tracing::info!("Server stopped accepting connections");
    state
        .orchestrator
        .shutdown(state.config.shutdown_timeout)
        .await;
    Ok(())
}
