//! HTTP surface: chat page, ingest, and query endpoints.
pub mod error;
pub mod handlers;
pub mod router;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::engine::manager::IndexManager;

pub struct AppState {
    pub index: IndexManager,
    pub data_dir: PathBuf,
    pub html_path: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &Config, index: IndexManager) -> Arc<Self> {
        Arc::new(Self {
            index,
            data_dir: config.data_dir(),
            html_path: PathBuf::from(&config.server.html_path),
            allowed_extensions: config.server.allowed_extensions.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
        })
    }
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn serve(config: &Config, state: Arc<AppState>) -> anyhow::Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {bind_addr}"))?;
    let addr = listener.local_addr()?;
    info!("Listening on http://{addr}");

    let app = router::router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
