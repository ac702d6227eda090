mod api;
mod config;

use std::sync::Arc;

use anyhow::Context;
use filedeck_engine::FileSystemCapabilities;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::{AppState, create_router};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    info!("starting filedeck server");
    let config = AppConfig::load().context("failed to load server config")?;

    let filesystem =
        FileSystemCapabilities::new(&config.engine).context("failed to initialize filesystem engine")?;
    info!(
        root = %filesystem.root().display(),
        trash = %filesystem.trash_root().display(),
        "filesystem engine initialized"
    );

    let app = create_router(
        Arc::new(AppState::new(filesystem)),
        &config.server.allowed_origins,
    );
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "server is ready, press Ctrl+C to shut down");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received, stopping server");
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}
