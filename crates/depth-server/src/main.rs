//! depth-server - serves RTL depth predictions and on-demand training

use anyhow::{Context, Result};
use depth_core::{
    health::{components, HealthRegistry},
    observability::DepthMetrics,
};
use depth_server::{api, AppState, ServerConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = SERVER_VERSION, "Starting depth-server");

    let config = ServerConfig::load().context("Failed to load server configuration")?;
    info!(
        port = config.port,
        model_path = %config.model_path.display(),
        data_path = %config.data_path.display(),
        "Server configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::TRAINER).await;

    let metrics = DepthMetrics::new();
    let port = config.port;
    let state = Arc::new(AppState::new(config, health_registry.clone(), metrics));
    state.load_initial_model().await;

    health_registry.set_ready(true).await;

    api::serve(port, state, shutdown_signal()).await?;
    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
