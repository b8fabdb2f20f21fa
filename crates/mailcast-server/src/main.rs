//! Mailcast - campaign server entry point

use anyhow::{Context, Result};
use mailcast_api::{create_router, AppState};
use mailcast_common::config::{Config, LoggingConfig};
use mailcast_core::CampaignWorker;
use mailcast_storage::repository::Repositories;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Mailcast server...");

    // Initialize storage
    let repos = Repositories::open(&config.storage)?;
    info!(data_dir = %config.storage.data_dir.display(), "Storage opened");

    let state = Arc::new(AppState::new(config.clone(), repos.clone()));
    let shutdown = CancellationToken::new();

    // Start campaign worker
    let worker_handle = {
        let worker = CampaignWorker::new(
            repos,
            state.manager.clone(),
            state.pipeline.clone(),
            shutdown.child_token(),
        )
        .with_poll_interval(config.sending.poll_interval_secs);
        tokio::spawn(async move {
            worker.run().await;
        })
    };

    // Start API server
    let addr = format!("{}:{}", config.server.bind_address, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;
    info!(address = %addr, public_url = %config.server.public_url, "Starting API server");

    let app = create_router(state);
    let server_shutdown = shutdown.clone();
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
            _ = server_shutdown.cancelled() => {}
        }
    });

    if let Err(e) = serve.await {
        error!(error = %e, "API server error");
    }

    // Let the worker finish in-flight batches
    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        error!(error = %e, "Campaign worker task failed");
    }

    info!("Mailcast server shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},mailcast=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
