mod config;
mod error;
mod handlers;
mod routes;
mod telemetry;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use audiosub::TranscriptionService;

use crate::config::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init_tracing(&cli)?;

    let config = cli.service_config()?;
    let engine = cli.build_engine(&config);
    let service = Arc::new(TranscriptionService::start(config, engine)?);

    // A failed warm-up is not fatal; the first job retries the load.
    let warm = Arc::clone(&service);
    tokio::spawn(async move {
        match warm.preload().await {
            Ok(tier) => info!(model = %tier, "Speech model ready"),
            Err(e) => warn!(error = %e, "Speech model warm-up failed"),
        }
    });

    let app = routes::router(Arc::clone(&service));
    let listener = TcpListener::bind(cli.bind_address()).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining workers");
}
