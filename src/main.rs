use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use model_worker::config::{Args, Config};
use model_worker::exit_err;
use model_worker::inference::models::politeness::PolitenessModel;
use model_worker::telemetry::{init_telemetry, shutdown_telemetry};

#[cfg(unix)]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;
    init_telemetry("model_worker", config.otlp_endpoint.as_deref(), config.console)?;

    let result = run(config).await;
    if let Err(err) = &result {
        error!("Server stopped: {:#}", err);
    }
    shutdown_telemetry();
    result
}

async fn run(config: Config) -> Result<()> {
    let model = match PolitenessModel::new(
        config.classifier_backend,
        &config.classifier_model,
        &config.revision,
        || config.device.resolve(config.device_ordinal),
    ) {
        Ok(model) => model,
        Err(err) => exit_err!(1, "Failed to load the politeness classifier: {:#}", err),
    };

    let router = model_worker::api::router(Arc::new(model));
    let listener = TcpListener::bind(format!("{}:{}", config.address, config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.address, config.port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down..."),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}
