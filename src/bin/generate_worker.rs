use std::io;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use model_worker::config::{Args, Config};
use model_worker::exit_err;
use model_worker::inference::models::mistral::MistralInstructModel;
use model_worker::telemetry::{init_telemetry, shutdown_telemetry};
use model_worker::worker::{self, Generate};

#[cfg(unix)]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;
    init_telemetry("generate_worker", config.otlp_endpoint.as_deref(), config.console)?;

    let result = run(config).await;
    if let Err(err) = &result {
        error!("Worker failed: {:#}", err);
    }
    shutdown_telemetry();
    result
}

async fn run(config: Config) -> Result<()> {
    let device = match config.device.resolve(config.device_ordinal) {
        Ok(device) => device,
        Err(err) => exit_err!(1, "Failed to select a compute device: {:#}", err),
    };
    let model = match MistralInstructModel::new(
        &config.mistral_files(),
        device,
        config.general_model_config(),
    ) {
        Ok(model) => model,
        Err(err) => exit_err!(1, "Failed to load the generator: {:#}", err),
    };
    info!("Generator ready, reading requests from stdin");

    let summary = tokio::task::spawn_blocking(move || {
        worker::serve(&mut Generate(model), io::stdin().lock(), io::stdout().lock())
    })
    .await??;
    info!("Worker stopped ({:?}) after {} replies", summary.exit, summary.answered);
    Ok(())
}
