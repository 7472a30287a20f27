use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use ::tracing::{error, info, info_span};
use anyhow::{anyhow, Result};
use batch::OfferBatch;
use clap::Parser;
use service::Service;

mod batch;
mod config;
mod service;
mod tracing;
use crate::tracing::setup_tracing;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: Option<PathBuf>,

    #[arg(
        short,
        long,
        value_name = "batch file",
        help = "Path to a YAML file with applications and offers"
    )]
    batch: PathBuf,
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("path is not valid utf-8: {}", path.display()))
}

fn load_config(cli: &Cli) -> Result<config::ServerConfig> {
    match &cli.config {
        Some(path) => config::ServerConfig::from_path(path_str(path)?),
        None => Ok(config::ServerConfig::default()),
    }
}

fn run(service: &Service, batch_path: &Path) -> Result<()> {
    let batch = OfferBatch::from_path(path_str(batch_path)?)?;
    let outcome = service.run_batch(batch)?;
    for command in &outcome.commands {
        println!("{command}");
    }
    info!(
        offers_used = outcome.summary.offers_used,
        offers_declined = outcome.summary.offers_declined,
        tasks_launched = outcome.summary.tasks_launched,
        pending_instances = outcome.pending_instances,
        tracked_tasks = outcome.tracked_tasks,
        "batch processed"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading config: {err:?}");
            return ExitCode::FAILURE;
        }
    };

    let tracing_provider = match setup_tracing(&config) {
        Ok(provider) => provider,
        Err(err) => {
            eprintln!("Error setting up tracing: {err:?}");
            return ExitCode::FAILURE;
        }
    };

    let root_span = info_span!(
        "offer-matcher",
        env = config.env,
        "offer-matcher-instance" = config.instance_id()
    );
    let _guard = root_span.enter();

    let meter_provider = match metrics::init_provider(
        config.telemetry.enable_metrics,
        config.telemetry.endpoint.as_ref(),
        config.telemetry.metrics_interval,
        &config.telemetry.service_name,
        &config.instance_id(),
        env!("CARGO_PKG_VERSION"),
    ) {
        Ok(provider) => provider,
        Err(err) => {
            error!("Error setting up metrics: {:?}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut exit_code = ExitCode::SUCCESS;
    match Service::new(config) {
        Ok(service) => {
            if let Err(err) = run(&service, &cli.batch) {
                error!("Error processing batch: {:?}", err);
                exit_code = ExitCode::FAILURE;
            }
        }
        Err(err) => {
            error!("Error creating service: {:?}", err);
            exit_code = ExitCode::FAILURE;
        }
    }

    // export metrics and traces before shutdown
    if let Some(meter_provider) = meter_provider {
        if let Err(err) = meter_provider.shutdown() {
            error!("Error shutting down meter provider: {:?}", err);
        }
    }
    if let Some(tracer_provider) = tracing_provider {
        if let Err(err) = tracer_provider.force_flush() {
            error!("Error flushing traces: {:?}", err);
        }
        if let Err(err) = tracer_provider.shutdown() {
            error!("Error shutting down tracer provider: {:?}", err);
        }
    }
    exit_code
}
