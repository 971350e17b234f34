//! Courier - one-shot remote conversion from the command line
//!
//! Resolves the worker pool from configuration or Consul, routes the given
//! file to the best worker and prints the path of the converted file.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courier::{
    config::Args,
    directory::{ConsulBackend, WorkerDirectory},
    format, Router,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("courier={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // A half-registered format would corrupt the wire protocol; refuse to
    // start instead.
    format::verify_catalog()?;

    info!("======================================");
    info!("  Courier - remote conversion");
    info!("======================================");
    info!(
        "Version: {} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_SHORT"),
        env!("BUILD_TIMESTAMP")
    );
    if args.use_discovery() {
        info!(
            "Workers: discovered via Consul at {} (service: {}, refresh every {:?})",
            args.consul_address.as_deref().unwrap_or_default(),
            args.consul_service.as_deref().unwrap_or_default(),
            args.refresh_interval()
        );
    } else {
        let workers = args.static_workers().map_err(anyhow::Error::from)?;
        info!("Workers: {} statically configured", workers.len());
        for worker in &workers {
            info!(
                "  {} ({})",
                worker.endpoint,
                if worker.supports_ocr { "ocr" } else { "general" }
            );
        }
    }
    info!("======================================");

    let timeouts = args.timeouts();
    let directory = if args.use_discovery() {
        let backend = ConsulBackend::new(
            args.consul_address.as_deref().unwrap_or_default(),
            args.consul_service.as_deref().unwrap_or_default(),
        )?;
        Arc::new(WorkerDirectory::with_discovery(
            Arc::new(backend),
            args.refresh_interval(),
            timeouts,
        ))
    } else {
        Arc::new(WorkerDirectory::fixed(args.static_workers()?, timeouts))
    };

    let router = Router::new(directory, timeouts.probe);
    let output = router.convert(&args.file, args.output_format()?).await?;

    info!("converted file written to {}", output.display());
    println!("{}", output.display());
    Ok(())
}
