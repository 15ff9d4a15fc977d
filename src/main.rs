//! recon-worker
//!
//! One worker process per external reconnaissance tool. The supervisor
//! forks this binary with the worker kind as a subcommand, sends
//! requests over stdin, and reads responses from stdout. Configuration
//! arrives via the `RECON_WORKER_CONFIG` env var.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recon_worker::config::Config;
use recon_worker::runtime;
use recon_worker::workers::{
    CloudWorker, CrawlerWorker, DedupeWorker, PortScanWorker, ProbeWorker, ScreenshotWorker,
};

#[derive(Parser, Debug)]
#[command(name = "recon-worker")]
#[command(about = "Supervised worker processes wrapping external reconnaissance tools")]
struct Args {
    #[command(subcommand)]
    worker: WorkerKind,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum WorkerKind {
    /// Port scanner (one request per process)
    Portscan,
    /// HTTP/HTTPS prober
    Probe,
    /// Web crawler
    Crawler,
    /// Screenshot tool
    Screenshot,
    /// Cloud-resource exporter
    Cloud,
    /// URL de-duplicator
    Dedupe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr so stdout is free for the worker protocol)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let code = match args.worker {
        WorkerKind::Portscan => runtime::run(PortScanWorker, config).await?,
        WorkerKind::Probe => runtime::run(ProbeWorker, config).await?,
        WorkerKind::Crawler => runtime::run(CrawlerWorker, config).await?,
        WorkerKind::Screenshot => runtime::run(ScreenshotWorker, config).await?,
        WorkerKind::Cloud => runtime::run(CloudWorker, config).await?,
        WorkerKind::Dedupe => runtime::run(DedupeWorker, config).await?,
    };

    std::process::exit(code);
}
