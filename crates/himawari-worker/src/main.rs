//! Transcoding worker binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use himawari_worker::{metrics, spawn_signal_handler, TaskPipeline, WorkerConfig, WorkerPool};

/// Pull tasks from a coordinator, run them through ffmpeg and upload the
/// results.
#[derive(Debug, Parser)]
#[command(name = "himawari-worker", version, about)]
struct Cli {
    /// Coordinator host[:port] (overrides HIMAWARI_COORDINATOR)
    coordinator: Option<String>,

    /// Directory for output artifacts (overrides WORKER_WORK_DIR)
    work_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();

    info!("Starting himawari-worker");

    let config = WorkerConfig::from_env().with_cli(cli.coordinator, cli.work_dir);
    if let Err(e) = config.validate() {
        error!("{}", e);
        std::process::exit(1);
    }
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        if let Err(e) = metrics::init_metrics(addr) {
            error!("{}", e);
            std::process::exit(1);
        }
    }

    let pipeline = match TaskPipeline::from_config(&config).await {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("Failed to set up task pipeline: {}", e);
            std::process::exit(1);
        }
    };

    let pool = WorkerPool::new(&config, Arc::new(pipeline.client().clone()), pipeline);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let summary = pool.run(cancel).await;

    info!(
        acquired = summary.acquired,
        no_work = summary.no_work,
        protocol_violations = summary.protocol_violations,
        transport_errors = summary.transport_errors,
        abandoned = summary.abandoned,
        "Worker pool stopped"
    );
    if summary.abandoned > 0 {
        warn!(
            "{} task(s) were still running at exit; their artifacts may remain in {}",
            summary.abandoned,
            config.work_dir.display()
        );
    }

    info!("Worker shutdown complete");
}

/// Coloured output for dev, JSON for production (`LOG_FORMAT=json`).
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    // Matches every himawari_* crate target
    let mut env_filter = EnvFilter::from_default_env();
    match "himawari=info".parse() {
        Ok(directive) => env_filter = env_filter.add_directive(directive),
        Err(e) => eprintln!("invalid log directive: {e}"),
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}
