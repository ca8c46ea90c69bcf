//! Keel Runner
//!
//! Runs one compiled pipeline on a container backend.
//!
//! Architecture:
//! - Configuration: command line flags, with environment fallbacks
//! - Services: pipeline loading and the stage/step driver
//! - Backend: an engine selected by name or auto-detected on this host
//!
//! Steps run strictly in file order. Step output is copied to stdout, each
//! line prefixed with the step name; the process exits non-zero when any
//! step fails. SIGINT or SIGTERM kills the running step and tears the run
//! down before exiting.

mod config;
mod service;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::service::{PipelineService, load_pipeline};

#[derive(Parser)]
#[command(name = "keel-runner")]
#[command(about = "Run a compiled pipeline on a container backend", long_about = None)]
struct Cli {
    /// Backend engine ("auto" picks the first available one)
    #[arg(long, env = "KEEL_BACKEND", default_value = keel_backend::AUTO_DETECT)]
    backend: String,

    /// Podman API socket
    #[arg(long, env = "KEEL_PODMAN_SOCKET")]
    socket: Option<PathBuf>,

    /// Compiled pipeline file (JSON)
    pipeline: PathBuf,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keel_runner=info,keel_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::new(cli.pipeline)
        .with_backend(cli.backend)
        .with_socket(cli.socket);
    config.validate()?;

    info!(
        "Starting Keel Runner: backend={}, pipeline={}",
        config.backend,
        config.pipeline.display()
    );

    let pipeline = load_pipeline(&config.pipeline).await?;

    let mut engine = keel_backend::select_engine(&config.backend, &config.podman)
        .context("Failed to select backend")?;
    engine
        .load()
        .await
        .with_context(|| format!("Failed to load {} backend", engine.name()))?;

    info!("Backend {} loaded", engine.name());

    let mut service = PipelineService::new(engine.as_ref(), tokio::io::stdout());
    let result = service.run_until(&pipeline, shutdown_signal()).await;

    if result.success {
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(step) = &result.failed_step {
        error!("Step '{}' failed", step);
    }

    // Exit statuses are a single byte; anything out of range reads as failure.
    let code = u8::try_from(result.exit_code)
        .ok()
        .filter(|code| *code != 0)
        .unwrap_or(1);
    Ok(ExitCode::from(code))
}

/// Completes on SIGINT, or on SIGTERM where available
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, cancelling pipeline"),
        _ = terminate => info!("Received SIGTERM, cancelling pipeline"),
    }
}
