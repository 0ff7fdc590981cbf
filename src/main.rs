//! Booking server (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     entry point
//!         │ open storage pool ──────────────▶ ResourceGuard
//!         ▼
//!     initialize()
//!         │ 1 data access   → storage probe task
//!         │ 2 validation    → rate limiter (+ cleanup adapter)
//!         │ 3 domain        → payments handshake (mandatory)
//!         │                   messaging (optional, may degrade)
//!         │ 4 handlers      → axum Router
//!         │ 5 tasks         → pool stats task
//!         │ 6 listener      → HttpListener
//!         ▼
//!     ServiceHandle ──── SIGTERM/SIGINT ──▶ ShutdownSequencer
//!         │                                  1 stop accepting (drain)
//!         │                                  2 cancel tasks, then adapters
//!         │                                  3 grace period
//!         │                                  4 close storage
//!         └── TaskFatal ──▶ immediate exit
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use booking_server::config::{load_config, loader::parse_config};
use booking_server::lifecycle::{
    initialize, run_until_terminated, termination_signal, ShutdownSequencer, Trigger,
};
use booking_server::observability::{logging, metrics};
use booking_server::storage::{PgStore, ResourceGuard};

#[derive(Parser)]
#[command(name = "booking-server", version, about = "Booking service backend")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => parse_config("")?,
    };

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "booking-server starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = PgStore::open(&config.storage).await?;
    let storage = Arc::new(ResourceGuard::new(Arc::new(store)));

    let handle = match initialize(&config, storage.clone()).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(
                error = %e.error,
                cancelled = e.cancelled.len(),
                "Initialization failed"
            );
            let exited = tokio::time::timeout(config.lifecycle.grace_period(), async {
                for task in &e.cancelled {
                    task.finished().await;
                }
            })
            .await;
            if exited.is_err() {
                tracing::warn!("Cancelled tasks still running after grace period");
            }
            if let Err(close) = storage.close().await {
                tracing::error!(error = %close, "Failed to close storage after initialization failure");
            }
            std::process::exit(1);
        }
    };

    tracing::info!(
        address = ?handle.local_addr(),
        degraded = handle.degraded().len(),
        "booking-server ready"
    );

    let sequencer = ShutdownSequencer::from_config(&config.lifecycle);

    match run_until_terminated(handle.supervisor(), termination_signal()).await {
        Trigger::Signal(signal) => {
            tracing::info!(signal = %signal, "Termination signal received, shutting down");
            sequencer.execute(&handle).await?;
        }
        Trigger::Fatal(fatal) => {
            tracing::error!(
                task = %fatal.task,
                failures = fatal.failures,
                reason = %fatal.reason,
                "Background task fatal, terminating without graceful shutdown"
            );
            std::process::exit(1);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
