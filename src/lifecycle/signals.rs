//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT)
//! - Translate the first signal into a termination trigger
//! - Race that trigger against a fatal background-task condition
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A failed SIGTERM registration degrades to Ctrl+C only

use std::fmt;
use std::future::Future;

use crate::lifecycle::error::TaskFatal;
use crate::lifecycle::supervisor::TaskSupervisor;

/// The signal that asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Interrupt,
    Terminate,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Interrupt => f.write_str("SIGINT"),
            Termination::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// What ended the running state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Graceful: run the shutdown sequence.
    Signal(Termination),
    /// Non-graceful: exit without sequencing.
    Fatal(TaskFatal),
}

/// Run until either `signal` resolves or a background task raises a fatal
/// condition. A fatal already raised wins over a signal.
pub async fn run_until_terminated<S>(supervisor: &TaskSupervisor, signal: S) -> Trigger
where
    S: Future<Output = Termination>,
{
    tokio::select! {
        biased;
        fatal = supervisor.fatal() => Trigger::Fatal(fatal),
        signal = signal => Trigger::Signal(signal),
    }
}

/// Wait for the first termination signal.
pub async fn termination_signal() -> Termination {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => Termination::Interrupt,
                    _ = sigterm.recv() => Termination::Terminate,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler, listening for SIGINT only");
                wait_ctrl_c().await
            }
        }
    }
    #[cfg(not(unix))]
    {
        wait_ctrl_c().await
    }
}

async fn wait_ctrl_c() -> Termination {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C; waiting forever");
        std::future::pending::<()>().await;
    }
    Termination::Interrupt
}
