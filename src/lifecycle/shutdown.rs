//! Shutdown sequencing.
//!
//! # Phases
//! ```text
//! StopAccepting → CancelBackgroundTasks → GracePeriod → CloseSharedResource → Done
//! ```
//!
//! # Design Decisions
//! - Phases never overlap; each runs to completion or its own bound
//! - Errors are recorded per phase and never skip later phases
//! - The grace period is a fixed wait, not a per-task join

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::config::LifecycleConfig;
use crate::lifecycle::error::{LifecycleError, ShutdownError};
use crate::lifecycle::handle::ServiceHandle;
use crate::observability::metrics;

/// Headroom past the drain window before the sequencer stops waiting on a
/// listener that ignores its own deadline.
const DRAIN_SLACK: Duration = Duration::from_millis(250);

/// Ordered shutdown phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPhase {
    StopAccepting,
    CancelBackgroundTasks,
    GracePeriod,
    CloseSharedResource,
    Done,
}

impl ShutdownPhase {
    /// The phase that must follow this one.
    pub fn next(self) -> Option<ShutdownPhase> {
        match self {
            ShutdownPhase::StopAccepting => Some(ShutdownPhase::CancelBackgroundTasks),
            ShutdownPhase::CancelBackgroundTasks => Some(ShutdownPhase::GracePeriod),
            ShutdownPhase::GracePeriod => Some(ShutdownPhase::CloseSharedResource),
            ShutdownPhase::CloseSharedResource => Some(ShutdownPhase::Done),
            ShutdownPhase::Done => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownPhase::StopAccepting => "stop_accepting",
            ShutdownPhase::CancelBackgroundTasks => "cancel_background_tasks",
            ShutdownPhase::GracePeriod => "grace_period",
            ShutdownPhase::CloseSharedResource => "close_shared_resource",
            ShutdownPhase::Done => "done",
        }
    }
}

impl fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current shutdown phase, `None` while the service is running.
///
/// Transitions are strictly sequential: only the first phase may follow
/// `None` and each later phase only its predecessor.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    tx: Arc<watch::Sender<Option<ShutdownPhase>>>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Option<ShutdownPhase> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ShutdownPhase>> {
        self.tx.subscribe()
    }

    /// Move to `phase`. Returns false, leaving the state unchanged, if
    /// `phase` is not the direct successor of the current phase.
    pub fn advance(&self, phase: ShutdownPhase) -> bool {
        self.tx.send_if_modified(|current| {
            let allowed = match *current {
                None => phase == ShutdownPhase::StopAccepting,
                Some(prev) => prev.next() == Some(phase),
            };
            if allowed {
                *current = Some(phase);
            }
            allowed
        })
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the four shutdown phases against a [`ServiceHandle`].
#[derive(Debug, Clone)]
pub struct ShutdownSequencer {
    drain_timeout: Duration,
    grace_period: Duration,
}

impl ShutdownSequencer {
    pub fn new(drain_timeout: Duration, grace_period: Duration) -> Self {
        Self {
            drain_timeout,
            grace_period,
        }
    }

    pub fn from_config(config: &LifecycleConfig) -> Self {
        Self::new(config.drain_timeout(), config.grace_period())
    }

    /// Run the shutdown sequence.
    ///
    /// Must be called once per handle. A repeated call is reported and
    /// returns the first run's result without running any phase again.
    pub async fn execute(&self, handle: &ServiceHandle) -> Result<(), ShutdownError> {
        let mut ran = false;
        let result = handle
            .shutdown_result()
            .get_or_init(|| {
                ran = true;
                self.run(handle)
            })
            .await
            .clone();

        if !ran {
            tracing::warn!("Shutdown already executed for this service handle; returning recorded result");
        }
        result
    }

    async fn run(&self, handle: &ServiceHandle) -> Result<(), ShutdownError> {
        let started = Instant::now();
        let mut errors = Vec::new();
        tracing::info!(
            drain_timeout = ?self.drain_timeout,
            grace_period = ?self.grace_period,
            "Shutdown sequence starting"
        );

        // Phase 1: stop taking new work, drain what is in flight.
        let phase_start = self.enter(handle, ShutdownPhase::StopAccepting);
        let drained = tokio::time::timeout(
            self.drain_timeout + DRAIN_SLACK,
            handle.listener().shutdown(self.drain_timeout),
        )
        .await
        .unwrap_or_else(|_| {
            tracing::error!(drain_timeout = ?self.drain_timeout, "Listener ignored its drain deadline");
            Err(LifecycleError::DrainTimeoutExceeded {
                timeout: self.drain_timeout,
                abandoned: 0,
            })
        });
        if let Err(e) = drained {
            tracing::error!(error = %e, "Listener drain failed; abandoning remaining requests");
            errors.push((ShutdownPhase::StopAccepting, e));
        }
        self.leave(ShutdownPhase::StopAccepting, phase_start);

        // Phase 2: newest tasks first, then adapters in construction order.
        let phase_start = self.enter(handle, ShutdownPhase::CancelBackgroundTasks);
        handle.supervisor().cancel_all();
        for adapter in handle.adapters() {
            tracing::info!(adapter = adapter.name(), "Shutting down adapter");
            adapter.shutdown();
        }
        self.leave(ShutdownPhase::CancelBackgroundTasks, phase_start);

        // Phase 3: let loops observe cancellation.
        let phase_start = self.enter(handle, ShutdownPhase::GracePeriod);
        tokio::time::sleep(self.grace_period).await;
        let stragglers = handle.supervisor().running();
        if stragglers > 0 {
            tracing::warn!(stragglers, "Background tasks still running after grace period");
        }
        self.leave(ShutdownPhase::GracePeriod, phase_start);

        // Phase 4: nothing may touch storage after this.
        let phase_start = self.enter(handle, ShutdownPhase::CloseSharedResource);
        if let Err(e) = handle.storage().close().await {
            errors.push((ShutdownPhase::CloseSharedResource, e));
        }
        self.leave(ShutdownPhase::CloseSharedResource, phase_start);

        handle.phase().advance(ShutdownPhase::Done);

        if errors.is_empty() {
            tracing::info!(elapsed = ?started.elapsed(), "Shutdown complete");
            Ok(())
        } else {
            tracing::warn!(
                elapsed = ?started.elapsed(),
                errors = errors.len(),
                "Shutdown complete with errors"
            );
            Err(ShutdownError { errors })
        }
    }

    fn enter(&self, handle: &ServiceHandle, phase: ShutdownPhase) -> Instant {
        if !handle.phase().advance(phase) {
            tracing::error!(phase = %phase, current = ?handle.phase().current(), "Out-of-order shutdown phase");
        }
        tracing::info!(phase = %phase, "Entering shutdown phase");
        Instant::now()
    }

    fn leave(&self, phase: ShutdownPhase, started: Instant) {
        let elapsed = started.elapsed();
        metrics::record_shutdown_phase(phase, elapsed);
        tracing::debug!(phase = %phase, elapsed = ?elapsed, "Shutdown phase finished");
    }
}
