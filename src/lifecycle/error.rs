//! Lifecycle error taxonomy.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::lifecycle::shutdown::ShutdownPhase;

/// Errors produced while starting or stopping the service.
///
/// `Clone` so a recorded shutdown result can be handed out again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// A dependency the service cannot run without failed its startup check.
    #[error("mandatory integration '{integration}' unavailable: {reason}")]
    MandatoryIntegrationUnavailable {
        integration: &'static str,
        reason: String,
    },

    /// An optional dependency is absent or unreachable. Recorded, never fatal.
    #[error("optional integration '{integration}' degraded: {reason}")]
    OptionalIntegrationDegraded {
        integration: &'static str,
        reason: String,
    },

    /// The inbound listener could not start serving.
    #[error("listener failed to bind {address}: {reason}")]
    ListenerBindFailure { address: String, reason: String },

    /// In-flight requests were still running when the drain window closed.
    #[error("listener did not drain within {timeout:?} ({abandoned} requests abandoned)")]
    DrainTimeoutExceeded { timeout: Duration, abandoned: u64 },

    /// A background task exhausted its failure budget.
    #[error("background task '{task}' failed {failures} consecutive times: {reason}")]
    BackgroundTaskFatal {
        task: String,
        failures: u32,
        reason: String,
    },

    /// Closing the shared storage pool failed.
    #[error("failed to close shared resource: {0}")]
    ResourceCloseError(String),
}

/// Fatal condition raised by a background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFatal {
    pub task: String,
    pub failures: u32,
    pub reason: String,
}

impl From<TaskFatal> for LifecycleError {
    fn from(fatal: TaskFatal) -> Self {
        LifecycleError::BackgroundTaskFatal {
            task: fatal.task,
            failures: fatal.failures,
            reason: fatal.reason,
        }
    }
}

impl fmt::Display for TaskFatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task '{}' failed {} consecutive times: {}",
            self.task, self.failures, self.reason
        )
    }
}

/// Errors recorded across a shutdown run, one entry per failing phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shutdown completed with {} error(s): {}", .errors.len(), describe(.errors))]
pub struct ShutdownError {
    pub errors: Vec<(ShutdownPhase, LifecycleError)>,
}

impl ShutdownError {
    /// Error recorded for a given phase, if any.
    pub fn for_phase(&self, phase: ShutdownPhase) -> Option<&LifecycleError> {
        self.errors
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, e)| e)
    }
}

fn describe(errors: &[(ShutdownPhase, LifecycleError)]) -> String {
    errors
        .iter()
        .map(|(phase, e)| format!("[{}] {}", phase, e))
        .collect::<Vec<_>>()
        .join("; ")
}
