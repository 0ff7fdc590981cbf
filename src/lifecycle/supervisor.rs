//! Background task supervision.
//!
//! # Responsibilities
//! - Register and spawn background loops, each with its own cancellation token
//! - Track registration order so cancellation can run newest-first
//! - Expose a per-task completion signal
//! - Carry the single escalation path: `TaskFatal`
//!
//! # Design Decisions
//! - Cancellation is cooperative; loops check their token before every unit of work
//! - Bounded sub-operations race their token, so cancellation cuts deadlines short
//! - `cancel_all` only signals; waiting for exit belongs to the shutdown grace period

use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::lifecycle::error::TaskFatal;
use crate::observability::metrics;
use crate::storage::StorageError;

/// Errors a unit of background work can end with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The owning task was cancelled mid-operation.
    #[error("cancelled")]
    Cancelled,

    /// A bounded sub-operation ran past its deadline.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The work itself failed.
    #[error("{0}")]
    Failed(String),
}

impl From<StorageError> for JobError {
    fn from(e: StorageError) -> Self {
        JobError::Failed(e.to_string())
    }
}

/// Identifier assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskId(u64);

/// Handle to a registered background task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    name: Arc<str>,
    token: CancellationToken,
    done: watch::Receiver<bool>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the task to stop at its next check.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the task's loop has returned.
    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait until the task's loop has returned.
    pub async fn finished(&self) {
        let mut done = self.done.clone();
        // The sender is dropped on exit, after marking done.
        let _ = done.wait_for(|finished| *finished).await;
    }
}

/// Snapshot of a task for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub id: TaskId,
    pub name: String,
    pub cancelled: bool,
    pub finished: bool,
}

/// What a registered loop receives: its name, token and the fatal channel.
#[derive(Clone)]
pub struct TaskContext {
    name: Arc<str>,
    token: CancellationToken,
    fatal: Arc<watch::Sender<Option<TaskFatal>>>,
}

impl TaskContext {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the task is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Token for sub-operations that should stop with this task.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Run `fut` with a deadline that is also cut short by cancellation.
    pub async fn bounded<F, T>(&self, limit: Duration, fut: F) -> Result<T, JobError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(JobError::Cancelled),
            res = time::timeout(limit, fut) => res.map_err(|_| JobError::TimedOut(limit)),
        }
    }

    /// Request non-graceful process termination. The first report wins.
    pub fn raise_fatal(&self, failures: u32, reason: impl Into<String>) {
        let fatal = TaskFatal {
            task: self.name.to_string(),
            failures,
            reason: reason.into(),
        };
        tracing::error!(task = %self.name, failures, reason = %fatal.reason, "Background task raised fatal condition");
        self.fatal.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(fatal);
                true
            } else {
                false
            }
        });
    }
}

/// A unit of periodic background work.
#[async_trait]
pub trait PeriodicJob: Send + 'static {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    /// Consecutive failures that raise `TaskFatal`. `None` disables counting.
    fn failure_threshold(&self) -> Option<u32> {
        None
    }

    /// Perform one unit of work. Only called when the task is not cancelled.
    async fn run_once(&mut self, ctx: &TaskContext) -> Result<(), JobError>;
}

struct TaskEntry {
    handle: TaskHandle,
}

/// Marks a task finished when its future completes or unwinds.
struct DoneGuard {
    done: watch::Sender<bool>,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.done.send_replace(true);
        metrics::record_task_exited();
    }
}

/// Registry of background tasks.
pub struct TaskSupervisor {
    tasks: Mutex<Vec<TaskEntry>>,
    next_id: AtomicU64,
    fatal: Arc<watch::Sender<Option<TaskFatal>>>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        let (fatal, _) = watch::channel(None);
        Self {
            tasks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fatal: Arc::new(fatal),
        }
    }

    /// Register a loop and start it immediately.
    pub fn register<F, Fut>(&self, name: impl Into<Arc<str>>, loop_fn: F) -> TaskHandle
    where
        F: FnOnce(TaskContext) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        let handle = TaskHandle {
            id,
            name: name.clone(),
            token: token.clone(),
            done: done_rx,
        };

        let ctx = TaskContext {
            name: name.clone(),
            token,
            fatal: self.fatal.clone(),
        };
        let fut = loop_fn(ctx);

        self.lock_tasks().push(TaskEntry {
            handle: handle.clone(),
        });

        metrics::record_task_started();
        tracing::debug!(task = %name, id = id.0, "Background task registered");

        tokio::spawn(async move {
            let _done = DoneGuard { done: done_tx };
            fut.await;
            tracing::debug!(task = %name, "Background task exited");
        });

        handle
    }

    /// Register a [`PeriodicJob`] driven by the standard tick/cancel loop.
    pub fn spawn_periodic<J: PeriodicJob>(&self, job: J) -> TaskHandle {
        let name: Arc<str> = Arc::from(job.name());
        self.register(name, move |ctx| run_periodic(job, ctx))
    }

    /// Signal one task.
    pub fn cancel(&self, handle: &TaskHandle) {
        tracing::debug!(task = %handle.name, "Cancelling background task");
        handle.cancel();
    }

    /// Signal every registered task, newest first.
    ///
    /// Returns the handles in the order they were signalled. Does not wait
    /// for the loops to exit.
    pub fn cancel_all(&self) -> Vec<TaskHandle> {
        let tasks = self.lock_tasks();
        let signalled: Vec<TaskHandle> = tasks
            .iter()
            .rev()
            .map(|entry| {
                entry.handle.cancel();
                entry.handle.clone()
            })
            .collect();
        tracing::info!(count = signalled.len(), "Cancellation broadcast to background tasks");
        signalled
    }

    /// Handles in registration order.
    pub fn tasks(&self) -> Vec<TaskHandle> {
        self.lock_tasks().iter().map(|e| e.handle.clone()).collect()
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.lock_tasks()
            .iter()
            .map(|e| TaskStatus {
                id: e.handle.id,
                name: e.handle.name.to_string(),
                cancelled: e.handle.is_cancelled(),
                finished: e.handle.is_finished(),
            })
            .collect()
    }

    /// Number of tasks whose loops have not returned yet.
    pub fn running(&self) -> usize {
        self.lock_tasks()
            .iter()
            .filter(|e| !e.handle.is_finished())
            .count()
    }

    /// Resolves with the first fatal condition raised by any task.
    pub async fn fatal(&self) -> TaskFatal {
        let mut rx = self.fatal.subscribe();
        loop {
            if let Some(fatal) = rx.borrow_and_update().clone() {
                return fatal;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// The fatal condition, if one has been raised.
    pub fn fatal_raised(&self) -> Option<TaskFatal> {
        self.fatal.borrow().clone()
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<TaskEntry>> {
        // A panic while holding the lock leaves the Vec intact.
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSupervisor")
            .field("tasks", &self.lock_tasks().len())
            .field("running", &self.running())
            .finish()
    }
}

async fn run_periodic<J: PeriodicJob>(mut job: J, ctx: TaskContext) {
    let mut ticker = time::interval(job.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let threshold = job.failure_threshold();
    let mut failures: u32 = 0;

    tracing::info!(task = %ctx.name, interval = ?job.interval(), "Periodic task starting");

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // Check-then-act: never start work once cancelled.
        if ctx.is_cancelled() {
            break;
        }

        match job.run_once(&ctx).await {
            Ok(()) => failures = 0,
            Err(JobError::Cancelled) => break,
            Err(e) => {
                metrics::record_task_failure(ctx.name());
                let Some(threshold) = threshold else {
                    tracing::warn!(task = %ctx.name, error = %e, "Periodic task iteration failed");
                    continue;
                };
                failures += 1;
                tracing::warn!(
                    task = %ctx.name,
                    error = %e,
                    failures,
                    threshold,
                    "Periodic task iteration failed"
                );
                if failures >= threshold {
                    ctx.raise_fatal(failures, e.to_string());
                    break;
                }
            }
        }
    }

    tracing::info!(task = %ctx.name, "Periodic task stopped");
}
