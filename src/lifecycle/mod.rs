//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Opened storage → data access → validation → domain services
//!     → handlers → background tasks → listener → ServiceHandle
//!
//! Runtime (supervisor.rs):
//!     Periodic tasks, each with its own token; TaskFatal on a blown budget
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Cancel tasks, then adapters
//!     → Grace period → Close storage
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     TaskFatal      → Trigger immediate exit
//! ```
//!
//! # Design Decisions
//! - One explicitly built ServiceHandle, no global state
//! - Startup returns errors; only the binary decides to exit
//! - Shutdown is best-effort: a failing phase never skips the next one

pub mod adapter;
pub mod error;
pub mod handle;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod supervisor;

pub use adapter::{Adapter, InboundListener};
pub use error::{LifecycleError, ShutdownError, TaskFatal};
pub use handle::ServiceHandle;
pub use shutdown::{PhaseTracker, ShutdownPhase, ShutdownSequencer};
pub use signals::{run_until_terminated, termination_signal, Termination, Trigger};
pub use startup::{initialize, StartupError};
pub use supervisor::{
    JobError, PeriodicJob, TaskContext, TaskHandle, TaskId, TaskStatus, TaskSupervisor,
};
