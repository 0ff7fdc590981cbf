//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Storage probe (probe.rs):
//!     Periodic timer
//!     → Bounded SELECT 1 against the shared pool
//!     → Consecutive failure count
//!     → TaskFatal at threshold (process restarts)
//!
//! Pool stats (stats.rs):
//!     Periodic timer → active/idle gauges
//! ```
//!
//! # Design Decisions
//! - Persistent storage unavailability is worse to wait out than to restart from
//! - A single success resets the failure count

pub mod probe;
pub mod stats;

pub use probe::{StorageProbe, STORAGE_PROBE_TASK};
pub use stats::{PoolStatsReporter, POOL_STATS_TASK};
