//! Shared storage subsystem.
//!
//! # Data Flow
//! ```text
//! Entry point:
//!     PgStore::open(config) → Arc<dyn SharedResource>
//!     → ResourceGuard (exactly-once close, closed flag)
//!     → shared by health probes, handlers and the shutdown sequencer
//! ```
//!
//! # Design Decisions
//! - The pool handles its own concurrency; only its lifecycle is guarded here
//! - Post-close calls fail with `StorageError::Closed`, never panic
//! - The entry point owns closing until a `ServiceHandle` exists

pub mod guard;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use guard::ResourceGuard;
pub use postgres::PgStore;

/// Errors from the shared storage pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The pool has been closed.
    #[error("storage pool is closed")]
    Closed,

    /// Timed out waiting for a connection.
    #[error("storage operation timed out")]
    Timeout,

    /// Could not establish a connection.
    #[error("storage connection failed: {0}")]
    Connect(String),

    /// A statement failed.
    #[error("storage query failed: {0}")]
    Query(String),
}

/// Connection counts reported by the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub active: u32,
    pub idle: u32,
}

/// Contract for the pooled storage handle shared by the whole process.
#[async_trait]
pub trait SharedResource: Send + Sync + 'static {
    /// Run a cheap round-trip against storage.
    async fn probe(&self) -> Result<(), StorageError>;

    /// Current pool occupancy.
    fn stats(&self) -> PoolStats;

    /// Close the pool. Calls made afterwards return `StorageError::Closed`.
    async fn close(&self) -> Result<(), StorageError>;
}
