//! Resilience subsystem.
//!
//! # Design Decisions
//! - Retries are for best-effort side tasks only, never for startup checks
//! - Every retry loop has a fixed attempt budget
//! - Jittered backoff prevents thundering herd

pub mod backoff;

pub use backoff::RetryPolicy;
