//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → admission gate (reject once draining)
//!     → rate_limit.rs (check per-IP limits)
//!     → handlers
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Bucket cleanup runs as a stoppable adapter loop

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimiter};
