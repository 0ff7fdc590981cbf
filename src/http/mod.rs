//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! HttpListener (net)
//!     → request ID + tracing + timeout layers
//!     → middleware/admission.rs (503 once draining)
//!     → security::rate_limit (429 per client)
//!     → handlers.rs / admin
//! ```

pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::{build_router, AppState};
