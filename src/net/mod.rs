//! Network layer.
//!
//! # Data Flow
//! ```text
//! TcpListener (bound inside the serve task)
//!     → listener.rs (startup window, graceful stop, bounded drain)
//!     → gate.rs (admission switch + in-flight count)
//!     → axum Router
//! ```
//!
//! # Design Decisions
//! - Bind errors surface within a bounded window, never later
//! - Draining closes the gate first so late requests get a defined 503

pub mod gate;
pub mod listener;

pub use gate::{AcceptGate, InFlight};
pub use listener::HttpListener;
