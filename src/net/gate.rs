//! Request admission and in-flight tracking.
//!
//! # Responsibilities
//! - Decide whether a new request may start (Accepting → Draining)
//! - Count requests in flight so a drain timeout can report what it abandoned
//!
//! # Design Decisions
//! - One-way switch: a closed gate never reopens
//! - RAII guard keeps the count right even if a handler panics

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct GateState {
    accepting: AtomicBool,
    in_flight: AtomicU64,
}

/// Shared admission switch for the inbound listener.
#[derive(Debug, Clone)]
pub struct AcceptGate {
    state: Arc<GateState>,
}

impl AcceptGate {
    pub fn new() -> Self {
        Self {
            state: Arc::new(GateState {
                accepting: AtomicBool::new(true),
                in_flight: AtomicU64::new(0),
            }),
        }
    }

    /// Admit a request, or `None` once draining has begun.
    pub fn enter(&self) -> Option<InFlight> {
        self.state.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight {
            state: self.state.clone(),
        };
        if self.state.accepting.load(Ordering::SeqCst) {
            Some(guard)
        } else {
            None
        }
    }

    /// Stop admitting requests. Returns true on the first call.
    pub fn close(&self) -> bool {
        self.state.accepting.swap(false, Ordering::SeqCst)
    }

    pub fn is_accepting(&self) -> bool {
        self.state.accepting.load(Ordering::SeqCst)
    }

    /// Requests admitted and not yet finished.
    pub fn in_flight(&self) -> u64 {
        self.state.in_flight.load(Ordering::SeqCst)
    }
}

impl Default for AcceptGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the lifetime of an admitted request.
#[derive(Debug)]
pub struct InFlight {
    state: Arc<GateState>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
