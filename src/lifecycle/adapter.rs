//! Narrow contracts the shutdown sequencer drives.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// An optional subsystem with its own stop hook.
///
/// `shutdown` must be safe to call on an adapter that never started,
/// and safe to call more than once.
pub trait Adapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn shutdown(&self);
}

/// The inbound request listener.
#[async_trait]
pub trait InboundListener: Send + Sync {
    /// Address actually bound, when there is one.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Stop accepting new work and wait up to `drain` for in-flight work.
    async fn shutdown(&self, drain: Duration) -> Result<(), LifecycleError>;
}
