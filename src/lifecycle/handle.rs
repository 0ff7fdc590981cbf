//! The aggregate produced by a successful startup.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::lifecycle::adapter::{Adapter, InboundListener};
use crate::lifecycle::error::{LifecycleError, ShutdownError};
use crate::lifecycle::shutdown::PhaseTracker;
use crate::lifecycle::supervisor::TaskSupervisor;
use crate::storage::ResourceGuard;

/// Everything shutdown needs: task tokens, adapters, listener and storage.
///
/// Built once per process run and passed by reference; not `Clone`.
pub struct ServiceHandle {
    storage: Arc<ResourceGuard>,
    supervisor: Arc<TaskSupervisor>,
    listener: Box<dyn InboundListener>,
    adapters: Vec<Arc<dyn Adapter>>,
    phase: PhaseTracker,
    degraded: Vec<LifecycleError>,
    shutdown_result: OnceCell<Result<(), ShutdownError>>,
}

impl ServiceHandle {
    pub fn new(
        storage: Arc<ResourceGuard>,
        supervisor: Arc<TaskSupervisor>,
        listener: Box<dyn InboundListener>,
    ) -> Self {
        Self {
            storage,
            supervisor,
            listener,
            adapters: Vec::new(),
            phase: PhaseTracker::new(),
            degraded: Vec::new(),
            shutdown_result: OnceCell::new(),
        }
    }

    /// Append an adapter. Adapters are shut down in the order added.
    pub fn with_adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_adapters(mut self, adapters: impl IntoIterator<Item = Arc<dyn Adapter>>) -> Self {
        self.adapters.extend(adapters);
        self
    }

    /// Share a phase tracker that was handed out before the handle existed.
    pub fn with_phase(mut self, phase: PhaseTracker) -> Self {
        self.phase = phase;
        self
    }

    /// Record optional integrations running in degraded mode.
    pub fn with_degraded(mut self, degraded: Vec<LifecycleError>) -> Self {
        self.degraded = degraded;
        self
    }

    pub fn storage(&self) -> &Arc<ResourceGuard> {
        &self.storage
    }

    pub fn supervisor(&self) -> &Arc<TaskSupervisor> {
        &self.supervisor
    }

    pub fn listener(&self) -> &dyn InboundListener {
        self.listener.as_ref()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn adapters(&self) -> &[Arc<dyn Adapter>] {
        &self.adapters
    }

    pub fn phase(&self) -> &PhaseTracker {
        &self.phase
    }

    pub fn degraded(&self) -> &[LifecycleError] {
        &self.degraded
    }

    pub(crate) fn shutdown_result(&self) -> &OnceCell<Result<(), ShutdownError>> {
        &self.shutdown_result
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("storage", &self.storage)
            .field("supervisor", &self.supervisor)
            .field("adapters", &self.adapters.iter().map(|a| a.name()).collect::<Vec<_>>())
            .field("phase", &self.phase.current())
            .field("degraded", &self.degraded.len())
            .finish()
    }
}
