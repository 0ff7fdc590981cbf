//! Active storage health probing.
//!
//! # Responsibilities
//! - Periodically run a bounded round-trip against the shared pool
//! - Count consecutive failures; the supervisor escalates at the threshold

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::HealthConfig;
use crate::lifecycle::{JobError, PeriodicJob, TaskContext};
use crate::observability::metrics;
use crate::storage::ResourceGuard;

pub const STORAGE_PROBE_TASK: &str = "storage-health-probe";

pub struct StorageProbe {
    storage: Arc<ResourceGuard>,
    interval: Duration,
    timeout: Duration,
    failure_threshold: u32,
}

impl StorageProbe {
    pub fn new(storage: Arc<ResourceGuard>, config: &HealthConfig) -> Self {
        Self {
            storage,
            interval: config.interval(),
            timeout: config.timeout(),
            failure_threshold: config.failure_threshold.max(1),
        }
    }
}

#[async_trait]
impl PeriodicJob for StorageProbe {
    fn name(&self) -> &str {
        STORAGE_PROBE_TASK
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn failure_threshold(&self) -> Option<u32> {
        Some(self.failure_threshold)
    }

    async fn run_once(&mut self, ctx: &TaskContext) -> Result<(), JobError> {
        let storage = self.storage.acquire()?;
        let result = ctx
            .bounded(self.timeout, storage.probe())
            .await
            .and_then(|probe| probe.map_err(JobError::from));

        match &result {
            Ok(()) => metrics::record_probe(true),
            Err(JobError::Cancelled) => {}
            Err(e) => {
                metrics::record_probe(false);
                tracing::warn!(error = %e, "Storage health probe failed");
            }
        }
        result
    }
}
