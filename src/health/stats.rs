//! Periodic pool statistics publishing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::lifecycle::{JobError, PeriodicJob, TaskContext};
use crate::observability::metrics;
use crate::storage::ResourceGuard;

pub const POOL_STATS_TASK: &str = "storage-pool-stats";

pub struct PoolStatsReporter {
    storage: Arc<ResourceGuard>,
    interval: Duration,
}

impl PoolStatsReporter {
    pub fn new(storage: Arc<ResourceGuard>, interval: Duration) -> Self {
        Self { storage, interval }
    }
}

#[async_trait]
impl PeriodicJob for PoolStatsReporter {
    fn name(&self) -> &str {
        POOL_STATS_TASK
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_once(&mut self, _ctx: &TaskContext) -> Result<(), JobError> {
        let stats = self.storage.acquire()?.stats();
        metrics::record_pool_stats(stats);
        tracing::trace!(active = stats.active, idle = stats.idle, "Storage pool stats");
        Ok(())
    }
}
