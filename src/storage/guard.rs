//! Exactly-once close guard for the shared storage pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::lifecycle::LifecycleError;
use crate::storage::{PoolStats, SharedResource, StorageError};

/// Wraps the shared resource with a monotonic Open → Closed flag.
///
/// Handles returned by [`acquire`](Self::acquire) before [`close`](Self::close)
/// stay usable for work already in flight; new acquisitions after close fail.
pub struct ResourceGuard {
    resource: Arc<dyn SharedResource>,
    closed: AtomicBool,
    close_result: OnceCell<Result<(), LifecycleError>>,
}

impl ResourceGuard {
    pub fn new(resource: Arc<dyn SharedResource>) -> Self {
        Self {
            resource,
            closed: AtomicBool::new(false),
            close_result: OnceCell::new(),
        }
    }

    /// Get a handle to the resource for a new operation.
    pub fn acquire(&self) -> Result<Arc<dyn SharedResource>, StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(self.resource.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Pool statistics, or zeroes once closed.
    pub fn stats(&self) -> PoolStats {
        match self.acquire() {
            Ok(resource) => resource.stats(),
            Err(_) => PoolStats::default(),
        }
    }

    /// Close the resource.
    ///
    /// The first call closes; every later or concurrent call waits for and
    /// returns that same result without touching the resource again.
    pub async fn close(&self) -> Result<(), LifecycleError> {
        self.close_result
            .get_or_init(|| async {
                self.closed.store(true, Ordering::Release);
                tracing::info!("Closing shared storage pool");
                match self.resource.close().await {
                    Ok(()) => {
                        tracing::info!("Shared storage pool closed");
                        Ok(())
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to close shared storage pool");
                        Err(LifecycleError::ResourceCloseError(e.to_string()))
                    }
                }
            })
            .await
            .clone()
    }
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct CountingResource {
        closes: AtomicU32,
        fail_close: bool,
    }

    #[async_trait]
    impl SharedResource for CountingResource {
        async fn probe(&self) -> Result<(), StorageError> {
            Ok(())
        }

        fn stats(&self) -> PoolStats {
            PoolStats { active: 1, idle: 4 }
        }

        async fn close(&self) -> Result<(), StorageError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                Err(StorageError::Query("terminate failed".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_close_runs_once() {
        let resource = Arc::new(CountingResource::default());
        let guard = ResourceGuard::new(resource.clone());

        assert!(guard.close().await.is_ok());
        assert!(guard.close().await.is_ok());

        assert_eq!(resource.closes.load(Ordering::SeqCst), 1);
        assert!(guard.is_closed());
    }

    #[tokio::test]
    async fn test_second_close_returns_original_error() {
        let resource = Arc::new(CountingResource {
            fail_close: true,
            ..Default::default()
        });
        let guard = ResourceGuard::new(resource.clone());

        let first = guard.close().await;
        let second = guard.close().await;

        assert!(matches!(first, Err(LifecycleError::ResourceCloseError(_))));
        assert_eq!(first, second);
        assert_eq!(resource.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_close_closes_once() {
        let resource = Arc::new(CountingResource::default());
        let guard = Arc::new(ResourceGuard::new(resource.clone()));

        let mut joins = Vec::new();
        for _ in 0..8 {
            let guard = guard.clone();
            joins.push(tokio::spawn(async move { guard.close().await }));
        }
        for join in joins {
            assert!(join.await.unwrap().is_ok());
        }

        assert_eq!(resource.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_after_close_fails() {
        let guard = ResourceGuard::new(Arc::new(CountingResource::default()));
        let before = guard.acquire().unwrap();

        guard.close().await.unwrap();

        assert_eq!(guard.acquire().err(), Some(StorageError::Closed));
        assert_eq!(guard.stats(), PoolStats::default());
        // Handles taken before close stay valid for in-flight work.
        assert!(before.probe().await.is_ok());
    }
}
