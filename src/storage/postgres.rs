//! PostgreSQL-backed shared resource.
//!
//! # Responsibilities
//! - Open the pooled connection at process start
//! - Provide health probe and pool statistics
//! - Map driver errors to `StorageError`, including the closed-pool case

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::StorageConfig;
use crate::storage::{PoolStats, SharedResource, StorageError};

/// Pooled PostgreSQL connection handle.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open the pool and establish the initial connections.
    pub async fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::Connect(e.to_string()))?;

        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Storage pool opened"
        );

        Ok(Self { pool })
    }

    /// The underlying pool, for the data-access layer.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolClosed => StorageError::Closed,
            sqlx::Error::PoolTimedOut => StorageError::Timeout,
            sqlx::Error::Io(e) => StorageError::Connect(e.to_string()),
            other => StorageError::Query(other.to_string()),
        }
    }
}

#[async_trait]
impl SharedResource for PgStore {
    async fn probe(&self) -> Result<(), StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        let size = self.pool.size();
        let idle = u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX);
        PoolStats {
            active: size.saturating_sub(idle),
            idle,
        }
    }

    async fn close(&self) -> Result<(), StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        self.pool.close().await;
        Ok(())
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("size", &self.pool.size())
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}
