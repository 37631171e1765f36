//! System configuration repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::config::DEFAULT_MAX_CONCURRENT_JOBS;
use crate::Result;

/// System configuration repository trait.
#[async_trait]
pub trait SystemConfigRepository: Send + Sync {
    /// Scheduler capacity. Falls back to the default when the key is missing
    /// or unparsable.
    async fn max_concurrent_jobs(&self) -> Result<u32>;
    async fn set_value(&self, key: &str, value: &str) -> Result<()>;
}

/// SQLx implementation of [`SystemConfigRepository`].
pub struct SqlxSystemConfigRepository {
    pool: SqlitePool,
}

impl SqlxSystemConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SystemConfigRepository for SqlxSystemConfigRepository {
    async fn max_concurrent_jobs(&self) -> Result<u32> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM system_config WHERE key = 'max_concurrent_jobs'",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(value
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS))
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO system_config (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
