// SQLite LockStore Implementation
//
// One table of (key, value, expires_at). Expired rows behave as absent and
// are removed lazily by `purge_expired`. `set_if_absent` is a single UPSERT
// whose update arm only fires over an expired row, so SQLite's write lock
// makes it atomic across every process sharing the file.

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use cadence_core::port::{LockStore, StoreError, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

pub struct SqliteLockStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteLockStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Delete expired rows, returning how many were removed
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query("DELETE FROM locks WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let removed = result.rows_affected();
        debug!(removed = removed, "Purged expired lock store rows");
        Ok(removed)
    }

    /// Number of unexpired rows
    pub async fn live_count(&self) -> Result<i64, StoreError> {
        let now = self.time_provider.now_millis();
        sqlx::query_scalar("SELECT COUNT(*) FROM locks WHERE expires_at > ?")
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl LockStore for SqliteLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl_ms: i64) -> Result<bool, StoreError> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO locks (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            WHERE locks.expires_at <= ?
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now + ttl_ms)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.time_provider.now_millis();
        sqlx::query_scalar("SELECT value FROM locks WHERE key = ? AND expires_at > ?")
            .bind(key)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn put(&self, key: &str, value: &str, ttl_ms: i64) -> Result<(), StoreError> {
        let now = self.time_provider.now_millis();
        sqlx::query(
            r#"
            INSERT INTO locks (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now + ttl_ms)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
