//! TTL付きキーバリューストア（SQLite）
//!
//! HTTP冪等キャッシュの永続バックエンド。`expires_at` はUNIXミリ秒。

use crate::clock::SharedClock;
use crate::common::error::{GuardError, GuardResult};
use crate::db::traits::KeyValueStore;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::time::Duration;

/// SQLiteベースのキーバリューストア
#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
    clock: SharedClock,
}

impl SqliteKeyValueStore {
    /// 新しいストアを作成
    pub fn new(pool: SqlitePool, clock: SharedClock) -> Self {
        Self { pool, clock }
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> GuardResult<Option<Vec<u8>>> {
        sqlx::query_scalar::<_, Vec<u8>>(
            "SELECT value FROM kv_store WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(self.now_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GuardError::Database(format!("Failed to read cache entry: {}", e)))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> GuardResult<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = self.now_millis().saturating_add(ttl_ms);
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| GuardError::Database(format!("Failed to store cache entry: {}", e)))?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> GuardResult<bool> {
        let now = self.now_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let result = sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            WHERE kv_store.expires_at <= ?
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now.saturating_add(ttl_ms))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| GuardError::Database(format!("Failed to store cache entry: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, key: &str) -> GuardResult<bool> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| GuardError::Database(format!("Failed to delete cache entry: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> GuardResult<u64> {
        let result = sqlx::query("DELETE FROM kv_store WHERE expires_at <= ?")
            .bind(self.now_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| GuardError::Database(format!("Failed to purge cache: {}", e)))?;
        Ok(result.rows_affected())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
