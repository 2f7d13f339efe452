//! 冪等キャッシュの保存先
//!
//! `IdempotencyStore` は差し替え可能な `KeyValueStore` の上に実装する。
//! バックエンドは起動時に一度だけ選択する（メモリ or SQLite）。

use crate::clock::SharedClock;
use crate::common::error::{CommonError, GuardResult};
use crate::db::traits::KeyValueStore;
use crate::idempotency::types::IdempotencyRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const KEY_NAMESPACE: &str = "idem:";

/// 冪等レコードの保存先
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// キャッシュキーでレコードを取得（期限切れは `None`）
    async fn lookup(&self, cache_key: &str) -> GuardResult<Option<IdempotencyRecord>>;
    /// 有効なレコードがなければ保存し、保存したかを返す（既存レコードは置き換えない）
    async fn store(&self, cache_key: &str, record: &IdempotencyRecord) -> GuardResult<bool>;
    /// 期限切れのレコードを削除し、件数を返す
    async fn purge_expired(&self) -> GuardResult<u64>;
    /// レコードの保持期間
    fn ttl(&self) -> Duration;
    /// バックエンド名（ログ用）
    fn backend_name(&self) -> &'static str;
}

/// `KeyValueStore` 上のJSON保存
#[derive(Clone)]
pub struct KvIdempotencyStore {
    kv: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl KvIdempotencyStore {
    /// 保存先を作成
    pub fn new(kv: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }
}

#[async_trait]
impl IdempotencyStore for KvIdempotencyStore {
    async fn lookup(&self, cache_key: &str) -> GuardResult<Option<IdempotencyRecord>> {
        let key = format!("{}{}", KEY_NAMESPACE, cache_key);
        let Some(raw) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&raw).map_err(CommonError::from)?;
        Ok(Some(record))
    }

    async fn store(&self, cache_key: &str, record: &IdempotencyRecord) -> GuardResult<bool> {
        let key = format!("{}{}", KEY_NAMESPACE, cache_key);
        let raw = serde_json::to_vec(record).map_err(CommonError::from)?;
        self.kv.set_if_absent(&key, raw, self.ttl).await
    }

    async fn purge_expired(&self) -> GuardResult<u64> {
        self.kv.purge_expired().await
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn backend_name(&self) -> &'static str {
        self.kv.backend_name()
    }
}

/// プロセス内メモリのキーバリューストア
#[derive(Clone)]
pub struct MemoryKeyValueStore {
    entries: Arc<RwLock<HashMap<String, (Vec<u8>, i64)>>>,
    clock: SharedClock,
}

impl MemoryKeyValueStore {
    /// 空のストアを作成
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// 保持件数（期限切れを含む）
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// 空か
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> GuardResult<Option<Vec<u8>>> {
        let now = self.clock.now().timestamp_millis();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> GuardResult<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = self.clock.now().timestamp_millis().saturating_add(ttl_ms);
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> GuardResult<bool> {
        let now = self.clock.now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at > now)
        {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value, now.saturating_add(ttl_ms)));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> GuardResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn purge_expired(&self) -> GuardResult<u64> {
        let now = self.clock.now().timestamp_millis();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// 期限切れレコードを定期的に削除するタスクを起動する
pub fn start_purge_task(
    store: Arc<dyn IdempotencyStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // 最初のtickは即座に完了する
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(purged) => {
                    tracing::debug!(purged, backend = store.backend_name(), "Idempotency cache purged")
                }
                Err(e) => tracing::error!(error = %e, "Idempotency cache purge failed"),
            }
        }
    })
}
