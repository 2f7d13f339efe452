//! 初期化ロジック
//!
//! データベース接続、レジャー、監査ログ、冪等キャッシュのバックエンド選択を行い
//! `AppState` を構築する。

use crate::audit::{AuditRecorder, FileAuditLog};
use crate::clock::{SharedClock, SystemClock};
use crate::common::error::GuardResult;
use crate::config::{GuardConfig, IdempotencyBackend};
use crate::db::kv_store::SqliteKeyValueStore;
use crate::db::migrations::initialize_database;
use crate::db::traits::KeyValueStore;
use crate::idempotency::store::{start_purge_task, IdempotencyStore};
use crate::idempotency::{IdempotencyState, KvIdempotencyStore, MemoryKeyValueStore};
use crate::ledger::SqliteLedger;
use crate::AppState;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 冪等キャッシュの期限切れ削除の間隔
pub const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// システム時刻で初期化する
pub async fn initialize(config: GuardConfig) -> GuardResult<AppState> {
    initialize_with_clock(config, Arc::new(SystemClock)).await
}

/// Drop時にタスクを停止するハンドル
#[derive(Debug)]
pub struct BackgroundTask(tokio::task::JoinHandle<()>);

impl BackgroundTask {
    /// タスクが終了しているか
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// 指定した時刻ソースで初期化する
///
/// データベースに接続できない場合はエラーを返す（レジャーなしでは起動しない）。
/// 冪等キャッシュの期限切れ削除タスクも起動し、`AppState` の最後の複製が
/// 破棄されるまで動かし続ける。
pub async fn initialize_with_clock(
    config: GuardConfig,
    clock: SharedClock,
) -> GuardResult<AppState> {
    info!("actionguard v{}", env!("CARGO_PKG_VERSION"));

    let db_pool = initialize_database(&config.database).await?;
    info!(url = %config.database.url, "Database initialized");

    let ledger = Arc::new(SqliteLedger::new(
        db_pool.clone(),
        clock.clone(),
        config.ledger,
    ));

    let audit_log = FileAuditLog::new(config.audit.log_path.clone());
    info!(path = %audit_log.path().display(), "Audit log configured");
    let audit = AuditRecorder::new(Arc::new(audit_log), clock.clone());

    let kv = select_cache_backend(config.idempotency.backend, &db_pool, clock.clone()).await;
    let store = Arc::new(KvIdempotencyStore::new(kv, config.idempotency.ttl));
    let idempotency = IdempotencyState::new(store, &config.idempotency, clock.clone());
    let cache_purge = start_cache_purge(idempotency.store().clone());

    Ok(AppState {
        ledger,
        audit,
        idempotency,
        db_pool,
        clock,
        config: Arc::new(config),
        cache_purge: Arc::new(cache_purge),
    })
}

/// 冪等キャッシュのバックエンドを一度だけ選択する
///
/// 永続バックエンドが使えない場合は警告を出してメモリにフォールバックする。
pub async fn select_cache_backend(
    backend: IdempotencyBackend,
    pool: &SqlitePool,
    clock: SharedClock,
) -> Arc<dyn KeyValueStore> {
    match backend {
        IdempotencyBackend::Memory => {
            info!("Idempotency cache backend: memory");
            Arc::new(MemoryKeyValueStore::new(clock))
        }
        IdempotencyBackend::Sqlite => {
            match sqlx::query("SELECT 1 FROM kv_store LIMIT 1")
                .execute(pool)
                .await
            {
                Ok(_) => {
                    info!("Idempotency cache backend: sqlite");
                    Arc::new(SqliteKeyValueStore::new(pool.clone(), clock))
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Durable idempotency cache unavailable, falling back to memory"
                    );
                    Arc::new(MemoryKeyValueStore::new(clock))
                }
            }
        }
    }
}

fn start_cache_purge(store: Arc<dyn IdempotencyStore>) -> BackgroundTask {
    BackgroundTask(start_purge_task(store, CACHE_PURGE_INTERVAL))
}
