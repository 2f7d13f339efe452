//! Repository traitパターン定義
//!
//! 呼び出し側は `Arc<dyn Trait>` に依存し、テストでは実装を差し替えられる。

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::common::error::GuardResult;
use crate::ledger::types::{LastReversibleFilter, LedgerEntry, NewAction, RecordOutcome};

// ---------------------------------------------------------------------------
// LedgerRepository
// ---------------------------------------------------------------------------

/// アクションレジャーのRepository trait
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// アクションを記録する
    ///
    /// 冪等キーがあり、重複排除ウィンドウ内に同じキーのエントリが存在する場合は
    /// 挿入せず既存IDを返す。同一キーの並行呼び出しが両方挿入することはない。
    async fn record(&self, action: NewAction) -> GuardResult<RecordOutcome>;

    /// 取り消しアクションを紐付ける（未設定の場合のみ）
    async fn link_reverse(&self, forward_id: i64, reverse_id: i64) -> GuardResult<bool>;

    /// 条件に合う最新の取り消し可能エントリを取得
    async fn get_last_reversible(
        &self,
        filter: &LastReversibleFilter,
    ) -> GuardResult<Option<LedgerEntry>>;

    /// 保持期間より古いエントリを削除し、削除件数を返す
    async fn prune(&self, retention: Duration) -> GuardResult<u64>;

    /// IDでエントリを取得
    async fn get(&self, id: i64) -> GuardResult<Option<LedgerEntry>>;

    /// 全エントリ数
    async fn count(&self) -> GuardResult<i64>;

    /// 全エントリをJSONLとして書き出し、件数を返す
    async fn export_jsonl(&self, target: &Path) -> GuardResult<u64>;
}

// ---------------------------------------------------------------------------
// KeyValueStore
// ---------------------------------------------------------------------------

/// TTL付きキーバリューストア
///
/// 期限切れのエントリは存在しないものとして扱う。
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 値を取得
    async fn get(&self, key: &str) -> GuardResult<Option<Vec<u8>>>;
    /// 値を保存（既存は上書き）
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> GuardResult<()>;
    /// 有効なエントリがない場合のみ保存し、保存したかを返す（期限切れは置き換える）
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> GuardResult<bool>;
    /// 値を削除し、削除されたかを返す
    async fn delete(&self, key: &str) -> GuardResult<bool>;
    /// 期限切れのエントリを削除し、件数を返す
    async fn purge_expired(&self) -> GuardResult<u64>;
    /// バックエンド名（ログ用）
    fn backend_name(&self) -> &'static str;
}
