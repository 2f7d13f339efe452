//! 監査ログの保存先抽象

use crate::audit::hash_chain::ChainVerificationResult;
use crate::audit::types::{AuditEvent, AuditEventDraft, AuditQuery};
use crate::common::error::GuardResult;
use async_trait::async_trait;

/// 追記専用の監査ログ
///
/// 既存の行を書き換えたり並べ替えたりしない。
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// イベントをハッシュチェーンに追記し、確定したイベントを返す
    async fn append(&self, draft: AuditEventDraft) -> GuardResult<AuditEvent>;

    /// 全行を再計算してチェーンを検証する
    async fn verify(&self) -> GuardResult<ChainVerificationResult>;

    /// 条件に合うイベントを新しい順に最大 `limit` 件返す
    async fn query(&self, query: &AuditQuery) -> GuardResult<Vec<AuditEvent>>;
}
