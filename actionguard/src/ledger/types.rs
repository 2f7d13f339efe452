//! アクションレジャーの型定義

use crate::common::error::{CommonError, GuardResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// 記録済みアクション
///
/// `reverse_id` 以外は記録後に変更されない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// 単調増加ID（削除後も再利用されない）
    pub id: i64,
    /// アクション種別（例: `lights.toggle`）
    pub action_type: String,
    /// 記録元のスキル名
    pub skill_origin: String,
    /// アクション引数（JSONオブジェクト）
    pub slots: serde_json::Value,
    /// 取り消し可能か
    pub reversible: bool,
    /// 取り消しアクションのID
    pub reverse_id: Option<i64>,
    /// 記録時刻
    pub timestamp: DateTime<Utc>,
    /// 重複排除キー
    pub idempotency_key: Option<String>,
    /// 実行ユーザー
    pub user_id: Option<String>,
}

/// 記録するアクション
#[derive(Debug, Clone, PartialEq)]
pub struct NewAction {
    /// アクション種別
    pub action_type: String,
    /// 記録元のスキル名
    pub skill_origin: String,
    /// アクション引数
    pub slots: serde_json::Value,
    /// 取り消し可能か
    pub reversible: bool,
    /// 重複排除キー
    pub idempotency_key: Option<String>,
    /// 実行ユーザー
    pub user_id: Option<String>,
}

impl NewAction {
    /// 引数なし・取り消し不可のアクションを作成
    pub fn new(action_type: impl Into<String>, skill_origin: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            skill_origin: skill_origin.into(),
            slots: serde_json::Value::Object(serde_json::Map::new()),
            reversible: false,
            idempotency_key: None,
            user_id: None,
        }
    }

    /// 引数を設定
    pub fn slots(mut self, slots: serde_json::Value) -> Self {
        self.slots = slots;
        self
    }

    /// 取り消し可否を設定
    pub fn reversible(mut self, reversible: bool) -> Self {
        self.reversible = reversible;
        self
    }

    /// 重複排除キーを設定
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// 実行ユーザーを設定
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// 入力値を検証する
    pub fn validate(&self) -> GuardResult<()> {
        if self.action_type.trim().is_empty() {
            return Err(CommonError::Validation("action_type must not be empty".into()).into());
        }
        if self.skill_origin.trim().is_empty() {
            return Err(CommonError::Validation("skill_origin must not be empty".into()).into());
        }
        if !self.slots.is_object() {
            return Err(CommonError::Validation("slots must be a JSON object".into()).into());
        }
        if matches!(self.idempotency_key.as_deref(), Some(k) if k.is_empty()) {
            return Err(
                CommonError::Validation("idempotency_key must not be empty".into()).into(),
            );
        }
        Ok(())
    }
}

/// `record` の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    /// 新規に挿入されたか（falseなら既存エントリ）
    pub inserted: bool,
    /// エントリID
    pub id: i64,
}

/// `get_last_reversible` の絞り込み条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastReversibleFilter {
    /// ユーザーで絞り込む
    pub user_id: Option<String>,
    /// アクション種別で絞り込む（空なら該当なし）
    pub action_types: Option<Vec<String>>,
    /// 既に取り消し済みのエントリを除外する
    pub exclude_reversed: bool,
}

impl LastReversibleFilter {
    /// ユーザー指定の条件を作成
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }
}

/// 保存用のタイムスタンプ文字列（固定幅のため辞書順比較が時刻順になる）
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 保存済みタイムスタンプを復元
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
