//! 監査ログの型定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 監査イベント（チェーンに追記済み）
///
/// `hash` は `hash` 自身を除いたイベント（`prev_hash` を含む）の正規化JSONの
/// SHA-256。`prev_hash` は直前イベントの `hash`（先頭は空文字列）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// 記録時刻
    pub ts: DateTime<Utc>,
    /// 実行ユーザー
    pub user_id: Option<String>,
    /// リクエストパス
    pub route: String,
    /// HTTPメソッド
    pub method: String,
    /// HTTPステータスコード
    pub status: u16,
    /// クライアントIP
    pub ip: Option<String>,
    /// リクエストID
    pub req_id: Option<String>,
    /// 認可スコープ
    #[serde(default)]
    pub scopes: Vec<String>,
    /// アクション名
    pub action: String,
    /// 付加情報
    #[serde(default)]
    pub meta: Map<String, Value>,
    /// このイベントのハッシュ
    pub hash: String,
    /// 直前イベントのハッシュ
    pub prev_hash: String,
}

/// 追記前の監査イベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEventDraft {
    /// 記録時刻
    pub ts: DateTime<Utc>,
    /// 実行ユーザー
    pub user_id: Option<String>,
    /// リクエストパス
    pub route: String,
    /// HTTPメソッド
    pub method: String,
    /// HTTPステータスコード
    pub status: u16,
    /// クライアントIP
    pub ip: Option<String>,
    /// リクエストID
    pub req_id: Option<String>,
    /// 認可スコープ
    pub scopes: Vec<String>,
    /// アクション名
    pub action: String,
    /// 付加情報
    pub meta: Map<String, Value>,
}

impl AuditEventDraft {
    /// 現在時刻のイベントを作成
    pub fn new(
        method: impl Into<String>,
        route: impl Into<String>,
        status: u16,
        action: impl Into<String>,
    ) -> Self {
        Self {
            ts: Utc::now(),
            user_id: None,
            route: route.into(),
            method: method.into(),
            status,
            ip: None,
            req_id: None,
            scopes: Vec::new(),
            action: action.into(),
            meta: Map::new(),
        }
    }

    /// 記録時刻を指定
    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }

    /// 実行ユーザーを設定
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// クライアントIPを設定
    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// リクエストIDを設定
    pub fn req_id(mut self, req_id: impl Into<String>) -> Self {
        self.req_id = Some(req_id.into());
        self
    }

    /// スコープを設定
    pub fn scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// 付加情報を1件追加
    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }
}

/// 認証済みの実行者（上流の認証レイヤーがリクエスト拡張に設定する）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditActor {
    /// ユーザーID
    pub user_id: String,
    /// 認可スコープ
    pub scopes: Vec<String>,
}

impl AuditActor {
    /// スコープなしの実行者を作成
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            scopes: Vec::new(),
        }
    }

    /// スコープを設定
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}

/// ハンドラーがレスポンス拡張に設定するアクション情報
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditAction {
    /// アクション名
    pub action: String,
    /// 付加情報
    pub meta: Map<String, Value>,
}

impl AuditAction {
    /// アクション名を指定して作成
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            meta: Map::new(),
        }
    }

    /// 付加情報を1件追加
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }
}

/// 監査ログ検索条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    /// 最大件数
    pub limit: usize,
    /// この時刻以降のイベントのみ
    pub since: Option<DateTime<Utc>>,
    /// アクション名（完全一致）
    pub action: Option<String>,
    /// ユーザーID（完全一致）
    pub user_id: Option<String>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            since: None,
            action: None,
            user_id: None,
        }
    }
}

impl AuditQuery {
    /// イベントが条件に一致するか
    pub fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(since) = self.since {
            if event.ts < since {
                return false;
            }
        }
        if let Some(ref action) = self.action {
            if &event.action != action {
                return false;
            }
        }
        if let Some(ref user_id) = self.user_id {
            if event.user_id.as_ref() != Some(user_id) {
                return false;
            }
        }
        true
    }
}
