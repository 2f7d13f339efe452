//! actionguard
//!
//! 副作用を伴う操作を「最大1回」実行させ、結果を改ざん検知可能な形で残す
//! 記録・完全性サブシステム。
//!
//! - 冪等アクションレジャー（`ledger`）
//! - HTTP冪等キャッシュ（`idempotency`）
//! - 追記専用のハッシュチェーン監査ログ（`audit`）

#![warn(missing_docs)]

/// 共通型定義（エラー、ハッシュ、IP）
pub mod common;

/// 設定管理（環境変数ヘルパー）
pub mod config;

/// ロギング初期化ユーティリティ
pub mod logging;

/// 時刻ソース
pub mod clock;

/// キー単位ロックとキャンセル不能な副作用実行
pub mod concurrency;

/// データベースアクセス
pub mod db;

/// 冪等アクションレジャー
pub mod ledger;

/// 追記専用の監査ログ
pub mod audit;

/// HTTP冪等キャッシュ
pub mod idempotency;

/// 初期化処理
pub mod bootstrap;

/// CLIインターフェース
pub mod cli;

use axum::{middleware::from_fn_with_state, Router};
use std::sync::Arc;

/// アプリケーション状態
///
/// 呼び出し側のルーターに `apply_layers` でミドルウェアを組み込み、
/// ハンドラーからは `ledger` を使ってアクションを記録する。
#[derive(Clone)]
pub struct AppState {
    /// アクションレジャー
    pub ledger: Arc<dyn db::traits::LedgerRepository>,
    /// 監査レコーダー
    pub audit: audit::AuditRecorder,
    /// HTTP冪等キャッシュ
    pub idempotency: idempotency::IdempotencyState,
    /// データベース接続プール
    pub db_pool: sqlx::SqlitePool,
    /// 時刻ソース
    pub clock: clock::SharedClock,
    /// 設定
    pub config: Arc<config::GuardConfig>,
    /// 冪等キャッシュの期限切れ削除タスク（最後の複製の破棄で停止）
    pub cache_purge: Arc<bootstrap::BackgroundTask>,
}

impl AppState {
    /// 監査ログと冪等キャッシュのミドルウェアをルーターに組み込む
    ///
    /// 監査が外側のため、冪等キャッシュが返す400/409/413や再生レスポンスも記録される。
    /// 期限切れキャッシュの削除は `bootstrap::initialize` が起動済み。
    pub fn apply_layers<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            .layer(from_fn_with_state(
                self.idempotency.clone(),
                idempotency::idempotency_middleware,
            ))
            .layer(from_fn_with_state(
                self.audit.clone(),
                audit::middleware::audit_middleware,
            ))
    }
}
