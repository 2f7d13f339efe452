//! テスト共通ユーティリティ

use actionguard::bootstrap::initialize_with_clock;
use actionguard::clock::ManualClock;
use actionguard::config::{
    AuditConfig, DatabaseConfig, GuardConfig, IdempotencyBackend, IdempotencyConfig, LedgerConfig,
};
use actionguard::AppState;
use chrono::{TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// 一時ディレクトリ内にDBと監査ログを置く設定
pub fn guard_config(dir: &Path, backend: IdempotencyBackend) -> GuardConfig {
    GuardConfig {
        database: DatabaseConfig {
            url: format!("sqlite:{}", dir.join("actionguard.db").display()),
            max_connections: 8,
            busy_timeout: Duration::from_secs(10),
        },
        ledger: LedgerConfig::default(),
        audit: AuditConfig {
            log_path: dir.join("audit.jsonl"),
        },
        idempotency: IdempotencyConfig {
            backend,
            ..IdempotencyConfig::default()
        },
    }
}

/// 手動時計で `AppState` を構築する
pub async fn build_state(dir: &Path, backend: IdempotencyBackend) -> (ManualClock, AppState) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap());
    let state = initialize_with_clock(guard_config(dir, backend), Arc::new(clock.clone()))
        .await
        .expect("failed to initialize actionguard");
    (clock, state)
}
