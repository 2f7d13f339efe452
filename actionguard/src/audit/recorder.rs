//! 監査イベントの記録と障害追跡
//!
//! 追記失敗はリクエストを失敗させない代わりに `AuditHealth` に記録し、
//! errorレベルでログ出力する。

use crate::audit::sink::AuditSink;
use crate::audit::types::{AuditEvent, AuditEventDraft};
use crate::clock::SharedClock;
use crate::common::error::GuardError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// 監査ログ追記の健全性
#[derive(Debug, Default)]
pub struct AuditHealth {
    failures: AtomicU64,
    last_error: Mutex<Option<(DateTime<Utc>, String)>>,
}

/// `AuditHealth` のスナップショット
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditHealthSnapshot {
    /// 失敗回数の累計
    pub failures: u64,
    /// 最後の失敗時刻
    pub last_failure_at: Option<DateTime<Utc>>,
    /// 最後の失敗内容
    pub last_error: Option<String>,
}

impl AuditHealth {
    /// 失敗を記録
    pub fn record_failure(&self, error: &GuardError) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let mut last = self.last_error.lock().unwrap_or_else(|p| p.into_inner());
        *last = Some((Utc::now(), error.to_string()));
    }

    /// 失敗回数の累計
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// 一度も失敗していないか
    pub fn is_healthy(&self) -> bool {
        self.failure_count() == 0
    }

    /// 現在の状態
    pub fn snapshot(&self) -> AuditHealthSnapshot {
        let last = self
            .last_error
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        AuditHealthSnapshot {
            failures: self.failure_count(),
            last_failure_at: last.as_ref().map(|(at, _)| *at),
            last_error: last.map(|(_, msg)| msg),
        }
    }
}

/// ミドルウェアから使う監査レコーダー
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    health: Arc<AuditHealth>,
    clock: SharedClock,
}

impl AuditRecorder {
    /// レコーダーを作成。イベント時刻は `clock` から取る。
    pub fn new(sink: Arc<dyn AuditSink>, clock: SharedClock) -> Self {
        Self {
            sink,
            health: Arc::new(AuditHealth::default()),
            clock,
        }
    }

    /// 保存先
    pub fn sink(&self) -> &Arc<dyn AuditSink> {
        &self.sink
    }

    /// 時刻ソース
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// 健全性
    pub fn health(&self) -> &Arc<AuditHealth> {
        &self.health
    }

    /// イベントを追記する。失敗時は `AuditHealth` に記録して `None` を返す。
    pub async fn record(&self, draft: AuditEventDraft) -> Option<AuditEvent> {
        let method = draft.method.clone();
        let route = draft.route.clone();
        match self.sink.append(draft).await {
            Ok(event) => Some(event),
            Err(e) => {
                self.health.record_failure(&e);
                tracing::error!(
                    error = %e,
                    method = %method,
                    route = %route,
                    failures = self.health.failure_count(),
                    "Failed to append audit event"
                );
                None
            }
        }
    }
}
