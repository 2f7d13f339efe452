//! 時刻ソース
//!
//! 重複排除ウィンドウや保持期間の判定は `Clock` 経由で現在時刻を取得する。
//! 本番は `SystemClock`、テストは `ManualClock` で時間を進める。

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// 現在時刻を返す
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// 現在時刻（UTC）
    fn now(&self) -> DateTime<Utc>;
}

/// 共有可能な時刻ソース
pub type SharedClock = Arc<dyn Clock>;

/// システム時刻
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手動で進める時刻（テスト用）
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// 指定時刻から開始する
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// 時刻を進める
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }

    /// 時刻を設定する
    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}
