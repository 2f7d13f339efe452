//! 並行制御ユーティリティ
//!
//! - `KeyedLocks`: キー単位の非同期排他（同一キーのcheck-and-insertを直列化）
//! - `run_to_completion`: 呼び出し元がキャンセルされても副作用を完了させる

use crate::common::error::{GuardError, GuardResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

type LockMap = Arc<Mutex<HashMap<String, Arc<TokioMutex<()>>>>>;

/// キー単位の非同期ロック
///
/// 異なるキーは互いにブロックしない。保持者も待機者もいなくなったキーは
/// マップから削除される。
#[derive(Clone, Default)]
pub struct KeyedLocks {
    map: LockMap,
}

/// `KeyedLocks::lock` が返すガード。Dropで解放される。
pub struct KeyedGuard {
    key: String,
    lock: Arc<TokioMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    map: LockMap,
}

impl KeyedLocks {
    /// 空のロックテーブルを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定キーのロックを取得するまで待機する
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let lock = {
            let mut map = self.map.lock().unwrap_or_else(|p| p.into_inner());
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(TokioMutex::new(())))
                .clone()
        };
        let guard = lock.clone().lock_owned().await;
        KeyedGuard {
            key: key.to_string(),
            lock,
            guard: Some(guard),
            map: self.map.clone(),
        }
    }

    /// 追跡中のキー数
    pub fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// 追跡中のキーがないか
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.map.lock().unwrap_or_else(|p| p.into_inner());
        // マップと自分以外に参照がなければ待機者はいない
        let unused = map
            .get(&self.key)
            .map(|existing| Arc::ptr_eq(existing, &self.lock) && Arc::strong_count(&self.lock) == 2)
            .unwrap_or(false);
        if unused {
            map.remove(&self.key);
        }
    }
}

/// 副作用を独立したタスクで最後まで実行し、その結果を待つ
///
/// 呼び出し元のFutureがDropされても、起動済みのタスクは完了まで走り続ける。
/// レジャー挿入や監査ログ追記のような取り消せない書き込みに使う。
pub async fn run_to_completion<F, T>(label: &'static str, fut: F) -> GuardResult<T>
where
    F: Future<Output = GuardResult<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(result) => result,
        Err(e) => Err(GuardError::Internal(format!("{} task failed: {}", label, e))),
    }
}
