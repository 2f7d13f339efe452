//! HTTP冪等キャッシュ
//!
//! クライアント指定の `Idempotency-Key` ごとに初回のHTTPレスポンスを保存し、
//! 再送時はハンドラーを再実行せずに再生する。同じキーで異なるリクエストが
//! 届いた場合は409で拒否する。

/// 型定義
pub mod types;

/// キー検証とハッシュ
pub mod key;

/// 保存先
pub mod store;

/// ミドルウェア
pub mod middleware;

pub use key::{IdempotencyPolicy, IDEMPOTENCY_KEY_HEADER};
pub use middleware::{idempotency_middleware, IdempotencyState};
pub use store::{IdempotencyStore, KvIdempotencyStore, MemoryKeyValueStore};
pub use types::IdempotencyRecord;
