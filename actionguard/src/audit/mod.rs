//! 追記専用の監査ログ
//!
//! 結果を伴う操作（失敗した試行を含む）を、直前イベントのハッシュで連結した
//! JSONLとして記録し、必要に応じてチェーン全体を再計算して検証する。

/// 監査ログの型定義
pub mod types;

/// SHA-256ハッシュチェーン（改ざん検知）
pub mod hash_chain;

/// 保存先trait
pub mod sink;

/// JSONLファイル実装
pub mod file_log;

/// 記録と障害追跡
pub mod recorder;

/// 監査ログミドルウェア
pub mod middleware;

pub use file_log::FileAuditLog;
pub use hash_chain::{ChainIssue, ChainIssueKind, ChainVerificationResult};
pub use recorder::{AuditHealth, AuditRecorder};
pub use sink::AuditSink;
pub use types::{AuditAction, AuditActor, AuditEvent, AuditEventDraft, AuditQuery};
