//! データベースアクセス層
//!
//! SQLiteベースのデータ永続化

/// データベース初期化とマイグレーション
pub mod migrations;

/// アクションレジャーのストレージ
pub mod ledger;

/// TTL付きキーバリューストア
pub mod kv_store;

/// Repository traitパターン（テスタビリティ向上）
pub mod traits;
