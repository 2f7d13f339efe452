//! 共通型定義

/// エラー型
pub mod error;

/// SHA-256ハッシュユーティリティ
pub mod hash;

/// クライアントIP抽出
pub mod ip;
