//! 冪等キーの検証とハッシュ計算

use crate::common::error::{GuardError, GuardResult};
use crate::common::hash::sha256_fields;
use axum::http::Method;
use std::collections::HashSet;

/// 冪等キーのヘッダー名
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// キーの最小長
pub const MIN_KEY_LENGTH: usize = 8;

/// キーに含まれるべき異なる文字の最小数
pub const MIN_DISTINCT_CHARS: usize = 4;

/// クライアント指定の冪等キーを検証する
///
/// 8文字以上、4種類以上の文字を含み、表示可能なASCII（空白を除く）のみ。
pub fn validate_key(key: &str) -> GuardResult<()> {
    if key.len() < MIN_KEY_LENGTH {
        return Err(GuardError::InvalidIdempotencyKey(format!(
            "must be at least {} characters",
            MIN_KEY_LENGTH
        )));
    }
    if !key.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(GuardError::InvalidIdempotencyKey(
            "must contain only visible ASCII characters".to_string(),
        ));
    }
    let distinct: HashSet<u8> = key.bytes().collect();
    if distinct.len() < MIN_DISTINCT_CHARS {
        return Err(GuardError::InvalidIdempotencyKey(format!(
            "must contain at least {} distinct characters",
            MIN_DISTINCT_CHARS
        )));
    }
    Ok(())
}

/// キャッシュキー = SHA-256(冪等キー, メソッド, パス)
pub fn compute_cache_key(key: &str, method: &Method, path: &str) -> String {
    sha256_fields(&[key.as_bytes(), method.as_str().as_bytes(), path.as_bytes()])
}

/// リクエストハッシュ = SHA-256(メソッド, パス, クエリ, ボディ)
pub fn compute_request_hash(method: &Method, path: &str, query: &str, body: &[u8]) -> String {
    sha256_fields(&[
        method.as_str().as_bytes(),
        path.as_bytes(),
        query.as_bytes(),
        body,
    ])
}

/// 冪等キャッシュの適用対象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyPolicy {
    prefixes: Vec<String>,
}

impl IdempotencyPolicy {
    /// 許可するパスプレフィックスを指定して作成
    pub fn new(prefixes: Vec<String>) -> Self {
        Self { prefixes }
    }

    /// 変更系メソッドかつ許可プレフィックス配下のパスか
    ///
    /// プレフィックスはセグメント単位で比較する（`/v1/payments` は
    /// `/v1/payments/x` に一致し、`/v1/paymentsx` には一致しない）。
    pub fn should_apply(&self, method: &Method, path: &str) -> bool {
        let mutating = matches!(
            *method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        );
        mutating && self.prefixes.iter().any(|p| path_has_prefix(path, p))
    }
}

fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
