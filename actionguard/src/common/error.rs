//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! # HTTPエラーレスポンス
//!
//! `GuardError`は`error_code()`と`status_code()`メソッドを提供し、
//! `{"error": "<code>"}` 形式の機械可読なエラーレスポンスを生成できます。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Common layer error type
#[derive(Debug, Error)]
pub enum CommonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// action guard error type
#[derive(Debug, Error)]
pub enum GuardError {
    /// Common layer error
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Malformed `Idempotency-Key` header
    #[error("Invalid idempotency key: {0}")]
    InvalidIdempotencyKey(String),

    /// Idempotency key reused with a different request payload
    #[error("Idempotency key reused with a different request payload")]
    IdempotencyConflict,

    /// Request body exceeds the configured limit
    #[error("Payload too large: limit is {0} bytes")]
    PayloadTooLarge(usize),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database error (ledger / key-value store)
    #[error("Database error: {0}")]
    Database(String),

    /// Filesystem error (audit log / export)
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuardError {
    /// Returns a safe error message for external clients.
    ///
    /// Internal details such as file paths or SQL errors are never included.
    /// Use the `Display` implementation for server logs.
    pub fn external_message(&self) -> &'static str {
        match self {
            Self::Common(_) => "Request error",
            Self::InvalidIdempotencyKey(_) => "Invalid Idempotency-Key header",
            Self::IdempotencyConflict => "Idempotency-Key was already used for a different request",
            Self::PayloadTooLarge(_) => "Request body too large",
            Self::NotFound(_) => "Not found",
            Self::Database(_) => "Storage unavailable",
            Self::Io(_) => "Storage unavailable",
            Self::Internal(_) => "Internal server error",
        }
    }

    /// Returns the stable machine-readable error code.
    ///
    /// # Error Codes
    ///
    /// - `invalid_idempotency_key`: malformed key (400)
    /// - `idempotency_conflict`: key reused for another payload (409)
    /// - `payload_too_large`: body over the limit (413)
    /// - `invalid_request`: validation / configuration errors (400)
    /// - `not_found`: resource not found (404)
    /// - `storage_unavailable`: ledger or audit storage failure (500)
    /// - `internal_error`: anything else (500)
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Common(_) => "invalid_request",
            Self::InvalidIdempotencyKey(_) => "invalid_idempotency_key",
            Self::IdempotencyConflict => "idempotency_conflict",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::NotFound(_) => "not_found",
            Self::Database(_) => "storage_unavailable",
            Self::Io(_) => "storage_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Common(CommonError::Serialization(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Common(_) => StatusCode::BAD_REQUEST,
            Self::InvalidIdempotencyKey(_) => StatusCode::BAD_REQUEST,
            Self::IdempotencyConflict => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// クライアント起因のエラーか（4xx）
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Converts this error to the JSON error body.
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.error_code().to_string(),
        }
    }
}

/// エラーレスポンスボディ
///
/// # Example
///
/// ```json
/// { "error": "idempotency_conflict" }
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// 機械可読なエラーコード
    pub error: String,
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            tracing::debug!(error = %self, "client error");
        } else {
            tracing::error!(error = %self, "request failed");
        }
        (self.status_code(), Json(self.to_error_body())).into_response()
    }
}

/// Result type alias (Common)
pub type CommonResult<T> = Result<T, CommonError>;

/// Result type alias (action guard)
pub type GuardResult<T> = Result<T, GuardError>;
