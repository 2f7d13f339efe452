//! HTTP冪等キャッシュミドルウェア
//!
//! `Idempotency-Key` 付きの変更系リクエストについて、初回のレスポンスを保存し、
//! 再送時はハンドラーを呼ばずに保存済みレスポンスを返す。

use crate::clock::SharedClock;
use crate::common::error::{CommonError, GuardError};
use crate::concurrency::KeyedLocks;
use crate::config::IdempotencyConfig;
use crate::idempotency::key::{
    compute_cache_key, compute_request_hash, validate_key, IdempotencyPolicy,
    IDEMPOTENCY_KEY_HEADER,
};
use crate::idempotency::store::IdempotencyStore;
use crate::idempotency::types::IdempotencyRecord;
use axum::{
    body::{Body, Bytes, HttpBody},
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// ミドルウェアの状態
#[derive(Clone)]
pub struct IdempotencyState {
    store: Arc<dyn IdempotencyStore>,
    policy: IdempotencyPolicy,
    max_body_bytes: usize,
    locks: KeyedLocks,
    clock: SharedClock,
}

impl IdempotencyState {
    /// 状態を作成
    pub fn new(
        store: Arc<dyn IdempotencyStore>,
        config: &IdempotencyConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            store,
            policy: IdempotencyPolicy::new(config.path_prefixes.clone()),
            max_body_bytes: config.max_body_bytes,
            locks: KeyedLocks::new(),
            clock,
        }
    }

    /// 保存先
    pub fn store(&self) -> &Arc<dyn IdempotencyStore> {
        &self.store
    }

    /// 読み出し失敗はミスとして扱う
    async fn lookup(&self, cache_key: &str) -> Option<IdempotencyRecord> {
        match self.store.lookup(cache_key).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    backend = self.store.backend_name(),
                    "Idempotency cache lookup failed, treating as miss"
                );
                None
            }
        }
    }
}

fn replay(record: IdempotencyRecord) -> Response {
    let status = StatusCode::from_u16(record.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, record.response_body).into_response();
    response.headers_mut().remove(header::CONTENT_TYPE);
    if let Some(value) = record
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

/// HTTP冪等キャッシュミドルウェア
///
/// 1. 対象外のメソッド・パス、またはキーなしはそのまま通す
/// 2. 不正なキーは400、ボディ上限超過は413
/// 3. 保存済みでハッシュ不一致は409、一致すれば保存済みレスポンスを再生
/// 4. 未保存ならハンドラーを実行し、結果（非2xxを含む）を保存してから返す
///
/// 同一キャッシュキーの照会から保存までは、プロセス内でキー単位に直列化する。
pub async fn idempotency_middleware(
    State(state): State<IdempotencyState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if !state.policy.should_apply(&method, &path) {
        return next.run(request).await;
    }
    let Some(raw_key) = request.headers().get(IDEMPOTENCY_KEY_HEADER) else {
        return next.run(request).await;
    };
    let key = match raw_key.to_str() {
        Ok(key) => key.to_string(),
        Err(_) => {
            return GuardError::InvalidIdempotencyKey("header is not visible ASCII".into())
                .into_response()
        }
    };
    if let Err(e) = validate_key(&key) {
        return e.into_response();
    }

    let query = request.uri().query().unwrap_or("").to_string();
    let declared_len = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to buffer request body");
            return match declared_len {
                Some(len) if len <= state.max_body_bytes => GuardError::Common(
                    CommonError::Validation("failed to read request body".into()),
                )
                .into_response(),
                _ => GuardError::PayloadTooLarge(state.max_body_bytes).into_response(),
            };
        }
    };

    let request_hash = compute_request_hash(&method, &path, &query, &body);
    let cache_key = compute_cache_key(&key, &method, &path);

    let _guard = state.locks.lock(&cache_key).await;

    if let Some(record) = state.lookup(&cache_key).await {
        if record.request_hash != request_hash {
            tracing::info!(method = %method, path = %path, "Idempotency key reused with different payload");
            return GuardError::IdempotencyConflict.into_response();
        }
        tracing::debug!(method = %method, path = %path, status = record.status_code, "Replaying cached response");
        return replay(record);
    }

    let response = next
        .run(Request::from_parts(parts, Body::from(body)))
        .await;

    let (parts, body) = response.into_parts();
    if body.size_hint().lower() > state.max_body_bytes as u64 {
        tracing::warn!(
            method = %method,
            path = %path,
            limit = state.max_body_bytes,
            "Response body exceeds cache limit, not cached"
        );
        return Response::from_parts(parts, body);
    }
    let bytes: Bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return GuardError::Internal(format!("failed to buffer response body: {}", e))
                .into_response()
        }
    };

    if bytes.len() > state.max_body_bytes {
        tracing::warn!(
            method = %method,
            path = %path,
            size = bytes.len(),
            limit = state.max_body_bytes,
            "Response body exceeds cache limit, not cached"
        );
    } else {
        let record = IdempotencyRecord {
            status_code: parts.status.as_u16(),
            response_body: bytes.to_vec(),
            content_type: parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            request_hash,
            created_at: state.clock.now(),
            ttl_secs: state.store.ttl().as_secs(),
        };
        match state.store.store(&cache_key, &record).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                method = %method,
                path = %path,
                backend = state.store.backend_name(),
                "Idempotency record already stored by another writer, keeping it"
            ),
            Err(e) => tracing::error!(
                error = %e,
                backend = state.store.backend_name(),
                "Failed to store idempotent response"
            ),
        }
    }

    Response::from_parts(parts, Body::from(bytes))
}
