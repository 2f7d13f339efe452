//! 監査ログミドルウェア
//!
//! 監査対象のリクエストごとに1件の `AuditEvent` を記録する。
//! ヘルスチェック等のノイズパスは除外。

use crate::audit::recorder::AuditRecorder;
use crate::audit::types::{AuditAction, AuditActor, AuditEventDraft};
use crate::common::ip::client_ip_from_headers;
use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use tracing::trace;

/// リクエストIDヘッダー
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 監査対象から除外すべきパスか判定する
fn should_exclude(path: &str) -> bool {
    matches!(path, "/health" | "/healthz" | "/readyz")
}

/// 監査ログミドルウェア
///
/// 実行者は上流の認証レイヤーが設定した `AuditActor`（リクエスト拡張、なければ
/// レスポンス拡張）から、アクション名と付加情報はハンドラーが設定した
/// `AuditAction`（レスポンス拡張）から取得する。追記が完了してからレスポンスを返す。
pub async fn audit_middleware(
    State(recorder): State<AuditRecorder>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    if should_exclude(&path) {
        return next.run(request).await;
    }

    let client_ip = client_ip_from_headers(request.headers());
    let req_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let request_actor = request.extensions().get::<AuditActor>().cloned();

    let response = next.run(request).await;
    let status = response.status().as_u16();

    let actor = request_actor.or_else(|| response.extensions().get::<AuditActor>().cloned());
    let action = response
        .extensions()
        .get::<AuditAction>()
        .cloned()
        .unwrap_or_else(|| AuditAction::new(format!("{} {}", method, path)));

    trace!(
        method = %method,
        path = %path,
        status,
        action = %action.action,
        "audit event captured"
    );

    let mut draft =
        AuditEventDraft::new(method, path, status, action.action).at(recorder.clock().now());
    draft.meta = action.meta;
    draft.ip = client_ip;
    draft.req_id = req_id;
    if let Some(actor) = actor {
        draft.user_id = Some(actor.user_id);
        draft.scopes = actor.scopes;
    }

    recorder.record(draft).await;
    response
}
