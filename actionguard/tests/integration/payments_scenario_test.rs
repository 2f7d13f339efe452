//! 決済APIの冪等キャッシュシナリオ
//!
//! `AppState::apply_layers` で組み込んだ監査ログ・冪等キャッシュを通して検証する。

use crate::support::build_state;
use actionguard::audit::{AuditQuery, AuditSink, FileAuditLog};
use actionguard::config::IdempotencyBackend;
use actionguard::AppState;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

const KEY: &str = "k1-payment-0001";

fn payments_app(state: &AppState, calls: Arc<AtomicUsize>) -> Router {
    let router = Router::new().route(
        "/v1/payments",
        post(move |Json(_body): Json<Value>| {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Json(json!({"id": format!("tx{}", n)}))
            }
        }),
    );
    state.apply_layers(router)
}

fn payment(amount: u64) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/payments")
        .header("content-type", "application/json")
        .header("idempotency-key", KEY)
        .body(Body::from(json!({"amount": amount}).to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_payment_replay_and_conflict() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let (_clock, state) = build_state(dir.path(), IdempotencyBackend::Memory).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = payments_app(&state, calls.clone());

    let (status, first) = send(&app, payment(100)).await;
    assert_eq!(status, StatusCode::OK);
    let first_json: Value = serde_json::from_slice(&first).unwrap();
    assert_eq!(first_json, json!({"id": "tx1"}));

    let (status, conflict) = send(&app, payment(200)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let conflict_json: Value = serde_json::from_slice(&conflict).unwrap();
    assert_eq!(conflict_json, json!({"error": "idempotency_conflict"}));

    let (status, replayed) = send(&app, payment(100)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replayed, first, "replay must be byte-identical");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "no new transaction");

    // 監査ログには3件すべて（409を含む）が残る
    let audit = FileAuditLog::new(state.config.audit.log_path.clone());
    let events = audit.query(&AuditQuery::default()).await.unwrap();
    let statuses: Vec<u16> = events.iter().rev().map(|e| e.status).collect();
    assert_eq!(statuses, vec![200, 409, 200]);
    assert!(audit.verify().await.unwrap().valid);
}

#[tokio::test]
async fn test_invalid_key_is_rejected_and_audited() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let (_clock, state) = build_state(dir.path(), IdempotencyBackend::Memory).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = payments_app(&state, calls.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/v1/payments")
        .header("content-type", "application/json")
        .header("idempotency-key", "aaaaaaaa")
        .body(Body::from(r#"{"amount":1}"#))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"], "invalid_idempotency_key");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let events = state
        .audit
        .sink()
        .query(&AuditQuery::default())
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, 400);
}

#[tokio::test]
async fn test_durable_cache_survives_restart() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let calls = Arc::new(AtomicUsize::new(0));

    let first = {
        let (_clock, state) = build_state(dir.path(), IdempotencyBackend::Sqlite).await;
        let app = payments_app(&state, calls.clone());
        let (status, body) = send(&app, payment(100)).await;
        assert_eq!(status, StatusCode::OK);
        state.db_pool.close().await;
        body
    };

    let (_clock, state) = build_state(dir.path(), IdempotencyBackend::Sqlite).await;
    let app = payments_app(&state, calls.clone());
    let (status, replayed) = send(&app, payment(100)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replayed, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_retries_run_handler_once() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let (_clock, state) = build_state(dir.path(), IdempotencyBackend::Memory).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let app = payments_app(&state, calls.clone());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        handles.push(tokio::spawn(async move { send(&app, payment(100)).await }));
    }
    let mut bodies = Vec::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        bodies.push(body);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
}
