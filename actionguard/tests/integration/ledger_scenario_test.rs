//! レジャーの重複排除シナリオ

use crate::support::build_state;
use actionguard::config::IdempotencyBackend;
use actionguard::db::traits::LedgerRepository;
use actionguard::ledger::{LastReversibleFilter, NewAction};
use serde_json::json;

fn toggle_kitchen() -> NewAction {
    NewAction::new("lights.toggle", "LightsSkill")
        .slots(json!({"entity": "light.kitchen"}))
        .reversible(true)
        .idempotency_key("ha:light.kitchen:173000")
        .user_id("alice")
}

#[tokio::test]
async fn test_repeated_action_is_recorded_once_per_window() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let (clock, state) = build_state(dir.path(), IdempotencyBackend::Memory).await;

    let first = state.ledger.record(toggle_kitchen()).await.unwrap();
    assert!(first.inserted);

    clock.advance(chrono::Duration::seconds(3));
    let second = state.ledger.record(toggle_kitchen()).await.unwrap();
    assert!(!second.inserted);
    assert_eq!(second.id, first.id);

    clock.advance(chrono::Duration::seconds(12));
    let third = state.ledger.record(toggle_kitchen()).await.unwrap();
    assert!(third.inserted);
    assert_eq!(third.id, first.id + 1);

    assert_eq!(state.ledger.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_undo_flow_links_reverse_action() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let (clock, state) = build_state(dir.path(), IdempotencyBackend::Memory).await;

    let forward = state.ledger.record(toggle_kitchen()).await.unwrap();
    clock.advance(chrono::Duration::seconds(1));

    let filter = LastReversibleFilter {
        exclude_reversed: true,
        ..LastReversibleFilter::for_user("alice")
    };
    let target = state
        .ledger
        .get_last_reversible(&filter)
        .await
        .unwrap()
        .expect("a reversible entry should exist");
    assert_eq!(target.id, forward.id);

    let undo = state
        .ledger
        .record(
            NewAction::new("lights.toggle", "UndoSkill")
                .slots(target.slots.clone())
                .user_id("alice"),
        )
        .await
        .unwrap();
    assert!(state.ledger.link_reverse(target.id, undo.id).await.unwrap());

    assert!(state.ledger.get_last_reversible(&filter).await.unwrap().is_none());
    let stored = state.ledger.get(forward.id).await.unwrap().unwrap();
    assert_eq!(stored.reverse_id, Some(undo.id));
}

#[tokio::test]
async fn test_concurrent_duplicates_share_one_row() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let (_clock, state) = build_state(dir.path(), IdempotencyBackend::Memory).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let ledger = state.ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.record(toggle_kitchen()).await.unwrap()
        }));
    }
    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(outcomes.iter().filter(|o| o.inserted).count(), 1);
    let id = outcomes[0].id;
    assert!(outcomes.iter().all(|o| o.id == id));
    assert_eq!(state.ledger.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_export_after_prune() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let (clock, state) = build_state(dir.path(), IdempotencyBackend::Memory).await;

    state
        .ledger
        .record(NewAction::new("timer.set", "TimerSkill"))
        .await
        .unwrap();
    clock.advance(chrono::Duration::days(100));
    state.ledger.record(toggle_kitchen()).await.unwrap();

    let pruned = state
        .ledger
        .prune(state.config.ledger.retention)
        .await
        .unwrap();
    assert_eq!(pruned, 1);

    let export = dir.path().join("export.jsonl");
    assert_eq!(state.ledger.export_jsonl(&export).await.unwrap(), 1);
    let line = std::fs::read_to_string(&export).unwrap();
    let entry: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(entry["action_type"], "lights.toggle");
}
