//! アクションレジャーのストレージ層
//!
//! `action_ledger` テーブルへの記録・重複排除・取り消しリンク・保持期間削除を行う。

use crate::clock::SharedClock;
use crate::common::error::{CommonError, GuardError, GuardResult};
use crate::concurrency::{run_to_completion, KeyedLocks};
use crate::config::LedgerConfig;
use crate::db::traits::LedgerRepository;
use crate::ledger::types::{
    format_timestamp, parse_timestamp, LastReversibleFilter, LedgerEntry, NewAction,
    RecordOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENTRY_COLUMNS: &str = "id, action_type, skill_origin, slots, reversible, reverse_id, \
                             timestamp, idempotency_key, user_id";

/// sqlx::FromRow用の行構造体
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: i64,
    action_type: String,
    skill_origin: String,
    slots: String,
    reversible: i64,
    reverse_id: Option<i64>,
    timestamp: String,
    idempotency_key: Option<String>,
    user_id: Option<String>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = GuardError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| {
            GuardError::Database(format!(
                "Invalid timestamp '{}' in ledger entry {}",
                row.timestamp, row.id
            ))
        })?;
        let slots = serde_json::from_str(&row.slots).map_err(|e| {
            GuardError::Database(format!("Invalid slots in ledger entry {}: {}", row.id, e))
        })?;
        Ok(LedgerEntry {
            id: row.id,
            action_type: row.action_type,
            skill_origin: row.skill_origin,
            slots,
            reversible: row.reversible != 0,
            reverse_id: row.reverse_id,
            timestamp,
            idempotency_key: row.idempotency_key,
            user_id: row.user_id,
        })
    }
}

/// SQLiteベースのアクションレジャー
#[derive(Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
    clock: SharedClock,
    dedup_window: Duration,
    locks: KeyedLocks,
}

impl SqliteLedger {
    /// 新しいレジャーを作成
    pub fn new(pool: SqlitePool, clock: SharedClock, config: LedgerConfig) -> Self {
        Self {
            pool,
            clock,
            dedup_window: config.dedup_window,
            locks: KeyedLocks::new(),
        }
    }

    /// 重複排除ウィンドウ
    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }
}

/// `now - window` を計算する（UNIXエポックより前には遡らない）
fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let epoch = DateTime::<Utc>::default();
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .filter(|start| *start > epoch)
        .unwrap_or(epoch)
}

async fn insert_action(
    pool: &SqlitePool,
    action: &NewAction,
    slots: &str,
    now: DateTime<Utc>,
    window: Duration,
) -> GuardResult<RecordOutcome> {
    let timestamp = format_timestamp(now);
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| GuardError::Database(format!("Failed to begin ledger transaction: {}", e)))?;

    let outcome = match action.idempotency_key.as_deref() {
        Some(key) => {
            let cutoff = format_timestamp(window_start(now, window));
            // 判定と挿入を1文で行うため、同一キーの並行挿入は片方しか成功しない
            let result = sqlx::query(
                r#"
                INSERT INTO action_ledger
                    (action_type, skill_origin, slots, reversible, timestamp, idempotency_key, user_id)
                SELECT ?, ?, ?, ?, ?, ?, ?
                WHERE NOT EXISTS (
                    SELECT 1 FROM action_ledger WHERE idempotency_key = ? AND timestamp > ?
                )
                "#,
            )
            .bind(&action.action_type)
            .bind(&action.skill_origin)
            .bind(slots)
            .bind(action.reversible)
            .bind(&timestamp)
            .bind(key)
            .bind(&action.user_id)
            .bind(key)
            .bind(&cutoff)
            .execute(&mut *tx)
            .await
            .map_err(|e| GuardError::Database(format!("Failed to record action: {}", e)))?;

            if result.rows_affected() == 1 {
                RecordOutcome {
                    inserted: true,
                    id: result.last_insert_rowid(),
                }
            } else {
                let id: i64 = sqlx::query_scalar(
                    r#"
                    SELECT id FROM action_ledger
                    WHERE idempotency_key = ? AND timestamp > ?
                    ORDER BY timestamp DESC, id DESC
                    LIMIT 1
                    "#,
                )
                .bind(key)
                .bind(&cutoff)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    GuardError::Database(format!("Failed to look up duplicate action: {}", e))
                })?;
                RecordOutcome {
                    inserted: false,
                    id,
                }
            }
        }
        None => {
            let result = sqlx::query(
                r#"
                INSERT INTO action_ledger
                    (action_type, skill_origin, slots, reversible, timestamp, idempotency_key, user_id)
                VALUES (?, ?, ?, ?, ?, NULL, ?)
                "#,
            )
            .bind(&action.action_type)
            .bind(&action.skill_origin)
            .bind(slots)
            .bind(action.reversible)
            .bind(&timestamp)
            .bind(&action.user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| GuardError::Database(format!("Failed to record action: {}", e)))?;
            RecordOutcome {
                inserted: true,
                id: result.last_insert_rowid(),
            }
        }
    };

    tx.commit()
        .await
        .map_err(|e| GuardError::Database(format!("Failed to commit ledger entry: {}", e)))?;
    Ok(outcome)
}

fn write_jsonl(target: &Path, entries: &[LedgerEntry]) -> GuardResult<()> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&parent).map_err(|e| {
        GuardError::Io(format!(
            "Failed to create export directory {}: {}",
            parent.display(),
            e
        ))
    })?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ledger.jsonl".to_string());
    let tmp_path = parent.join(format!(".{}.tmp-{}", file_name, uuid::Uuid::new_v4()));

    let result = (|| -> GuardResult<()> {
        let file = std::fs::File::create(&tmp_path)
            .map_err(|e| GuardError::Io(format!("Failed to create export file: {}", e)))?;
        let mut writer = std::io::BufWriter::new(file);
        for entry in entries {
            let line = serde_json::to_string(entry).map_err(CommonError::from)?;
            writeln!(writer, "{}", line)
                .map_err(|e| GuardError::Io(format!("Failed to write export file: {}", e)))?;
        }
        let file = writer
            .into_inner()
            .map_err(|e| GuardError::Io(format!("Failed to flush export file: {}", e)))?;
        file.sync_all()
            .map_err(|e| GuardError::Io(format!("Failed to sync export file: {}", e)))?;
        std::fs::rename(&tmp_path, target)
            .map_err(|e| GuardError::Io(format!("Failed to replace export file: {}", e)))
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    result
}

#[async_trait]
impl LedgerRepository for SqliteLedger {
    async fn record(&self, action: NewAction) -> GuardResult<RecordOutcome> {
        action.validate()?;
        let slots = serde_json::to_string(&action.slots).map_err(CommonError::from)?;

        let pool = self.pool.clone();
        let clock = self.clock.clone();
        let locks = self.locks.clone();
        let window = self.dedup_window;

        let outcome = run_to_completion("ledger record", async move {
            let _guard = match action.idempotency_key.as_deref() {
                Some(key) => Some(locks.lock(key).await),
                None => None,
            };
            let outcome = insert_action(&pool, &action, &slots, clock.now(), window).await?;
            if outcome.inserted {
                tracing::debug!(
                    id = outcome.id,
                    action_type = %action.action_type,
                    skill = %action.skill_origin,
                    "Recorded action"
                );
            } else {
                tracing::info!(
                    id = outcome.id,
                    action_type = %action.action_type,
                    idempotency_key = ?action.idempotency_key,
                    "Duplicate action within dedup window"
                );
            }
            Ok(outcome)
        })
        .await;

        if let Err(e) = &outcome {
            tracing::error!(error = %e, "Failed to record action in ledger");
        }
        outcome
    }

    async fn link_reverse(&self, forward_id: i64, reverse_id: i64) -> GuardResult<bool> {
        let result = sqlx::query(
            "UPDATE action_ledger SET reverse_id = ? WHERE id = ? AND reverse_id IS NULL",
        )
        .bind(reverse_id)
        .bind(forward_id)
        .execute(&self.pool)
        .await
        .map_err(|e| GuardError::Database(format!("Failed to link reverse action: {}", e)))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let current: Option<Option<i64>> =
            sqlx::query_scalar("SELECT reverse_id FROM action_ledger WHERE id = ?")
                .bind(forward_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    GuardError::Database(format!("Failed to read ledger entry: {}", e))
                })?;

        match current {
            None => {
                tracing::warn!(forward_id, reverse_id, "Cannot link reverse: unknown entry");
                Ok(false)
            }
            Some(Some(existing)) if existing == reverse_id => Ok(true),
            Some(existing) => {
                tracing::warn!(
                    forward_id,
                    reverse_id,
                    existing = ?existing,
                    "Entry already linked to another reverse action"
                );
                Ok(false)
            }
        }
    }

    async fn get_last_reversible(
        &self,
        filter: &LastReversibleFilter,
    ) -> GuardResult<Option<LedgerEntry>> {
        let mut conditions = vec!["reversible = 1".to_string()];
        let mut bind_values: Vec<String> = Vec::new();

        if let Some(ref user_id) = filter.user_id {
            conditions.push("user_id = ?".to_string());
            bind_values.push(user_id.clone());
        }
        if let Some(ref types) = filter.action_types {
            if types.is_empty() {
                return Ok(None);
            }
            let placeholders = vec!["?"; types.len()].join(", ");
            conditions.push(format!("action_type IN ({})", placeholders));
            bind_values.extend(types.iter().cloned());
        }
        if filter.exclude_reversed {
            conditions.push("reverse_id IS NULL".to_string());
        }

        let sql = format!(
            "SELECT {} FROM action_ledger WHERE {} ORDER BY timestamp DESC, id DESC LIMIT 1",
            ENTRY_COLUMNS,
            conditions.join(" AND ")
        );
        let mut query = sqlx::query_as::<_, LedgerRow>(&sql);
        for val in &bind_values {
            query = query.bind(val.as_str());
        }
        let row = query.fetch_optional(&self.pool).await.map_err(|e| {
            GuardError::Database(format!("Failed to query reversible actions: {}", e))
        })?;

        row.map(LedgerEntry::try_from).transpose()
    }

    async fn prune(&self, retention: Duration) -> GuardResult<u64> {
        // 重複排除ウィンドウ内のエントリは削除しない
        let effective = retention.max(self.dedup_window);
        if effective > retention {
            tracing::debug!(
                retention_secs = retention.as_secs(),
                window_secs = self.dedup_window.as_secs(),
                "Prune retention clamped to dedup window"
            );
        }
        let cutoff = format_timestamp(window_start(self.clock.now(), effective));

        let result = sqlx::query("DELETE FROM action_ledger WHERE timestamp < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| GuardError::Database(format!("Failed to prune ledger: {}", e)))?;

        let deleted = result.rows_affected();
        tracing::info!(deleted, cutoff = %cutoff, "Pruned ledger entries");
        Ok(deleted)
    }

    async fn get(&self, id: i64) -> GuardResult<Option<LedgerEntry>> {
        let sql = format!("SELECT {} FROM action_ledger WHERE id = ?", ENTRY_COLUMNS);
        let row = sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| GuardError::Database(format!("Failed to get ledger entry: {}", e)))?;
        row.map(LedgerEntry::try_from).transpose()
    }

    async fn count(&self) -> GuardResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM action_ledger")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| GuardError::Database(format!("Failed to count ledger entries: {}", e)))
    }

    async fn export_jsonl(&self, target: &Path) -> GuardResult<u64> {
        let sql = format!(
            "SELECT {} FROM action_ledger ORDER BY timestamp ASC, id ASC",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query_as::<_, LedgerRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| GuardError::Database(format!("Failed to read ledger: {}", e)))?;
        let entries = rows
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect::<GuardResult<Vec<_>>>()?;

        let count = entries.len() as u64;
        let target_path = target.to_path_buf();
        tokio::task::spawn_blocking(move || write_jsonl(&target_path, &entries))
            .await
            .map_err(|e| GuardError::Internal(format!("Export task failed: {}", e)))??;

        tracing::info!(count, path = %target.display(), "Exported ledger");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::test_utils::{file_db_pool, test_db_pool};
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::Arc;

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    async fn ledger_with_clock() -> (SqliteLedger, ManualClock) {
        let clock = ManualClock::new(start_time());
        let ledger = SqliteLedger::new(
            test_db_pool().await,
            Arc::new(clock.clone()),
            LedgerConfig::default(),
        );
        (ledger, clock)
    }

    fn toggle_kitchen() -> NewAction {
        NewAction::new("lights.toggle", "LightsSkill")
            .slots(json!({"entity": "light.kitchen"}))
            .reversible(true)
            .idempotency_key("ha:light.kitchen:173000")
            .user_id("alice")
    }

    #[tokio::test]
    async fn test_duplicate_within_window_returns_existing_id() {
        let (ledger, clock) = ledger_with_clock().await;

        let first = ledger.record(toggle_kitchen()).await.unwrap();
        assert!(first.inserted);

        clock.advance(chrono::Duration::seconds(3));
        let second = ledger.record(toggle_kitchen()).await.unwrap();
        assert_eq!(
            second,
            RecordOutcome {
                inserted: false,
                id: first.id
            }
        );

        clock.advance(chrono::Duration::seconds(12));
        let third = ledger.record(toggle_kitchen()).await.unwrap();
        assert!(third.inserted, "window expired, a new row is expected");
        assert_eq!(third.id, first.id + 1);
        assert_eq!(ledger.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_record_without_key_always_inserts() {
        let (ledger, _clock) = ledger_with_clock().await;
        let a = ledger.record(NewAction::new("timer.set", "Timer")).await.unwrap();
        let b = ledger.record(NewAction::new("timer.set", "Timer")).await.unwrap();
        assert!(a.inserted && b.inserted);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_different_keys_are_independent() {
        let (ledger, _clock) = ledger_with_clock().await;
        let a = ledger
            .record(NewAction::new("x", "s").idempotency_key("key-a"))
            .await
            .unwrap();
        let b = ledger
            .record(NewAction::new("x", "s").idempotency_key("key-b"))
            .await
            .unwrap();
        assert!(a.inserted && b.inserted);
    }

    #[tokio::test]
    async fn test_record_rejects_invalid_action() {
        let (ledger, _clock) = ledger_with_clock().await;
        let err = ledger
            .record(NewAction::new("x", "s").slots(json!("not an object")))
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(ledger.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_record_fails_loudly_when_storage_is_closed() {
        let (ledger, _clock) = ledger_with_clock().await;
        ledger.pool.close().await;
        let err = ledger.record(toggle_kitchen()).await.unwrap_err();
        assert!(matches!(err, GuardError::Database(_)), "got {:?}", err);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_insert_once() {
        let dir = tempfile::tempdir().unwrap();
        let pool = file_db_pool(dir.path()).await;
        let ledger = Arc::new(SqliteLedger::new(
            pool,
            Arc::new(ManualClock::new(start_time())),
            LedgerConfig::default(),
        ));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
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
        assert_eq!(ledger.count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_separate_ledgers_on_same_database_insert_once() {
        // キーロックを共有しない2インスタンスでもトランザクションで守られる
        let dir = tempfile::tempdir().unwrap();
        let pool = file_db_pool(dir.path()).await;
        let clock: SharedClock = Arc::new(ManualClock::new(start_time()));
        let a = SqliteLedger::new(pool.clone(), clock.clone(), LedgerConfig::default());
        let b = SqliteLedger::new(pool, clock, LedgerConfig::default());

        let mut handles = Vec::new();
        for i in 0..10 {
            let ledger = if i % 2 == 0 { a.clone() } else { b.clone() };
            handles.push(tokio::spawn(async move {
                ledger.record(toggle_kitchen()).await.unwrap()
            }));
        }
        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(a.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_link_reverse_is_set_once() {
        let (ledger, _clock) = ledger_with_clock().await;
        let forward = ledger.record(toggle_kitchen()).await.unwrap().id;
        let undo = ledger
            .record(NewAction::new("lights.toggle", "LightsSkill"))
            .await
            .unwrap()
            .id;
        let other = ledger.record(NewAction::new("x", "s")).await.unwrap().id;

        assert!(ledger.link_reverse(forward, undo).await.unwrap());
        assert!(
            ledger.link_reverse(forward, undo).await.unwrap(),
            "repeating the same link is idempotent"
        );
        assert!(!ledger.link_reverse(forward, other).await.unwrap());
        assert!(!ledger.link_reverse(9_999, undo).await.unwrap());

        let entry = ledger.get(forward).await.unwrap().unwrap();
        assert_eq!(entry.reverse_id, Some(undo));
    }

    #[tokio::test]
    async fn test_get_last_reversible_filters() {
        let (ledger, clock) = ledger_with_clock().await;
        let alice_lights = ledger.record(toggle_kitchen()).await.unwrap().id;
        clock.advance(chrono::Duration::seconds(1));
        let alice_timer = ledger
            .record(
                NewAction::new("timer.set", "TimerSkill")
                    .reversible(true)
                    .user_id("alice"),
            )
            .await
            .unwrap()
            .id;
        clock.advance(chrono::Duration::seconds(1));
        ledger
            .record(NewAction::new("reminder.send", "Reminders").user_id("alice"))
            .await
            .unwrap();
        let bob = ledger
            .record(NewAction::new("lights.toggle", "LightsSkill").reversible(true).user_id("bob"))
            .await
            .unwrap()
            .id;

        let latest = ledger
            .get_last_reversible(&LastReversibleFilter::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, bob);

        let alice = ledger
            .get_last_reversible(&LastReversibleFilter::for_user("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alice.id, alice_timer, "non-reversible entries are skipped");

        let lights_only = LastReversibleFilter {
            user_id: Some("alice".into()),
            action_types: Some(vec!["lights.toggle".into()]),
            exclude_reversed: false,
        };
        let found = ledger.get_last_reversible(&lights_only).await.unwrap().unwrap();
        assert_eq!(found.id, alice_lights);
        assert_eq!(found.slots, json!({"entity": "light.kitchen"}));

        let none = LastReversibleFilter {
            action_types: Some(vec![]),
            ..LastReversibleFilter::default()
        };
        assert!(ledger.get_last_reversible(&none).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_last_reversible_can_skip_reversed() {
        let (ledger, _clock) = ledger_with_clock().await;
        let first = ledger
            .record(NewAction::new("a", "s").reversible(true))
            .await
            .unwrap()
            .id;
        let second = ledger
            .record(NewAction::new("a", "s").reversible(true))
            .await
            .unwrap()
            .id;
        assert!(ledger.link_reverse(second, first).await.unwrap());

        let mut filter = LastReversibleFilter::default();
        assert_eq!(
            ledger.get_last_reversible(&filter).await.unwrap().unwrap().id,
            second,
            "same timestamp ties are broken by id"
        );
        filter.exclude_reversed = true;
        assert_eq!(
            ledger.get_last_reversible(&filter).await.unwrap().unwrap().id,
            first
        );
    }

    #[tokio::test]
    async fn test_prune_deletes_old_entries_and_never_reuses_ids() {
        let (ledger, clock) = ledger_with_clock().await;
        let old = ledger.record(NewAction::new("a", "s")).await.unwrap().id;
        clock.advance(chrono::Duration::days(2));
        let recent = ledger.record(NewAction::new("a", "s")).await.unwrap().id;

        let deleted = ledger.prune(Duration::from_secs(24 * 60 * 60)).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(ledger.get(old).await.unwrap().is_none());
        assert!(ledger.get(recent).await.unwrap().is_some());

        // 最大IDを削除しても再利用されない
        clock.advance(chrono::Duration::days(2));
        ledger.prune(Duration::from_secs(60)).await.unwrap();
        assert_eq!(ledger.count().await.unwrap(), 0);
        let next = ledger.record(NewAction::new("a", "s")).await.unwrap().id;
        assert!(next > recent);
    }

    #[tokio::test]
    async fn test_prune_never_cuts_into_dedup_window() {
        let (ledger, clock) = ledger_with_clock().await;
        let first = ledger.record(toggle_kitchen()).await.unwrap();
        clock.advance(chrono::Duration::seconds(5));

        let deleted = ledger.prune(Duration::ZERO).await.unwrap();
        assert_eq!(deleted, 0, "entries inside the dedup window must survive");

        let retry = ledger.record(toggle_kitchen()).await.unwrap();
        assert_eq!(
            retry,
            RecordOutcome {
                inserted: false,
                id: first.id
            }
        );
    }

    #[tokio::test]
    async fn test_export_jsonl_in_timestamp_order() {
        let (ledger, clock) = ledger_with_clock().await;
        ledger.record(toggle_kitchen()).await.unwrap();
        clock.advance(chrono::Duration::seconds(30));
        ledger.record(NewAction::new("timer.set", "Timer")).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("exports").join("ledger.jsonl");
        let count = ledger.export_jsonl(&target).await.unwrap();
        assert_eq!(count, 2);

        let content = std::fs::read_to_string(&target).unwrap();
        let entries: Vec<LedgerEntry> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action_type, "lights.toggle");
        assert!(entries[0].timestamp < entries[1].timestamp);

        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "temporary files must be renamed away");
    }

    #[test]
    fn test_window_start_saturates() {
        let now = start_time();
        assert_eq!(
            window_start(now, Duration::from_secs(10)),
            now - chrono::Duration::seconds(10)
        );
        assert_eq!(
            window_start(now, Duration::from_secs(u64::MAX)),
            DateTime::<Utc>::default()
        );
    }
}
