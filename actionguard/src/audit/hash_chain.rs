//! SHA-256ハッシュチェーン（改ざん検知）
//!
//! 各行は正規化JSON。`hash` は `hash` を除くフィールド（`prev_hash` を含む）の
//! 正規化JSONに対するSHA-256で、`prev_hash` は直前行の `hash`。

use crate::audit::types::{AuditEvent, AuditEventDraft};
use crate::common::error::{CommonError, GuardError, GuardResult};
use crate::common::hash::sha256_hex;
use serde::Serialize;
use serde_json::{Map, Value};

/// 先頭イベントの `prev_hash`
pub const GENESIS_PREV_HASH: &str = "";

/// オブジェクトのキーを辞書順に並べ、空白なしでシリアライズする
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        leaf => out.push_str(&leaf.to_string()),
    }
}

/// `hash` を除いたイベントのハッシュを計算する
pub fn compute_event_hash(unsealed: &Map<String, Value>) -> String {
    sha256_hex(canonical_json(&Value::Object(unsealed.clone())).as_bytes())
}

/// チェーンに追記できる状態のイベント
#[derive(Debug, Clone)]
pub struct SealedEvent {
    /// 確定したイベント
    pub event: AuditEvent,
    /// ファイルに書き込む1行（改行なし）
    pub line: String,
}

/// 直前ハッシュを埋めてハッシュを計算する
pub fn seal_event(draft: &AuditEventDraft, prev_hash: &str) -> GuardResult<SealedEvent> {
    let Value::Object(mut fields) = serde_json::to_value(draft).map_err(CommonError::from)?
    else {
        return Err(GuardError::Internal(
            "audit event did not serialize to an object".to_string(),
        ));
    };
    fields.insert("prev_hash".to_string(), Value::String(prev_hash.to_string()));
    let hash = compute_event_hash(&fields);
    fields.insert("hash".to_string(), Value::String(hash));

    let value = Value::Object(fields);
    let line = canonical_json(&value);
    let event = serde_json::from_value(value).map_err(CommonError::from)?;
    Ok(SealedEvent { event, line })
}

/// 行に記録された `hash` を取り出す（解析できない行は `None`）
pub fn stored_hash(line: &[u8]) -> Option<String> {
    match serde_json::from_slice::<Value>(line).ok()? {
        Value::Object(map) => map.get("hash")?.as_str().map(str::to_string),
        _ => None,
    }
}

/// 検証で見つかった問題の種類
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainIssueKind {
    /// JSONとして解析できない、または必須フィールドがない
    InvalidRecord {
        /// 理由
        reason: String,
    },
    /// 再計算したハッシュが記録値と一致しない
    HashMismatch {
        /// 再計算した値
        expected: String,
        /// 記録値
        actual: String,
    },
    /// `prev_hash` が直前行の `hash` と一致しない
    PrevHashMismatch {
        /// 直前行の `hash`
        expected: String,
        /// 記録値
        actual: String,
    },
}

/// 検証で見つかった問題
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainIssue {
    /// 1始まりの行番号
    pub line: usize,
    /// 問題の種類
    #[serde(flatten)]
    pub kind: ChainIssueKind,
}

/// チェーン検証結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerificationResult {
    /// 問題がなければtrue
    pub valid: bool,
    /// 検証した行数（空行を除く）
    pub lines_checked: usize,
    /// 見つかった問題（行順）
    pub issues: Vec<ChainIssue>,
}

impl ChainVerificationResult {
    /// 空のログに対する結果
    pub fn empty() -> Self {
        Self {
            valid: true,
            lines_checked: 0,
            issues: Vec::new(),
        }
    }
}

/// 全行のハッシュとリンクを検証する
///
/// 最初の問題で止まらず、問題のある行をすべて報告する。改ざんされた行の
/// 次の行は、改ざん行に記録された `hash` とのリンクで検証する。
pub fn verify_chain<I, L>(lines: I) -> ChainVerificationResult
where
    I: IntoIterator<Item = L>,
    L: AsRef<[u8]>,
{
    let mut issues = Vec::new();
    let mut lines_checked = 0;
    let mut expected_prev: Option<String> = Some(GENESIS_PREV_HASH.to_string());

    for (index, raw) in lines.into_iter().enumerate() {
        let line_no = index + 1;
        let raw = raw.as_ref();
        if raw.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        lines_checked += 1;

        let mut fields = match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                issues.push(invalid(line_no, "not a JSON object"));
                expected_prev = None;
                continue;
            }
            Err(e) => {
                issues.push(invalid(line_no, &e.to_string()));
                expected_prev = None;
                continue;
            }
        };

        let actual_hash = match fields.remove("hash") {
            Some(Value::String(h)) => h,
            _ => {
                issues.push(invalid(line_no, "missing hash"));
                expected_prev = None;
                continue;
            }
        };
        let prev_hash = match fields.get("prev_hash") {
            Some(Value::String(p)) => p.clone(),
            _ => {
                issues.push(invalid(line_no, "missing prev_hash"));
                expected_prev = Some(actual_hash);
                continue;
            }
        };

        let recomputed = compute_event_hash(&fields);
        if recomputed != actual_hash {
            issues.push(ChainIssue {
                line: line_no,
                kind: ChainIssueKind::HashMismatch {
                    expected: recomputed,
                    actual: actual_hash.clone(),
                },
            });
        }
        if let Some(expected) = expected_prev.take() {
            if expected != prev_hash {
                issues.push(ChainIssue {
                    line: line_no,
                    kind: ChainIssueKind::PrevHashMismatch {
                        expected,
                        actual: prev_hash,
                    },
                });
            }
        }
        expected_prev = Some(actual_hash);
    }

    ChainVerificationResult {
        valid: issues.is_empty(),
        lines_checked,
        issues,
    }
}

fn invalid(line: usize, reason: &str) -> ChainIssue {
    ChainIssue {
        line,
        kind: ChainIssueKind::InvalidRecord {
            reason: reason.to_string(),
        },
    }
}
