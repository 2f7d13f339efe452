//! JSONLファイルへの監査ログ
//!
//! プロセス内の追記は非同期Mutexで直列化し、プロセス間は `fs2` の排他ロックで
//! 直列化する。ロック保持中にチェーン末尾を読み直し、O_APPENDハンドルへ
//! 1回の `write_all` で1行を書き込む。

use crate::audit::hash_chain::{
    seal_event, stored_hash, verify_chain, ChainVerificationResult, GENESIS_PREV_HASH,
};
use crate::audit::sink::AuditSink;
use crate::audit::types::{AuditEvent, AuditEventDraft, AuditQuery};
use crate::common::error::{GuardError, GuardResult};
use crate::concurrency::run_to_completion;
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const TAIL_CHUNK: u64 = 8 * 1024;

/// JSONLファイルベースの監査ログ
#[derive(Clone)]
pub struct FileAuditLog {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileAuditLog {
    /// 指定パスの監査ログを作成（ファイルは最初の追記時に作られる）
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// ログファイルのパス
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn io_err(context: &str, path: &Path, e: std::io::Error) -> GuardError {
    GuardError::Io(format!("{} {}: {}", context, path.display(), e))
}

/// チェーン末尾のハッシュと、末尾に改行が欠けているかを返す
fn chain_tail(file: &mut File, path: &Path) -> GuardResult<(String, bool)> {
    let len = file
        .seek(SeekFrom::End(0))
        .map_err(|e| io_err("Failed to seek audit log", path, e))?;
    if len == 0 {
        return Ok((GENESIS_PREV_HASH.to_string(), false));
    }

    let mut chunk = TAIL_CHUNK;
    loop {
        let start = len.saturating_sub(chunk);
        let mut buf = vec![0u8; (len - start) as usize];
        file.seek(SeekFrom::Start(start))
            .and_then(|_| file.read_exact(&mut buf))
            .map_err(|e| io_err("Failed to read audit log", path, e))?;

        let needs_newline = buf.last() != Some(&b'\n');
        let body_end = buf
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map(|i| i + 1)
            .unwrap_or(0);
        let body = &buf[..body_end];

        if let Some(pos) = body.iter().rposition(|b| *b == b'\n') {
            let last = &body[pos + 1..];
            return match stored_hash(last) {
                Some(hash) => Ok((hash, needs_newline)),
                None => Ok((last_valid_hash(file, path)?, needs_newline)),
            };
        }
        if start == 0 {
            let hash = match stored_hash(body) {
                Some(hash) => hash,
                None if body.is_empty() => GENESIS_PREV_HASH.to_string(),
                None => last_valid_hash(file, path)?,
            };
            return Ok((hash, needs_newline && !body.is_empty()));
        }
        chunk = chunk.saturating_mul(2);
    }
}

/// 末尾行が壊れている場合、最後に解析できた行のハッシュを探す
fn last_valid_hash(file: &mut File, path: &Path) -> GuardResult<String> {
    tracing::warn!(path = %path.display(), "Audit log tail is unreadable, scanning for last valid entry");
    let mut content = Vec::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut content))
        .map_err(|e| io_err("Failed to read audit log", path, e))?;
    Ok(content
        .split(|b| *b == b'\n')
        .rev()
        .find_map(stored_hash)
        .unwrap_or_else(|| GENESIS_PREV_HASH.to_string()))
}

fn append_blocking(path: &Path, draft: &AuditEventDraft) -> GuardResult<AuditEvent> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| io_err("Failed to create audit log directory", parent, e))?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| io_err("Failed to open audit log", path, e))?;
    FileExt::lock_exclusive(&file).map_err(|e| io_err("Failed to lock audit log", path, e))?;

    let (prev_hash, needs_newline) = chain_tail(&mut file, path)?;
    let sealed = seal_event(draft, &prev_hash)?;

    let mut buf = Vec::with_capacity(sealed.line.len() + 2);
    if needs_newline {
        buf.push(b'\n');
    }
    buf.extend_from_slice(sealed.line.as_bytes());
    buf.push(b'\n');
    file.write_all(&buf)
        .and_then(|_| file.sync_data())
        .map_err(|e| io_err("Failed to write audit log", path, e))?;

    FileExt::unlock(&file).map_err(|e| io_err("Failed to unlock audit log", path, e))?;
    Ok(sealed.event)
}

/// 共有ロックを取って全内容を読む（ファイルがなければ `None`）
fn read_all_blocking(path: &Path) -> GuardResult<Option<Vec<u8>>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err("Failed to open audit log", path, e)),
    };
    FileExt::lock_shared(&file).map_err(|e| io_err("Failed to lock audit log", path, e))?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)
        .map_err(|e| io_err("Failed to read audit log", path, e))?;
    FileExt::unlock(&file).map_err(|e| io_err("Failed to unlock audit log", path, e))?;
    Ok(Some(content))
}

fn split_lines(content: &[u8]) -> Vec<&[u8]> {
    let mut lines: Vec<&[u8]> = content.split(|b| *b == b'\n').collect();
    // 最終行の改行による空要素
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

#[async_trait]
impl AuditSink for FileAuditLog {
    async fn append(&self, draft: AuditEventDraft) -> GuardResult<AuditEvent> {
        let path = self.path.clone();
        let write_lock = self.write_lock.clone();

        run_to_completion("audit append", async move {
            let _guard = write_lock.lock().await;
            let event = tokio::task::spawn_blocking(move || append_blocking(&path, &draft))
                .await
                .map_err(|e| GuardError::Internal(format!("Audit append task failed: {}", e)))??;
            tracing::trace!(action = %event.action, hash = %event.hash, "Audit event appended");
            Ok(event)
        })
        .await
    }

    async fn verify(&self) -> GuardResult<ChainVerificationResult> {
        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || -> GuardResult<_> {
            Ok(match read_all_blocking(&path)? {
                Some(content) => verify_chain(split_lines(&content)),
                None => ChainVerificationResult::empty(),
            })
        })
        .await
        .map_err(|e| GuardError::Internal(format!("Audit verify task failed: {}", e)))??;

        if result.valid {
            tracing::info!(lines = result.lines_checked, "Audit chain verified");
        } else {
            tracing::warn!(
                lines = result.lines_checked,
                issues = result.issues.len(),
                "Audit chain verification found issues"
            );
        }
        Ok(result)
    }

    async fn query(&self, query: &AuditQuery) -> GuardResult<Vec<AuditEvent>> {
        let path = self.path.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || -> GuardResult<Vec<AuditEvent>> {
            let Some(content) = read_all_blocking(&path)? else {
                return Ok(Vec::new());
            };
            Ok(split_lines(&content)
                .into_iter()
                .rev()
                .filter_map(|line| serde_json::from_slice::<AuditEvent>(line).ok())
                .filter(|event| query.matches(event))
                .take(query.limit)
                .collect())
        })
        .await
        .map_err(|e| GuardError::Internal(format!("Audit query task failed: {}", e)))?
    }
}
