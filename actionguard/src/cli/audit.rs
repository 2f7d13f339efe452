//! audit subcommand
//!
//! 監査ログのハッシュチェーン検証と検索。

use crate::audit::{AuditQuery, AuditSink, ChainVerificationResult, FileAuditLog};
use crate::config::GuardConfig;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Arguments for the audit subcommand
#[derive(Args, Debug, Clone)]
pub struct AuditArgs {
    /// Audit operation
    #[command(subcommand)]
    pub command: AuditCommand,
}

/// Audit operations
#[derive(Subcommand, Debug, Clone)]
pub enum AuditCommand {
    /// Recompute the hash chain and report broken lines
    Verify(VerifyArgs),
    /// Print recent audit events (newest first)
    Query(QueryArgs),
}

/// Arguments for `audit verify`
#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Audit log file (defaults to ACTIONGUARD_AUDIT_LOG_PATH)
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `audit query`
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Audit log file (defaults to ACTIONGUARD_AUDIT_LOG_PATH)
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// Maximum number of events
    #[arg(short, long, default_value_t = 100)]
    pub limit: usize,
    /// Only events at or after this RFC 3339 timestamp
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,
    /// Filter by action name
    #[arg(long)]
    pub action: Option<String>,
    /// Filter by user id
    #[arg(long)]
    pub user: Option<String>,
}

/// Execute the audit command
pub async fn execute(args: &AuditArgs, config: &GuardConfig) -> Result<(), anyhow::Error> {
    match &args.command {
        AuditCommand::Verify(verify) => {
            let log = open_log(verify.path.as_ref(), config);
            let result = log.verify().await?;
            println!("{}", render_verification(&result, verify.json)?);
            if !result.valid {
                anyhow::bail!(
                    "audit chain verification failed: {} issue(s) in {}",
                    result.issues.len(),
                    log.path().display()
                );
            }
            Ok(())
        }
        AuditCommand::Query(query) => {
            let log = open_log(query.path.as_ref(), config);
            let events = log
                .query(&AuditQuery {
                    limit: query.limit,
                    since: query.since,
                    action: query.action.clone(),
                    user_id: query.user.clone(),
                })
                .await?;
            for event in events {
                println!("{}", serde_json::to_string(&event)?);
            }
            Ok(())
        }
    }
}

fn open_log(path: Option<&PathBuf>, config: &GuardConfig) -> FileAuditLog {
    FileAuditLog::new(path.cloned().unwrap_or_else(|| config.audit.log_path.clone()))
}

/// 検証結果を表示用の文字列にする
pub fn render_verification(
    result: &ChainVerificationResult,
    json: bool,
) -> Result<String, anyhow::Error> {
    if json {
        return Ok(serde_json::to_string_pretty(result)?);
    }
    if result.valid {
        return Ok(format!("OK: {} line(s) checked", result.lines_checked));
    }
    let mut out = format!(
        "INVALID: {} line(s) checked, {} issue(s)",
        result.lines_checked,
        result.issues.len()
    );
    for issue in &result.issues {
        out.push_str(&format!("\n  line {}: {}", issue.line, serde_json::to_string(&issue.kind)?));
    }
    Ok(out)
}
