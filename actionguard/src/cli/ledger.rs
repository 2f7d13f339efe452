//! ledger subcommand
//!
//! 定期ジョブ向けの保持期間削除、全件エクスポート、直近の取り消し可能アクションの確認。

use crate::clock::SystemClock;
use crate::config::GuardConfig;
use crate::db::migrations::initialize_database;
use crate::db::traits::LedgerRepository;
use crate::ledger::{LastReversibleFilter, SqliteLedger};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Arguments for the ledger subcommand
#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    /// Ledger operation
    #[command(subcommand)]
    pub command: LedgerCommand,
}

/// Ledger operations
#[derive(Subcommand, Debug, Clone)]
pub enum LedgerCommand {
    /// Delete entries older than the retention window
    Prune(PruneArgs),
    /// Dump every entry to a JSONL file (oldest first)
    Export(ExportArgs),
    /// Show the most recent reversible entry
    LastReversible(LastReversibleArgs),
}

/// Arguments for `ledger prune`
#[derive(Args, Debug, Clone)]
pub struct PruneArgs {
    /// Retention in days (defaults to ACTIONGUARD_LEDGER_RETENTION_DAYS)
    #[arg(long)]
    pub days: Option<u64>,
}

/// Arguments for `ledger export`
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Output file
    pub path: PathBuf,
}

/// Arguments for `ledger last-reversible`
#[derive(Args, Debug, Clone)]
pub struct LastReversibleArgs {
    /// Restrict to this user
    #[arg(long)]
    pub user: Option<String>,
    /// Restrict to these action types (repeatable)
    #[arg(long = "action-type")]
    pub action_type: Vec<String>,
    /// Skip entries that were already reversed
    #[arg(long)]
    pub exclude_reversed: bool,
}

/// Execute the ledger command
pub async fn execute(args: &LedgerArgs, config: &GuardConfig) -> Result<(), anyhow::Error> {
    let pool = initialize_database(&config.database).await?;
    let ledger = SqliteLedger::new(pool.clone(), Arc::new(SystemClock), config.ledger);
    let output = run_command(&ledger, &args.command, config).await;
    pool.close().await;
    println!("{}", output?);
    Ok(())
}

/// レジャーに対してコマンドを実行し、表示用の文字列を返す
pub async fn run_command(
    ledger: &dyn LedgerRepository,
    command: &LedgerCommand,
    config: &GuardConfig,
) -> Result<String, anyhow::Error> {
    match command {
        LedgerCommand::Prune(prune) => {
            let retention = prune
                .days
                .map(|days| Duration::from_secs(days.saturating_mul(SECS_PER_DAY)))
                .unwrap_or(config.ledger.retention);
            let deleted = ledger.prune(retention).await?;
            Ok(format!("Pruned {} ledger entries", deleted))
        }
        LedgerCommand::Export(export) => {
            let count = ledger.export_jsonl(&export.path).await?;
            Ok(format!(
                "Exported {} ledger entries to {}",
                count,
                export.path.display()
            ))
        }
        LedgerCommand::LastReversible(lr) => {
            let filter = LastReversibleFilter {
                user_id: lr.user.clone(),
                action_types: if lr.action_type.is_empty() {
                    None
                } else {
                    Some(lr.action_type.clone())
                },
                exclude_reversed: lr.exclude_reversed,
            };
            match ledger.get_last_reversible(&filter).await? {
                Some(entry) => Ok(serde_json::to_string_pretty(&entry)?),
                None => Ok("No reversible action found".to_string()),
            }
        }
    }
}
