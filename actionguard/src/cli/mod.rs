//! CLI module for actionguard
//!
//! 監査ログの検証・検索、レジャーの保守、冪等キャッシュの掃除を行う。

pub mod audit;
pub mod cache;
pub mod ledger;

use crate::config::GuardConfig;
use clap::{Parser, Subcommand};

/// actionguard - Action ledger, idempotency cache and tamper-evident audit log
#[derive(Parser, Debug)]
#[command(name = "actionguard")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    ACTIONGUARD_DATABASE_URL             Ledger database URL (default: sqlite:~/.actionguard/actionguard.db)
    ACTIONGUARD_AUDIT_LOG_PATH           Audit log file (default: ~/.actionguard/audit.jsonl)
    ACTIONGUARD_DEDUP_WINDOW_SECS        Ledger dedup window (default: 10)
    ACTIONGUARD_LEDGER_RETENTION_DAYS    Ledger retention for prune (default: 90)
    ACTIONGUARD_IDEMPOTENCY_BACKEND      memory | sqlite (default: memory)
    ACTIONGUARD_IDEMPOTENCY_TTL_SECS     Cached response TTL (default: 86400)
    ACTIONGUARD_IDEMPOTENCY_PATHS        Comma-separated path prefixes (default: /v1/)
    ACTIONGUARD_IDEMPOTENCY_MAX_BODY_BYTES  Max cached body size (default: 1048576)
    ACTIONGUARD_LOG_LEVEL                Log level (default: info)
    ACTIONGUARD_LOG_DIR                  Daily rolling log file directory
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Verify or query the audit log
    Audit(audit::AuditArgs),
    /// Maintain the action ledger
    Ledger(ledger::LedgerArgs),
    /// Maintain the idempotency cache
    Cache(cache::CacheArgs),
}

/// サブコマンドを実行する
pub async fn run(cli: Cli, config: GuardConfig) -> Result<(), anyhow::Error> {
    match cli.command {
        Commands::Audit(args) => audit::execute(&args, &config).await,
        Commands::Ledger(args) => ledger::execute(&args, &config).await,
        Commands::Cache(args) => cache::execute(&args, &config).await,
    }
}
