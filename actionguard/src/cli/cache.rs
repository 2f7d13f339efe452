//! cache subcommand

use crate::clock::SystemClock;
use crate::config::{GuardConfig, IdempotencyBackend};
use crate::db::kv_store::SqliteKeyValueStore;
use crate::db::migrations::initialize_database;
use crate::db::traits::KeyValueStore;
use clap::{Args, Subcommand};
use std::sync::Arc;

/// Arguments for the cache subcommand
#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    /// Cache operation
    #[command(subcommand)]
    pub command: CacheCommand,
}

/// Cache operations
#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Delete expired idempotency records from the durable backend
    Purge,
}

/// Execute the cache command
pub async fn execute(args: &CacheArgs, config: &GuardConfig) -> Result<(), anyhow::Error> {
    match args.command {
        CacheCommand::Purge => {
            if config.idempotency.backend == IdempotencyBackend::Memory {
                // メモリバックエンドはプロセスごとに独立しているため外部から消せない
                println!("Idempotency backend is memory; nothing to purge");
                return Ok(());
            }
            let pool = initialize_database(&config.database).await?;
            let store = SqliteKeyValueStore::new(pool.clone(), Arc::new(SystemClock));
            let purged = store.purge_expired().await;
            pool.close().await;
            println!("Purged {} expired idempotency records", purged?);
            Ok(())
        }
    }
}
