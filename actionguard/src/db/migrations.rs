//! データベース初期化とマイグレーション

use crate::common::error::{GuardError, GuardResult};
use crate::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// SQLiteデータベース接続プールを作成してマイグレーションを実行
///
/// ファイルDBの場合は親ディレクトリとファイルを作成し、WALモードと
/// busy timeoutを設定する。
pub async fn initialize_database(config: &DatabaseConfig) -> GuardResult<SqlitePool> {
    let in_memory = is_memory_url(&config.url);
    if !in_memory {
        ensure_parent_dir(&config.url)?;
    }

    let mut options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| GuardError::Database(format!("Invalid database URL: {}", e)))?
        .create_if_missing(true)
        .busy_timeout(config.busy_timeout);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    // インメモリDBは接続ごとに独立するため1接続に制限する
    let max_connections = if in_memory { 1 } else { config.max_connections };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| GuardError::Database(format!("Failed to connect to database: {}", e)))?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// マイグレーションを実行（sqlx::migrate!マクロを使用）
pub async fn run_migrations(pool: &SqlitePool) -> GuardResult<()> {
    tracing::debug!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| GuardError::Database(format!("Failed to run migrations: {}", e)))?;

    tracing::debug!("Database migrations completed successfully");
    Ok(())
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// SQLiteファイルはディレクトリが存在しないと作成できないため、先に作成しておく
fn ensure_parent_dir(database_url: &str) -> GuardResult<()> {
    let Some(path) = database_url.strip_prefix("sqlite:") else {
        return Ok(());
    };
    // `sqlite://` 形式に備えてスラッシュを除去し、クエリ部分を除外
    let normalized = path.trim_start_matches("//");
    let without_params = normalized.split('?').next().unwrap_or(normalized);
    if let Some(parent) = std::path::Path::new(without_params).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                GuardError::Io(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}
