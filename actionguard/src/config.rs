//! Configuration management via environment variables
//!
//! Provides helper functions for reading environment variables with fallback
//! to deprecated variable names with warning logs, plus typed configuration
//! for each subsystem component.

use crate::common::error::CommonError;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Get an environment variable with fallback to a deprecated name
///
/// If the new variable name is set, returns its value.
/// If only the old (deprecated) variable name is set, returns its value
/// and logs a deprecation warning.
///
/// # Example
/// ```
/// use actionguard::config::get_env_with_fallback;
///
/// let url = get_env_with_fallback("ACTIONGUARD_DATABASE_URL", "DATABASE_URL");
/// ```
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// Get an environment variable with fallback and default value
pub fn get_env_with_fallback_or(new_name: &str, old_name: &str, default: &str) -> String {
    get_env_with_fallback(new_name, old_name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable with fallback, parsing to a specific type
///
/// Returns `default` if neither variable is set or parsing fails.
pub fn get_env_with_fallback_parse<T: std::str::FromStr>(
    new_name: &str,
    old_name: &str,
    default: T,
) -> T {
    get_env_with_fallback(new_name, old_name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// データディレクトリを取得
///
/// 環境変数 `ACTIONGUARD_DATA_DIR` が未設定の場合は `~/.actionguard` を使用する。
pub fn data_dir() -> PathBuf {
    if let Some(dir) = get_env_with_fallback("ACTIONGUARD_DATA_DIR", "ACTIONGUARD_HOME") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".actionguard")
}

/// データベース設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// SQLite接続URL
    pub url: String,
    /// 接続プールの最大接続数
    pub max_connections: u32,
    /// ロック待ちのタイムアウト
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    /// Load database configuration from environment variables.
    pub fn from_env() -> Self {
        let url = get_env_with_fallback("ACTIONGUARD_DATABASE_URL", "DATABASE_URL")
            .unwrap_or_else(|| format!("sqlite:{}", data_dir().join("actionguard.db").display()));
        let max_connections =
            get_env_with_fallback_parse("ACTIONGUARD_DB_MAX_CONNECTIONS", "DB_MAX_CONNECTIONS", 8u32);
        let busy_timeout_ms =
            get_env_with_fallback_parse("ACTIONGUARD_DB_BUSY_TIMEOUT_MS", "DB_BUSY_TIMEOUT_MS", 5_000u64);
        Self {
            url,
            max_connections: max_connections.max(1),
            busy_timeout: Duration::from_millis(busy_timeout_ms),
        }
    }
}

/// アクションレジャー設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// 同一冪等キーを重複とみなす時間幅
    pub dedup_window: Duration,
    /// `prune` で保持する期間
    pub retention: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(10),
            retention: Duration::from_secs(90 * 24 * 60 * 60),
        }
    }
}

impl LedgerConfig {
    /// Load ledger configuration from environment variables.
    pub fn from_env() -> Self {
        let dedup_secs =
            get_env_with_fallback_parse("ACTIONGUARD_DEDUP_WINDOW_SECS", "DEDUP_WINDOW_SECS", 10u64);
        let retention_days = get_env_with_fallback_parse(
            "ACTIONGUARD_LEDGER_RETENTION_DAYS",
            "LEDGER_RETENTION_DAYS",
            90u64,
        );
        Self {
            dedup_window: Duration::from_secs(dedup_secs),
            retention: Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60)),
        }
    }
}

/// 監査ログ設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// JSONL監査ログファイルのパス
    pub log_path: PathBuf,
}

impl AuditConfig {
    /// Load audit configuration from environment variables.
    pub fn from_env() -> Self {
        let log_path = get_env_with_fallback("ACTIONGUARD_AUDIT_LOG_PATH", "AUDIT_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir().join("audit.jsonl"));
        Self { log_path }
    }
}

/// HTTP冪等キャッシュのストレージバックエンド
///
/// 起動時に一度だけ選択し、実行中に切り替えない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdempotencyBackend {
    /// プロセス内メモリ（デフォルト）
    #[default]
    Memory,
    /// SQLite `kv_store` テーブル
    Sqlite,
}

impl FromStr for IdempotencyBackend {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "sqlite" | "db" => Ok(Self::Sqlite),
            other => Err(CommonError::Config(format!(
                "unknown idempotency backend '{}' (expected memory|sqlite)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for IdempotencyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// HTTP冪等キャッシュ設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyConfig {
    /// ストレージバックエンド
    pub backend: IdempotencyBackend,
    /// キャッシュエントリの有効期間
    pub ttl: Duration,
    /// 対象とするパスプレフィックス
    pub path_prefixes: Vec<String>,
    /// バッファリングするリクエスト/レスポンスボディの上限
    pub max_body_bytes: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            backend: IdempotencyBackend::Memory,
            ttl: Duration::from_secs(24 * 60 * 60),
            path_prefixes: vec!["/v1/".to_string()],
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl IdempotencyConfig {
    /// Load idempotency cache configuration from environment variables.
    ///
    /// An unknown backend name falls back to `memory` with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let backend = match get_env_with_fallback("ACTIONGUARD_IDEMPOTENCY_BACKEND", "IDEMPOTENCY_BACKEND")
        {
            Some(raw) => raw.parse().unwrap_or_else(|e: CommonError| {
                tracing::warn!("{}; using memory backend", e);
                IdempotencyBackend::Memory
            }),
            None => defaults.backend,
        };
        let ttl_secs = get_env_with_fallback_parse(
            "ACTIONGUARD_IDEMPOTENCY_TTL_SECS",
            "IDEMPOTENCY_TTL_SECS",
            defaults.ttl.as_secs(),
        );
        let path_prefixes = get_env_with_fallback("ACTIONGUARD_IDEMPOTENCY_PATHS", "IDEMPOTENCY_PATHS")
            .map(|raw| parse_path_prefixes(&raw))
            .unwrap_or(defaults.path_prefixes);
        let max_body_bytes = get_env_with_fallback_parse(
            "ACTIONGUARD_IDEMPOTENCY_MAX_BODY_BYTES",
            "IDEMPOTENCY_MAX_BODY_BYTES",
            defaults.max_body_bytes,
        );

        Self {
            backend,
            ttl: Duration::from_secs(ttl_secs),
            path_prefixes,
            max_body_bytes,
        }
    }
}

/// カンマ区切りのパスプレフィックス一覧を解析する
///
/// 空要素は無視し、先頭に `/` がなければ補う。
pub fn parse_path_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.starts_with('/') {
                s.to_string()
            } else {
                format!("/{}", s)
            }
        })
        .collect()
}

/// ログ設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` 形式のログレベル
    pub level: String,
    /// 指定時はローテーションファイルにも出力する
    pub directory: Option<PathBuf>,
}

impl LogConfig {
    /// Load logging configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            level: get_env_with_fallback_or("ACTIONGUARD_LOG_LEVEL", "LOG_LEVEL", "info"),
            directory: get_env_with_fallback("ACTIONGUARD_LOG_DIR", "LOG_DIR").map(PathBuf::from),
        }
    }
}

/// サブシステム全体の設定
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// データベース設定
    pub database: DatabaseConfig,
    /// レジャー設定
    pub ledger: LedgerConfig,
    /// 監査ログ設定
    pub audit: AuditConfig,
    /// HTTP冪等キャッシュ設定
    pub idempotency: IdempotencyConfig,
}

impl GuardConfig {
    /// Load the full configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            database: DatabaseConfig::from_env(),
            ledger: LedgerConfig::from_env(),
            audit: AuditConfig::from_env(),
            idempotency: IdempotencyConfig::from_env(),
        }
    }
}
