//! ロギング初期化ユーティリティ
//!
//! `tracing-subscriber` を一度だけ初期化する。ログディレクトリ指定時は
//! `tracing-appender` の日次ローテーションファイルにも出力する。

use crate::common::error::{CommonError, GuardError, GuardResult};
use crate::config::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログファイル名のプレフィックス
pub const LOG_FILE_PREFIX: &str = "actionguard.log";

/// 環境変数の設定でロギングを初期化する
///
/// 戻り値の `WorkerGuard` はプロセス終了まで保持すること（Dropでファイル出力がフラッシュされる）。
pub fn init() -> GuardResult<Option<WorkerGuard>> {
    init_with(&LogConfig::from_env())
}

/// 指定した設定でロギングを初期化する
pub fn init_with(config: &LogConfig) -> GuardResult<Option<WorkerGuard>> {
    let filter = build_filter(&config.level)?;
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                GuardError::Io(format!(
                    "Failed to create log directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|e| {
                    GuardError::Internal(format!("Failed to initialize logging: {}", e))
                })?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()
                .map_err(|e| {
                    GuardError::Internal(format!("Failed to initialize logging: {}", e))
                })?;
            Ok(None)
        }
    }
}

/// `RUST_LOG` が設定されていればそれを優先し、なければ設定値を使う
fn build_filter(level: &str) -> GuardResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| {
        CommonError::Config(format!("Invalid log level '{}': {}", level, e)).into()
    })
}
