//! actionguard CLI entry point

use actionguard::cli::{self, Cli};
use actionguard::config::GuardConfig;
use actionguard::logging;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let _log_guard = logging::init()?;
    cli::run(cli, GuardConfig::from_env()).await
}
