//! # Stream Spreader CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 把输入流扇出到多个目标
//! - 优雅关闭处理

mod cli;
mod commands;
mod error;
mod stats;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_spread, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Stream Spreader CLI starting"
    );

    let result = match &cli.command {
        Commands::Run(args) => run_spread(args).await,
        Commands::Validate(args) => run_validate(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
///
/// `-q` overrides RUST_LOG; otherwise RUST_LOG wins over `-v`. Logs go to
/// stderr. Metrics are started later by `run` when `--metrics-port` is set.
fn init_logging(cli: &Cli) -> Result<()> {
    let level = observability::ObservabilityConfig::log_level_for(cli.verbose, cli.quiet);
    observability::init_with_config(observability::ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: None,
        default_log_level: level.to_string(),
        force_log_level: cli.quiet,
    })
}
