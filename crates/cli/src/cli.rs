//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Stream Spreader - copy one byte stream to many destinations
#[derive(Parser, Debug)]
#[command(
    name = "stream-spreader",
    author,
    version,
    about = "Fan one byte stream out to many destinations",
    long_about = "Reads a source (file or stdin) and replicates it, in order, to every\n\
                  destination from a configuration file or from --output paths.\n\
                  Each destination is written independently, so a slow one never\n\
                  holds up the others."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "STREAM_SPREADER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "STREAM_SPREADER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy the input to every destination
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, env = "STREAM_SPREADER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Extra file destination; may be repeated
    #[arg(short, long = "output", value_name = "PATH")]
    pub outputs: Vec<PathBuf>,

    /// Source file (default: stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Use overlapped (async) writes
    #[arg(long)]
    pub asynchronous: bool,

    /// Keep written chunks so late destinations get a replay
    #[arg(long)]
    pub keep_cached: bool,

    /// Maximum bytes per read from the source
    #[arg(long, env = "STREAM_SPREADER_CHUNK_SIZE")]
    pub chunk_size: Option<usize>,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "STREAM_SPREADER_METRICS_PORT")]
    pub metrics_port: u16,

    /// Run timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "STREAM_SPREADER_TIMEOUT")]
    pub timeout: u64,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "spreader.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
