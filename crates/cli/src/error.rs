//! Error types for CLI operations.

use std::path::PathBuf;

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Nothing to write to
    #[error("No destinations: pass --config with destinations or at least one --output")]
    NoDestinations,

    /// Source could not be opened
    #[error("Failed to open input {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Run exceeded `--timeout`
    #[error("Run timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Run interrupted by a shutdown signal
    #[error("Interrupted by shutdown signal")]
    Interrupted,

    /// Spreader error
    #[error(transparent)]
    Spreader(#[from] spreader::SpreaderError),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn input(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Input {
            path: path.into(),
            source,
        }
    }
}
