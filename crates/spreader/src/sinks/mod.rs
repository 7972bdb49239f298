//! Sink implementations
//!
//! Contains MemorySink, FileSink and LogSink, plus `ConfiguredSink` which
//! builds one of them from a `DestinationConfig`.

mod file;
mod log;
mod memory;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
pub use self::memory::MemorySink;

use contracts::{ByteSink, ContractError, DestinationConfig, DestinationKind};
use tracing::instrument;

use crate::error::SpreaderError;

/// A destination built from configuration
pub enum ConfiguredSink {
    Memory(MemorySink),
    File(FileSink),
    Log(LogSink),
}

impl ConfiguredSink {
    /// Create a sink from its configuration entry
    #[instrument(
        name = "configured_sink_build",
        skip(config),
        fields(sink = %config.name, kind = ?config.kind)
    )]
    pub fn from_config(config: &DestinationConfig) -> Result<Self, SpreaderError> {
        match config.kind {
            DestinationKind::Memory => Ok(Self::Memory(MemorySink::new(&config.name))),
            DestinationKind::Log => Ok(Self::Log(LogSink::new(&config.name))),
            DestinationKind::File => FileSink::from_params(&config.name, &config.params)
                .map(Self::File)
                .map_err(|e| SpreaderError::sink_creation(&config.name, e.to_string())),
        }
    }
}

impl ByteSink for ConfiguredSink {
    fn name(&self) -> &str {
        match self {
            Self::Memory(s) => s.name(),
            Self::File(s) => s.name(),
            Self::Log(s) => s.name(),
        }
    }

    fn write_blocking(&self, buf: &[u8]) -> Result<(), ContractError> {
        match self {
            Self::Memory(s) => s.write_blocking(buf),
            Self::File(s) => s.write_blocking(buf),
            Self::Log(s) => s.write_blocking(buf),
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<(), ContractError> {
        match self {
            Self::Memory(s) => s.write(buf).await,
            Self::File(s) => s.write(buf).await,
            Self::Log(s) => s.write(buf).await,
        }
    }

    fn flush_blocking(&self) -> Result<(), ContractError> {
        match self {
            Self::Memory(s) => s.flush_blocking(),
            Self::File(s) => s.flush_blocking(),
            Self::Log(s) => s.flush_blocking(),
        }
    }

    async fn flush(&self) -> Result<(), ContractError> {
        match self {
            Self::Memory(s) => s.flush().await,
            Self::File(s) => s.flush().await,
            Self::Log(s) => s.flush().await,
        }
    }

    async fn close(&self) -> Result<(), ContractError> {
        match self {
            Self::Memory(s) => s.close().await,
            Self::File(s) => s.close().await,
            Self::Log(s) => s.close().await,
        }
    }
}
