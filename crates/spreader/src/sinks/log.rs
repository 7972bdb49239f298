//! LogSink - logs chunk summaries via tracing

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{ByteSink, ContractError};
use tracing::{info, instrument};

/// Sink that logs chunk summaries for debugging
pub struct LogSink {
    name: String,
    chunks: AtomicU64,
    bytes: AtomicU64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chunks: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn chunks_seen(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    pub fn bytes_seen(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn log_chunk_summary(&self, buf: &[u8]) {
        let index = self.chunks.fetch_add(1, Ordering::Relaxed);
        let total = self.bytes.fetch_add(buf.len() as u64, Ordering::Relaxed) + buf.len() as u64;
        let head = &buf[..buf.len().min(8)];

        info!(
            sink = %self.name,
            index,
            len = buf.len(),
            total_bytes = total,
            head = ?head,
            "Chunk received"
        );
    }
}

impl ByteSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_blocking(&self, buf: &[u8]) -> Result<(), ContractError> {
        self.log_chunk_summary(buf);
        Ok(())
    }

    #[instrument(name = "log_sink_write", skip(self, buf), fields(sink = %self.name, len = buf.len()))]
    async fn write(&self, buf: &[u8]) -> Result<(), ContractError> {
        self.log_chunk_summary(buf);
        Ok(())
    }

    fn flush_blocking(&self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&self) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            chunks = self.chunks_seen(),
            bytes = self.bytes_seen(),
            "LogSink closed"
        );
        Ok(())
    }
}
