//! MemorySink - accumulates every write in an in-memory buffer

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use contracts::{ByteSink, ContractError};

/// Sink that keeps everything written to it
pub struct MemorySink {
    name: String,
    buffer: Mutex<Vec<u8>>,
    write_calls: AtomicU64,
    flush_calls: AtomicU64,
    closed: AtomicBool,
}

impl MemorySink {
    /// Create a new MemorySink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer: Mutex::new(Vec::new()),
            write_calls: AtomicU64::new(0),
            flush_calls: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> Vec<u8> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::Relaxed)
    }

    pub fn flush_calls(&self) -> u64 {
        self.flush_calls.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn append(&self, buf: &[u8]) -> Result<(), ContractError> {
        if self.is_closed() {
            return Err(ContractError::sink_write(&self.name, "sink is closed"));
        }
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl ByteSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_blocking(&self, buf: &[u8]) -> Result<(), ContractError> {
        self.append(buf)
    }

    async fn write(&self, buf: &[u8]) -> Result<(), ContractError> {
        self.append(buf)
    }

    fn flush_blocking(&self) -> Result<(), ContractError> {
        self.flush_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn flush(&self) -> Result<(), ContractError> {
        self.flush_blocking()
    }

    async fn close(&self) -> Result<(), ContractError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
