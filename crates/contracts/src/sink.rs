//! ByteSink trait - spreader output interface
//!
//! Defines the abstract interface for destinations.

use crate::ContractError;

/// Byte destination trait
///
/// Every destination offers both a blocking and an overlapped write; the
/// spreader picks one according to its write mode. Methods take `&self` so a
/// destination can be shared through an `Arc` by the caller and the spreader
/// at the same time; implementations use interior mutability.
#[trait_variant::make(ByteSink: Send)]
pub trait LocalByteSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one chunk, blocking the calling thread until it is accepted
    ///
    /// # Errors
    /// Returns write error (should include context)
    fn write_blocking(&self, buf: &[u8]) -> Result<(), ContractError>;

    /// Write one chunk without blocking the calling thread
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&self, buf: &[u8]) -> Result<(), ContractError>;

    /// Flush buffer (if any), blocking
    fn flush_blocking(&self) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&self) -> Result<(), ContractError>;
}
