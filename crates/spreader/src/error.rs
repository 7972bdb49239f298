//! Spreader error types

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Identity of a registered destination (address of its shared allocation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DestinationId(usize);

impl DestinationId {
    /// Identity of the sink behind `sink`; two clones of one `Arc` share it
    pub fn of<S>(sink: &std::sync::Arc<S>) -> Self {
        Self(std::sync::Arc::as_ptr(sink) as *const () as usize)
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Why a destination chain stopped or an operation on it failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureKind {
    /// Construction-time cancellation observed before writing chunk `seq`
    #[error("cancelled before chunk {seq}")]
    Cancelled { seq: u64 },

    /// The sink rejected chunk `seq`
    #[error("write of chunk {seq} failed: {message}")]
    WriteFailed { seq: u64, message: String },

    /// The sink's flush failed
    #[error("flush failed: {message}")]
    FlushFailed { message: String },

    /// The sink's close failed
    #[error("close failed: {message}")]
    CloseFailed { message: String },

    /// The worker task ended without answering
    #[error("worker stopped unexpectedly")]
    WorkerGone,
}

/// A failure attributed to one destination
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("destination '{name}' ({id}): {kind}")]
pub struct DestinationFailure {
    pub name: String,
    pub id: DestinationId,
    pub kind: FailureKind,
}

/// Spreader-specific errors
#[derive(Debug, Error)]
pub enum SpreaderError {
    /// The same sink instance is already registered
    #[error("destination '{name}' is already registered")]
    DuplicateDestination { name: String },

    /// Read/seek/set_length on a write-only spreader
    #[error("{operation} is not supported by a write-only spreader")]
    UnsupportedOperation { operation: &'static str },

    /// Cancellation observed before or during the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Deadline elapsed before the operation completed
    #[error("operation timed out after {after:?}")]
    TimedOut { after: Duration },

    /// One or more destinations reported a terminal error
    #[error("{} destination(s) failed: {}", .0.len(), join_failures(.0))]
    DestinationFailures(Vec<DestinationFailure>),

    /// `offset..offset + count` is outside the caller's buffer
    #[error("range offset={offset} count={count} exceeds buffer of {len} bytes")]
    InvalidRange {
        offset: usize,
        count: usize,
        len: usize,
    },

    /// Write or registration after `close`
    #[error("spreader is closed")]
    Closed,

    /// Constructed outside a tokio runtime
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// Sink creation error
    #[error("failed to create destination '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Sink error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpreaderError {
    /// Create a duplicate destination error
    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateDestination { name: name.into() }
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: &'static str) -> Self {
        Self::UnsupportedOperation { operation }
    }

    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Per-destination failures carried by this error, if any
    pub fn failures(&self) -> &[DestinationFailure] {
        match self {
            Self::DestinationFailures(failures) => failures,
            _ => &[],
        }
    }
}

fn join_failures(failures: &[DestinationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
