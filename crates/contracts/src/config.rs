//! SpreaderConfig - Config Loader output
//!
//! Describes the write mode, replay policy and the destination routing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete spreader configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SpreaderConfig {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Use overlapped (async) writes instead of blocking writes
    #[serde(default)]
    pub asynchronous: bool,

    /// Retain every chunk and replay it to destinations added later
    #[serde(default)]
    pub keep_cached: bool,

    /// Make `flush` wait for `finish_writing` before draining
    #[serde(default)]
    pub wait_for_finish: bool,

    /// Deadline applied by `flush` (milliseconds, None = no deadline)
    #[serde(default)]
    #[validate(range(min = 1))]
    pub flush_timeout_ms: Option<u64>,

    /// Read size used when copying a source into the spreader
    #[serde(default = "default_chunk_size")]
    #[validate(range(min = 1))]
    pub chunk_size: usize,

    /// Destination routing
    #[serde(default)]
    #[validate(nested)]
    pub destinations: Vec<DestinationConfig>,
}

fn default_chunk_size() -> usize {
    64 * 1024
}

impl Default for SpreaderConfig {
    fn default() -> Self {
        Self {
            version: ConfigVersion::V1,
            asynchronous: false,
            keep_cached: false,
            wait_for_finish: false,
            flush_timeout_ms: None,
            chunk_size: default_chunk_size(),
            destinations: Vec::new(),
        }
    }
}

impl SpreaderConfig {
    /// Builder-style toggle for the write mode
    pub fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    /// Builder-style toggle for replay-on-join
    pub fn keep_cached(mut self, keep_cached: bool) -> Self {
        self.keep_cached = keep_cached;
        self
    }

    /// Builder-style toggle for waiting on the completion gate in `flush`
    pub fn wait_for_finish(mut self, wait_for_finish: bool) -> Self {
        self.wait_for_finish = wait_for_finish;
        self
    }
}

/// Destination configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DestinationConfig {
    /// Destination name
    #[validate(length(min = 1))]
    pub name: String,

    /// Destination kind
    pub kind: DestinationKind,

    /// Kind-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Destination kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// In-memory buffer
    Memory,
    /// File on disk (`path`, optional `append`)
    File,
    /// Chunk summaries through tracing
    Log,
}
