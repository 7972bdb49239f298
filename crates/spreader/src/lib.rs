//! # Spreader
//!
//! 字节流扇出模块。
//!
//! 负责：
//! - 把一个写入流复制到多个 destination
//! - 每个 destination 独立有序，慢 destination 不阻塞其他
//! - 可选缓存，新加入的 destination 补发历史数据
//! - flush / finish / close 生命周期

pub mod chain;
pub mod chunk_store;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod registry;
pub mod sinks;
pub mod spreader;

pub use chain::WriteMode;
pub use chunk_store::Chunk;
pub use contracts::{ByteSink, LocalByteSink, SpreaderConfig};
pub use error::{DestinationFailure, DestinationId, FailureKind, SpreaderError};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{ConfiguredSink, FileSink, FileSinkConfig, LogSink, MemorySink};
pub use spreader::{StreamSpreader, create_spreader};
