//! 分发指标收集模块
//!
//! 记录 chunk 写入、目标投递、flush 耗时等指标，并在内存中聚合统计。

use std::collections::HashMap;

use metrics::{counter, gauge, histogram};

/// 记录一次 `write` 调用产生的 chunk
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_chunk_written;
///
/// record_chunk_written(buf.len(), destination_count);
/// ```
pub fn record_chunk_written(len: usize, fan_out: usize) {
    counter!("stream_spreader_chunks_total").increment(1);
    counter!("stream_spreader_bytes_total").increment(len as u64);
    histogram!("stream_spreader_chunk_size_bytes").record(len as f64);
    gauge!("stream_spreader_fan_out").set(fan_out as f64);
}

/// 记录单个目标的写入结果
pub fn record_chunk_delivered(sink_name: &str, len: usize, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "stream_spreader_deliveries_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    if success {
        counter!(
            "stream_spreader_delivered_bytes_total",
            "sink" => sink_name.to_string()
        )
        .increment(len as u64);
    }
}

/// 记录目标链进入终止状态
pub fn record_destination_failed(sink_name: &str, reason: &str) {
    counter!(
        "stream_spreader_destination_failures_total",
        "sink" => sink_name.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录目标注册 (含回放的 chunk 数)
pub fn record_destination_added(sink_name: &str, replayed_chunks: usize) {
    counter!("stream_spreader_destinations_added_total").increment(1);
    if replayed_chunks > 0 {
        counter!(
            "stream_spreader_replayed_chunks_total",
            "sink" => sink_name.to_string()
        )
        .increment(replayed_chunks as u64);
    }
}

/// 记录目标队列深度
pub fn record_queue_depth(sink_name: &str, depth: usize) {
    gauge!(
        "stream_spreader_queue_depth",
        "sink" => sink_name.to_string()
    )
    .set(depth as f64);
}

/// 记录 flush 耗时
pub fn record_flush_latency_ms(latency_ms: f64, success: bool) {
    let status = if success { "success" } else { "failure" };
    histogram!("stream_spreader_flush_latency_ms", "status" => status.to_string())
        .record(latency_ms);
}

/// 分发指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct SpreadMetricsAggregator {
    /// 总 chunk 数
    pub total_chunks: u64,

    /// 总字节数
    pub total_bytes: u64,

    /// 空 chunk 数
    pub empty_chunks: u64,

    /// chunk 大小统计
    pub chunk_stats: RunningStats,

    /// flush 耗时统计 (毫秒)
    pub flush_stats: RunningStats,

    /// 各目标失败次数
    pub failure_counts: HashMap<String, u64>,
}

impl SpreadMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个 chunk
    pub fn record_chunk(&mut self, len: usize) {
        self.total_chunks += 1;
        self.total_bytes += len as u64;
        if len == 0 {
            self.empty_chunks += 1;
        }
        self.chunk_stats.push(len as f64);
    }

    /// 记录一次 flush
    pub fn record_flush(&mut self, latency_ms: f64) {
        self.flush_stats.push(latency_ms);
    }

    /// 记录目标失败
    pub fn record_failure(&mut self, sink_name: &str) {
        *self.failure_counts.entry(sink_name.to_string()).or_insert(0) += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_chunks: self.total_chunks,
            total_bytes: self.total_bytes,
            empty_chunks: self.empty_chunks,
            chunk_size_bytes: StatsSummary::from(&self.chunk_stats),
            flush_latency_ms: StatsSummary::from(&self.flush_stats),
            failure_counts: self.failure_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_chunks: u64,
    pub total_bytes: u64,
    pub empty_chunks: u64,
    pub chunk_size_bytes: StatsSummary,
    pub flush_latency_ms: StatsSummary,
    pub failure_counts: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Spread Metrics Summary ===")?;
        writeln!(f, "Total chunks: {}", self.total_chunks)?;
        writeln!(f, "Total bytes: {}", self.total_bytes)?;
        writeln!(f, "Empty chunks: {}", self.empty_chunks)?;
        writeln!(f, "Chunk size (bytes): {}", self.chunk_size_bytes)?;
        writeln!(f, "Flush latency (ms): {}", self.flush_latency_ms)?;

        if !self.failure_counts.is_empty() {
            writeln!(f, "Destination failures:")?;
            for (sink, count) in &self.failure_counts {
                writeln!(f, "  {}: {}", sink, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}
