//! Run statistics.

use std::time::Duration;

use observability::SpreadMetricsAggregator;
use spreader::MetricsSnapshot;

/// Statistics from one `run`
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Wall time from first read to close
    pub duration: Duration,

    /// Per-destination counters, captured before close
    pub destinations: Vec<(String, MetricsSnapshot)>,

    /// Source-side chunk and flush statistics
    pub spread_metrics: SpreadMetricsAggregator,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source throughput in MiB/s
    pub fn throughput_mib_s(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.spread_metrics.total_bytes as f64 / (1024.0 * 1024.0) / secs
        } else {
            0.0
        }
    }

    /// Destinations that missed at least one chunk
    pub fn incomplete_destinations(&self) -> usize {
        let total = self.spread_metrics.total_chunks - self.spread_metrics.empty_chunks;
        self.destinations
            .iter()
            .filter(|(_, m)| m.write_count < total)
            .count()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Run Statistics ===\n");
        println!("Overview");
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!("  Throughput: {:.2} MiB/s", self.throughput_mib_s());
        println!("  Destinations: {}", self.destinations.len());
        println!("  Incomplete destinations: {}", self.incomplete_destinations());

        println!("\n{}", self.spread_metrics.summary());

        if !self.destinations.is_empty() {
            println!("Destinations");
            for (name, m) in &self.destinations {
                println!(
                    "  {}: {} writes, {} bytes, {} failed, {} skipped",
                    name, m.write_count, m.bytes_written, m.failure_count, m.skipped_count
                );
            }
        }

        println!();
    }
}
