//! Metrics collection for the revision tree engine
//!
//! Counters and histograms are registered on a crate-local Prometheus
//! registry so an embedding service can merge them into its own exposition.

use crate::types::Result;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry, Histogram, IntCounter,
    Registry,
};
use std::time::Instant;

/// Global metrics registry
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Revision tree codec and mutation counters
pub struct TreeMetrics {
    /// Trees successfully decoded
    pub trees_decoded: IntCounter,
    /// Trees encoded for storage
    pub trees_encoded: IntCounter,
    /// Decodes that failed on corrupt input
    pub corrupt_trees: IntCounter,
    /// Revisions added by insert or history insert
    pub revisions_inserted: IntCounter,
    /// Single inserts that were rejected
    pub inserts_rejected: IntCounter,
    /// Nodes removed by depth pruning
    pub nodes_pruned: IntCounter,
    /// Nodes removed by explicit purge
    pub nodes_purged: IntCounter,
    /// Histogram of encode durations in seconds
    pub encode_duration: Histogram,
}

/// Storage round-trip metrics
pub struct StorageMetrics {
    /// Trees written back to the store
    pub trees_saved: IntCounter,
    /// Read-modify-write cycles that changed nothing
    pub unchanged_updates: IntCounter,
    /// Histogram of read-modify-write durations in seconds
    pub update_duration: Histogram,
}

/// Centralized metrics collection
pub struct Metrics {
    /// Revision tree metrics
    pub tree: TreeMetrics,
    /// Storage metrics
    pub storage: StorageMetrics,
}

impl Metrics {
    fn new() -> Result<Self> {
        Ok(Self {
            tree: TreeMetrics::new()?,
            storage: StorageMetrics::new()?,
        })
    }

    /// Get the global metrics instance
    pub fn global() -> &'static Metrics {
        static INSTANCE: Lazy<Metrics> = Lazy::new(|| {
            Metrics::new().expect("Failed to initialize metrics")
        });
        &INSTANCE
    }
}

impl TreeMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            trees_decoded: register_int_counter_with_registry!(
                "mr_trees_decoded_total",
                "Total number of revision trees decoded",
                REGISTRY
            )?,
            trees_encoded: register_int_counter_with_registry!(
                "mr_trees_encoded_total",
                "Total number of revision trees encoded",
                REGISTRY
            )?,
            corrupt_trees: register_int_counter_with_registry!(
                "mr_corrupt_trees_total",
                "Total number of revision trees rejected as corrupt",
                REGISTRY
            )?,
            revisions_inserted: register_int_counter_with_registry!(
                "mr_revisions_inserted_total",
                "Total number of revisions inserted",
                REGISTRY
            )?,
            inserts_rejected: register_int_counter_with_registry!(
                "mr_inserts_rejected_total",
                "Total number of rejected revision inserts",
                REGISTRY
            )?,
            nodes_pruned: register_int_counter_with_registry!(
                "mr_nodes_pruned_total",
                "Total number of revisions removed by pruning",
                REGISTRY
            )?,
            nodes_purged: register_int_counter_with_registry!(
                "mr_nodes_purged_total",
                "Total number of revisions removed by purging",
                REGISTRY
            )?,
            encode_duration: register_histogram_with_registry!(
                "mr_encode_duration_seconds",
                "Duration of revision tree encodes in seconds",
                vec![0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01],
                REGISTRY
            )?,
        })
    }
}

impl StorageMetrics {
    fn new() -> Result<Self> {
        Ok(Self {
            trees_saved: register_int_counter_with_registry!(
                "mr_trees_saved_total",
                "Total number of revision trees written to storage",
                REGISTRY
            )?,
            unchanged_updates: register_int_counter_with_registry!(
                "mr_unchanged_updates_total",
                "Total number of updates that left the tree unchanged",
                REGISTRY
            )?,
            update_duration: register_histogram_with_registry!(
                "mr_update_duration_seconds",
                "Duration of document read-modify-write cycles in seconds",
                vec![0.000_01, 0.000_1, 0.001, 0.01, 0.1],
                REGISTRY
            )?,
        })
    }
}

/// Timer for measuring operation duration with automatic histogram recording
pub struct Timer {
    /// Start time of the operation
    start: Instant,
    /// Histogram to record the duration when finished
    histogram: Histogram,
}

impl Timer {
    /// Start a new timer
    pub fn start(histogram: Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }

    /// Record the elapsed time and consume the timer
    pub fn finish(self) {
        let duration = self.start.elapsed();
        self.histogram.observe(duration.as_secs_f64());
    }
}

/// Convenience macro for timing operations and automatically recording duration
///
/// # Examples
/// ```
/// use massive_revtree::{time_operation, system::metrics::Metrics};
/// let metrics = Metrics::global();
/// let sum = time_operation!(metrics.storage.update_duration, { 1 + 1 });
/// assert_eq!(sum, 2);
/// ```
#[macro_export]
macro_rules! time_operation {
    ($metric:expr, $body:expr) => {{
        let timer = $crate::system::metrics::Timer::start($metric.clone());
        let result = $body;
        timer.finish();
        result
    }};
}

/// Initialize the metrics registry by creating the global metrics instance
pub fn init_registry() {
    let _ = Metrics::global();
}

/// Get the Prometheus registry for serving metrics to monitoring systems
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Collect and return all metrics as a Prometheus-formatted string
pub fn collect_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = registry().gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        init_registry();
        Metrics::global().tree.trees_decoded.inc();
        let text = collect_metrics();
        assert!(text.contains("mr_trees_decoded_total"));
        assert!(text.contains("mr_encode_duration_seconds"));
    }

    #[test]
    fn timer_records_one_observation() {
        let histogram = Histogram::with_opts(prometheus::HistogramOpts::new("t", "t")).unwrap();
        let timer = Timer::start(histogram.clone());
        timer.finish();
        assert_eq!(histogram.get_sample_count(), 1);
    }
}
