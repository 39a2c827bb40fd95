//! Loader metrics
//!
//! Atomic counters and a latency histogram, rendered in the Prometheus
//! text format.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

/// Counter metric (monotonically increasing)
pub struct Counter {
    value: AtomicU64,
    name: &'static str,
    help: &'static str,
}

impl Counter {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name,
            help,
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
            self.name,
            self.help,
            self.name,
            self.name,
            self.get()
        )
    }
}

/// Histogram of durations in seconds
pub struct Histogram {
    buckets: Vec<(f64, AtomicU64)>,
    /// Sum in microseconds
    sum: AtomicU64,
    count: AtomicU64,
    name: &'static str,
    help: &'static str,
}

impl Histogram {
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self::with_buckets(
            name,
            help,
            &[0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0],
        )
    }

    pub fn with_buckets(name: &'static str, help: &'static str, bounds: &[f64]) -> Self {
        Self {
            buckets: bounds.iter().map(|&b| (b, AtomicU64::new(0))).collect(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            name,
            help,
        }
    }

    pub fn observe(&self, seconds: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum
            .fetch_add((seconds * 1_000_000.0) as u64, Ordering::Relaxed);
        for (bound, count) in &self.buckets {
            if seconds <= *bound {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Run `f` and record how long it took
    pub fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.observe(start.elapsed().as_secs_f64());
        result
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn to_prometheus(&self) -> String {
        let mut output = format!(
            "# HELP {} {}\n# TYPE {} histogram\n",
            self.name, self.help, self.name
        );
        for (bound, count) in &self.buckets {
            output.push_str(&format!(
                "{}_bucket{{le=\"{}\"}} {}\n",
                self.name,
                bound,
                count.load(Ordering::Relaxed)
            ));
        }
        output.push_str(&format!(
            "{}_bucket{{le=\"+Inf\"}} {}\n",
            self.name,
            self.count()
        ));
        let sum_secs = self.sum.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        output.push_str(&format!("{}_sum {}\n", self.name, sum_secs));
        output.push_str(&format!("{}_count {}\n", self.name, self.count()));
        output
    }
}

/// Counters updated by the collator and the loaders
pub struct LoaderMetrics {
    /// Examples fetched and decoded
    pub examples_read: Counter,
    /// Groups collated successfully
    pub batches_collated: Counter,
    /// Groups aborted by an error
    pub fetch_errors: Counter,
    /// Feature rows emitted after trimming
    pub frames_emitted: Counter,
    /// Time spent fetching one example
    pub fetch_duration: Histogram,
}

impl LoaderMetrics {
    pub fn new() -> Self {
        Self {
            examples_read: Counter::new(
                "cegs_examples_read_total",
                "Chain examples deserialized",
            ),
            batches_collated: Counter::new(
                "cegs_batches_collated_total",
                "Batch groups collated",
            ),
            fetch_errors: Counter::new(
                "cegs_fetch_errors_total",
                "Batch groups aborted by an error",
            ),
            frames_emitted: Counter::new(
                "cegs_frames_emitted_total",
                "Feature frames emitted after context trimming",
            ),
            fetch_duration: Histogram::new(
                "cegs_example_fetch_duration_seconds",
                "Open, read and close latency per example",
            ),
        }
    }

    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        output.push_str(&self.examples_read.to_prometheus());
        output.push_str(&self.batches_collated.to_prometheus());
        output.push_str(&self.fetch_errors.to_prometheus());
        output.push_str(&self.frames_emitted.to_prometheus());
        output.push_str(&self.fetch_duration.to_prometheus());
        output
    }
}

impl Default for LoaderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide loader metrics, shared by every collator built without
/// its own
pub static LOADER_METRICS: LazyLock<Arc<LoaderMetrics>> =
    LazyLock::new(|| Arc::new(LoaderMetrics::new()));

/// Render the process-wide metrics
pub fn gather() -> String {
    LOADER_METRICS.to_prometheus()
}
