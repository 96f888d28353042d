//! Performance monitoring - load/switch timing and memory footprints.
//!
//! The [`PerformanceMonitor`] keeps one bounded ring buffer of samples per
//! operation kind and a table of the latest per-page footprint estimates.
//! Old samples are overwritten, never explicitly freed. Recording a sample
//! that exceeds the configured threshold emits a slow-operation event
//! through an observer callback; it never raises.
//!
//! Memory sampling is pushed in by a host-side timer (`sample_memory`) and
//! pulled out by the cache when it makes sizing decisions, which keeps
//! footprint measurement off the navigation hot path and leaves the
//! dependency pointing cache → monitor only.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::common::config::{
    DEFAULT_SAMPLE_CAPACITY, DEFAULT_SLOW_LOAD_MS, DEFAULT_SLOW_SWITCH_MS,
    DEFAULT_STATS_PERCENTILE,
};

/// The two timed operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Materializing a page via its factory.
    Load,
    /// The visible hand-off between two pages.
    Switch,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Load => write!(f, "load"),
            Operation::Switch => write!(f, "switch"),
        }
    }
}

/// One timed observation.
#[derive(Debug, Clone)]
pub struct PerformanceSample {
    pub operation: Operation,
    pub page_name: String,
    pub duration_ms: f64,
    pub timestamp: Instant,
}

/// Callback invoked when a sample exceeds its operation's threshold.
pub type SlowOpObserver = Box<dyn Fn(&PerformanceSample) + Send + Sync>;

/// Rolling statistics for one operation kind over a time window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationStats {
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Duration at the configured percentile (e.g. p95).
    pub percentile_ms: f64,
    /// The percentile the field above was computed at, 0.0..=1.0.
    pub percentile: f64,
}

impl OperationStats {
    fn empty(percentile: f64) -> Self {
        Self {
            count: 0,
            avg_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
            percentile_ms: 0.0,
            percentile,
        }
    }
}

/// Statistics for both operation kinds within one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticsReport {
    pub load: OperationStats,
    pub switch: OperationStats,
}

/// Fixed-capacity sample ring; oldest samples are overwritten.
struct SampleRing {
    samples: VecDeque<PerformanceSample>,
    capacity: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, sample: PerformanceSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn stats(&self, window: Duration, percentile: f64) -> OperationStats {
        let cutoff = Instant::now().checked_sub(window);
        let mut durations: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| match cutoff {
                Some(c) => s.timestamp >= c,
                // Window longer than process uptime: everything qualifies.
                None => true,
            })
            .map(|s| s.duration_ms)
            .collect();

        if durations.is_empty() {
            return OperationStats::empty(percentile);
        }

        durations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let count = durations.len();
        let sum: f64 = durations.iter().sum();
        let rank = ((percentile * count as f64).ceil() as usize).clamp(1, count);

        OperationStats {
            count,
            avg_ms: sum / count as f64,
            min_ms: durations[0],
            max_ms: durations[count - 1],
            percentile_ms: durations[rank - 1],
            percentile,
        }
    }
}

/// Records operation timings and memory-footprint samples.
///
/// # Thread Safety
/// The rings are append-mostly and each sits behind its own mutex; the
/// footprint table has a third. Loader workers, the navigation thread, and
/// a host-side sampling timer can all record concurrently.
pub struct PerformanceMonitor {
    load_ring: Mutex<SampleRing>,
    switch_ring: Mutex<SampleRing>,
    memory: Mutex<HashMap<String, f64>>,
    slow_observer: Mutex<Option<SlowOpObserver>>,
    slow_load_threshold_ms: f64,
    slow_switch_threshold_ms: f64,
    percentile: f64,
    enabled: AtomicBool,
}

impl PerformanceMonitor {
    /// Create a monitor with explicit settings.
    pub fn new(
        sample_capacity: usize,
        slow_load_threshold_ms: f64,
        slow_switch_threshold_ms: f64,
        percentile: f64,
        enabled: bool,
    ) -> Self {
        Self {
            load_ring: Mutex::new(SampleRing::new(sample_capacity.max(1))),
            switch_ring: Mutex::new(SampleRing::new(sample_capacity.max(1))),
            memory: Mutex::new(HashMap::new()),
            slow_observer: Mutex::new(None),
            slow_load_threshold_ms,
            slow_switch_threshold_ms,
            percentile: percentile.clamp(0.0, 1.0),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Create a monitor with the compiled-in defaults.
    pub fn with_defaults() -> Self {
        Self::new(
            DEFAULT_SAMPLE_CAPACITY,
            DEFAULT_SLOW_LOAD_MS,
            DEFAULT_SLOW_SWITCH_MS,
            DEFAULT_STATS_PERCENTILE,
            true,
        )
    }

    /// Record one timed operation.
    ///
    /// A sample above the operation's threshold triggers the slow-operation
    /// observer (if installed) and a log line; it is still recorded
    /// normally and never raises.
    pub fn record(&self, operation: Operation, page_name: &str, duration_ms: f64) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }

        let sample = PerformanceSample {
            operation,
            page_name: page_name.to_string(),
            duration_ms,
            timestamp: Instant::now(),
        };

        let threshold = match operation {
            Operation::Load => self.slow_load_threshold_ms,
            Operation::Switch => self.slow_switch_threshold_ms,
        };
        if threshold > 0.0 && duration_ms > threshold {
            log::warn!(
                "slow {} of page '{}': {:.1} ms (threshold {:.1} ms)",
                operation,
                page_name,
                duration_ms,
                threshold
            );
            if let Some(observer) = self.slow_observer.lock().as_ref() {
                observer(&sample);
            }
        }

        match operation {
            Operation::Load => self.load_ring.lock().push(sample),
            Operation::Switch => self.switch_ring.lock().push(sample),
        }
    }

    /// Store the latest footprint estimate for one page.
    ///
    /// Called periodically by a host-side timer, never by the cache.
    pub fn sample_memory(&self, page_name: &str, estimated_mb: f64) {
        self.memory
            .lock()
            .insert(page_name.to_string(), estimated_mb);
    }

    /// The latest footprint estimate for one page, if any.
    pub fn memory_estimate(&self, page_name: &str) -> Option<f64> {
        self.memory.lock().get(page_name).copied()
    }

    /// Install the slow-operation observer, replacing any previous one.
    pub fn set_slow_op_observer(&self, observer: SlowOpObserver) {
        *self.slow_observer.lock() = Some(observer);
    }

    /// Rolling statistics for both operations within `window`.
    pub fn get_statistics(&self, window: Duration) -> StatisticsReport {
        StatisticsReport {
            load: self.load_ring.lock().stats(window, self.percentile),
            switch: self.switch_ring.lock().stats(window, self.percentile),
        }
    }

    /// Whether recording is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turn recording on or off at runtime.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}
