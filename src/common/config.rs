//! Compiled-in defaults for pagecycle.
//!
//! These are the fallback values used when the configuration document does
//! not override them. Runtime-tunable settings live in
//! [`crate::policy::GlobalConfig`]; this module holds the constants those
//! defaults are built from.

/// Default number of pages kept resident in the cache.
pub const DEFAULT_MAX_RESIDENT_PAGES: usize = 8;

/// Default aggregate memory budget for resident pages, in megabytes.
///
/// A soft target: a single oversized entry is still admitted, and pinned
/// entries are never evicted to satisfy it.
pub const DEFAULT_MAX_MEMORY_MB: f64 = 256.0;

/// Default number of loader worker threads.
///
/// Page factories are UI-object constructors, not bulk I/O: a small pool
/// keeps speculative loads off the navigation path without oversubscribing.
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// Default bound on the navigation history deque.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// Default capacity of each performance-sample ring buffer.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 256;

/// Default per-page TTL in seconds (secondary expiry on any strategy).
pub const DEFAULT_TTL_SECONDS: f64 = 300.0;

/// Default per-page memory threshold in megabytes.
///
/// A resident page whose measured footprint exceeds this is the first
/// eviction candidate regardless of recency.
pub const DEFAULT_MEMORY_THRESHOLD_MB: f64 = 64.0;

/// Default wait budget for a blocking load, in seconds.
pub const DEFAULT_LOAD_TIMEOUT_SECONDS: f64 = 5.0;

/// Default slow-load threshold, in milliseconds.
pub const DEFAULT_SLOW_LOAD_MS: f64 = 500.0;

/// Default slow-switch threshold, in milliseconds.
pub const DEFAULT_SLOW_SWITCH_MS: f64 = 250.0;

/// Default percentile reported by `get_statistics`.
pub const DEFAULT_STATS_PERCENTILE: f64 = 0.95;
