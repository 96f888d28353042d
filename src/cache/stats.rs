//! Cache statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics tracked by the page cache.
///
/// All fields are atomic for lock-free, thread-safe updates; the loader's
/// workers and the navigation thread increment counters without taking the
/// cache lock.
///
/// # Memory Ordering
/// `Ordering::Relaxed` throughout: only atomicity is needed, there is no
/// synchronization between counters, and statistics are eventually
/// consistent by nature.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of times a page was found resident.
    pub hits: AtomicU64,

    /// Number of lookups for a page that was not resident.
    pub misses: AtomicU64,

    /// Number of entries removed by the eviction algorithm.
    pub evictions: AtomicU64,

    /// Number of entries installed.
    pub inserts: AtomicU64,
}

impl CacheStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get a non-atomic snapshot for display or reporting.
    ///
    /// Resident count and memory usage live in the cache map, so the cache
    /// fills them in; the counters alone are captured here.
    pub fn snapshot(&self, resident_pages: usize, memory_usage_mb: f64) -> CacheSnapshot {
        CacheSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            resident_pages,
            memory_usage_mb,
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of cache statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub inserts: u64,
    pub resident_pages: usize,
    pub memory_usage_mb: f64,
}

impl CacheSnapshot {
    /// Calculate cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for CacheSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cache {{ hits: {}, misses: {}, evictions: {}, resident: {}, {:.1} MB, hit_rate: {:.2}% }}",
            self.hits,
            self.misses,
            self.evictions,
            self.resident_pages,
            self.memory_usage_mb,
            self.hit_rate() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits.load(Ordering::Relaxed), 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats::new();
        stats.hits.fetch_add(7, Ordering::Relaxed);
        stats.misses.fetch_add(3, Ordering::Relaxed);
        assert_eq!(stats.hit_rate(), 0.7);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let stats = CacheStats::new();
        stats.hits.fetch_add(4, Ordering::Relaxed);
        stats.evictions.fetch_add(2, Ordering::Relaxed);

        let snap = stats.snapshot(3, 12.5);
        assert_eq!(snap.hits, 4);
        assert_eq!(snap.evictions, 2);
        assert_eq!(snap.resident_pages, 3);
        assert_eq!(snap.memory_usage_mb, 12.5);

        stats.reset();
        assert_eq!(stats.hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_snapshot_display() {
        let stats = CacheStats::new();
        stats.hits.fetch_add(80, Ordering::Relaxed);
        stats.misses.fetch_add(20, Ordering::Relaxed);

        let display = format!("{}", stats.snapshot(2, 8.0));
        assert!(display.contains("hits: 80"));
        assert!(display.contains("80.00%"));
    }
}
