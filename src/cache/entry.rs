//! Cache entry - one resident page plus its bookkeeping.

use std::time::Instant;

use crate::page::PageHandle;
use crate::policy::PagePolicy;

/// A resident page in the cache.
///
/// An entry exists in the cache map if and only if its instance is fully
/// materialized and not yet evicted. In-progress loads are tracked by the
/// loader's task table, never by a placeholder entry here.
///
/// `Clone` is cheap: the instance is shared through its handle, the rest is
/// plain metadata. All metadata mutation happens under the cache map lock.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// Back-reference to the descriptor, by name.
    pub name: String,

    /// The opaque page handle. The cache releases it through the page's
    /// cleanup hook on eviction.
    pub instance: PageHandle,

    /// When the instance was installed.
    pub created_at: Instant,

    /// Last cache hit.
    pub last_accessed_at: Instant,

    /// Incremented on every cache hit.
    pub access_count: u64,

    /// Latest footprint estimate, refreshed from the performance monitor.
    /// Zero until the first sample arrives.
    pub estimated_memory_mb: f64,

    /// Policy snapshot taken when the entry was installed. Supplies the
    /// per-entry TTL and memory threshold during eviction.
    pub policy: PagePolicy,
}

impl CacheEntry {
    /// Build a fresh entry for a just-materialized page.
    pub fn new(name: impl Into<String>, instance: PageHandle, policy: PagePolicy) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            instance,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            estimated_memory_mb: 0.0,
            policy,
        }
    }

    /// Record a cache hit.
    pub fn touch(&mut self) {
        self.last_accessed_at = Instant::now();
        self.access_count += 1;
    }

    /// Whether the entry's own TTL has elapsed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.policy.ttl_seconds > 0.0 && now.duration_since(self.created_at) > self.policy.ttl()
    }

    /// Whether the measured footprint exceeds the entry's memory threshold.
    pub fn is_oversized(&self) -> bool {
        self.policy.memory_threshold_mb > 0.0
            && self.estimated_memory_mb > self.policy.memory_threshold_mb
    }
}
