//! Page cache - the bounded store of materialized pages.
//!
//! The [`PageCache`] provides:
//! - O(1) lookup of resident pages by name
//! - Runtime-swappable eviction strategies
//! - Count and memory soft budgets
//! - Pin-based protection of the visible page

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::cache::entry::CacheEntry;
use crate::cache::eviction::{select_victim, EvictionStrategy};
use crate::cache::stats::{CacheSnapshot, CacheStats};
use crate::monitor::PerformanceMonitor;
use crate::page::PageHandle;
use crate::policy::PagePolicy;

/// Bounded storage for resident pages with strategy-driven eviction.
///
/// # Architecture
/// ```text
/// ┌───────────────────────────────────────────────────────────┐
/// │                        PageCache                          │
/// │  ┌─────────────────────────────┐  ┌───────────────────┐   │
/// │  │ entries: name → CacheEntry  │  │ pinned: {name}    │   │
/// │  │ (one Mutex guards both)     │  │ (never a victim)  │   │
/// │  └─────────────────────────────┘  └───────────────────┘   │
/// │  ┌──────────────┐  ┌──────────────┐  ┌───────────────┐    │
/// │  │   strategy   │  │    stats     │  │    monitor    │    │
/// │  │   (Mutex)    │  │  (atomics)   │  │ (mem samples) │    │
/// │  └──────────────┘  └──────────────┘  └───────────────┘    │
/// └───────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// The entry map and the pinned set are mutated by the loader's workers
/// (inserting on load completion) and the navigation thread (reads, pins,
/// evictions), so a single mutex guards both; read, insert, and evict are
/// atomic relative to each other. Statistics are lock-free atomics.
///
/// # Budgets
/// Both the resident-count and the memory budget are soft targets. A
/// single entry larger than the whole memory budget is still admitted (it
/// simply becomes the first eviction candidate), and when every remaining
/// entry is pinned the cache transiently exceeds its bound rather than
/// evicting the visible page.
pub struct PageCache {
    inner: Mutex<CacheInner>,

    /// Active eviction strategy; swappable at runtime.
    strategy: Mutex<EvictionStrategy>,

    /// Soft bound on resident entries.
    max_count: usize,

    /// Soft bound on aggregate footprint, in megabytes.
    max_memory_mb: f64,

    /// Performance statistics.
    stats: CacheStats,

    /// Source of per-page footprint estimates.
    monitor: Arc<PerformanceMonitor>,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    pinned: HashSet<String>,
}

impl PageCache {
    /// Create a cache with the given soft budgets.
    ///
    /// # Panics
    /// Panics if `max_count` is 0.
    pub fn new(
        max_count: usize,
        max_memory_mb: f64,
        strategy: EvictionStrategy,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        assert!(max_count > 0, "max_count must be > 0");

        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                pinned: HashSet::new(),
            }),
            strategy: Mutex::new(strategy),
            max_count,
            max_memory_mb,
            stats: CacheStats::new(),
            monitor,
        }
    }

    // ========================================================================
    // Public API: lookup and insert
    // ========================================================================

    /// Look up a resident page.
    ///
    /// On a hit, updates `last_accessed_at` and `access_count`. Never
    /// triggers eviction as a side effect of a read.
    pub fn get(&self, name: &str) -> Option<CacheEntry> {
        let mut inner = self.inner.lock();
        match inner.entries.get_mut(name) {
            Some(entry) => {
                entry.touch();
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Install a materialized page, evicting per the active strategy until
    /// both soft budgets are met or no victim remains.
    ///
    /// Returns a snapshot of the inserted entry.
    pub fn put(&self, name: &str, instance: PageHandle, policy: PagePolicy) -> CacheEntry {
        let strategy = *self.strategy.lock();
        let mut evicted: Vec<CacheEntry> = Vec::new();

        let (installed, replaced) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            self.refresh_estimates(inner);

            let mut entry = CacheEntry::new(name, instance, policy);
            if let Some(mb) = self.monitor.memory_estimate(name) {
                entry.estimated_memory_mb = mb;
            }
            let incoming_mb = entry.estimated_memory_mb;

            // Make room before inserting. The incoming entry itself is not
            // a candidate; capacity is a soft target, never a rejection.
            let now = Instant::now();
            loop {
                let replacing = inner.entries.contains_key(name);
                let count_after = inner.entries.len() + usize::from(!replacing);
                let over_count = count_after > self.max_count;
                let over_memory = self.max_memory_mb > 0.0
                    && Self::memory_of(inner) + incoming_mb > self.max_memory_mb;
                if !(over_count || over_memory) {
                    break;
                }

                let victim = {
                    let refs: Vec<&CacheEntry> =
                        inner.entries.values().filter(|e| e.name != name).collect();
                    select_victim(strategy, &refs, &inner.pinned, now)
                };
                match victim {
                    Some(victim_name) => {
                        if let Some(e) = inner.entries.remove(&victim_name) {
                            log::debug!(
                                "evicting page '{}' ({:?}, {:.1} MB resident)",
                                victim_name,
                                strategy,
                                e.estimated_memory_mb
                            );
                            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                            evicted.push(e);
                        }
                    }
                    // Everything else is pinned: exceed the soft bound.
                    None => break,
                }
            }

            let replaced = inner.entries.insert(name.to_string(), entry.clone());
            self.stats.inserts.fetch_add(1, Ordering::Relaxed);
            (entry, replaced)
        };

        // Lifecycle hooks run outside the map lock.
        for e in evicted {
            Self::run_cleanup(&e);
        }
        if let Some(old) = replaced {
            if !Arc::ptr_eq(&old.instance, &installed.instance) {
                Self::run_cleanup(&old);
            }
        }

        installed
    }

    // ========================================================================
    // Public API: removal
    // ========================================================================

    /// Explicitly remove one page, invoking its cleanup hook.
    ///
    /// Returns false if the page is absent or pinned (the visible page is
    /// never evicted).
    pub fn evict(&self, name: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            if inner.pinned.contains(name) {
                log::warn!("refusing to evict pinned page '{}'", name);
                return false;
            }
            inner.entries.remove(name)
        };

        match removed {
            Some(entry) => {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                Self::run_cleanup(&entry);
                true
            }
            None => false,
        }
    }

    /// Evict every non-pinned entry. Returns the count evicted.
    ///
    /// Used on policy changes or explicit cache-clear requests. Pinned
    /// entries survive.
    pub fn invalidate_all(&self) -> usize {
        let removed: Vec<CacheEntry> = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let pinned = &inner.pinned;
            let names: Vec<String> = inner
                .entries
                .keys()
                .filter(|n| !pinned.contains(n.as_str()))
                .cloned()
                .collect();
            names
                .into_iter()
                .filter_map(|n| inner.entries.remove(&n))
                .collect()
        };

        self.stats
            .evictions
            .fetch_add(removed.len() as u64, Ordering::Relaxed);
        for entry in &removed {
            Self::run_cleanup(entry);
        }
        removed.len()
    }

    /// Evict per the active strategy until both soft budgets are met or no
    /// victim remains. Returns the count evicted.
    ///
    /// `put` already shrinks on insert; this re-check exists for the
    /// moment a pin is released, when an entry kept only by its pinned
    /// status becomes a legal victim again.
    pub fn enforce_budgets(&self) -> usize {
        let strategy = *self.strategy.lock();
        let evicted: Vec<CacheEntry> = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            self.refresh_estimates(inner);

            let now = Instant::now();
            let mut evicted = Vec::new();
            loop {
                let over_count = inner.entries.len() > self.max_count;
                let over_memory =
                    self.max_memory_mb > 0.0 && Self::memory_of(inner) > self.max_memory_mb;
                if !(over_count || over_memory) {
                    break;
                }

                let victim = {
                    let refs: Vec<&CacheEntry> = inner.entries.values().collect();
                    select_victim(strategy, &refs, &inner.pinned, now)
                };
                match victim {
                    Some(name) => {
                        if let Some(e) = inner.entries.remove(&name) {
                            log::debug!("evicting page '{}' on budget re-check", name);
                            evicted.push(e);
                        }
                    }
                    None => break,
                }
            }
            evicted
        };

        self.stats
            .evictions
            .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        for entry in &evicted {
            Self::run_cleanup(entry);
        }
        evicted.len()
    }

    /// Remove every non-pinned entry whose TTL has elapsed. Returns the
    /// count evicted.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let removed: Vec<CacheEntry> = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let pinned = &inner.pinned;
            let names: Vec<String> = inner
                .entries
                .values()
                .filter(|e| e.is_expired(now) && !pinned.contains(&e.name))
                .map(|e| e.name.clone())
                .collect();
            names
                .into_iter()
                .filter_map(|n| inner.entries.remove(&n))
                .collect()
        };

        self.stats
            .evictions
            .fetch_add(removed.len() as u64, Ordering::Relaxed);
        for entry in &removed {
            log::debug!("page '{}' expired after {:?}", entry.name, entry.policy.ttl());
            Self::run_cleanup(entry);
        }
        removed.len()
    }

    // ========================================================================
    // Public API: pinning
    // ========================================================================

    /// Mark a name ineligible for eviction (the visible page).
    pub fn pin(&self, name: &str) {
        self.inner.lock().pinned.insert(name.to_string());
    }

    /// Make a name eligible for eviction again.
    pub fn unpin(&self, name: &str) {
        self.inner.lock().pinned.remove(name);
    }

    /// Whether a name is currently pinned.
    pub fn is_pinned(&self, name: &str) -> bool {
        self.inner.lock().pinned.contains(name)
    }

    // ========================================================================
    // Public API: introspection
    // ========================================================================

    /// Number of resident pages.
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether `name` is resident.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().entries.contains_key(name)
    }

    /// Names of all resident pages, unordered.
    pub fn resident_names(&self) -> Vec<String> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    /// Aggregate estimated footprint of resident pages, in megabytes.
    pub fn memory_usage_mb(&self) -> f64 {
        Self::memory_of(&self.inner.lock())
    }

    /// The soft resident-count bound.
    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// The active eviction strategy.
    pub fn strategy(&self) -> EvictionStrategy {
        *self.strategy.lock()
    }

    /// Swap the eviction strategy at runtime. Takes effect on the next
    /// eviction decision; resident entries are untouched.
    pub fn set_strategy(&self, strategy: EvictionStrategy) {
        log::debug!("eviction strategy set to {:?}", strategy);
        *self.strategy.lock() = strategy;
    }

    /// Point-in-time statistics snapshot.
    pub fn snapshot(&self) -> CacheSnapshot {
        let (resident, memory) = {
            let inner = self.inner.lock();
            (inner.entries.len(), Self::memory_of(&inner))
        };
        self.stats.snapshot(resident, memory)
    }

    /// Raw statistics counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Overwrite the footprint estimate for one resident page.
    pub fn refresh_memory_estimate(&self, name: &str, estimated_mb: f64) {
        if let Some(entry) = self.inner.lock().entries.get_mut(name) {
            entry.estimated_memory_mb = estimated_mb;
        }
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn memory_of(inner: &CacheInner) -> f64 {
        inner.entries.values().map(|e| e.estimated_memory_mb).sum()
    }

    /// Pull the latest footprint samples from the monitor into the entries.
    fn refresh_estimates(&self, inner: &mut CacheInner) {
        for entry in inner.entries.values_mut() {
            if let Some(mb) = self.monitor.memory_estimate(&entry.name) {
                entry.estimated_memory_mb = mb;
            }
        }
    }

    /// Run a page's cleanup hook, containing panics.
    fn run_cleanup(entry: &CacheEntry) {
        let result = catch_unwind(AssertUnwindSafe(|| {
            entry.instance.lock().cleanup();
        }));
        if result.is_err() {
            log::warn!("cleanup hook for page '{}' panicked", entry.name);
        }
    }
}
