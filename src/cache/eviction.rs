//! Eviction strategies and victim selection.
//!
//! The cache swaps strategies at runtime; selection itself is a pure
//! function over the resident entries so each policy stays a few lines and
//! the lock discipline lives entirely in the cache.

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cache::entry::CacheEntry;

/// The policy used to choose which resident page to remove when the cache
/// is over budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Evict the entry with the oldest `last_accessed_at`.
    #[default]
    Lru,
    /// Evict the entry with the smallest `access_count`; ties broken by
    /// oldest access.
    Lfu,
    /// Evict the entry with the oldest `created_at`.
    Fifo,
    /// Evict expired entries first, then fall back to LRU.
    Ttl,
}

/// Choose the next victim among `entries`, honoring the pinned set.
///
/// Selection order, regardless of strategy:
/// 1. Oversized entries (footprint above their own threshold), largest
///    overshoot first - an oversized page is never protected by recency or
///    frequency.
/// 2. The strategy-specific rule.
///
/// Returns `None` when every entry is pinned (the cache may then
/// transiently exceed its soft bound).
pub fn select_victim(
    strategy: EvictionStrategy,
    entries: &[&CacheEntry],
    pinned: &HashSet<String>,
    now: Instant,
) -> Option<String> {
    let candidates: Vec<&&CacheEntry> = entries
        .iter()
        .filter(|e| !pinned.contains(&e.name))
        .collect();

    if candidates.is_empty() {
        return None;
    }

    // Oversized pages go first, largest overshoot first.
    if let Some(oversized) = candidates
        .iter()
        .filter(|e| e.is_oversized())
        .max_by(|a, b| {
            a.estimated_memory_mb
                .partial_cmp(&b.estimated_memory_mb)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    {
        return Some(oversized.name.clone());
    }

    let victim = match strategy {
        EvictionStrategy::Lru => candidates.iter().min_by_key(|e| e.last_accessed_at),
        EvictionStrategy::Lfu => candidates
            .iter()
            .min_by_key(|e| (e.access_count, e.last_accessed_at)),
        EvictionStrategy::Fifo => candidates.iter().min_by_key(|e| e.created_at),
        EvictionStrategy::Ttl => {
            // Expired entries first (oldest first), LRU among the rest.
            let expired = candidates
                .iter()
                .filter(|e| e.is_expired(now))
                .min_by_key(|e| e.created_at);
            match expired {
                Some(e) => Some(e),
                None => candidates.iter().min_by_key(|e| e.last_accessed_at),
            }
        }
    };

    victim.map(|e| e.name.clone())
}
