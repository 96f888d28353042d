//! Policy resolution - the three-tier configuration layer.
//!
//! A [`ConfigDocument`] carries three sections: `global` defaults,
//! per-[`PageType`](crate::registry::PageType) overrides, and per-page
//! overrides. [`PageConfigurationManager::resolve_policy`] merges them on
//! every call, so a [`reload`](PageConfigurationManager::reload) takes
//! effect on the next navigation with no coordination: resolved
//! [`PagePolicy`] values are immutable `Copy` snapshots, and in-flight
//! operations keep whatever snapshot they already hold.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::cache::EvictionStrategy;
use crate::common::config::{
    DEFAULT_HISTORY_CAPACITY, DEFAULT_LOAD_TIMEOUT_SECONDS, DEFAULT_MAX_MEMORY_MB,
    DEFAULT_MAX_RESIDENT_PAGES, DEFAULT_MEMORY_THRESHOLD_MB, DEFAULT_SAMPLE_CAPACITY,
    DEFAULT_SLOW_LOAD_MS, DEFAULT_SLOW_SWITCH_MS, DEFAULT_STATS_PERCENTILE,
    DEFAULT_TTL_SECONDS, DEFAULT_WORKER_THREADS,
};
use crate::common::Result;
use crate::registry::PageType;

/// Effective policy for one page, resolved from the three layers.
///
/// Immutable snapshot: never stored per cache instance by the manager,
/// recomputed on demand. Callers may keep a copy for the lifetime of one
/// navigation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePolicy {
    pub cache_enabled: bool,
    pub eviction_strategy: EvictionStrategy,
    pub ttl_seconds: f64,
    pub preload_enabled: bool,
    pub preload_priority: i32,
    pub memory_threshold_mb: f64,
    pub load_timeout_seconds: f64,
}

impl PagePolicy {
    /// The configured load timeout as a `Duration`.
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.load_timeout_seconds.max(0.0))
    }

    /// The configured TTL as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs_f64(self.ttl_seconds.max(0.0))
    }
}

/// A partial policy: any unset field falls through to the layer below.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOverride {
    pub cache_enabled: Option<bool>,
    pub eviction_strategy: Option<EvictionStrategy>,
    pub ttl_seconds: Option<f64>,
    pub preload_enabled: Option<bool>,
    pub preload_priority: Option<i32>,
    pub memory_threshold_mb: Option<f64>,
    pub load_timeout_seconds: Option<f64>,
}

impl PolicyOverride {
    fn apply(&self, base: &mut PagePolicy) {
        if let Some(v) = self.cache_enabled {
            base.cache_enabled = v;
        }
        if let Some(v) = self.eviction_strategy {
            base.eviction_strategy = v;
        }
        if let Some(v) = self.ttl_seconds {
            base.ttl_seconds = v;
        }
        if let Some(v) = self.preload_enabled {
            base.preload_enabled = v;
        }
        if let Some(v) = self.preload_priority {
            base.preload_priority = v;
        }
        if let Some(v) = self.memory_threshold_mb {
            base.memory_threshold_mb = v;
        }
        if let Some(v) = self.load_timeout_seconds {
            base.load_timeout_seconds = v;
        }
    }
}

/// The `global` section: cache-wide settings plus the base policy every
/// page starts from.
///
/// Structural fields (pool size, worker count, capacities) are read once
/// when the facade is built; the policy fields participate in resolution
/// and therefore hot-reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    // Cache-wide structure
    pub max_resident_pages: usize,
    pub max_memory_mb: f64,
    pub worker_threads: usize,
    pub history_capacity: usize,
    pub sample_capacity: usize,

    // Monitoring
    pub monitoring_enabled: bool,
    pub slow_load_threshold_ms: f64,
    pub slow_switch_threshold_ms: f64,
    pub stats_percentile: f64,

    // Base policy fields
    pub cache_enabled: bool,
    pub eviction_strategy: EvictionStrategy,
    pub ttl_seconds: f64,
    pub preload_enabled: bool,
    pub preload_priority: i32,
    pub memory_threshold_mb: f64,
    pub load_timeout_seconds: f64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            max_resident_pages: DEFAULT_MAX_RESIDENT_PAGES,
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            worker_threads: DEFAULT_WORKER_THREADS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            sample_capacity: DEFAULT_SAMPLE_CAPACITY,
            monitoring_enabled: true,
            slow_load_threshold_ms: DEFAULT_SLOW_LOAD_MS,
            slow_switch_threshold_ms: DEFAULT_SLOW_SWITCH_MS,
            stats_percentile: DEFAULT_STATS_PERCENTILE,
            cache_enabled: true,
            eviction_strategy: EvictionStrategy::Lru,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            preload_enabled: false,
            preload_priority: 0,
            memory_threshold_mb: DEFAULT_MEMORY_THRESHOLD_MB,
            load_timeout_seconds: DEFAULT_LOAD_TIMEOUT_SECONDS,
        }
    }
}

impl GlobalConfig {
    /// The base policy every resolution starts from.
    pub fn base_policy(&self) -> PagePolicy {
        PagePolicy {
            cache_enabled: self.cache_enabled,
            eviction_strategy: self.eviction_strategy,
            ttl_seconds: self.ttl_seconds,
            preload_enabled: self.preload_enabled,
            preload_priority: self.preload_priority,
            memory_threshold_mb: self.memory_threshold_mb,
            load_timeout_seconds: self.load_timeout_seconds,
        }
    }
}

/// The full three-section configuration artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    pub global: GlobalConfig,
    pub page_types: HashMap<PageType, PolicyOverride>,
    pub pages: HashMap<String, PolicyOverride>,
}

impl ConfigDocument {
    /// Parse a configuration document from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Resolves effective per-page policy from the three layers.
///
/// # Thread Safety
/// The document is replaced wholesale under the write lock on `reload`;
/// readers clone the `Arc` under the read lock and resolve against that
/// snapshot, so they see either the old or the new complete document,
/// never a partial one.
pub struct PageConfigurationManager {
    layers: RwLock<Arc<ConfigDocument>>,
}

impl PageConfigurationManager {
    /// Create a manager over the given document.
    pub fn new(document: ConfigDocument) -> Self {
        Self {
            layers: RwLock::new(Arc::new(document)),
        }
    }

    /// Resolve the effective policy for one page.
    ///
    /// Pure function of the currently loaded document: global base, then
    /// the `page_type` override, then the per-page override.
    pub fn resolve_policy(&self, name: &str, page_type: PageType) -> PagePolicy {
        let doc = Arc::clone(&self.layers.read());

        let mut policy = doc.global.base_policy();
        if let Some(by_type) = doc.page_types.get(&page_type) {
            by_type.apply(&mut policy);
        }
        if let Some(by_name) = doc.pages.get(name) {
            by_name.apply(&mut policy);
        }
        policy
    }

    /// Atomically replace all three layers.
    ///
    /// In-flight operations holding a previously resolved [`PagePolicy`]
    /// are unaffected; the snapshot is a plain `Copy` value.
    pub fn reload(&self, document: ConfigDocument) {
        log::info!(
            "configuration reloaded: {} type overrides, {} page overrides",
            document.page_types.len(),
            document.pages.len()
        );
        *self.layers.write() = Arc::new(document);
    }

    /// Parse and install a JSON document.
    pub fn reload_from_json(&self, json: &str) -> Result<()> {
        self.reload(ConfigDocument::from_json(json)?);
        Ok(())
    }

    /// A snapshot of the current document.
    pub fn current(&self) -> Arc<ConfigDocument> {
        Arc::clone(&self.layers.read())
    }
}

impl Default for PageConfigurationManager {
    fn default() -> Self {
        Self::new(ConfigDocument::default())
    }
}
