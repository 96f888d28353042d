//! Integrated page manager - the single entry point for host applications.
//!
//! The facade wires registry, cache, loader, transition manager, monitor,
//! and configuration together and adds navigation history on top. All of
//! the collaborators are explicit instances owned here; nothing is
//! process-global, so tests can run several independent managers at once.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cache::{CacheSnapshot, PageCache};
use crate::common::Result;
use crate::loader::LazyPageLoader;
use crate::monitor::{PerformanceMonitor, SlowOpObserver, StatisticsReport};
use crate::page::{PageHandle, PageParams};
use crate::policy::{ConfigDocument, PageConfigurationManager};
use crate::registry::{PageDescriptor, PageRegistry};
use crate::transition::{LoadingObserver, PageTransitionManager, TransitionResult};

/// Window used by the argument-less statistics report.
const DEFAULT_STATS_WINDOW: Duration = Duration::from_secs(300);

/// One successful navigation, as remembered by the history deque.
#[derive(Debug, Clone)]
pub struct NavigationHistoryEntry {
    pub page_name: String,
    pub params: PageParams,
    pub timestamp: Instant,
}

/// Combined report: cache counters plus load/switch timing statistics.
#[derive(Debug, Clone)]
pub struct PerformanceReport {
    pub cache: CacheSnapshot,
    pub timings: StatisticsReport,
}

impl fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | load avg {:.1} ms ({} samples) | switch avg {:.1} ms ({} samples)",
            self.cache,
            self.timings.load.avg_ms,
            self.timings.load.count,
            self.timings.switch.avg_ms,
            self.timings.switch.count
        )
    }
}

/// The navigation system facade.
///
/// # Architecture
/// ```text
/// ┌────────────────────────────────────────────────────────────────┐
/// │                     IntegratedPageManager                      │
/// │                                                                │
/// │  navigate_to ──► PageConfigurationManager (resolve policy)     │
/// │       │                                                        │
/// │       ▼                                                        │
/// │  PageTransitionManager ──► PageCache ◄── LazyPageLoader        │
/// │       │                        │               │               │
/// │       │                        ▼               ▼               │
/// │       └──────────────► PerformanceMonitor ◄────┘               │
/// │                                                                │
/// │  history: VecDeque<NavigationHistoryEntry> (bounded)           │
/// └────────────────────────────────────────────────────────────────┘
/// ```
pub struct IntegratedPageManager {
    registry: Arc<PageRegistry>,
    cache: Arc<PageCache>,
    loader: Arc<LazyPageLoader>,
    transitions: PageTransitionManager,
    monitor: Arc<PerformanceMonitor>,
    config: Arc<PageConfigurationManager>,
    history: Mutex<VecDeque<NavigationHistoryEntry>>,
    history_capacity: usize,
}

impl IntegratedPageManager {
    /// Build a manager from a configuration document.
    ///
    /// Structural settings (cache budgets, worker count, ring and history
    /// capacities) are fixed here; the policy layers stay hot-reloadable
    /// through [`reload_config`](Self::reload_config).
    pub fn new(document: ConfigDocument) -> Self {
        let global = document.global.clone();

        let registry = Arc::new(PageRegistry::new());
        let monitor = Arc::new(PerformanceMonitor::new(
            global.sample_capacity,
            global.slow_load_threshold_ms,
            global.slow_switch_threshold_ms,
            global.stats_percentile,
            global.monitoring_enabled,
        ));
        let cache = Arc::new(PageCache::new(
            global.max_resident_pages,
            global.max_memory_mb,
            global.eviction_strategy,
            Arc::clone(&monitor),
        ));
        let loader = Arc::new(LazyPageLoader::new(
            global.worker_threads.max(1),
            Arc::clone(&registry),
            Arc::clone(&cache),
            Arc::clone(&monitor),
        ));
        let transitions = PageTransitionManager::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            Arc::clone(&loader),
            Arc::clone(&monitor),
        );

        Self {
            registry,
            cache,
            loader,
            transitions,
            monitor,
            config: Arc::new(PageConfigurationManager::new(document)),
            history: Mutex::new(VecDeque::new()),
            history_capacity: global.history_capacity.max(1),
        }
    }

    /// Build a manager with compiled-in defaults.
    pub fn with_defaults() -> Self {
        Self::new(ConfigDocument::default())
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register one page.
    pub fn register_page(&self, descriptor: PageDescriptor) -> Result<()> {
        self.registry.register(descriptor)
    }

    /// Register several pages; stops at the first failure.
    pub fn register_pages(&self, descriptors: Vec<PageDescriptor>) -> Result<()> {
        for descriptor in descriptors {
            self.registry.register(descriptor)?;
        }
        Ok(())
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Navigate to a registered page.
    ///
    /// Resolves the page's policy, performs the switch, and appends a
    /// history entry on success. A failure leaves the previous page
    /// active and the history untouched.
    pub fn navigate_to(
        &self,
        name: &str,
        params: Option<PageParams>,
    ) -> Result<TransitionResult> {
        let descriptor = self.registry.descriptor(name)?;
        let policy = self.config.resolve_policy(name, descriptor.page_type);
        let params = params.unwrap_or_default();

        let result = self.transitions.switch_to(&descriptor, &params, &policy)?;

        let mut history = self.history.lock();
        while history.len() >= self.history_capacity {
            history.pop_front();
        }
        history.push_back(NavigationHistoryEntry {
            page_name: name.to_string(),
            params,
            timestamp: Instant::now(),
        });

        Ok(result)
    }

    /// Re-navigate to the previous history entry.
    ///
    /// Returns `Ok(None)` when there is nothing to go back to. The
    /// back-navigation itself appends no duplicate history entry; on
    /// success the entry navigated away from is dropped so the tail of the
    /// history always names the visible page. On failure the history is
    /// left untouched.
    pub fn go_back(&self) -> Result<Option<TransitionResult>> {
        let (name, params) = {
            let history = self.history.lock();
            if history.len() < 2 {
                return Ok(None);
            }
            let target = &history[history.len() - 2];
            (target.page_name.clone(), target.params.clone())
        };

        let descriptor = self.registry.descriptor(&name)?;
        let policy = self.config.resolve_policy(&name, descriptor.page_type);
        let result = self.transitions.switch_to(&descriptor, &params, &policy)?;

        self.history.lock().pop_back();
        Ok(Some(result))
    }

    /// Handle to the visible page, if any.
    pub fn get_current_page(&self) -> Option<PageHandle> {
        self.transitions.current_page()
    }

    /// Name of the visible page, if any.
    pub fn current_page_name(&self) -> Option<String> {
        self.transitions.current_name()
    }

    /// Invoke the visible page's refresh hook. Returns false when no page
    /// is active.
    pub fn refresh_current_page(&self) -> bool {
        self.transitions.refresh_current()
    }

    /// Snapshot of the navigation history, oldest first.
    pub fn history(&self) -> Vec<NavigationHistoryEntry> {
        self.history.lock().iter().cloned().collect()
    }

    // ========================================================================
    // Preloading
    // ========================================================================

    /// Fire-and-forget background materialization.
    ///
    /// Ignored when the page's policy disables preloading (or caching -
    /// there is nowhere to put the result). Never blocks the caller.
    pub fn preload(&self, name: &str) -> Result<()> {
        let descriptor = self.registry.descriptor(name)?;
        let policy = self.config.resolve_policy(name, descriptor.page_type);

        if !policy.preload_enabled || !policy.cache_enabled {
            log::debug!("preload of '{}' skipped by policy", name);
            return Ok(());
        }
        if self.cache.contains(name) {
            return Ok(());
        }

        self.loader
            .load_async(name, policy.preload_priority, policy, None);
        Ok(())
    }

    /// Cancel an outstanding load for `name`. See
    /// [`LazyPageLoader::cancel`] for the exact semantics.
    pub fn cancel_load(&self, name: &str) -> bool {
        self.loader.cancel(name)
    }

    // ========================================================================
    // Maintenance and diagnostics
    // ========================================================================

    /// Push a fresh footprint estimate for one page. Intended to be called
    /// periodically by a host-side timer.
    pub fn sample_memory(&self, name: &str, estimated_mb: f64) {
        self.monitor.sample_memory(name, estimated_mb);
        self.cache.refresh_memory_estimate(name, estimated_mb);
    }

    /// Evict every non-pinned resident page. Returns the count evicted.
    pub fn invalidate_cache(&self) -> usize {
        self.cache.invalidate_all()
    }

    /// Remove expired entries. Returns the count evicted.
    pub fn evict_expired(&self) -> usize {
        self.cache.evict_expired()
    }

    /// Atomically replace the configuration layers and apply the new
    /// global strategy and monitoring switch.
    pub fn reload_config(&self, document: ConfigDocument) {
        self.cache.set_strategy(document.global.eviction_strategy);
        self.monitor.set_enabled(document.global.monitoring_enabled);
        self.config.reload(document);
    }

    /// Parse and install a JSON configuration document.
    pub fn reload_config_json(&self, json: &str) -> Result<()> {
        self.reload_config(ConfigDocument::from_json(json)?);
        Ok(())
    }

    /// Combined cache and timing report over the default window.
    pub fn get_performance_stats(&self) -> PerformanceReport {
        self.performance_report(DEFAULT_STATS_WINDOW)
    }

    /// Combined cache and timing report over an explicit window.
    pub fn performance_report(&self, window: Duration) -> PerformanceReport {
        PerformanceReport {
            cache: self.cache.snapshot(),
            timings: self.monitor.get_statistics(window),
        }
    }

    /// Install the loading-indicator observer.
    pub fn set_loading_observer(&self, observer: LoadingObserver) {
        self.transitions.set_loading_observer(observer);
    }

    /// Install the slow-operation observer.
    pub fn set_slow_op_observer(&self, observer: SlowOpObserver) {
        self.monitor.set_slow_op_observer(observer);
    }

    // ========================================================================
    // Collaborator access
    // ========================================================================

    /// The page registry.
    pub fn registry(&self) -> &Arc<PageRegistry> {
        &self.registry
    }

    /// The page cache.
    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    /// The background loader.
    pub fn loader(&self) -> &Arc<LazyPageLoader> {
        &self.loader
    }

    /// The performance monitor.
    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    /// The configuration manager.
    pub fn config(&self) -> &Arc<PageConfigurationManager> {
        &self.config
    }
}

impl Default for IntegratedPageManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Page;
    use crate::policy::PolicyOverride;
    use crate::registry::PageType;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Blank;

    impl Page for Blank {
        fn on_page_enter(&mut self, _params: &PageParams) {}
        fn on_page_leave(&mut self) {}
        fn cleanup(&mut self) {}
    }

    fn blank(name: &str) -> PageDescriptor {
        PageDescriptor::new(name, PageType::ListView, || Ok(Box::new(Blank)))
    }

    #[test]
    fn test_navigate_and_history() {
        let manager = IntegratedPageManager::with_defaults();
        manager
            .register_pages(vec![blank("a"), blank("b"), blank("c")])
            .unwrap();

        manager.navigate_to("a", None).unwrap();
        manager.navigate_to("b", None).unwrap();
        manager.navigate_to("c", None).unwrap();

        assert_eq!(manager.current_page_name().as_deref(), Some("c"));
        let names: Vec<String> = manager
            .history()
            .into_iter()
            .map(|e| e.page_name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_go_back() {
        let manager = IntegratedPageManager::with_defaults();
        manager
            .register_pages(vec![blank("a"), blank("b")])
            .unwrap();

        manager.navigate_to("a", None).unwrap();
        manager.navigate_to("b", None).unwrap();

        let result = manager.go_back().unwrap().unwrap();
        assert_eq!(result.to, "a");
        assert_eq!(manager.current_page_name().as_deref(), Some("a"));

        // Back-navigation appended nothing; history tail is "a".
        let names: Vec<String> = manager
            .history()
            .into_iter()
            .map(|e| e.page_name)
            .collect();
        assert_eq!(names, vec!["a"]);

        // Nothing further to pop.
        assert!(manager.go_back().unwrap().is_none());
    }

    #[test]
    fn test_go_back_with_empty_history() {
        let manager = IntegratedPageManager::with_defaults();
        assert!(manager.go_back().unwrap().is_none());
    }

    #[test]
    fn test_navigate_unknown_page() {
        let manager = IntegratedPageManager::with_defaults();
        let err = manager.navigate_to("ghost", None).unwrap_err();
        assert!(matches!(err, crate::common::Error::UnknownPage(_)));
        assert!(manager.history().is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut doc = ConfigDocument::default();
        doc.global.history_capacity = 3;
        let manager = IntegratedPageManager::new(doc);
        manager.register_page(blank("a")).unwrap();

        for _ in 0..10 {
            manager.navigate_to("a", None).unwrap();
        }
        assert_eq!(manager.history().len(), 3);
    }

    #[test]
    fn test_preload_respects_policy() {
        static BUILDS: AtomicU32 = AtomicU32::new(0);

        let mut doc = ConfigDocument::default();
        doc.pages.insert(
            "eager".into(),
            PolicyOverride {
                preload_enabled: Some(true),
                preload_priority: Some(10),
                ..Default::default()
            },
        );
        let manager = IntegratedPageManager::new(doc);
        manager
            .register_page(PageDescriptor::new("eager", PageType::Dashboard, || {
                BUILDS.fetch_add(1, Ordering::Relaxed);
                Ok(Box::new(Blank))
            }))
            .unwrap();
        manager.register_page(blank("lazy")).unwrap();

        // Preload disabled by default: no build.
        manager.preload("lazy").unwrap();
        // Preload enabled: builds in the background.
        manager.preload("eager").unwrap();

        for _ in 0..100 {
            if manager.cache().contains("eager") {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(manager.cache().contains("eager"));
        assert_eq!(BUILDS.load(Ordering::Relaxed), 1);

        // Navigation now hits the preloaded instance.
        let result = manager.navigate_to("eager", None).unwrap();
        assert!(!result.cold_load);
        assert_eq!(BUILDS.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_performance_stats_accumulate() {
        let manager = IntegratedPageManager::with_defaults();
        manager
            .register_pages(vec![blank("a"), blank("b")])
            .unwrap();

        manager.navigate_to("a", None).unwrap();
        manager.navigate_to("b", None).unwrap();
        manager.navigate_to("a", None).unwrap();

        let report = manager.get_performance_stats();
        assert_eq!(report.timings.switch.count, 3);
        // Third navigation was a cache hit.
        assert!(report.cache.hits >= 1);
        assert_eq!(report.cache.resident_pages, 2);

        let rendered = format!("{}", report);
        assert!(rendered.contains("switch avg"));
    }

    #[test]
    fn test_reload_config_swaps_strategy() {
        let manager = IntegratedPageManager::with_defaults();
        assert_eq!(
            manager.cache().strategy(),
            crate::cache::EvictionStrategy::Lru
        );

        let mut doc = ConfigDocument::default();
        doc.global.eviction_strategy = crate::cache::EvictionStrategy::Fifo;
        manager.reload_config(doc);

        assert_eq!(
            manager.cache().strategy(),
            crate::cache::EvictionStrategy::Fifo
        );
    }

    #[test]
    fn test_sample_memory_reaches_cache_entry() {
        let manager = IntegratedPageManager::with_defaults();
        manager.register_page(blank("a")).unwrap();
        manager.navigate_to("a", None).unwrap();

        manager.sample_memory("a", 12.0);
        assert_eq!(manager.cache().memory_usage_mb(), 12.0);
    }

    #[test]
    fn test_independent_managers() {
        let one = IntegratedPageManager::with_defaults();
        let two = IntegratedPageManager::with_defaults();

        one.register_page(blank("a")).unwrap();
        // "a" is unknown to the second manager: no shared global state.
        assert!(two.navigate_to("a", None).is_err());
        assert!(one.navigate_to("a", None).is_ok());
    }
}
