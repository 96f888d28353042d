//! Page transitions - the ordered, observable hand-off between pages.
//!
//! [`PageTransitionManager`] owns the notion of the "active" (visible)
//! page. It is the only place the cache's pin/unpin is called, which is
//! what keeps eviction away from the page the user is looking at
//! mid-switch.
//!
//! # Ordering
//! Within one transition, `on_page_leave` of the previous page runs
//! strictly before `on_page_enter` of the next, exactly once per leave
//! event. Concurrent `switch_to` calls from other threads queue on the
//! transition gate (never dropped, never interleaved); a re-entrant call
//! from inside a lifecycle hook gets [`Error::TransitionInProgress`]
//! instead of deadlocking.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cache::PageCache;
use crate::common::{Error, Result};
use crate::loader::LazyPageLoader;
use crate::monitor::{Operation, PerformanceMonitor};
use crate::page::{PageHandle, PageParams};
use crate::policy::PagePolicy;
use crate::registry::{PageDescriptor, PageRegistry};

/// Outcome of a successful switch.
#[derive(Debug, Clone)]
pub struct TransitionResult {
    /// The page that was visible before, if any.
    pub from: Option<String>,
    /// The page now visible.
    pub to: String,
    /// True when the target had to be materialized (cache miss or
    /// uncacheable page); the loading indicator was shown.
    pub cold_load: bool,
    /// Wall-clock duration of the whole switch.
    pub duration: Duration,
}

/// Callback observing the loading indicator (true = shown).
pub type LoadingObserver = Box<dyn Fn(bool) + Send + Sync>;

/// The currently visible page.
#[derive(Clone)]
struct ActivePage {
    name: String,
    handle: PageHandle,
    /// Resident pages are pinned in the cache; transient instances
    /// (cache disabled) are owned here alone and cleaned up on leave.
    resident: bool,
}

/// Sequences the visible hand-off between the active page and the next.
pub struct PageTransitionManager {
    registry: Arc<PageRegistry>,
    cache: Arc<PageCache>,
    loader: Arc<LazyPageLoader>,
    monitor: Arc<PerformanceMonitor>,

    /// Serializes transitions; held for the whole switch.
    gate: Mutex<()>,

    /// Thread currently holding the gate, for re-entrancy detection.
    gate_owner: Mutex<Option<ThreadId>>,

    /// The visible page. Separate from the gate so `current_page` never
    /// blocks behind a slow load.
    active: Mutex<Option<ActivePage>>,

    loading: AtomicBool,
    loading_observer: Mutex<Option<LoadingObserver>>,
}

impl PageTransitionManager {
    pub fn new(
        registry: Arc<PageRegistry>,
        cache: Arc<PageCache>,
        loader: Arc<LazyPageLoader>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            registry,
            cache,
            loader,
            monitor,
            gate: Mutex::new(()),
            gate_owner: Mutex::new(None),
            active: Mutex::new(None),
            loading: AtomicBool::new(false),
            loading_observer: Mutex::new(None),
        }
    }

    // ========================================================================
    // Public API
    // ========================================================================

    /// Switch the visible page to `descriptor`, materializing it first if
    /// needed.
    ///
    /// On any failure the previous page stays active and unpinned state is
    /// untouched - there is no partial switch.
    ///
    /// # Errors
    /// - [`Error::TransitionInProgress`] on re-entry from a lifecycle hook
    /// - [`Error::LoadTimeout`] / [`Error::PageConstruction`] /
    ///   [`Error::LoadCancelled`] when the target cannot be materialized
    pub fn switch_to(
        &self,
        descriptor: &PageDescriptor,
        params: &PageParams,
        policy: &PagePolicy,
    ) -> Result<TransitionResult> {
        let me = thread::current().id();
        if *self.gate_owner.lock() == Some(me) {
            return Err(Error::TransitionInProgress);
        }

        let _gate = self.gate.lock();
        *self.gate_owner.lock() = Some(me);
        let _reset = OwnerReset(&self.gate_owner);

        self.perform_switch(descriptor, params, policy)
    }

    /// Handle to the visible page, if any.
    pub fn current_page(&self) -> Option<PageHandle> {
        self.active.lock().as_ref().map(|a| Arc::clone(&a.handle))
    }

    /// Name of the visible page, if any.
    pub fn current_name(&self) -> Option<String> {
        self.active.lock().as_ref().map(|a| a.name.clone())
    }

    /// Invoke the visible page's refresh hook. Returns false when no page
    /// is active.
    pub fn refresh_current(&self) -> bool {
        let handle = self.current_page();
        match handle {
            Some(h) => {
                h.lock().refresh();
                true
            }
            None => false,
        }
    }

    /// Whether the loading indicator is currently shown.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Relaxed)
    }

    /// Install the loading-indicator observer, replacing any previous one.
    pub fn set_loading_observer(&self, observer: LoadingObserver) {
        *self.loading_observer.lock() = Some(observer);
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn perform_switch(
        &self,
        descriptor: &PageDescriptor,
        params: &PageParams,
        policy: &PagePolicy,
    ) -> Result<TransitionResult> {
        let started = Instant::now();
        let name = descriptor.name.as_str();

        // Step 1-3: obtain the target instance, showing the loading
        // indicator while it is not yet resident.
        let (handle, resident, cold_load) = if policy.cache_enabled {
            match self.cache.get(name) {
                Some(entry) => (entry.instance, true, false),
                None => {
                    self.set_loading(true);
                    match self.loader.load_sync(name, *policy, policy.load_timeout()) {
                        Ok(entry) => (entry.instance, true, true),
                        Err(err) => {
                            self.set_loading(false);
                            log::warn!("switch to '{}' failed: {}", name, err);
                            return Err(err);
                        }
                    }
                }
            }
        } else {
            // Uncacheable page: construct synchronously, every time.
            self.set_loading(true);
            let load_started = Instant::now();
            match self.registry.create_instance(name) {
                Ok(handle) => {
                    self.monitor.record(
                        Operation::Load,
                        name,
                        load_started.elapsed().as_secs_f64() * 1000.0,
                    );
                    (handle, false, true)
                }
                Err(err) => {
                    self.set_loading(false);
                    log::warn!("switch to '{}' failed: {}", name, err);
                    return Err(err);
                }
            }
        };

        // Keep the target safe from eviction for the rest of the switch.
        if resident {
            self.cache.pin(name);
        }

        // Step 4: ordered lifecycle hand-off.
        let prev = self.active.lock().clone();
        if let Some(prev) = &prev {
            prev.handle.lock().on_page_leave();
            if prev.resident {
                if prev.name != name {
                    self.cache.unpin(&prev.name);
                }
            } else {
                // Transient instance; nobody holds it after this point.
                let result = catch_unwind(AssertUnwindSafe(|| {
                    prev.handle.lock().cleanup();
                }));
                if result.is_err() {
                    log::warn!("cleanup hook for page '{}' panicked", prev.name);
                }
            }
        }

        handle.lock().on_page_enter(params);

        *self.active.lock() = Some(ActivePage {
            name: name.to_string(),
            handle,
            resident,
        });

        // Releasing the previous pin may have re-opened eviction room the
        // insert could not claim; settle the budgets now.
        self.cache.enforce_budgets();

        // Step 5: done.
        self.set_loading(false);
        let duration = started.elapsed();
        self.monitor
            .record(Operation::Switch, name, duration.as_secs_f64() * 1000.0);
        log::debug!(
            "switched {} -> '{}' in {:?}{}",
            prev.as_ref().map(|p| p.name.as_str()).unwrap_or("(none)"),
            name,
            duration,
            if cold_load { " (cold)" } else { "" }
        );

        Ok(TransitionResult {
            from: prev.map(|p| p.name),
            to: name.to_string(),
            cold_load,
            duration,
        })
    }

    fn set_loading(&self, visible: bool) {
        self.loading.store(visible, Ordering::Relaxed);
        if let Some(observer) = self.loading_observer.lock().as_ref() {
            observer(visible);
        }
    }
}

/// Clears the gate owner even if a lifecycle hook panics.
struct OwnerReset<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for OwnerReset<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionStrategy;
    use crate::page::Page;
    use crate::policy::PageConfigurationManager;
    use crate::registry::PageType;

    /// Page that appends its lifecycle events to a shared log.
    struct LoggedPage {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Page for LoggedPage {
        fn on_page_enter(&mut self, params: &PageParams) {
            let suffix = params
                .get("id")
                .map(|v| format!("({})", v))
                .unwrap_or_default();
            self.log.lock().push(format!("enter:{}{}", self.name, suffix));
        }

        fn on_page_leave(&mut self) {
            self.log.lock().push(format!("leave:{}", self.name));
        }

        fn cleanup(&mut self) {
            self.log.lock().push(format!("cleanup:{}", self.name));
        }
    }

    struct Fixture {
        registry: Arc<PageRegistry>,
        cache: Arc<PageCache>,
        transitions: PageTransitionManager,
        log: Arc<Mutex<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(PageRegistry::new());
        let monitor = Arc::new(PerformanceMonitor::with_defaults());
        let cache = Arc::new(PageCache::new(
            8,
            0.0,
            EvictionStrategy::Lru,
            Arc::clone(&monitor),
        ));
        let loader = Arc::new(LazyPageLoader::new(
            2,
            Arc::clone(&registry),
            Arc::clone(&cache),
            Arc::clone(&monitor),
        ));
        let transitions = PageTransitionManager::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            loader,
            monitor,
        );
        Fixture {
            registry,
            cache,
            transitions,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn register_logged(fx: &Fixture, name: &'static str) {
        let log = Arc::clone(&fx.log);
        fx.registry
            .register(PageDescriptor::new(name, PageType::ListView, move || {
                Ok(Box::new(LoggedPage {
                    name,
                    log: Arc::clone(&log),
                }))
            }))
            .unwrap();
    }

    fn policy() -> PagePolicy {
        PageConfigurationManager::default().resolve_policy("x", PageType::ListView)
    }

    fn switch(fx: &Fixture, name: &str, policy: &PagePolicy) -> Result<TransitionResult> {
        let descriptor = fx.registry.descriptor(name)?;
        fx.transitions
            .switch_to(&descriptor, &PageParams::new(), policy)
    }

    #[test]
    fn test_leave_strictly_before_enter() {
        let fx = fixture();
        register_logged(&fx, "a");
        register_logged(&fx, "b");
        let p = policy();

        switch(&fx, "a", &p).unwrap();
        let result = switch(&fx, "b", &p).unwrap();

        assert_eq!(result.from.as_deref(), Some("a"));
        assert_eq!(result.to, "b");
        assert_eq!(*fx.log.lock(), vec!["enter:a", "leave:a", "enter:b"]);
    }

    #[test]
    fn test_active_page_pinned() {
        let fx = fixture();
        register_logged(&fx, "a");
        register_logged(&fx, "b");
        let p = policy();

        switch(&fx, "a", &p).unwrap();
        assert!(fx.cache.is_pinned("a"));

        switch(&fx, "b", &p).unwrap();
        assert!(!fx.cache.is_pinned("a"));
        assert!(fx.cache.is_pinned("b"));
        assert_eq!(fx.transitions.current_name().as_deref(), Some("b"));
    }

    #[test]
    fn test_failed_switch_keeps_previous_active() {
        let fx = fixture();
        register_logged(&fx, "a");
        fx.registry
            .register(PageDescriptor::new("broken", PageType::Custom, || {
                Err("boom".into())
            }))
            .unwrap();
        let p = policy();

        switch(&fx, "a", &p).unwrap();
        let err = switch(&fx, "broken", &p).unwrap_err();
        assert!(matches!(err, Error::PageConstruction { .. }));

        assert_eq!(fx.transitions.current_name().as_deref(), Some("a"));
        assert!(fx.cache.is_pinned("a"));
        assert!(!fx.transitions.is_loading());
        // "a" never got a leave event.
        assert_eq!(*fx.log.lock(), vec!["enter:a"]);
    }

    #[test]
    fn test_uncacheable_page_rebuilt_and_cleaned_up() {
        let fx = fixture();
        register_logged(&fx, "settings");
        register_logged(&fx, "home");

        let mut uncached = policy();
        uncached.cache_enabled = false;
        let cached = policy();

        switch(&fx, "settings", &uncached).unwrap();
        assert!(!fx.cache.contains("settings"));

        switch(&fx, "home", &cached).unwrap();
        assert_eq!(
            *fx.log.lock(),
            vec![
                "enter:settings",
                "leave:settings",
                "cleanup:settings",
                "enter:home"
            ]
        );
    }

    #[test]
    fn test_loading_observer_sees_cold_loads_only() {
        let fx = fixture();
        register_logged(&fx, "a");
        let p = policy();

        let events: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        fx.transitions
            .set_loading_observer(Box::new(move |visible| sink.lock().push(visible)));

        // Cold: shown then hidden.
        let result = switch(&fx, "a", &p).unwrap();
        assert!(result.cold_load);
        assert_eq!(*events.lock(), vec![true, false]);

        // Warm hit: the indicator never appears.
        events.lock().clear();
        let result = switch(&fx, "a", &p).unwrap();
        assert!(!result.cold_load);
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_navigate_to_self_stays_pinned() {
        let fx = fixture();
        register_logged(&fx, "a");
        let p = policy();

        switch(&fx, "a", &p).unwrap();
        switch(&fx, "a", &p).unwrap();

        assert!(fx.cache.is_pinned("a"));
        assert_eq!(*fx.log.lock(), vec!["enter:a", "leave:a", "enter:a"]);
    }

    #[test]
    fn test_params_reach_enter_hook() {
        let fx = fixture();
        register_logged(&fx, "detail");
        let p = policy();

        let descriptor = fx.registry.descriptor("detail").unwrap();
        let mut params = PageParams::new();
        params.insert("id".into(), "42".into());
        fx.transitions.switch_to(&descriptor, &params, &p).unwrap();

        assert_eq!(*fx.log.lock(), vec!["enter:detail(42)"]);
    }

    #[test]
    fn test_refresh_current() {
        let fx = fixture();
        register_logged(&fx, "a");

        assert!(!fx.transitions.refresh_current());
        switch(&fx, "a", &policy()).unwrap();
        assert!(fx.transitions.refresh_current());
    }

    #[test]
    fn test_concurrent_switches_serialize() {
        use std::thread;

        let fx = Arc::new(fixture());
        register_logged(&fx, "x");
        register_logged(&fx, "y");
        let p = policy();

        let mut handles = vec![];
        for name in ["x", "y", "x", "y"] {
            let fx = Arc::clone(&fx);
            let p = p;
            handles.push(thread::spawn(move || switch(&fx, name, &p).unwrap()));
        }
        for h in handles {
            h.join().unwrap();
        }

        // Every transition ran whole: the log alternates enter/leave
        // without interleaving.
        let log = fx.log.lock();
        let enters = log.iter().filter(|e| e.starts_with("enter:")).count();
        let leaves = log.iter().filter(|e| e.starts_with("leave:")).count();
        assert_eq!(enters, 4);
        assert_eq!(leaves, 3);
    }
}
