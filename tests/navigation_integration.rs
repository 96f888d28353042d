//! Integration tests for the navigation facade.
//!
//! These tests verify cross-component behavior that unit tests don't cover:
//! the full navigate → policy → cache/loader → transition → history path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use pagecycle::{
    ConfigDocument, Error, IntegratedPageManager, Page, PageDescriptor, PageParams, PageType,
    PolicyOverride,
};

/// Page that appends its lifecycle events to a shared log.
struct LoggedPage {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Page for LoggedPage {
    fn on_page_enter(&mut self, _params: &PageParams) {
        self.log.lock().push(format!("enter:{}", self.name));
    }

    fn on_page_leave(&mut self) {
        self.log.lock().push(format!("leave:{}", self.name));
    }

    fn cleanup(&mut self) {
        self.log.lock().push(format!("cleanup:{}", self.name));
    }
}

fn logged_descriptor(
    name: &str,
    page_type: PageType,
    log: &Arc<Mutex<Vec<String>>>,
    builds: &Arc<AtomicU32>,
) -> PageDescriptor {
    let log = Arc::clone(log);
    let builds = Arc::clone(builds);
    let page_name = name.to_string();
    PageDescriptor::new(name, page_type, move || {
        builds.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(LoggedPage {
            name: page_name.clone(),
            log: Arc::clone(&log),
        }))
    })
}

/// Scenario: cold navigation to a preload-enabled dashboard shows and hides
/// the loading indicator, enters the page once, and leaves one resident
/// entry.
#[test]
fn test_cold_navigation_to_dashboard() {
    let mut doc = ConfigDocument::default();
    doc.pages.insert(
        "dashboard".into(),
        PolicyOverride {
            preload_enabled: Some(true),
            preload_priority: Some(10),
            ..Default::default()
        },
    );
    let manager = IntegratedPageManager::new(doc);

    let log = Arc::new(Mutex::new(Vec::new()));
    let builds = Arc::new(AtomicU32::new(0));
    manager
        .register_page(logged_descriptor(
            "dashboard",
            PageType::Dashboard,
            &log,
            &builds,
        ))
        .unwrap();

    let indicator: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&indicator);
    manager.set_loading_observer(Box::new(move |visible| sink.lock().push(visible)));

    let result = manager.navigate_to("dashboard", None).unwrap();

    assert!(result.cold_load);
    assert_eq!(*indicator.lock(), vec![true, false]);
    assert_eq!(*log.lock(), vec!["enter:dashboard"]);
    assert_eq!(manager.cache().size(), 1);
    assert_eq!(builds.load(Ordering::Relaxed), 1);
}

/// Scenario: a cache-disabled page is constructed fresh on every
/// navigation.
#[test]
fn test_disabled_cache_constructs_every_time() {
    let mut doc = ConfigDocument::default();
    doc.page_types.insert(
        PageType::Settings,
        PolicyOverride {
            cache_enabled: Some(false),
            ..Default::default()
        },
    );
    let manager = IntegratedPageManager::new(doc);

    let log = Arc::new(Mutex::new(Vec::new()));
    let builds = Arc::new(AtomicU32::new(0));
    manager
        .register_page(logged_descriptor(
            "settings",
            PageType::Settings,
            &log,
            &builds,
        ))
        .unwrap();

    manager.navigate_to("settings", None).unwrap();
    manager.navigate_to("settings", None).unwrap();

    assert_eq!(builds.load(Ordering::Relaxed), 2);
    assert_eq!(manager.cache().size(), 0);
    // The first instance was left and released before the second entered.
    assert_eq!(
        *log.lock(),
        vec![
            "enter:settings",
            "leave:settings",
            "cleanup:settings",
            "enter:settings"
        ]
    );
}

/// Scenario: with a one-entry budget and LRU, navigating a → b evicts "a"
/// once it stops being the visible page.
#[test]
fn test_single_slot_lru_eviction() {
    let mut doc = ConfigDocument::default();
    doc.global.max_resident_pages = 1;
    let manager = IntegratedPageManager::new(doc);

    let log = Arc::new(Mutex::new(Vec::new()));
    let builds = Arc::new(AtomicU32::new(0));
    manager
        .register_page(logged_descriptor("a", PageType::ListView, &log, &builds))
        .unwrap();
    manager
        .register_page(logged_descriptor("b", PageType::ListView, &log, &builds))
        .unwrap();

    manager.navigate_to("a", None).unwrap();
    manager.navigate_to("b", None).unwrap();

    assert!(manager.cache().get("a").is_none());
    assert!(manager.cache().contains("b"));
    assert_eq!(manager.cache().size(), 1);
}

/// Scenario: TTL expiry removes a page via the explicit sweep, but never
/// while it is the visible page.
#[test]
fn test_ttl_expiry_sweep() {
    let mut doc = ConfigDocument::default();
    doc.pages.insert(
        "c".into(),
        PolicyOverride {
            ttl_seconds: Some(0.05),
            ..Default::default()
        },
    );
    let manager = IntegratedPageManager::new(doc);

    let log = Arc::new(Mutex::new(Vec::new()));
    let builds = Arc::new(AtomicU32::new(0));
    manager
        .register_page(logged_descriptor("c", PageType::ListView, &log, &builds))
        .unwrap();
    manager
        .register_page(logged_descriptor("d", PageType::ListView, &log, &builds))
        .unwrap();

    manager.navigate_to("c", None).unwrap();
    std::thread::sleep(Duration::from_millis(100));

    // Expired but visible: the sweep must not touch it.
    assert_eq!(manager.evict_expired(), 0);
    assert!(manager.cache().contains("c"));

    // Once navigation moves on, the sweep reclaims it.
    manager.navigate_to("d", None).unwrap();
    assert_eq!(manager.evict_expired(), 1);
    assert!(!manager.cache().contains("c"));
}

/// Scenario: a failing factory surfaces an error, leaves the previous page
/// active, and does not poison later retries.
#[test]
fn test_factory_failure_and_retry() {
    let manager = IntegratedPageManager::with_defaults();

    let log = Arc::new(Mutex::new(Vec::new()));
    let builds = Arc::new(AtomicU32::new(0));
    manager
        .register_page(logged_descriptor("home", PageType::Dashboard, &log, &builds))
        .unwrap();

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let retry_log = Arc::clone(&log);
    manager
        .register_page(PageDescriptor::new("flaky", PageType::DetailView, move || {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            if n == 0 {
                Err("database offline".into())
            } else {
                Ok(Box::new(LoggedPage {
                    name: "flaky".into(),
                    log: Arc::clone(&retry_log),
                }))
            }
        }))
        .unwrap();

    manager.navigate_to("home", None).unwrap();

    let err = manager.navigate_to("flaky", None).unwrap_err();
    assert!(matches!(err, Error::PageConstruction { .. }));
    assert_eq!(manager.current_page_name().as_deref(), Some("home"));
    assert!(!manager.cache().contains("flaky"));
    // The failed attempt appended no history entry.
    assert_eq!(manager.history().len(), 1);

    // Retry constructs again and succeeds.
    manager.navigate_to("flaky", None).unwrap();
    assert_eq!(attempts.load(Ordering::Relaxed), 2);
    assert_eq!(manager.current_page_name().as_deref(), Some("flaky"));
}

/// Ordering law: every successful switch runs `on_page_leave` of the
/// previous page strictly before `on_page_enter` of the next, exactly once.
#[test]
fn test_lifecycle_ordering_across_navigations() {
    let manager = IntegratedPageManager::with_defaults();

    let log = Arc::new(Mutex::new(Vec::new()));
    let builds = Arc::new(AtomicU32::new(0));
    for name in ["a", "b", "c"] {
        manager
            .register_page(logged_descriptor(name, PageType::ListView, &log, &builds))
            .unwrap();
    }

    manager.navigate_to("a", None).unwrap();
    manager.navigate_to("b", None).unwrap();
    manager.navigate_to("c", None).unwrap();
    manager.go_back().unwrap().unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "enter:a", "leave:a", "enter:b", "leave:b", "enter:c", "leave:c", "enter:b"
        ]
    );
}

/// A slow-but-successful load completes in the background past the
/// caller's timeout and serves the next navigation from the cache.
#[test]
fn test_timeout_then_background_completion() {
    let mut doc = ConfigDocument::default();
    doc.pages.insert(
        "slow".into(),
        PolicyOverride {
            load_timeout_seconds: Some(0.02),
            ..Default::default()
        },
    );
    let manager = IntegratedPageManager::new(doc);

    let log = Arc::new(Mutex::new(Vec::new()));
    let slow_log = Arc::clone(&log);
    manager
        .register_page(PageDescriptor::new("slow", PageType::ListView, move || {
            std::thread::sleep(Duration::from_millis(150));
            Ok(Box::new(LoggedPage {
                name: "slow".into(),
                log: Arc::clone(&slow_log),
            }))
        }))
        .unwrap();

    let err = manager.navigate_to("slow", None).unwrap_err();
    assert!(matches!(err, Error::LoadTimeout { .. }));
    assert!(manager.current_page_name().is_none());

    // The worker finishes and installs a valid, non-corrupt entry.
    std::thread::sleep(Duration::from_millis(300));
    assert!(manager.cache().contains("slow"));

    let result = manager.navigate_to("slow", None).unwrap();
    assert!(!result.cold_load);
    assert_eq!(*log.lock(), vec!["enter:slow"]);
}

/// A lifecycle hook that navigates re-entrantly gets
/// `TransitionInProgress` instead of deadlocking the gate.
#[test]
fn test_reentrant_navigation_is_rejected() {
    static SLOT: OnceLock<Weak<IntegratedPageManager>> = OnceLock::new();

    struct ReentrantPage {
        observed: Arc<Mutex<Option<Error>>>,
    }

    impl Page for ReentrantPage {
        fn on_page_enter(&mut self, _params: &PageParams) {
            if let Some(manager) = SLOT.get().and_then(Weak::upgrade) {
                if let Err(err) = manager.navigate_to("other", None) {
                    *self.observed.lock() = Some(err);
                }
            }
        }

        fn on_page_leave(&mut self) {}
        fn cleanup(&mut self) {}
    }

    let manager = Arc::new(IntegratedPageManager::with_defaults());
    let _ = SLOT.set(Arc::downgrade(&manager));

    let observed: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
    let observed_factory = Arc::clone(&observed);
    manager
        .register_page(PageDescriptor::new(
            "reentrant",
            PageType::Custom,
            move || {
                Ok(Box::new(ReentrantPage {
                    observed: Arc::clone(&observed_factory),
                }))
            },
        ))
        .unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let builds = Arc::new(AtomicU32::new(0));
    manager
        .register_page(logged_descriptor("other", PageType::ListView, &log, &builds))
        .unwrap();

    manager.navigate_to("reentrant", None).unwrap();

    assert!(matches!(
        observed.lock().take(),
        Some(Error::TransitionInProgress)
    ));
    // The outer transition completed normally.
    assert_eq!(manager.current_page_name().as_deref(), Some("reentrant"));
}

/// Breadcrumbs derive from registration metadata, not navigation state.
#[test]
fn test_breadcrumbs_from_registration() {
    let manager = IntegratedPageManager::with_defaults();

    let log = Arc::new(Mutex::new(Vec::new()));
    let builds = Arc::new(AtomicU32::new(0));
    manager
        .register_page(
            logged_descriptor("customers", PageType::ListView, &log, &builds)
                .with_route("/customers"),
        )
        .unwrap();
    manager
        .register_page(
            logged_descriptor("customer_detail", PageType::DetailView, &log, &builds)
                .with_parent("customers"),
        )
        .unwrap();

    assert_eq!(
        manager.registry().breadcrumb_trail("customer_detail"),
        vec!["customers", "customer_detail"]
    );
}

/// Hit rate and switch timings accumulate across a realistic session.
#[test]
fn test_session_statistics() {
    let manager = IntegratedPageManager::with_defaults();

    let log = Arc::new(Mutex::new(Vec::new()));
    let builds = Arc::new(AtomicU32::new(0));
    for name in ["customers", "suppliers", "quotes"] {
        manager
            .register_page(logged_descriptor(name, PageType::ListView, &log, &builds))
            .unwrap();
    }

    manager.navigate_to("customers", None).unwrap();
    manager.navigate_to("suppliers", None).unwrap();
    manager.navigate_to("customers", None).unwrap(); // hit
    manager.navigate_to("quotes", None).unwrap();
    manager.navigate_to("suppliers", None).unwrap(); // hit

    let report = manager.get_performance_stats();
    assert_eq!(report.timings.switch.count, 5);
    assert_eq!(report.timings.load.count, 3);
    assert_eq!(report.cache.resident_pages, 3);
    assert!(report.cache.hit_rate() > 0.0);
    assert_eq!(builds.load(Ordering::Relaxed), 3);
}
