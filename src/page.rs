//! The page abstraction managed by this crate.
//!
//! A page is an opaque, named, re-creatable UI unit. The cache and
//! transition layers only ever call the lifecycle hooks defined here; they
//! never inspect page content or touch rendering APIs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Parameters carried by a navigation request, opaque to this crate.
pub type PageParams = HashMap<String, String>;

/// Shared handle to a materialized page instance.
///
/// Mirrors the interior-mutability shape of a buffer frame: the handle can
/// be cloned freely (cache entry, active-page slot, waiters of the same
/// load task), while lifecycle hooks take `&mut` access under the page's
/// own mutex. Hooks are never invoked while the cache map lock is held.
pub type PageHandle = Arc<Mutex<Box<dyn Page>>>;

/// Lifecycle hooks every managed page must implement.
///
/// Implemented by the host application's page objects. The transition
/// manager guarantees `on_page_leave` of the previous page runs strictly
/// before `on_page_enter` of the next, and the cache calls `cleanup`
/// exactly once when an instance is evicted or discarded.
pub trait Page: Send {
    /// Called when the page becomes the visible page.
    fn on_page_enter(&mut self, params: &PageParams);

    /// Called when the page stops being the visible page.
    fn on_page_leave(&mut self);

    /// Called when the instance is released (eviction or discard).
    ///
    /// A panic here is caught and logged by the cache; it never blocks
    /// removal of the entry.
    fn cleanup(&mut self);

    /// Called by `refresh_current_page`. Optional.
    fn refresh(&mut self) {}
}

impl fmt::Debug for dyn Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<dyn Page>")
    }
}

/// Wrap a freshly constructed page object into a shareable handle.
pub fn into_handle(page: Box<dyn Page>) -> PageHandle {
    Arc::new(Mutex::new(page))
}
