//! Page registry - name to factory and static metadata.
//!
//! The [`PageRegistry`] maps each page name to the factory that can
//! re-create it plus registration-time metadata (type, route, parent).
//! It is a leaf component: no dependency on the cache or loader, and
//! `create_instance` has no cache side effects.
//!
//! The registry is an explicit instance owned by the facade and passed by
//! handle to collaborators. There is no process-wide page map, so tests can
//! run multiple independent navigation systems side by side.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::common::{BoxedError, Error, Result};
use crate::page::{into_handle, Page, PageHandle};

/// Factory producing a fresh page instance.
///
/// Factories may fail; the registry wraps any failure as
/// [`Error::PageConstruction`] with the original cause attached.
pub type PageFactory =
    Arc<dyn Fn() -> std::result::Result<Box<dyn Page>, BoxedError> + Send + Sync>;

/// Classification of a page, used to look up type-level policy defaults.
///
/// A closed set: policy resolution switches on the tag. Pages that fit no
/// built-in category register as `Custom` and carry their policy in the
/// per-page configuration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Dashboard,
    ListView,
    DetailView,
    Settings,
    DataManagement,
    Custom,
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            PageType::Dashboard => "dashboard",
            PageType::ListView => "list_view",
            PageType::DetailView => "detail_view",
            PageType::Settings => "settings",
            PageType::DataManagement => "data_management",
            PageType::Custom => "custom",
        };
        write!(f, "{}", tag)
    }
}

/// Static description of a registered page. Created once at registration
/// time, never mutated.
///
/// `parent_name` is a plain name lookup used for breadcrumb construction,
/// never an owning edge - back-references stay "relation + lookup" so no
/// reference cycles can form.
#[derive(Clone)]
pub struct PageDescriptor {
    pub name: String,
    pub factory: PageFactory,
    pub page_type: PageType,
    pub route_path: Option<String>,
    pub parent_name: Option<String>,
}

impl PageDescriptor {
    /// Build a descriptor with no route or parent.
    pub fn new(
        name: impl Into<String>,
        page_type: PageType,
        factory: impl Fn() -> std::result::Result<Box<dyn Page>, BoxedError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            page_type,
            route_path: None,
            parent_name: None,
        }
    }

    /// Attach a hierarchical route path.
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route_path = Some(route.into());
        self
    }

    /// Attach a parent page name (breadcrumb relation only).
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_name = Some(parent.into());
        self
    }
}

impl fmt::Debug for PageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageDescriptor")
            .field("name", &self.name)
            .field("page_type", &self.page_type)
            .field("route_path", &self.route_path)
            .field("parent_name", &self.parent_name)
            .finish()
    }
}

/// Maps page names to descriptors.
///
/// # Thread Safety
/// Registration happens at startup but may race with navigation in tests,
/// so the map sits behind an `RwLock` - many readers, few writers.
#[derive(Default)]
pub struct PageRegistry {
    descriptors: RwLock<HashMap<String, PageDescriptor>>,
}

impl PageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page descriptor.
    ///
    /// # Errors
    /// [`Error::DuplicateName`] if the name is already registered.
    pub fn register(&self, descriptor: PageDescriptor) -> Result<()> {
        let mut map = self.descriptors.write();
        if map.contains_key(&descriptor.name) {
            return Err(Error::DuplicateName(descriptor.name));
        }
        map.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Look up a descriptor by name.
    ///
    /// # Errors
    /// [`Error::UnknownPage`] if absent.
    pub fn descriptor(&self, name: &str) -> Result<PageDescriptor> {
        self.descriptors
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownPage(name.to_string()))
    }

    /// Invoke the stored factory for `name` and wrap the result in a
    /// shareable handle.
    ///
    /// Has no side effect on the cache; installing the instance is the
    /// caller's business.
    ///
    /// # Errors
    /// - [`Error::UnknownPage`] if the name is not registered
    /// - [`Error::PageConstruction`] if the factory fails
    pub fn create_instance(&self, name: &str) -> Result<PageHandle> {
        let factory = {
            let map = self.descriptors.read();
            let descriptor = map
                .get(name)
                .ok_or_else(|| Error::UnknownPage(name.to_string()))?;
            Arc::clone(&descriptor.factory)
        };

        // Run the factory outside the registry lock; factories can be slow.
        let page = factory().map_err(|cause| Error::construction(name, cause))?;
        Ok(into_handle(page))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.read().contains_key(name)
    }

    /// Number of registered pages.
    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }

    /// All registered page names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.descriptors.read().keys().cloned().collect()
    }

    /// Breadcrumb trail for `name`, root first.
    ///
    /// Walks `parent_name` links. The walk is bounded by the number of
    /// registered pages, so a cyclic parent relation terminates instead of
    /// spinning.
    pub fn breadcrumb_trail(&self, name: &str) -> Vec<String> {
        let map = self.descriptors.read();
        let mut trail = Vec::new();
        let mut current = Some(name.to_string());
        let limit = map.len();

        while let Some(n) = current {
            if trail.len() > limit || trail.contains(&n) {
                break;
            }
            match map.get(&n) {
                Some(d) => {
                    trail.push(n);
                    current = d.parent_name.clone();
                }
                None => break,
            }
        }

        trail.reverse();
        trail
    }

    /// The route path registered for `name`, if any.
    pub fn route_path(&self, name: &str) -> Option<String> {
        self.descriptors
            .read()
            .get(name)
            .and_then(|d| d.route_path.clone())
    }
}
