//! Error types for pagecycle.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Boxed error type page factories are allowed to fail with.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in pagecycle.
///
/// By having a single error type, error handling stays consistent across
/// the registry, cache, loader, and navigation layers.
///
/// # Cloning
/// `Error` is `Clone` so a single load failure can be handed to every
/// waiter of the same in-flight task (synchronous callers and completion
/// callbacks alike). Underlying causes are therefore shared via `Arc`.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A page name was registered twice.
    ///
    /// Registration-time, fatal to that `register` call only.
    #[error("page name already registered: '{0}'")]
    DuplicateName(String),

    /// Navigation or preload targeted a name with no descriptor.
    #[error("no page registered under name '{0}'")]
    UnknownPage(String),

    /// A page factory failed. Wraps the underlying cause.
    ///
    /// The cache is left untouched (no partial entry) and the previously
    /// active page remains displayed.
    #[error("failed to construct page '{name}': {cause}")]
    PageConstruction {
        name: String,
        cause: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A caller's wait exceeded the configured load timeout.
    ///
    /// The underlying task, if still running, is left to complete
    /// asynchronously and will populate the cache for a future navigation.
    #[error("page '{name}' did not load within {waited:?}")]
    LoadTimeout { name: String, waited: Duration },

    /// A waiter observed its load task reach the Cancelled state.
    #[error("load of page '{0}' was cancelled")]
    LoadCancelled(String),

    /// `switch_to` was re-entered from the thread already running a
    /// transition (e.g. a lifecycle hook navigating). Concurrent calls from
    /// other threads queue instead of seeing this error.
    #[error("a page transition is already in progress on this thread")]
    TransitionInProgress,

    /// The configuration document could not be parsed.
    #[error("invalid configuration document: {0}")]
    InvalidConfig(Arc<serde_json::Error>),
}

impl Error {
    /// Wrap a factory failure for the named page.
    pub fn construction(name: impl Into<String>, cause: BoxedError) -> Self {
        Error::PageConstruction {
            name: name.into(),
            cause: Arc::from(cause),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidConfig(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownPage("reports".into());
        assert_eq!(format!("{}", err), "no page registered under name 'reports'");

        let err = Error::DuplicateName("dashboard".into());
        assert_eq!(
            format!("{}", err),
            "page name already registered: 'dashboard'"
        );
    }

    #[test]
    fn test_construction_error_carries_cause() {
        let cause: BoxedError = "widget tree failed to build".into();
        let err = Error::construction("dashboard", cause);

        let msg = format!("{}", err);
        assert!(msg.contains("dashboard"));
        assert!(msg.contains("widget tree failed to build"));
    }

    #[test]
    fn test_error_is_cloneable() {
        let cause: BoxedError = "boom".into();
        let err = Error::construction("a", cause);
        let cloned = err.clone();
        assert_eq!(format!("{}", err), format!("{}", cloned));
    }

    #[test]
    fn test_config_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn might_fail() -> Result<u32> {
            Ok(42)
        }

        assert_eq!(might_fail().unwrap(), 42);
    }
}
