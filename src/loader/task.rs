//! Load tasks - one in-flight or queued page materialization.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::cache::CacheEntry;
use crate::common::{Error, Result};
use crate::policy::PagePolicy;

/// Lifecycle of a load task.
///
/// Queued → Running → one of the terminal states. A task is discarded from
/// the loader's table once its completion callbacks have fired; handles
/// held by callers stay valid for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether the task can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Callback invoked when a task reaches Succeeded or Failed.
pub type CompletionCallback = Box<dyn FnOnce(Result<CacheEntry>) + Send>;

pub(crate) struct TaskState {
    pub status: TaskStatus,
    pub result: Option<CacheEntry>,
    pub error: Option<Error>,
    pub callbacks: Vec<CompletionCallback>,
    /// Set when a running task is cancelled: the factory finishes, the
    /// cache is still populated, but no callback fires.
    pub suppress_callbacks: bool,
}

pub(crate) struct TaskShared {
    pub name: String,
    pub priority: i32,
    pub requested_at: Instant,
    pub policy: PagePolicy,
    pub state: Mutex<TaskState>,
    pub done: Condvar,
}

impl TaskShared {
    pub fn new(
        name: String,
        priority: i32,
        policy: PagePolicy,
        callback: Option<CompletionCallback>,
    ) -> Self {
        Self {
            name,
            priority,
            requested_at: Instant::now(),
            policy,
            state: Mutex::new(TaskState {
                status: TaskStatus::Queued,
                result: None,
                error: None,
                callbacks: callback.into_iter().collect(),
                suppress_callbacks: false,
            }),
            done: Condvar::new(),
        }
    }
}

/// Handle to one queued or in-flight materialization.
///
/// Cheap to clone; all clones observe the same underlying task.
#[derive(Clone)]
pub struct LoadTask {
    pub(crate) shared: Arc<TaskShared>,
}

impl LoadTask {
    /// The page being materialized.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Queue priority; higher loads first.
    pub fn priority(&self) -> i32 {
        self.shared.priority
    }

    /// When the task was enqueued.
    pub fn requested_at(&self) -> Instant {
        self.shared.requested_at
    }

    /// Current status.
    pub fn status(&self) -> TaskStatus {
        self.shared.state.lock().status
    }

    /// Whether this handle and `other` refer to the same task.
    pub fn same_task(&self, other: &LoadTask) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Block until the task reaches a terminal state or `timeout` elapses.
    ///
    /// On timeout the underlying task is left running (factories are not
    /// assumed interruptible); a later completion still populates the cache
    /// for subsequent callers.
    ///
    /// # Errors
    /// - [`Error::LoadTimeout`] if the deadline passes first
    /// - [`Error::PageConstruction`] if the factory failed
    /// - [`Error::LoadCancelled`] if the task was cancelled
    pub fn wait(&self, timeout: Duration) -> Result<CacheEntry> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();

        loop {
            match state.status {
                TaskStatus::Succeeded => {
                    return Ok(state
                        .result
                        .clone()
                        .expect("task marked succeeded without a result"));
                }
                TaskStatus::Failed => {
                    return Err(state
                        .error
                        .clone()
                        .expect("task marked failed without an error"));
                }
                TaskStatus::Cancelled => {
                    return Err(Error::LoadCancelled(self.shared.name.clone()));
                }
                TaskStatus::Queued | TaskStatus::Running => {}
            }

            if self.shared.done.wait_until(&mut state, deadline).timed_out()
                && !state.status.is_terminal()
            {
                return Err(Error::LoadTimeout {
                    name: self.shared.name.clone(),
                    waited: timeout,
                });
            }
        }
    }
}
