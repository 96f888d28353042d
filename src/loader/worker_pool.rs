//! Lazy page loader - the background materialization pool.
//!
//! The [`LazyPageLoader`] keeps page construction off the navigation
//! critical path: a fixed set of OS worker threads pulls the
//! highest-priority queued task, runs the page factory, installs the
//! result in the cache, records a load sample, and fires the task's
//! completion callbacks.
//!
//! # Ordering
//! For a single page name at most one factory invocation is in flight at a
//! time (`load_async` de-duplicates against the task table before
//! enqueueing). Across names the only ordering is declared priority, ties
//! broken FIFO by enqueue sequence.
//!
//! # Cancellation
//! Cancelling a queued task is immediate; the heap entry is skipped lazily
//! when a worker pops it, the same trick the cache's eviction bookkeeping
//! uses for removed names. Cancelling a running task only suppresses its
//! callbacks - factories are not assumed interruptible, so the call runs
//! to completion and its result still lands in the cache.

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::cache::{CacheEntry, PageCache};
use crate::common::Result;
use crate::loader::task::{CompletionCallback, LoadTask, TaskShared, TaskStatus};
use crate::monitor::{Operation, PerformanceMonitor};
use crate::policy::PagePolicy;
use crate::registry::PageRegistry;

/// Priority used for navigation-blocking loads; outranks any preload.
pub const NAVIGATION_PRIORITY: i32 = i32::MAX;

/// A heap entry. Higher priority pops first; equal priorities pop in
/// enqueue order.
struct QueuedTask {
    shared: Arc<TaskShared>,
    seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.shared.priority == other.shared.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.shared
            .priority
            .cmp(&other.shared.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct PoolInner {
    queue: Mutex<BinaryHeap<QueuedTask>>,
    available: Condvar,
    /// One live task per page name; the de-duplication table.
    tasks: Mutex<HashMap<String, Arc<TaskShared>>>,
    shutdown: AtomicBool,
    seq: AtomicU64,
    registry: Arc<PageRegistry>,
    cache: Arc<PageCache>,
    monitor: Arc<PerformanceMonitor>,
}

/// Bounded worker pool materializing pages outside the caller's critical
/// path.
///
/// # Thread Safety
/// The queue and the task table each sit behind a mutex; task state has
/// its own mutex plus a condvar for waiters. Lock order is always
/// table → state, and workers never hold one while taking the other in
/// reverse.
pub struct LazyPageLoader {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LazyPageLoader {
    /// Spawn a pool with `worker_count` threads.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(
        worker_count: usize,
        registry: Arc<PageRegistry>,
        cache: Arc<PageCache>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        assert!(worker_count > 0, "worker_count must be > 0");

        let inner = Arc::new(PoolInner {
            queue: Mutex::new(BinaryHeap::new()),
            available: Condvar::new(),
            tasks: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
            seq: AtomicU64::new(0),
            registry,
            cache,
            monitor,
        });

        let workers = (0..worker_count)
            .map(|i| {
                let inner = Arc::clone(&inner);
                std::thread::Builder::new()
                    .name(format!("pagecycle-loader-{i}"))
                    .spawn(move || worker_loop(inner))
                    .expect("failed to spawn loader worker")
            })
            .collect();

        Self {
            inner,
            workers: Mutex::new(workers),
        }
    }

    // ========================================================================
    // Public API
    // ========================================================================

    /// Enqueue a background load for `name`.
    ///
    /// If a task for `name` is already queued or running, the existing task
    /// is returned and `on_complete` (if any) is appended to it, so every
    /// interested caller is notified by the single materialization.
    pub fn load_async(
        &self,
        name: &str,
        priority: i32,
        policy: PagePolicy,
        on_complete: Option<CompletionCallback>,
    ) -> LoadTask {
        let shared = {
            let mut tasks = self.inner.tasks.lock();

            if let Some(existing) = tasks.get(name) {
                let mut state = existing.state.lock();
                if !state.status.is_terminal() {
                    log::debug!("load of '{}' de-duplicated onto live task", name);
                    if let Some(cb) = on_complete {
                        state.callbacks.push(cb);
                    }
                    return LoadTask {
                        shared: Arc::clone(existing),
                    };
                }
            }

            let shared = Arc::new(TaskShared::new(
                name.to_string(),
                priority,
                policy,
                on_complete,
            ));
            tasks.insert(name.to_string(), Arc::clone(&shared));
            shared
        };

        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        self.inner.queue.lock().push(QueuedTask {
            shared: Arc::clone(&shared),
            seq,
        });
        self.inner.available.notify_one();

        LoadTask { shared }
    }

    /// Materialize `name`, blocking the caller up to `timeout`.
    ///
    /// De-duplicates onto any live task for the same name. On timeout the
    /// task keeps running and will populate the cache for later callers;
    /// the caller gets [`crate::Error::LoadTimeout`].
    pub fn load_sync(
        &self,
        name: &str,
        policy: PagePolicy,
        timeout: Duration,
    ) -> Result<CacheEntry> {
        self.load_async(name, NAVIGATION_PRIORITY, policy, None)
            .wait(timeout)
    }

    /// Cancel the live task for `name`, if any.
    ///
    /// A queued task is marked Cancelled and never runs. A running task is
    /// only flagged: the factory completes and the cache is populated, but
    /// no callback fires. Returns false when there is no live task
    /// (including already-terminal ones), so cancelling twice is a no-op.
    pub fn cancel(&self, name: &str) -> bool {
        let shared = {
            let tasks = self.inner.tasks.lock();
            match tasks.get(name) {
                Some(s) => Arc::clone(s),
                None => return false,
            }
        };

        let cancelled_while_queued = {
            let mut state = shared.state.lock();
            match state.status {
                TaskStatus::Queued => {
                    state.status = TaskStatus::Cancelled;
                    state.callbacks.clear();
                    true
                }
                TaskStatus::Running => {
                    log::debug!("load of '{}' already running; suppressing callbacks", name);
                    state.suppress_callbacks = true;
                    return true;
                }
                _ => return false,
            }
        };

        if cancelled_while_queued {
            shared.done.notify_all();
            self.discard(&shared);
            log::debug!("queued load of '{}' cancelled", name);
        }
        cancelled_while_queued
    }

    /// The live task for `name`, if one is queued or running.
    pub fn task(&self, name: &str) -> Option<LoadTask> {
        let tasks = self.inner.tasks.lock();
        tasks.get(name).map(|shared| LoadTask {
            shared: Arc::clone(shared),
        })
    }

    /// Number of tasks currently queued or running.
    pub fn in_flight(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Remove a task from the table, unless a newer task took the name.
    fn discard(&self, shared: &Arc<TaskShared>) {
        let mut tasks = self.inner.tasks.lock();
        if let Some(current) = tasks.get(&shared.name) {
            if Arc::ptr_eq(current, shared) {
                tasks.remove(&shared.name);
            }
        }
    }
}

impl Drop for LazyPageLoader {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
        // Taking the queue lock orders the store against any worker that is
        // between its shutdown check and its wait, so the notify below
        // cannot be lost.
        drop(self.inner.queue.lock());
        self.inner.available.notify_all();
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    loop {
        let popped = {
            let mut queue = inner.queue.lock();
            loop {
                if inner.shutdown.load(Ordering::Relaxed) {
                    return;
                }
                if let Some(task) = queue.pop() {
                    break task;
                }
                inner.available.wait(&mut queue);
            }
        };
        let shared = popped.shared;

        // Claim the task; lazily skip entries cancelled while queued.
        {
            let mut state = shared.state.lock();
            if state.status != TaskStatus::Queued {
                continue;
            }
            state.status = TaskStatus::Running;
        }

        let started = Instant::now();
        let outcome = inner
            .registry
            .create_instance(&shared.name)
            .map(|handle| inner.cache.put(&shared.name, handle, shared.policy));
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        inner
            .monitor
            .record(Operation::Load, &shared.name, duration_ms);

        let callbacks = {
            let mut state = shared.state.lock();
            match &outcome {
                Ok(entry) => {
                    state.status = TaskStatus::Succeeded;
                    state.result = Some(entry.clone());
                }
                Err(err) => {
                    log::warn!("background load of '{}' failed: {}", shared.name, err);
                    state.status = TaskStatus::Failed;
                    state.error = Some(err.clone());
                }
            }
            if state.suppress_callbacks {
                state.callbacks.clear();
                Vec::new()
            } else {
                std::mem::take(&mut state.callbacks)
            }
        };
        shared.done.notify_all();

        // The task is discarded once terminal; waiters keep their handles.
        {
            let mut tasks = inner.tasks.lock();
            if let Some(current) = tasks.get(&shared.name) {
                if Arc::ptr_eq(current, &shared) {
                    tasks.remove(&shared.name);
                }
            }
        }

        for callback in callbacks {
            callback(outcome.clone());
        }
    }
}
