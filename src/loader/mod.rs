//! Background page loading.
//!
//! # Components
//! - [`LazyPageLoader`] - priority worker pool over the page factories
//! - [`LoadTask`] / [`TaskStatus`] - handle to one in-flight materialization

mod task;
mod worker_pool;

pub use task::{CompletionCallback, LoadTask, TaskStatus};
pub use worker_pool::{LazyPageLoader, NAVIGATION_PRIORITY};
