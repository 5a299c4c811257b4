//! # Deferred task and its ambient-state snapshot.
//!
//! [`IdleTask`] wraps a closure `FnOnce(&TaskSnapshot)`, run at most once
//! when the owning queue drains. The [`TaskSnapshot`] is captured by the
//! queue at enqueue time and passed as the task's sole argument, so task
//! execution never depends on mutable state observed at run time.
//!
//! ## Example
//! ```rust
//! use idlesync::{IdleTask, Visibility};
//!
//! let task = IdleTask::new(|snapshot| {
//!     if snapshot.visibility == Visibility::Hidden {
//!         // context was already backgrounded when this work was queued
//!     }
//! });
//! # drop(task);
//! ```

use std::fmt;
use std::time::SystemTime;

use crate::lifecycle::Visibility;

/// Ambient state captured when a task is enqueued.
#[derive(Clone, Copy, Debug)]
pub struct TaskSnapshot {
    /// Wall-clock time at enqueue.
    pub captured_at: SystemTime,
    /// Context visibility at enqueue.
    pub visibility: Visibility,
}

/// A unit of deferred work.
///
/// Runs at most once; dropped unrun if the owning queue is destroyed
/// first.
pub struct IdleTask {
    action: Box<dyn FnOnce(&TaskSnapshot) + Send>,
}

impl IdleTask {
    /// Creates a task from a closure.
    pub fn new(action: impl FnOnce(&TaskSnapshot) + Send + 'static) -> Self {
        Self {
            action: Box::new(action),
        }
    }

    /// Executes the task with its enqueue-time snapshot.
    pub(crate) fn run(self, snapshot: &TaskSnapshot) {
        (self.action)(snapshot);
    }
}

impl fmt::Debug for IdleTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdleTask")
    }
}

/// A task paired with the snapshot taken when it was queued.
#[derive(Debug)]
pub(crate) struct QueuedTask {
    pub(crate) snapshot: TaskSnapshot,
    pub(crate) task: IdleTask,
}
