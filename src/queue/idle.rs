//! # IdleQueue: deferred work drained in idle time.
//!
//! An ordered queue of [`IdleTask`]s, drained opportunistically within
//! idle budgets while the context is visible, as an immediate callback
//! while it is hidden, and synchronously to completion on the hard
//! deadline (context about to be destroyed).
//!
//! ## States
//! ```text
//!            add()                 slot fires             queue empty
//!   Idle ───────────► Pending ───────────────► Draining ───────────► Idle
//!    ▲                   │ visibility→hidden /     │ budget exhausted
//!    │                   │ unload: cancel slot,    ▼
//!    │                   └─────► flush()        reschedule ──► Pending
//!    └──────────────────────────── destroy() from any state
//! ```
//!
//! ## Rules
//! - **FIFO including nested enqueues**: tasks added by a running task go
//!   to the back of the same work list and are eligible within the same
//!   drain pass; order is breadth-first by enqueue time, never LIFO.
//! - **Run at most once**: tasks are popped under the state lock, so no
//!   task can execute twice even if a scheduled drain races a flush.
//! - **Isolation**: a panicking task is caught and logged; remaining
//!   tasks still run.
//! - **Hard deadline**: `flush()` cancels any scheduled drain and runs
//!   the whole queue before returning, making `add()` followed by the
//!   hard-deadline signal equivalent to eager synchronous execution.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use crate::clock::{Clock, Deadline};
use crate::host::{DrainFn, HostScheduler, ScheduleHandle};
use crate::lifecycle::{LifecycleEvent, LifecycleHub, ObserverId, Visibility};
use crate::queue::task::{IdleTask, QueuedTask, TaskSnapshot};
use crate::registry::Teardown;

/// Per-queue configuration.
#[derive(Clone, Copy, Debug)]
pub struct QueueOptions {
    /// Minimum remaining idle budget required to start another task.
    ///
    /// Deliberately larger than a typical per-frame idle slice, so queued
    /// work only runs in slices long enough to be truly spare time.
    pub min_task_time: Duration,
}

impl Default for QueueOptions {
    /// Returns options with `min_task_time = 25ms`.
    fn default() -> Self {
        Self {
            min_task_time: Duration::from_millis(25),
        }
    }
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<QueuedTask>,
    scheduled: Option<ScheduleHandle>,
    draining: bool,
    destroyed: bool,
}

/// Ordered queue of deferred tasks with deadline-aware draining.
///
/// Within one execution context, share a single instance per logical key
/// through the [`KeyedRegistry`](crate::registry::KeyedRegistry) so idle
/// slots are never registered twice for the same resource.
pub struct IdleQueue {
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn HostScheduler>,
    lifecycle: Arc<LifecycleHub>,
    options: QueueOptions,
    state: Mutex<QueueState>,
    observer: Mutex<Option<ObserverId>>,
    weak: Weak<IdleQueue>,
}

impl IdleQueue {
    /// Creates a queue and hooks it into the lifecycle hub.
    ///
    /// The queue flushes itself when the context goes hidden or fires the
    /// hard-deadline signal.
    pub fn new(
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn HostScheduler>,
        lifecycle: Arc<LifecycleHub>,
        options: QueueOptions,
    ) -> Arc<Self> {
        let queue = Arc::new_cyclic(|weak| Self {
            clock,
            scheduler,
            lifecycle,
            options,
            state: Mutex::new(QueueState::default()),
            observer: Mutex::new(None),
            weak: weak.clone(),
        });

        let observer = {
            let weak = queue.weak.clone();
            queue.lifecycle.observe(Arc::new(move |event| {
                if let Some(queue) = weak.upgrade() {
                    match event {
                        LifecycleEvent::VisibilityChanged(Visibility::Hidden)
                        | LifecycleEvent::Unload => queue.flush(),
                        LifecycleEvent::VisibilityChanged(Visibility::Visible) => {}
                    }
                }
            }))
        };
        *queue.observer.lock() = Some(observer);
        queue
    }

    /// Appends one task, tagged with the current ambient snapshot.
    pub fn add(&self, task: IdleTask) {
        self.add_all([task]);
    }

    /// Appends tasks in order; an empty iterable is accepted trivially.
    ///
    /// Never blocks and never runs tasks inline: the drain always happens
    /// from a scheduled callback (or from an explicit [`IdleQueue::flush`]).
    pub fn add_all(&self, tasks: impl IntoIterator<Item = IdleTask>) {
        let snapshot = TaskSnapshot {
            captured_at: self.clock.now(),
            visibility: self.lifecycle.visibility(),
        };

        let mut state = self.state.lock();
        if state.destroyed {
            return;
        }
        let before = state.tasks.len();
        state
            .tasks
            .extend(tasks.into_iter().map(|task| QueuedTask { snapshot, task }));
        if state.tasks.len() > before {
            self.ensure_scheduled(&mut state);
        }
    }

    /// Number of tasks currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// True if no tasks are queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }

    /// Cancels any scheduled drain and runs every queued task now,
    /// ignoring idle budgets.
    ///
    /// Tasks enqueued by a running task are executed too; the queue is
    /// empty when this returns (hard-deadline semantics).
    pub fn flush(&self) {
        let was_draining = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            if let Some(handle) = state.scheduled.take() {
                handle.cancel();
            }
            let was = state.draining;
            state.draining = true;
            was
        };

        self.drain_loop(None);

        let mut state = self.state.lock();
        state.draining = was_draining;
        if !state.tasks.is_empty() {
            self.ensure_scheduled(&mut state);
        }
    }

    /// Drops pending tasks, cancels any scheduled drain, and detaches the
    /// lifecycle observer.
    ///
    /// A task already mid-execution is not interrupted; tasks still queued
    /// are discarded unrun.
    pub fn destroy(&self) {
        {
            let mut state = self.state.lock();
            state.destroyed = true;
            state.tasks.clear();
            if let Some(handle) = state.scheduled.take() {
                handle.cancel();
            }
        }
        if let Some(id) = self.observer.lock().take() {
            self.lifecycle.unobserve(id);
        }
    }

    /// Schedules a drain if none is pending: an immediate slot while
    /// hidden (idle slots may never fire for backgrounded contexts), an
    /// idle slot otherwise.
    fn ensure_scheduled(&self, state: &mut QueueState) {
        if state.destroyed || state.draining || state.scheduled.is_some() || state.tasks.is_empty()
        {
            return;
        }

        let weak = self.weak.clone();
        let run: DrainFn = Box::new(move |deadline| {
            if let Some(queue) = weak.upgrade() {
                queue.run_drain(deadline);
            }
        });

        let handle = match self.lifecycle.visibility() {
            Visibility::Hidden => self.scheduler.schedule_immediate(run),
            Visibility::Visible => self.scheduler.schedule_idle(run),
        };
        state.scheduled = Some(handle);
    }

    /// Entry point for scheduled drains.
    fn run_drain(&self, deadline: Option<Deadline>) {
        {
            let mut state = self.state.lock();
            state.scheduled = None;
            if state.draining || state.destroyed {
                return;
            }
            state.draining = true;
        }

        self.drain_loop(deadline);

        let mut state = self.state.lock();
        state.draining = false;
        if !state.tasks.is_empty() {
            self.ensure_scheduled(&mut state);
        }
    }

    /// Pops and runs tasks while budget remains.
    ///
    /// The lock is released around each task so actions may re-enter the
    /// queue; a pop is exclusive, so no task runs twice.
    fn drain_loop(&self, deadline: Option<Deadline>) {
        loop {
            if let Some(deadline) = &deadline {
                if deadline.time_remaining() <= self.options.min_task_time {
                    break;
                }
            }

            let queued = self.state.lock().tasks.pop_front();
            let Some(QueuedTask { snapshot, task }) = queued else {
                break;
            };

            if catch_unwind(AssertUnwindSafe(move || task.run(&snapshot))).is_err() {
                warn!("queued task panicked; continuing with remaining tasks");
            }
        }
    }
}

impl Teardown for IdleQueue {
    fn teardown(&self) {
        self.destroy();
    }
}
