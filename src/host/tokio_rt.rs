//! # Tokio-backed scheduler adapter.
//!
//! [`TokioScheduler`] approximates the host idle primitives on a tokio
//! runtime:
//!
//! - `schedule_idle` waits a short pacing delay, then invokes the callback
//!   with a bounded [`Deadline`] standing in for an idle slice;
//! - `schedule_immediate` spawns the callback directly, so it runs at the
//!   runtime's next opportunity with no budget (microtask-like).
//!
//! Cancellation uses the handle's token, checked right up to invocation.
//! Without a current runtime the callback is dropped with a warning; the
//! hard-deadline flush path does not go through this adapter and still
//! runs.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::clock::{Clock, Deadline};
use crate::host::scheduler::{DrainFn, HostScheduler, ScheduleHandle};

/// Pacing parameters for the simulated idle slots.
#[derive(Clone, Copy, Debug)]
pub struct TokioSchedulerOptions {
    /// Delay before an idle slot fires (the runtime is presumed idle by
    /// then).
    pub idle_delay: Duration,
    /// Budget handed to each idle slot.
    pub idle_slice: Duration,
}

impl Default for TokioSchedulerOptions {
    /// Returns `idle_delay = 50ms`, `idle_slice = 50ms` (comparable to a
    /// host idle-callback deadline).
    fn default() -> Self {
        Self {
            idle_delay: Duration::from_millis(50),
            idle_slice: Duration::from_millis(50),
        }
    }
}

/// Scheduler adapter running callbacks on the current tokio runtime.
pub struct TokioScheduler {
    clock: Arc<dyn Clock>,
    options: TokioSchedulerOptions,
}

impl TokioScheduler {
    /// Creates an adapter with explicit pacing options.
    pub fn new(clock: Arc<dyn Clock>, options: TokioSchedulerOptions) -> Arc<Self> {
        Arc::new(Self { clock, options })
    }

    /// Creates an adapter with default pacing.
    pub fn with_defaults(clock: Arc<dyn Clock>) -> Arc<Self> {
        Self::new(clock, TokioSchedulerOptions::default())
    }

    fn spawn(future: impl std::future::Future<Output = ()> + Send + 'static) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(future);
            }
            Err(_) => warn!("no tokio runtime; scheduled drain dropped"),
        }
    }
}

impl HostScheduler for TokioScheduler {
    fn schedule_idle(&self, run: DrainFn) -> ScheduleHandle {
        let handle = ScheduleHandle::new();
        let guard = handle.clone();
        let clock = Arc::clone(&self.clock);
        let options = self.options;

        Self::spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = tokio::time::sleep(options.idle_delay) => {
                    run(Some(Deadline::after(clock, options.idle_slice)));
                }
            }
        });
        handle
    }

    fn schedule_immediate(&self, run: DrainFn) -> ScheduleHandle {
        let handle = ScheduleHandle::new();
        let guard = handle.clone();

        Self::spawn(async move {
            if !guard.is_cancelled() {
                run(None);
            }
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::host::HostScheduler as _;
    use crate::lifecycle::{LifecycleHub, Visibility};
    use crate::queue::{IdleQueue, IdleTask, QueueOptions};
    use parking_lot::Mutex;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_hidden_state_drains_by_next_checkpoint() {
        let scheduler = TokioScheduler::with_defaults(Arc::new(SystemClock));
        let lifecycle = LifecycleHub::new(Visibility::Hidden);
        let queue = IdleQueue::new(
            Arc::new(SystemClock),
            scheduler,
            lifecycle,
            QueueOptions::default(),
        );

        let ran = Arc::new(Mutex::new(false));
        let sink = Arc::clone(&ran);
        queue.add(IdleTask::new(move |_| *sink.lock() = true));

        settle().await;
        assert!(*ran.lock(), "hidden-state add must drain without an idle slot");
    }

    #[tokio::test]
    async fn test_hidden_state_drain_twice_runs_each_task_once() {
        let scheduler = TokioScheduler::with_defaults(Arc::new(SystemClock));
        let lifecycle = LifecycleHub::new(Visibility::Hidden);
        let queue = IdleQueue::new(
            Arc::new(SystemClock),
            scheduler,
            lifecycle,
            QueueOptions::default(),
        );

        let count = Arc::new(Mutex::new(0usize));
        for _ in 0..2 {
            let sink = Arc::clone(&count);
            queue.add(IdleTask::new(move |_| *sink.lock() += 1));
            settle().await;
        }
        assert_eq!(*count.lock(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_slot_fires_after_pacing_delay() {
        let scheduler = TokioScheduler::with_defaults(Arc::new(SystemClock));
        let ran = Arc::new(Mutex::new(false));

        let sink = Arc::clone(&ran);
        scheduler.schedule_idle(Box::new(move |deadline| {
            assert!(deadline.is_some());
            *sink.lock() = true;
        }));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(*ran.lock());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_idle_slot_never_fires() {
        let scheduler = TokioScheduler::with_defaults(Arc::new(SystemClock));
        let ran = Arc::new(Mutex::new(false));

        let sink = Arc::clone(&ran);
        let handle = scheduler.schedule_idle(Box::new(move |_| *sink.lock() = true));
        handle.cancel();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!*ran.lock());
    }
}
