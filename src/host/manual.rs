//! # Manually driven scheduler adapter.
//!
//! [`ManualScheduler`] records scheduled callbacks and fires them only
//! when told to, with a deadline of the caller's choosing. This is the
//! adapter for deterministic tests and for hosts that drive their own
//! event loop.
//!
//! ## Example
//! ```rust
//! use idlesync::{HostScheduler, ManualScheduler};
//!
//! let scheduler = ManualScheduler::new();
//! let handle = scheduler.schedule_idle(Box::new(|_| { /* drain */ }));
//! assert_eq!(scheduler.pending(), 1);
//!
//! handle.cancel();
//! assert!(!scheduler.fire_next(None)); // cancelled slots are skipped
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Deadline;
use crate::host::scheduler::{DrainFn, HostScheduler, ScheduleHandle};

/// Which primitive a callback was scheduled through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleKind {
    /// Idle-time slot (bounded budget).
    Idle,
    /// Immediate slot (microtask-like).
    Immediate,
}

struct Scheduled {
    kind: ScheduleKind,
    handle: ScheduleHandle,
    run: DrainFn,
}

/// Scheduler adapter fired explicitly by the host or test.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<VecDeque<Scheduled>>,
}

impl ManualScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of scheduled, not-yet-cancelled callbacks.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .iter()
            .filter(|s| !s.handle.is_cancelled())
            .count()
    }

    /// Number of pending immediate-kind callbacks.
    pub fn pending_immediate(&self) -> usize {
        self.pending
            .lock()
            .iter()
            .filter(|s| s.kind == ScheduleKind::Immediate && !s.handle.is_cancelled())
            .count()
    }

    /// Fires the oldest non-cancelled callback with the given deadline.
    ///
    /// Returns false if nothing was left to fire. The callback runs on
    /// the calling thread; callbacks may schedule further work.
    pub fn fire_next(&self, deadline: Option<Deadline>) -> bool {
        loop {
            let next = self.pending.lock().pop_front();
            match next {
                None => return false,
                Some(scheduled) if scheduled.handle.is_cancelled() => continue,
                Some(scheduled) => {
                    (scheduled.run)(deadline);
                    return true;
                }
            }
        }
    }

    /// Fires callbacks until none remain; returns how many ran.
    ///
    /// Every callback gets a clone of the same `deadline`, so an already
    /// exhausted budget can loop if callbacks keep rescheduling; prefer
    /// `None` or a fresh budget per call when draining rescheduling work.
    pub fn fire_all(&self, deadline: Option<Deadline>) -> usize {
        let mut fired = 0;
        while self.fire_next(deadline.clone()) {
            fired += 1;
        }
        fired
    }
}

impl HostScheduler for ManualScheduler {
    fn schedule_idle(&self, run: DrainFn) -> ScheduleHandle {
        self.push(ScheduleKind::Idle, run)
    }

    fn schedule_immediate(&self, run: DrainFn) -> ScheduleHandle {
        self.push(ScheduleKind::Immediate, run)
    }
}

impl ManualScheduler {
    fn push(&self, kind: ScheduleKind, run: DrainFn) -> ScheduleHandle {
        let handle = ScheduleHandle::new();
        self.pending.lock().push_back(Scheduled {
            kind,
            handle: handle.clone(),
            run,
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_next_runs_in_schedule_order() {
        let scheduler = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let log = Arc::clone(&log);
            scheduler.schedule_idle(Box::new(move |_| log.lock().push(n)));
        }

        assert!(scheduler.fire_next(None));
        assert!(scheduler.fire_next(None));
        assert_eq!(*log.lock(), vec![0, 1]);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_cancelled_slot_is_skipped() {
        let scheduler = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let log1 = Arc::clone(&log);
        let first = scheduler.schedule_idle(Box::new(move |_| log1.lock().push(1)));
        let log2 = Arc::clone(&log);
        scheduler.schedule_immediate(Box::new(move |_| log2.lock().push(2)));

        first.cancel();
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.fire_all(None), 1);
        assert_eq!(*log.lock(), vec![2]);
    }

    #[test]
    fn test_callbacks_may_reschedule() {
        let scheduler = ManualScheduler::new();
        let ran = Arc::new(Mutex::new(0usize));

        let s = Arc::clone(&scheduler);
        let sink = Arc::clone(&ran);
        scheduler.schedule_idle(Box::new(move |_| {
            let sink = Arc::clone(&sink);
            s.schedule_idle(Box::new(move |_| *sink.lock() += 1));
        }));

        assert_eq!(scheduler.fire_all(None), 2);
        assert_eq!(*ran.lock(), 1);
    }
}
