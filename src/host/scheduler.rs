//! # Host scheduling port.
//!
//! [`HostScheduler`] abstracts the host's deferred-callback primitives:
//! an idle-time slot (run this when the context has spare time, with a
//! bounded budget) and an immediate slot (run this as soon as the current
//! unit of work yields, microtask-like). Each scheduled callback gets a
//! [`ScheduleHandle`] the owner can cancel before it fires.
//!
//! Adapters implement this per target platform; see
//! [`TokioScheduler`](crate::host::TokioScheduler) and
//! [`ManualScheduler`](crate::host::ManualScheduler).

use tokio_util::sync::CancellationToken;

use crate::clock::Deadline;

/// Callback invoked by the host when a scheduled slot fires.
///
/// `Some(deadline)` bounds the idle budget; `None` means run to
/// completion.
pub type DrainFn = Box<dyn FnOnce(Option<Deadline>) + Send + 'static>;

/// Cancellation handle for one scheduled callback.
///
/// Cancelling after the callback ran is a no-op.
#[derive(Clone, Debug, Default)]
pub struct ScheduleHandle {
    token: CancellationToken,
}

impl ScheduleHandle {
    /// Creates a fresh, uncancelled handle.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Cancels the scheduled callback if it has not fired yet.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once [`ScheduleHandle::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the handle is cancelled; for async adapters.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Port to the host's deferred-callback primitives.
pub trait HostScheduler: Send + Sync + 'static {
    /// Schedules `run` for the next idle slot, with a bounded budget.
    ///
    /// Idle slots are not guaranteed to fire for backgrounded contexts;
    /// callers must not rely on them for correctness once hidden.
    fn schedule_idle(&self, run: DrainFn) -> ScheduleHandle;

    /// Schedules `run` as soon as the current unit of work yields.
    ///
    /// The callback receives no deadline (run to completion).
    fn schedule_immediate(&self, run: DrainFn) -> ScheduleHandle;
}
