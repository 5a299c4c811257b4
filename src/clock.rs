//! # Time source and idle budgets.
//!
//! The runtime never reads the system clock directly; it goes through the
//! [`Clock`] port so hosts and tests can substitute their own time source.
//!
//! - [`SystemClock`]: wall-clock adapter backed by [`SystemTime::now`].
//! - [`ManualClock`]: settable clock for deterministic tests and embedders.
//! - [`Deadline`]: a bounded idle budget; queued work may run while
//!   [`Deadline::time_remaining`] is above the configured minimum task time.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Milliseconds since the Unix epoch for a [`SystemTime`].
///
/// Times before the epoch map to negative values.
pub fn unix_millis(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// Source of wall-clock time.
///
/// Implementations must be cheap to call; `now` is consulted on every
/// enqueue and on every deadline check during a drain.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current wall-clock time.
    fn now(&self) -> SystemTime;

    /// Returns the current time as milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64 {
        unix_millis(self.now())
    }
}

/// Wall-clock adapter backed by the operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Settable clock for tests and hosts that drive time themselves.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use idlesync::{Clock, ManualClock};
///
/// let clock = ManualClock::from_millis(1_000);
/// assert_eq!(clock.now_millis(), 1_000);
/// clock.advance(Duration::from_millis(500));
/// assert_eq!(clock.now_millis(), 1_500);
/// ```
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    /// Creates a clock frozen at the given instant.
    pub fn starting_at(start: SystemTime) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    /// Creates a clock frozen at `millis` past the Unix epoch.
    pub fn from_millis(millis: u64) -> Arc<Self> {
        Self::starting_at(UNIX_EPOCH + Duration::from_millis(millis))
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now = now.checked_add(delta).unwrap_or(*now);
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, at: SystemTime) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock()
    }
}

/// A bounded idle budget.
///
/// Wraps a limit instant and the clock used to measure against it. A drain
/// invoked with a deadline keeps executing tasks only while
/// [`Deadline::time_remaining`] stays above the configured minimum task
/// time; a drain invoked without one runs to completion.
#[derive(Clone)]
pub struct Deadline {
    clock: Arc<dyn Clock>,
    limit: SystemTime,
}

impl Deadline {
    /// Creates a deadline `budget` from now on the given clock.
    pub fn after(clock: Arc<dyn Clock>, budget: Duration) -> Self {
        let now = clock.now();
        let limit = now.checked_add(budget).unwrap_or(now);
        Self { clock, limit }
    }

    /// Remaining budget; zero once the limit has passed.
    pub fn time_remaining(&self) -> Duration {
        self.limit
            .duration_since(self.clock.now())
            .unwrap_or(Duration::ZERO)
    }
}
