//! # Context lifecycle signals.
//!
//! [`LifecycleHub`] carries the two host signals the scheduler cares about:
//! visibility transitions and the hard deadline (context about to be
//! destroyed). A host adapter drives the hub from its own events; core
//! components register observers.
//!
//! ## Rules
//! - **Synchronous fan-out**: `set_visibility` / `unload` return only after
//!   every observer ran. The hard-deadline contract depends on this: work
//!   flushed from an `Unload` observer completes before the signal handler
//!   returns.
//! - **State before delivery**: the visibility value is updated before
//!   observers fire, so an observer reading [`LifecycleHub::visibility`]
//!   sees the new state.
//! - **Isolation**: a panicking observer is caught and logged; remaining
//!   observers still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

/// Whether the execution context is currently user-visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// The context is in the foreground and competing for render time.
    Visible,
    /// The context is backgrounded; idle callbacks may never fire.
    Hidden,
}

/// A lifecycle signal delivered to observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The context changed visibility.
    VisibilityChanged(Visibility),
    /// The context is about to be destroyed (hard deadline).
    Unload,
}

/// Handle identifying a registered observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObserverId(u64);

/// Shared observer callback.
pub type ObserverFn = Arc<dyn Fn(LifecycleEvent) + Send + Sync>;

/// Synchronous fan-out point for lifecycle signals.
pub struct LifecycleHub {
    visibility: Mutex<Visibility>,
    observers: Mutex<Vec<(u64, ObserverFn)>>,
    next_id: AtomicU64,
}

impl LifecycleHub {
    /// Creates a hub with the given initial visibility.
    pub fn new(initial: Visibility) -> Arc<Self> {
        Arc::new(Self {
            visibility: Mutex::new(initial),
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Creates a hub starting in the visible state.
    pub fn visible() -> Arc<Self> {
        Self::new(Visibility::Visible)
    }

    /// Current visibility state.
    pub fn visibility(&self) -> Visibility {
        *self.visibility.lock()
    }

    /// Updates visibility and notifies observers on an actual transition.
    pub fn set_visibility(&self, visibility: Visibility) {
        {
            let mut current = self.visibility.lock();
            if *current == visibility {
                return;
            }
            *current = visibility;
        }
        self.emit(LifecycleEvent::VisibilityChanged(visibility));
    }

    /// Fires the hard-deadline signal.
    ///
    /// Returns after every observer has run; observers that flush queued
    /// work do so synchronously within this call.
    pub fn unload(&self) {
        self.emit(LifecycleEvent::Unload);
    }

    /// Registers an observer; returns an id for [`LifecycleHub::unobserve`].
    pub fn observe(&self, observer: ObserverFn) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, observer));
        ObserverId(id)
    }

    /// Removes a previously registered observer.
    ///
    /// Removing an id twice is a no-op.
    pub fn unobserve(&self, id: ObserverId) {
        self.observers.lock().retain(|(oid, _)| *oid != id.0);
    }

    fn emit(&self, event: LifecycleEvent) {
        // Snapshot outside the lock so observers may re-enter the hub.
        let observers: Vec<ObserverFn> = self
            .observers
            .lock()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();

        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| (*observer)(event))).is_err() {
                warn!(?event, "lifecycle observer panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_visibility_notifies_on_transition_only() {
        let hub = LifecycleHub::visible();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        hub.observe(Arc::new(move |ev| sink.lock().push(ev)));

        hub.set_visibility(Visibility::Visible); // no transition
        hub.set_visibility(Visibility::Hidden);
        hub.set_visibility(Visibility::Hidden); // no transition

        assert_eq!(
            *seen.lock(),
            vec![LifecycleEvent::VisibilityChanged(Visibility::Hidden)]
        );
    }

    #[test]
    fn test_observer_sees_updated_state() {
        let hub = LifecycleHub::visible();
        let observed = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&observed);
        let hub_ref = Arc::clone(&hub);
        hub.observe(Arc::new(move |_| {
            *sink.lock() = Some(hub_ref.visibility());
        }));

        hub.set_visibility(Visibility::Hidden);
        assert_eq!(*observed.lock(), Some(Visibility::Hidden));
    }

    #[test]
    fn test_unobserve_stops_delivery() {
        let hub = LifecycleHub::visible();
        let count = Arc::new(Mutex::new(0usize));

        let sink = Arc::clone(&count);
        let id = hub.observe(Arc::new(move |_| *sink.lock() += 1));

        hub.unload();
        hub.unobserve(id);
        hub.unload();

        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_panicking_observer_does_not_block_others() {
        let hub = LifecycleHub::visible();
        let count = Arc::new(Mutex::new(0usize));

        hub.observe(Arc::new(|_| panic!("observer boom")));
        let sink = Arc::clone(&count);
        hub.observe(Arc::new(move |_| *sink.lock() += 1));

        hub.unload();
        assert_eq!(*count.lock(), 1);
    }
}
