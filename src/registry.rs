//! # Keyed reference-counted singleton registry.
//!
//! [`KeyedRegistry`] deduplicates expensive per-key resources within one
//! execution context: every consumer asking for the same key gets the same
//! instance, and the underlying resource is torn down only when the last
//! consumer releases it. This is what keeps listeners and idle slots from
//! being registered twice for one logical resource.
//!
//! ## Rules
//! - `get_or_create` increments the key's refcount (creating at 1).
//! - `release` decrements; at zero the entry is removed and
//!   [`Teardown::teardown`] runs on the instance.
//! - Releasing a key that was never acquired is a programming-contract
//!   violation and panics; it is not a runtime condition to recover from.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Resource cleanup hook run when the last reference is released.
pub trait Teardown: Send + Sync + 'static {
    /// Releases underlying resources (listeners, scheduled callbacks).
    fn teardown(&self);
}

struct Entry<T> {
    refs: usize,
    value: Arc<T>,
}

/// Reference-counted map of live instances keyed by string.
pub struct KeyedRegistry<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T: Teardown> KeyedRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the instance for `key`, creating it via `factory` on first
    /// acquisition.
    ///
    /// The factory runs with the registry locked so first creation is
    /// atomic; it must not re-enter the registry.
    pub fn get_or_create(&self, key: &str, factory: impl FnOnce() -> Arc<T>) -> Arc<T> {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| e.refs += 1)
            .or_insert_with(|| Entry {
                refs: 1,
                value: factory(),
            });
        Arc::clone(&entry.value)
    }

    /// Drops one reference to `key`; returns the remaining count.
    ///
    /// On the last release the entry is removed and the instance's
    /// [`Teardown::teardown`] runs (outside the registry lock).
    ///
    /// # Panics
    /// Panics if `key` has no live entry — a `release` must pair 1:1 with
    /// a prior `get_or_create`.
    pub fn release(&self, key: &str) -> usize {
        let removed = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                panic!("KeyedRegistry::release: key {key:?} was never acquired");
            };
            entry.refs -= 1;
            if entry.refs > 0 {
                return entry.refs;
            }
            entries.remove(key).map(|e| e.value)
        };

        if let Some(value) = removed {
            value.teardown();
        }
        0
    }

    /// Returns the live instance for `key` without touching its refcount.
    pub fn peek(&self, key: &str) -> Option<Arc<T>> {
        self.entries.lock().get(key).map(|e| Arc::clone(&e.value))
    }

    /// Current reference count for `key` (0 if absent).
    pub fn ref_count(&self, key: &str) -> usize {
        self.entries.lock().get(key).map_or(0, |e| e.refs)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if no keys are live.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T: Teardown> Default for KeyedRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        torn: Mutex<bool>,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                torn: Mutex::new(false),
            })
        }
    }

    impl Teardown for Probe {
        fn teardown(&self) {
            *self.torn.lock() = true;
        }
    }

    #[test]
    fn test_same_key_returns_identical_instance() {
        let registry = KeyedRegistry::new();
        let first = registry.get_or_create("k", Probe::new);
        let second = registry.get_or_create("k", Probe::new);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.ref_count("k"), 2);
    }

    #[test]
    fn test_teardown_only_on_last_release() {
        let registry = KeyedRegistry::new();
        let probe = registry.get_or_create("k", Probe::new);
        registry.get_or_create("k", Probe::new);

        assert_eq!(registry.release("k"), 1);
        assert!(!*probe.torn.lock(), "still referenced; must stay alive");

        assert_eq!(registry.release("k"), 0);
        assert!(*probe.torn.lock());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reacquire_after_teardown_creates_fresh_instance() {
        let registry = KeyedRegistry::new();
        let first = registry.get_or_create("k", Probe::new);
        registry.release("k");

        let second = registry.get_or_create("k", Probe::new);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!*second.torn.lock());
    }

    #[test]
    fn test_distinct_keys_are_independent() {
        let registry = KeyedRegistry::new();
        let a = registry.get_or_create("a", Probe::new);
        let b = registry.get_or_create("b", Probe::new);

        assert!(!Arc::ptr_eq(&a, &b));
        registry.release("a");
        assert!(*a.torn.lock());
        assert!(!*b.torn.lock());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[should_panic(expected = "was never acquired")]
    fn test_release_of_unacquired_key_panics() {
        let registry: KeyedRegistry<Probe> = KeyedRegistry::new();
        registry.release("ghost");
    }

    #[test]
    fn test_peek_does_not_bump_refcount() {
        let registry = KeyedRegistry::new();
        registry.get_or_create("k", Probe::new);

        assert!(registry.peek("k").is_some());
        assert_eq!(registry.ref_count("k"), 1);
        assert!(registry.peek("ghost").is_none());
    }
}
