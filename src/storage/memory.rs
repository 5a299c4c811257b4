//! # In-process shared storage adapter.
//!
//! [`MemoryArea`] simulates one host-persisted store shared by several
//! execution contexts; [`MemoryStorage`] is the per-context handle. Writes
//! from any handle are visible to reads from every handle and publish a
//! [`ChangeEvent`] tagged with the writing context.
//!
//! This is the adapter used by tests and demos to stand in for a real host
//! store; it also supports write-failure injection to exercise the
//! degraded (memory-only) paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::StorageError;
use crate::storage::shared::{ChangeBus, ChangeEvent, ContextId, SharedStorage};

/// One simulated host store, shared by any number of contexts.
pub struct MemoryArea {
    entries: Mutex<HashMap<String, String>>,
    bus: ChangeBus,
    next_context: AtomicU64,
}

impl MemoryArea {
    /// Creates an empty area with the given notification capacity.
    pub fn new(change_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            bus: ChangeBus::new(change_capacity),
            next_context: AtomicU64::new(0),
        })
    }

    /// Opens a handle for a fresh execution context.
    pub fn context(self: &Arc<Self>) -> MemoryStorage {
        MemoryStorage {
            area: Arc::clone(self),
            id: ContextId(self.next_context.fetch_add(1, Ordering::Relaxed)),
            write_error: Mutex::new(None),
        }
    }

    /// Number of durable entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of contexts currently subscribed to change notifications.
    pub fn listener_count(&self) -> usize {
        self.bus.receiver_count()
    }
}

/// Per-context handle to a [`MemoryArea`].
pub struct MemoryStorage {
    area: Arc<MemoryArea>,
    id: ContextId,
    write_error: Mutex<Option<StorageError>>,
}

impl MemoryStorage {
    /// Makes subsequent writes fail with `error` (`None` restores writes).
    ///
    /// Reads and removals are unaffected; this models quota exhaustion or
    /// a disabled store, which hosts report on write only.
    pub fn fail_writes_with(&self, error: Option<StorageError>) {
        *self.write_error.lock() = error;
    }
}

impl SharedStorage for MemoryStorage {
    fn context_id(&self) -> ContextId {
        self.id
    }

    fn read(&self, key: &str) -> Option<String> {
        self.area.entries.lock().get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(err) = self.write_error.lock().clone() {
            return Err(err);
        }
        let old = {
            let mut entries = self.area.entries.lock();
            entries.insert(key.to_string(), value.to_string())
        };
        self.area.bus.publish(ChangeEvent {
            key: key.to_string(),
            old,
            new: Some(value.to_string()),
            origin: self.id,
        });
        Ok(())
    }

    fn remove(&self, key: &str) {
        let old = self.area.entries.lock().remove(key);
        if old.is_some() {
            self.area.bus.publish(ChangeEvent {
                key: key.to_string(),
                old,
                new: None,
                origin: self.id,
            });
        }
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.area.bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_is_visible_to_other_contexts() {
        let area = MemoryArea::new(8);
        let a = area.context();
        let b = area.context();

        a.write("k", "{\"x\":1}").unwrap();
        assert_eq!(b.read("k").as_deref(), Some("{\"x\":1}"));
    }

    #[test]
    fn test_remove_deletes_and_notifies_once() {
        let area = MemoryArea::new(8);
        let a = area.context();
        let mut rx = a.changes();

        a.write("k", "1").unwrap();
        a.remove("k");
        a.remove("k"); // already gone, no second event

        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.new.as_deref(), Some("1"));
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.old.as_deref(), Some("1"));
        assert!(ev.new.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_change_events_carry_origin() {
        let area = MemoryArea::new(8);
        let a = area.context();
        let b = area.context();
        let mut rx = b.changes();

        a.write("k", "1").unwrap();
        b.write("k", "2").unwrap();

        assert_eq!(rx.try_recv().unwrap().origin, a.context_id());
        assert_eq!(rx.try_recv().unwrap().origin, b.context_id());
    }

    #[test]
    fn test_injected_write_failure_leaves_entry_untouched() {
        let area = MemoryArea::new(8);
        let a = area.context();
        a.write("k", "1").unwrap();

        a.fail_writes_with(Some(StorageError::QuotaExceeded));
        assert!(a.write("k", "2").is_err());
        assert_eq!(a.read("k").as_deref(), Some("1"));

        a.fail_writes_with(None);
        a.write("k", "2").unwrap();
        assert_eq!(a.read("k").as_deref(), Some("2"));
    }
}
