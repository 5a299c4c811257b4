//! # SyncedStore: one durable key with a synchronized in-context cache.
//!
//! Wraps a single key of the shared durable store with a lazily loaded
//! cache, shallow-merge writes guarded by an optional logical timestamp,
//! and a callback fan-out fired when another execution context changes the
//! same key.
//!
//! ## Rules
//! - **Lazy load**: the durable entry is read once, on first access; the
//!   cache is authoritative for this context afterwards.
//! - **Never regress**: with a timestamp field configured, a write (local
//!   or external) carrying an older timestamp than the cache is a no-op.
//! - **Best-effort persistence**: storage failures are swallowed and
//!   logged; the cache keeps serving.
//! - **Whole-value replace**: an external change replaces the cache with
//!   the notified value; listeners receive defaults-merged old/new
//!   records, not raw deltas.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, trace, warn};

use crate::registry::Teardown;
use crate::storage::SharedStorage;
use crate::store::record::{self, Record};

/// Per-store configuration.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Values merged under the cache on every read.
    pub defaults: Record,
    /// Field used for optimistic write ordering, when configured.
    pub timestamp_key: Option<String>,
    /// Remove the durable entry when the store is torn down.
    ///
    /// Off by default: state that exists to outlive one context (sessions,
    /// cross-context counters) must survive teardown of the last consumer.
    pub clear_on_teardown: bool,
    /// Schema tag injected into persisted records under `"schema"`.
    pub schema_version: Option<u32>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            defaults: Record::new(),
            timestamp_key: None,
            clear_on_teardown: false,
            schema_version: None,
        }
    }
}

impl StoreOptions {
    /// Options with defaults merged on read.
    pub fn with_defaults(mut self, defaults: Record) -> Self {
        self.defaults = defaults;
        self
    }

    /// Options with a designated timestamp field.
    pub fn with_timestamp_key(mut self, key: impl Into<String>) -> Self {
        self.timestamp_key = Some(key.into());
        self
    }
}

/// Handle identifying a registered external-set listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(u64);

type ExternalSetFn = Arc<dyn Fn(&Record, &Record) + Send + Sync>;

/// One durable key wrapped with a synchronized in-context cache.
///
/// Within one execution context, share a single instance per key through
/// the [`KeyedRegistry`](crate::registry::KeyedRegistry) so listeners and
/// caches are never duplicated.
pub struct SyncedStore {
    key: String,
    backend: Arc<dyn SharedStorage>,
    options: StoreOptions,
    cache: Mutex<Option<Record>>,
    listeners: Mutex<Vec<(u64, ExternalSetFn)>>,
    next_listener: AtomicU64,
}

impl SyncedStore {
    /// Creates a store over `key` on the given backend.
    pub fn new(
        key: impl Into<String>,
        backend: Arc<dyn SharedStorage>,
        options: StoreOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            key: key.into(),
            backend,
            options,
            cache: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        })
    }

    /// The durable key this store wraps.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the defaults-merged record.
    ///
    /// The first call may read durable storage; afterwards this never
    /// blocks on I/O.
    pub fn get(&self) -> Record {
        let mut cache = self.cache.lock();
        let current = self.load(&mut cache);
        record::merged(&self.options.defaults, current)
    }

    /// Shallow-merges `partial` into the record.
    ///
    /// With a timestamp field configured, a `partial` whose timestamp is
    /// numerically smaller than the cached one is dropped entirely. The
    /// merged record is persisted best-effort; persistence failures leave
    /// the cache authoritative.
    pub fn update(&self, partial: Record) {
        let payload = {
            let mut cache = self.cache.lock();
            let current = self.load(&mut cache);

            if let Some(ts_key) = &self.options.timestamp_key {
                if record::is_stale(current, &partial, ts_key) {
                    trace!(key = %self.key, "stale write rejected");
                    return;
                }
            }

            record::merge(current, &partial);
            if let Some(version) = self.options.schema_version {
                current.insert("schema".to_string(), json!(version));
            }

            match serde_json::to_string(current) {
                Ok(payload) => payload,
                Err(err) => {
                    debug!(key = %self.key, error = %err, "record not serializable; keeping memory-only");
                    return;
                }
            }
        };

        if let Err(err) = self.backend.write(&self.key, &payload) {
            debug!(key = %self.key, label = err.as_label(), "persist failed; keeping memory-only");
        }
    }

    /// Resets the record to empty and removes the durable entry.
    pub fn clear(&self) {
        *self.cache.lock() = Some(Record::new());
        self.backend.remove(&self.key);
    }

    /// Registers an external-set listener, called as `(new, old)` with
    /// defaults-merged records whenever another context changes this key.
    pub fn on_external_set(
        &self,
        listener: impl Fn(&Record, &Record) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        ListenerId(id)
    }

    /// Removes a previously registered listener (no-op if already gone).
    pub fn remove_external_set(&self, id: ListenerId) {
        self.listeners.lock().retain(|(lid, _)| *lid != id.0);
    }

    /// Applies a change notification from another execution context.
    ///
    /// Replaces the cache with the notified value, subject to the same
    /// never-regress timestamp guard as [`SyncedStore::update`] (late
    /// notifications carrying older data are dropped). Normally driven by
    /// the coordinator's change listener; custom host adapters may call it
    /// directly.
    pub fn apply_external(&self, old_raw: Option<&str>, new_raw: Option<&str>) {
        let (new_merged, old_merged) = {
            let mut cache = self.cache.lock();
            let current = self.load(&mut cache);
            let incoming = record::parse(new_raw);

            if let Some(ts_key) = &self.options.timestamp_key {
                if record::is_stale(current, &incoming, ts_key) {
                    trace!(key = %self.key, "stale external change ignored");
                    return;
                }
            }

            let old_merged = record::merged(&self.options.defaults, &record::parse(old_raw));
            *current = incoming;
            let new_merged = record::merged(&self.options.defaults, current);
            (new_merged, old_merged)
        };

        let listeners: Vec<ExternalSetFn> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();

        for listener in listeners {
            let call = std::panic::AssertUnwindSafe(|| (*listener)(&new_merged, &old_merged));
            if std::panic::catch_unwind(call).is_err() {
                warn!(key = %self.key, "external-set listener panicked");
            }
        }
    }

    /// Loads the cache from durable storage on first access.
    fn load<'a>(&self, cache: &'a mut Option<Record>) -> &'a mut Record {
        cache.get_or_insert_with(|| record::parse(self.backend.read(&self.key).as_deref()))
    }
}

impl Teardown for SyncedStore {
    fn teardown(&self) {
        if self.options.clear_on_teardown {
            self.backend.remove(&self.key);
        }
        self.listeners.lock().clear();
        debug!(key = %self.key, "store torn down");
    }
}
