//! # Coordinator: the consumer-facing facade.
//!
//! Owns the injected ports (clock, scheduler, lifecycle, shared storage)
//! and one [`KeyedRegistry`] per resource kind, and hands out RAII handles
//! to shared [`SyncedStore`]s and [`IdleQueue`]s. There is no ambient
//! global state: lifetime is explicit, and two consumers asking for the
//! same key always get the same underlying instance.
//!
//! ## Architecture
//! ```text
//! plugin A ──┐                        ┌─► KeyedRegistry<IdleQueue>  ──► IdleQueue (per key)
//! plugin B ──┼──► Coordinator ────────┤
//! plugin C ──┘        │               └─► KeyedRegistry<SyncedStore> ─► SyncedStore (per key)
//!                     │                                                      ▲
//!                     └─► change listener (one per context, all keys)        │
//!                           storage.changes() ── origin-filtered ────────────┘
//! ```
//!
//! ## Rules
//! - The cross-context change listener is **registry-wide**: installed
//!   lazily when the first store of any key is acquired, removed when the
//!   last store of any key is released.
//! - Handles release their registry reference on drop; the underlying
//!   resource is torn down on the last release only.

use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::Config;
use crate::host::HostScheduler;
use crate::lifecycle::LifecycleHub;
use crate::queue::{IdleQueue, IdleTask, QueueOptions};
use crate::registry::KeyedRegistry;
use crate::session::{self, Session, HIT_TIME_KEY, SESSION_NAMESPACE};
use crate::storage::SharedStorage;
use crate::store::{record, Record, StoreOptions, SyncedStore};

struct CoordinatorInner {
    config: Config,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn HostScheduler>,
    lifecycle: Arc<LifecycleHub>,
    storage: Arc<dyn SharedStorage>,
    stores: KeyedRegistry<SyncedStore>,
    queues: KeyedRegistry<IdleQueue>,
    /// Cancellation for the registry-wide change listener, while installed.
    change_listener: Mutex<Option<CancellationToken>>,
}

/// Consumer-facing entry point; cheap to clone.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    /// Creates a coordinator over the injected ports.
    pub fn new(
        config: Config,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn HostScheduler>,
        lifecycle: Arc<LifecycleHub>,
        storage: Arc<dyn SharedStorage>,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                clock,
                scheduler,
                lifecycle,
                storage,
                stores: KeyedRegistry::new(),
                queues: KeyedRegistry::new(),
                change_listener: Mutex::new(None),
            }),
        }
    }

    /// The lifecycle hub, for host adapters driving visibility/unload.
    pub fn lifecycle(&self) -> Arc<LifecycleHub> {
        Arc::clone(&self.inner.lifecycle)
    }

    /// Acquires the shared queue for `tracking_id` (creating it on first
    /// acquisition).
    pub fn queue(&self, tracking_id: &str) -> QueueHandle {
        let inner = &self.inner;
        let queue = inner.queues.get_or_create(tracking_id, || {
            IdleQueue::new(
                Arc::clone(&inner.clock),
                Arc::clone(&inner.scheduler),
                Arc::clone(&inner.lifecycle),
                QueueOptions {
                    min_task_time: inner.config.min_task_time,
                },
            )
        });
        QueueHandle {
            queue,
            inner: Arc::clone(inner),
            key: tracking_id.to_string(),
        }
    }

    /// Acquires the shared store for `(tracking_id, namespace)`.
    ///
    /// The first acquisition of any store installs the context-wide change
    /// listener; `options` take effect only on first creation of this
    /// particular store.
    pub fn store(&self, tracking_id: &str, namespace: &str, options: StoreOptions) -> StoreHandle {
        let key = self.inner.config.storage_key(tracking_id, namespace);
        let inner = &self.inner;

        let mut listener = inner.change_listener.lock();
        let first_store = inner.stores.is_empty();
        let store = inner.stores.get_or_create(&key, || {
            SyncedStore::new(key.clone(), Arc::clone(&inner.storage), options)
        });
        if first_store {
            *listener = Some(install_change_listener(inner));
        }
        drop(listener);

        StoreHandle {
            store,
            inner: Arc::clone(inner),
            key,
        }
    }

    /// Acquires the session store for `tracking_id`: the `session`
    /// namespace with `hitTime` as the designated timestamp field, so a
    /// deferred stale interaction can never clobber a newer one written by
    /// another context.
    pub fn session_store(&self, tracking_id: &str) -> StoreHandle {
        let options = StoreOptions {
            timestamp_key: Some(HIT_TIME_KEY.to_string()),
            schema_version: Some(self.inner.config.schema_version),
            ..StoreOptions::default()
        };
        self.store(tracking_id, SESSION_NAMESPACE, options)
    }

    /// Whether the session for `tracking_id` has expired under the
    /// configured timeout and time zone.
    ///
    /// Must be consulted before trusting any session-scoped stored value;
    /// the store itself is pure storage.
    pub fn is_session_expired(&self, tracking_id: &str) -> bool {
        let key = self
            .inner
            .config
            .storage_key(tracking_id, SESSION_NAMESPACE);
        // Prefer the live store's cache; fall back to a raw read so this
        // never changes registry state.
        let current = match self.inner.stores.peek(&key) {
            Some(store) => store.get(),
            None => record::parse(self.inner.storage.read(&key).as_deref()),
        };
        session::is_expired(
            &Session::from_record(&current),
            self.inner.clock.now(),
            self.inner.config.session_timeout_minutes,
            self.inner.config.time_zone.as_deref(),
        )
    }

    /// Records an interaction: bumps the session's `hitTime` to now.
    ///
    /// Goes through the timestamp guard, so a deferred touch replayed
    /// after a newer cross-context interaction is dropped.
    pub fn touch_session(&self, tracking_id: &str) {
        let handle = self.session_store(tracking_id);
        let mut partial = Record::new();
        partial.insert(
            HIT_TIME_KEY.to_string(),
            json!(self.inner.clock.now_millis()),
        );
        handle.update(partial);
    }

    /// Returns the current session id, starting a fresh session first if
    /// none exists or the previous one expired.
    pub fn ensure_session(&self, tracking_id: &str) -> String {
        let handle = self.session_store(tracking_id);
        let current = Session::from_record(&handle.get());
        let expired = session::is_expired(
            &current,
            self.inner.clock.now(),
            self.inner.config.session_timeout_minutes,
            self.inner.config.time_zone.as_deref(),
        );

        let id = match (current.id, expired) {
            (Some(id), false) => id,
            _ => Uuid::new_v4().to_string(),
        };
        handle.update(
            Session {
                id: Some(id.clone()),
                hit_time: Some(self.inner.clock.now_millis()),
                is_expired: false,
            }
            .to_record(),
        );
        id
    }
}

/// Spawns the registry-wide listener forwarding other contexts' changes
/// into the matching live stores.
fn install_change_listener(inner: &Arc<CoordinatorInner>) -> CancellationToken {
    let token = CancellationToken::new();
    let guard = token.clone();
    let mut changes = inner.storage.changes();
    let origin = inner.storage.context_id();
    let weak = Arc::downgrade(inner);

    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                loop {
                    tokio::select! {
                        _ = guard.cancelled() => break,
                        event = changes.recv() => match event {
                            Ok(event) => {
                                if event.origin == origin {
                                    continue;
                                }
                                let Some(inner) = weak.upgrade() else { break };
                                if let Some(store) = inner.stores.peek(&event.key) {
                                    store.apply_external(event.old.as_deref(), event.new.as_deref());
                                }
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(skipped, "change listener lagged; notifications coalesced");
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }
            });
        }
        Err(_) => warn!("no tokio runtime; cross-context changes will not be observed"),
    }
    token
}

impl Drop for CoordinatorInner {
    fn drop(&mut self) {
        if let Some(token) = self.change_listener.lock().take() {
            token.cancel();
        }
    }
}

impl CoordinatorInner {
    fn release_store(&self, key: &str) {
        let mut listener = self.change_listener.lock();
        self.stores.release(key);
        if self.stores.is_empty() {
            if let Some(token) = listener.take() {
                token.cancel();
            }
        }
    }
}

/// RAII reference to a shared [`SyncedStore`]; releases on drop.
///
/// Dereferences to the store, so `get`/`update`/`clear` and the
/// external-set listener API are available directly.
pub struct StoreHandle {
    store: Arc<SyncedStore>,
    inner: Arc<CoordinatorInner>,
    key: String,
}

impl Deref for StoreHandle {
    type Target = SyncedStore;

    fn deref(&self) -> &SyncedStore {
        &self.store
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        self.inner.release_store(&self.key);
    }
}

/// RAII reference to a shared [`IdleQueue`]; releases on drop.
pub struct QueueHandle {
    queue: Arc<IdleQueue>,
    inner: Arc<CoordinatorInner>,
    key: String,
}

impl QueueHandle {
    /// Enqueues one task on the shared queue.
    pub fn add(&self, task: IdleTask) {
        self.queue.add(task);
    }

    /// Enqueues tasks in order.
    pub fn add_all(&self, tasks: impl IntoIterator<Item = IdleTask>) {
        self.queue.add_all(tasks);
    }
}

impl Deref for QueueHandle {
    type Target = IdleQueue;

    fn deref(&self) -> &IdleQueue {
        &self.queue
    }
}

impl Drop for QueueHandle {
    fn drop(&mut self) {
        self.inner.queues.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::ManualScheduler;
    use crate::storage::MemoryArea;
    use serde_json::json;
    use std::time::Duration;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn coordinator_on(
        area: &Arc<MemoryArea>,
        clock: Arc<ManualClock>,
    ) -> (Coordinator, Arc<LifecycleHub>) {
        let lifecycle = LifecycleHub::visible();
        let coordinator = Coordinator::new(
            Config::default(),
            clock,
            ManualScheduler::new(),
            Arc::clone(&lifecycle),
            Arc::new(area.context()),
        );
        (coordinator, lifecycle)
    }

    fn rec(v: serde_json::Value) -> Record {
        v.as_object().expect("object literal").clone()
    }

    #[tokio::test]
    async fn test_same_key_handles_share_one_store() {
        let area = MemoryArea::new(8);
        let (coordinator, _) = coordinator_on(&area, ManualClock::from_millis(0));

        let a = coordinator.store("UA-1", "plugins/scroll", StoreOptions::default());
        let b = coordinator.store("UA-1", "plugins/scroll", StoreOptions::default());
        assert!(std::ptr::eq::<SyncedStore>(&*a, &*b));

        a.update(rec(json!({"depth": 40})));
        assert_eq!(b.get(), rec(json!({"depth": 40})));
    }

    #[tokio::test]
    async fn test_change_listener_lifetime_is_registry_wide() {
        let area = MemoryArea::new(8);
        let (coordinator, _) = coordinator_on(&area, ManualClock::from_millis(0));
        assert_eq!(area.listener_count(), 0);

        let a = coordinator.store("UA-1", "session", StoreOptions::default());
        let b = coordinator.store("UA-1", "plugins/scroll", StoreOptions::default());
        settle().await;
        assert_eq!(area.listener_count(), 1, "one listener across all keys");

        drop(a);
        settle().await;
        assert_eq!(area.listener_count(), 1, "still one store alive");

        drop(b);
        settle().await;
        assert_eq!(area.listener_count(), 0, "last release removes listener");
    }

    #[tokio::test]
    async fn test_cross_context_change_reaches_store() {
        let area = MemoryArea::new(8);
        let clock = ManualClock::from_millis(0);
        let (ctx_a, _) = coordinator_on(&area, clock.clone());
        let (ctx_b, _) = coordinator_on(&area, clock);

        let local = ctx_b.store("UA-1", "session", StoreOptions::default());
        settle().await;

        let seen: Arc<Mutex<Vec<(Record, Record)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        local.on_external_set(move |new, old| {
            sink.lock().push((new.clone(), old.clone()));
        });

        let remote = ctx_a.store("UA-1", "session", StoreOptions::default());
        remote.update(rec(json!({"hitTime": 7})));
        settle().await;

        assert_eq!(local.get(), rec(json!({"hitTime": 7})));
        let calls = seen.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, rec(json!({"hitTime": 7})));
        assert!(calls[0].1.is_empty());
    }

    #[tokio::test]
    async fn test_own_writes_do_not_loop_back() {
        let area = MemoryArea::new(8);
        let (coordinator, _) = coordinator_on(&area, ManualClock::from_millis(0));

        let store = coordinator.store("UA-1", "session", StoreOptions::default());
        settle().await;

        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        store.on_external_set(move |_, _| *sink.lock() += 1);

        store.update(rec(json!({"n": 1})));
        settle().await;
        assert_eq!(*count.lock(), 0);
    }

    #[tokio::test]
    async fn test_session_expiry_over_manual_time() {
        let area = MemoryArea::new(8);
        let clock = ManualClock::from_millis(1_000_000);
        let (coordinator, _) = coordinator_on(&area, clock.clone());

        let id = coordinator.ensure_session("UA-1");
        assert!(!coordinator.is_session_expired("UA-1"));

        clock.advance(Duration::from_secs(29 * 60));
        assert!(!coordinator.is_session_expired("UA-1"));
        assert_eq!(coordinator.ensure_session("UA-1"), id, "still live: id kept");

        clock.advance(Duration::from_secs(31 * 60));
        assert!(coordinator.is_session_expired("UA-1"));
        assert_ne!(coordinator.ensure_session("UA-1"), id, "expired: fresh id");
        assert!(!coordinator.is_session_expired("UA-1"));
    }

    #[tokio::test]
    async fn test_touch_session_keeps_session_alive() {
        let area = MemoryArea::new(8);
        let clock = ManualClock::from_millis(0);
        let (coordinator, _) = coordinator_on(&area, clock.clone());

        coordinator.ensure_session("UA-1");
        for _ in 0..3 {
            clock.advance(Duration::from_secs(20 * 60));
            coordinator.touch_session("UA-1");
        }
        assert!(!coordinator.is_session_expired("UA-1"));
    }

    #[tokio::test]
    async fn test_stale_touch_does_not_regress_hit_time() {
        let area = MemoryArea::new(8);
        let clock = ManualClock::from_millis(1_000_000);
        let (coordinator, _) = coordinator_on(&area, clock.clone());

        coordinator.ensure_session("UA-1");
        let newer = clock.now_millis();

        // A deferred write carrying an older hitTime must be dropped.
        let handle = coordinator.session_store("UA-1");
        handle.update(rec(json!({ "hitTime": newer - 5_000 })));

        let session = Session::from_record(&handle.get());
        assert_eq!(session.hit_time, Some(newer));
    }

    #[tokio::test]
    async fn test_queue_handle_flushes_on_hard_deadline() {
        let area = MemoryArea::new(8);
        let (coordinator, lifecycle) = coordinator_on(&area, ManualClock::from_millis(0));

        let queue = coordinator.queue("UA-1");
        let ran = Arc::new(Mutex::new(0usize));
        for _ in 0..3 {
            let sink = Arc::clone(&ran);
            queue.add(IdleTask::new(move |_| *sink.lock() += 1));
        }

        lifecycle.unload();
        assert_eq!(*ran.lock(), 3);
    }

    #[tokio::test]
    async fn test_queue_released_on_last_handle_drop() {
        let area = MemoryArea::new(8);
        let (coordinator, lifecycle) = coordinator_on(&area, ManualClock::from_millis(0));

        let a = coordinator.queue("UA-1");
        let b = coordinator.queue("UA-1");
        assert!(std::ptr::eq::<IdleQueue>(&*a, &*b));

        let ran = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&ran);
        a.add(IdleTask::new(move |_| *sink.lock() += 1));

        drop(a);
        drop(b); // queue torn down: pending task discarded, observer gone

        lifecycle.unload();
        assert_eq!(*ran.lock(), 0);
    }
}
