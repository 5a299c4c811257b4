//! # Shared durable store port and change notifications.
//!
//! [`SharedStorage`] is the boundary to the host's durable key/value store:
//! a mapping persisted per application instance and visible to every
//! execution context of that instance. Reads and writes are synchronous
//! (the store the original system targets is a synchronous host API);
//! cross-context change delivery is asynchronous and best-effort.
//!
//! ## Architecture
//! ```text
//! Writers (any context):              Listeners (one per context):
//!   ctx A ──┐
//!   ctx B ──┼──────► ChangeBus ───────► changes() receiver ──► SyncedStore
//!   ctx C ──┘  (broadcast chan)          (origin-filtered)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls
//!   `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for
//!   all receivers; slow receivers observe `RecvError::Lagged(n)` and skip
//!   the `n` oldest items (coalescing is expected, never an error).
//! - **No persistence of events**: an event is lost if no receiver is
//!   subscribed at send time. The durable mapping itself is the source of
//!   truth; notifications are only an invalidation hint.
//! - **Origin filtering**: events carry the writing context's id;
//!   listeners skip their own writes.

use tokio::sync::broadcast;

use crate::error::StorageError;

/// Identifier of one execution context sharing the durable store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(pub u64);

/// A change to one durable key, as observed by other contexts.
///
/// `old`/`new` carry the raw persisted JSON (`None` for absent entries).
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    /// The durable key that changed.
    pub key: String,
    /// Raw JSON before the change, if the entry existed.
    pub old: Option<String>,
    /// Raw JSON after the change; `None` means the entry was removed.
    pub new: Option<String>,
    /// Context that performed the write.
    pub origin: ContextId,
}

/// Port to the host's durable, cross-context key/value store.
///
/// Implementations must tolerate concurrent use from one context; writes
/// from other contexts surface only through [`SharedStorage::changes`].
pub trait SharedStorage: Send + Sync + 'static {
    /// The id of the context this handle belongs to.
    fn context_id(&self) -> ContextId;

    /// Reads the raw JSON stored under `key`, if any.
    fn read(&self, key: &str) -> Option<String>;

    /// Persists `value` under `key`.
    ///
    /// Failures are expected steady-state conditions (storage disabled,
    /// quota); callers degrade to memory-only operation.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes the entry under `key`, if any.
    fn remove(&self, key: &str);

    /// Subscribes to change notifications.
    ///
    /// The receiver observes writes from **all** contexts, including this
    /// one; filter with [`ChangeEvent::origin`]. Delivery may be delayed
    /// or coalesced by the host.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

/// Broadcast channel for change notifications.
///
/// Thin wrapper over [`tokio::sync::broadcast`] used by storage adapters.
/// Multiple writers publish concurrently; each subscribed context receives
/// clones of each event.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    /// Creates a new bus with the given channel capacity (min 1, clamped).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<ChangeEvent>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: ChangeEvent) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver observing subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Number of currently subscribed receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
