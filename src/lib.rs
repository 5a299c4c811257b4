//! # idlesync
//!
//! **idlesync** is a background-work coordinator for cooperative hosts:
//! it defers non-critical bookkeeping so it never competes with
//! user-visible work, while keeping several independent execution
//! contexts of one application instance consistent about a small amount
//! of shared state — even though those contexts run concurrently, may be
//! killed without warning, and communicate only through a slow,
//! eventually-consistent shared store.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   plugin A   │   │   plugin B   │   │   plugin C   │
//!     │ (consumer)   │   │ (consumer)   │   │ (consumer)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Coordinator (per execution context)                              │
//! │  - KeyedRegistry<IdleQueue>    (one queue per tracking id)        │
//! │  - KeyedRegistry<SyncedStore>  (one store per durable key)        │
//! │  - change listener             (one per context, all keys)        │
//! └──────┬──────────────────┬───────────────────────────┬─────────────┘
//!        ▼                  ▼                           ▼
//!  ┌────────────┐    ┌──────────────┐          ┌─────────────────┐
//!  │ IdleQueue  │    │ SyncedStore  │          │ session::       │
//!  │ FIFO drain │    │ cache+guard  │          │ is_expired      │
//!  └─────┬──────┘    └──────┬───────┘          └─────────────────┘
//!        │ ports            │ port
//!        ▼                  ▼
//!  HostScheduler       SharedStorage ◄──── other execution contexts
//!  LifecycleHub         (ChangeBus)        (same durable area)
//!  Clock
//! ```
//!
//! ### Scheduling policy
//! ```text
//! add(task)
//!   ├─ context visible  → idle slot (bounded budget, min task time)
//!   ├─ context hidden   → immediate slot (idle slots may never fire)
//!   └─ hard deadline    → flush(): synchronous drain to completion
//! ```
//!
//! ## Features
//! | Area            | Description                                                | Key types                                   |
//! |-----------------|------------------------------------------------------------|---------------------------------------------|
//! | **Queueing**    | Deferred FIFO work with enqueue-time snapshots.            | [`IdleQueue`], [`IdleTask`], [`TaskSnapshot`] |
//! | **State sync**  | Cross-context key/value state with optimistic ordering.    | [`SyncedStore`], [`StoreOptions`]           |
//! | **Sharing**     | Reference-counted singletons per logical key.              | [`KeyedRegistry`], [`Teardown`]             |
//! | **Sessions**    | Expiry over elapsed time and calendar date.                | [`session::Session`], [`session::is_expired`] |
//! | **Ports**       | Injected host primitives, adapter per platform.            | [`HostScheduler`], [`SharedStorage`], [`Clock`], [`LifecycleHub`] |
//! | **Facade**      | RAII handles tying it together.                            | [`Coordinator`], [`StoreHandle`], [`QueueHandle`] |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use idlesync::{
//!     Config, Coordinator, IdleTask, LifecycleHub, ManualScheduler, StoreOptions, SystemClock,
//! };
//! use idlesync::storage::MemoryArea;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     // One durable area stands in for the host store; each Coordinator
//!     // is one execution context (e.g. one tab).
//!     let area = MemoryArea::new(64);
//!     let lifecycle = LifecycleHub::visible();
//!     let coordinator = Coordinator::new(
//!         Config::default(),
//!         Arc::new(SystemClock),
//!         ManualScheduler::new(),
//!         Arc::clone(&lifecycle),
//!         Arc::new(area.context()),
//!     );
//!
//!     // Defer bookkeeping; it will not run inline.
//!     let queue = coordinator.queue("UA-12345-1");
//!     let store = coordinator.store("UA-12345-1", "plugins/scroll", StoreOptions::default());
//!     queue.add(IdleTask::new(|snapshot| {
//!         let _queued_at = snapshot.captured_at;
//!         // read/write stores, assemble hits...
//!     }));
//!     assert_eq!(queue.len(), 1);
//!
//!     // Context about to be destroyed: everything queued runs now.
//!     lifecycle.unload();
//!     assert!(queue.is_empty());
//!
//!     // Session identity survives in the shared area across contexts.
//!     let id = coordinator.ensure_session("UA-12345-1");
//!     assert!(!coordinator.is_session_expired("UA-12345-1"));
//!     assert_eq!(coordinator.ensure_session("UA-12345-1"), id);
//!     drop(store);
//! }
//! ```

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod queue;
pub mod registry;
pub mod session;
pub mod storage;
pub mod store;

// ---- Public re-exports ----

pub use clock::{Clock, Deadline, ManualClock, SystemClock};
pub use config::Config;
pub use coordinator::{Coordinator, QueueHandle, StoreHandle};
pub use error::StorageError;
pub use host::{DrainFn, HostScheduler, ManualScheduler, ScheduleHandle, TokioScheduler};
pub use lifecycle::{LifecycleEvent, LifecycleHub, Visibility};
pub use queue::{IdleQueue, IdleTask, QueueOptions, TaskSnapshot};
pub use registry::{KeyedRegistry, Teardown};
pub use storage::{ChangeBus, ChangeEvent, ContextId, SharedStorage};
pub use store::{Record, StoreOptions, SyncedStore};
