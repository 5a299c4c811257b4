//! Durable storage boundary: port, change notifications, and adapters.
//!
//! - [`shared`]: the [`SharedStorage`] port, [`ChangeEvent`], and the
//!   [`ChangeBus`] broadcast wrapper used by adapters;
//! - [`memory`]: in-process adapter simulating one host store shared by
//!   several execution contexts.

mod memory;
mod shared;

pub use memory::{MemoryArea, MemoryStorage};
pub use shared::{ChangeBus, ChangeEvent, ContextId, SharedStorage};
