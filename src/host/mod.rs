//! Host scheduling boundary: port and adapters.
//!
//! - [`scheduler`]: the [`HostScheduler`] port and [`ScheduleHandle`];
//! - `tokio_rt`: adapter running callbacks on a tokio runtime;
//! - `manual`: adapter fired explicitly, for tests and self-driven hosts.

mod manual;
mod scheduler;
mod tokio_rt;

pub use manual::{ManualScheduler, ScheduleKind};
pub use scheduler::{DrainFn, HostScheduler, ScheduleHandle};
pub use tokio_rt::{TokioScheduler, TokioSchedulerOptions};
