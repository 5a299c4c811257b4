//! # Demo: deferred_bookkeeping
//!
//! Defer bookkeeping work into idle time and show the two drain paths:
//! the paced idle slot, and the synchronous hard-deadline flush.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► Coordinator::new(ports...)
//!   ├─► queue.add(task × 3)          → idle slot scheduled
//!   ├─► sleep                        → idle slot fires, tasks run
//!   ├─► queue.add(task × 2)
//!   └─► lifecycle.unload()           → remaining tasks run synchronously
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example deferred_bookkeeping
//! ```

use std::sync::Arc;
use std::time::Duration;

use idlesync::storage::MemoryArea;
use idlesync::{Config, Coordinator, IdleTask, LifecycleHub, SystemClock, TokioScheduler};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // 1) Wire the ports: system clock, tokio-paced idle slots, in-process
    //    shared storage, and a lifecycle hub this demo drives by hand.
    let clock = Arc::new(SystemClock);
    let scheduler = TokioScheduler::with_defaults(clock.clone());
    let lifecycle = LifecycleHub::visible();
    let area = MemoryArea::new(64);

    let coordinator = Coordinator::new(
        Config::default(),
        clock,
        scheduler,
        Arc::clone(&lifecycle),
        Arc::new(area.context()),
    );

    // 2) Queue some bookkeeping; nothing runs inline.
    let queue = coordinator.queue("UA-12345-1");
    for n in 1..=3 {
        queue.add(IdleTask::new(move |snapshot| {
            println!("[idle] task {n} (queued while {:?})", snapshot.visibility);
        }));
    }
    println!("[main] {} tasks queued, none run yet", queue.len());

    // 3) Give the runtime a moment of idleness; the paced slot fires.
    tokio::time::sleep(Duration::from_millis(120)).await;
    println!("[main] after idle slot: {} tasks left", queue.len());

    // 4) Queue more work, then simulate the context being torn down.
    //    The hard deadline drains synchronously: by the time unload()
    //    returns, everything ran.
    for n in 4..=5 {
        queue.add(IdleTask::new(move |_| println!("[flush] task {n}")));
    }
    lifecycle.unload();
    println!("[main] after unload: {} tasks left", queue.len());
}
