//! # Demo: two_contexts
//!
//! Two execution contexts (think: two tabs of one application) share one
//! durable area. A session started in the first context is visible in the
//! second, and cross-context changes fan out to external-set listeners.
//!
//! ## Flow
//! ```text
//! area = MemoryArea
//!   ├─► ctx A: Coordinator ── ensure_session() ── touch_session()
//!   └─► ctx B: Coordinator ── store("session").on_external_set(...)
//!                 ▲                        │
//!                 └── change notification ─┘
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example two_contexts
//! ```

use std::sync::Arc;

use idlesync::storage::MemoryArea;
use idlesync::{Config, Coordinator, LifecycleHub, ManualScheduler, SystemClock};

fn context(area: &Arc<MemoryArea>, name: &str) -> Coordinator {
    println!("[{name}] context opened");
    Coordinator::new(
        Config::default(),
        Arc::new(SystemClock),
        ManualScheduler::new(),
        LifecycleHub::visible(),
        Arc::new(area.context()),
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let area = MemoryArea::new(64);
    let ctx_a = context(&area, "ctx-a");
    let ctx_b = context(&area, "ctx-b");

    // ctx B watches the session store for changes made elsewhere.
    let watched = ctx_b.session_store("UA-12345-1");
    watched.on_external_set(|new, old| {
        println!(
            "[ctx-b] session changed externally: {} -> {}",
            serde_json::to_string(old).unwrap_or_default(),
            serde_json::to_string(new).unwrap_or_default(),
        );
    });

    // ctx A starts the session and records an interaction.
    let id = ctx_a.ensure_session("UA-12345-1");
    println!("[ctx-a] session id: {id}");
    ctx_a.touch_session("UA-12345-1");

    // Let the change notifications drain to ctx B's listener.
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    // ctx B agrees on identity and liveness without ever writing.
    println!(
        "[ctx-b] sees id: {:?}, expired: {}",
        watched.get().get("id"),
        ctx_b.is_session_expired("UA-12345-1"),
    );
}
