//! Startup planning.
//!
//! # Responsibilities
//! - Map config entries to startup effects (pool size, node database dir)
//! - Build the job that drives the event loop on the network I/O pool
//!
//! # Design Decisions
//! - Effects are computed by a pure function after enumeration completes;
//!   nothing in the context is touched while entries are visited
//! - `router.threads`: the first positive integer wins; zero, negative
//!   and non-integer values count as unset
//! - `netdb.dir`: the last entry wins, and an empty value clears it

use std::sync::{Arc, Weak};

use crate::config::schema::{NodeDbDir, DIR_KEY, NETDB_SECTION, ROUTER_SECTION, THREADS_KEY};
use crate::config::store::ConfigEntry;
use crate::pool::Threading;
use crate::subsystem::{EventLoop, Job, ThreadPool};

/// Name of the single-threaded pool that pumps the event loop.
pub const NET_IO_POOL: &str = "net-io";

/// Name of the worker pool.
pub const WORKER_POOL: &str = "worker";

/// What the config asks of startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupPlan {
    pub worker_threads: Option<usize>,
    pub nodedb_dir: Option<NodeDbDir>,
}

impl StartupPlan {
    pub fn from_entries(entries: &[ConfigEntry]) -> Self {
        let mut plan = Self::default();

        for entry in entries {
            if entry.is(ROUTER_SECTION, THREADS_KEY) {
                if plan.worker_threads.is_some() {
                    tracing::debug!(value = %entry.value, "Ignoring repeated router.threads");
                    continue;
                }
                match entry.value.trim().parse::<i64>() {
                    Ok(n) if n > 0 => plan.worker_threads = usize::try_from(n).ok(),
                    _ => tracing::debug!(value = %entry.value, "router.threads is not a positive integer"),
                }
            } else if entry.is(NETDB_SECTION, DIR_KEY) {
                let dir = NodeDbDir::new(&entry.value);
                if dir.was_truncated() {
                    tracing::warn!(
                        configured_len = entry.value.len(),
                        kept_len = dir.len(),
                        "netdb.dir truncated"
                    );
                }
                plan.nodedb_dir = (!dir.is_empty()).then_some(dir);
            }
        }

        plan
    }
}

/// Job that runs the event loop on `pool`.
///
/// Threaded mode blocks in [`EventLoop::run`]. Cooperative mode runs one
/// tick and requeues itself until the loop reports it has stopped.
pub fn event_loop_job(
    event_loop: Arc<dyn EventLoop>,
    pool: &Arc<dyn ThreadPool>,
    threading: Threading,
) -> Job {
    match threading {
        Threading::Multi => Box::new(move || event_loop.run()),
        Threading::Single => tick_job(event_loop, Arc::downgrade(pool)),
    }
}

// Weak: the pool's queue owns this job.
fn tick_job(event_loop: Arc<dyn EventLoop>, pool: Weak<dyn ThreadPool>) -> Job {
    Box::new(move || {
        if !event_loop.tick() {
            return;
        }
        if let Some(owner) = pool.upgrade() {
            let next = tick_job(Arc::clone(&event_loop), Weak::clone(&pool));
            owner.submit(next);
        }
    })
}
