//! Logic scheduler: the single serialized context for router events.
//!
//! # Responsibilities
//! - Own the mainloop the orchestrating thread parks in
//! - Run `call`ed jobs one at a time, in submission order
//! - In cooperative mode, pump the worker pool and driven pools
//!
//! # Design Decisions
//! - Wakeups use `park`/`unpark`; `request_stop` takes no locks
//! - Parking is bounded, so a lost wakeup costs one park interval at most
//! - Jobs still queued at `stop` are dropped unrun

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, Thread};
use std::time::Duration;

use parking_lot::Mutex;

use crate::pool::Threading;
use crate::subsystem::{Job, Logic, ThreadPool};

const THREADED_PARK: Duration = Duration::from_millis(250);
const COOPERATIVE_PARK: Duration = Duration::from_millis(2);

/// Serializes router-level work onto one thread.
pub struct LogicScheduler {
    worker: Arc<dyn ThreadPool>,
    threading: Threading,
    queue: Mutex<VecDeque<Job>>,
    stopping: AtomicBool,
    mainloop: OnceLock<Thread>,
    driven: Mutex<Vec<Arc<dyn ThreadPool>>>,
}

impl LogicScheduler {
    pub fn new(worker: Arc<dyn ThreadPool>, threading: Threading) -> Self {
        Self {
            worker,
            threading,
            queue: Mutex::new(VecDeque::new()),
            stopping: AtomicBool::new(false),
            mainloop: OnceLock::new(),
            driven: Mutex::new(Vec::new()),
        }
    }

    /// Offload `job` to the worker pool.
    pub fn queue_work(&self, job: Job) -> bool {
        self.worker.submit(job)
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn wake(&self) {
        if let Some(thread) = self.mainloop.get() {
            thread.unpark();
        }
    }

    fn run_queued(&self) -> usize {
        // Jobs scheduled by these jobs run on the next turn.
        let budget = self.queue.lock().len();
        let mut ran = 0;
        while ran < budget {
            let Some(job) = self.queue.lock().pop_front() else {
                break;
            };
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!("Logic job panicked");
            }
            ran += 1;
        }
        ran
    }

    fn pump_pools(&self) {
        self.worker.pump();
        let driven = self.driven.lock().clone();
        for pool in driven {
            pool.pump();
        }
    }
}

impl Logic for LogicScheduler {
    fn call(&self, job: Job) -> bool {
        if self.is_stopping() {
            return false;
        }
        self.queue.lock().push_back(job);
        self.wake();
        true
    }

    fn drive(&self, pool: Arc<dyn ThreadPool>) {
        tracing::debug!(pool = pool.name(), "Logic driving pool");
        self.driven.lock().push(pool);
    }

    fn run_mainloop(&self) {
        if self.mainloop.set(thread::current()).is_err() {
            tracing::warn!("Logic mainloop already ran");
            return;
        }

        let cooperative = self.threading.is_cooperative();
        let park = if cooperative { COOPERATIVE_PARK } else { THREADED_PARK };
        tracing::info!(threading = ?self.threading, "Logic mainloop running");

        loop {
            self.run_queued();
            if cooperative {
                self.pump_pools();
            }
            if self.is_stopping() {
                break;
            }
            if self.queue.lock().is_empty() {
                thread::park_timeout(park);
            }
        }

        tracing::info!(dropped = self.queue.lock().len(), "Logic mainloop exited");
    }

    fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.wake();
    }

    fn stop(&self) {
        self.request_stop();
        // Queued jobs may hold handles back to this scheduler.
        let dropped: Vec<Job> = self.queue.lock().drain(..).collect();
        self.driven.lock().clear();
        tracing::info!(dropped = dropped.len(), "Logic stopped");
    }
}
