//! Collaborator contracts consumed by the orchestrator.
//!
//! # Responsibilities
//! - Define the shape of each subsystem the daemon sequences
//! - Provide the factory seam used to construct them
//!
//! # Design Decisions
//! - Subsystems are shared as `Arc<dyn Trait>`; freeing a slot drops its handle
//! - `request_stop` is the stop-path hook. It sets flags and wakes waiters
//!   without logging or blocking, and runs on the signal listener task,
//!   never inside the OS handler
//! - `stop` is the teardown step and is idempotent
//! - The factory is the only place concrete types are chosen, so tests can
//!   substitute instrumented fakes

use std::path::Path;
use std::sync::Arc;

use crate::config::loader::ConfigError;
use crate::config::schema::NodeDbDir;
use crate::config::store::{ConfigEntry, TomlConfigStore};
use crate::crypto::CryptoContext;
use crate::ev::TokioEventLoop;
use crate::logic::LogicScheduler;
use crate::nodedb::NodeDb;
use crate::pool::{Threading, WorkerPool};
use crate::router::OverlayRouter;

/// A unit of work queued on a pool or on the logic thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Parsed key/value configuration.
pub trait ConfigStore: Send + Sync {
    /// All entries in file order.
    fn entries(&self) -> &[ConfigEntry];

    /// Visit every entry in file order.
    fn for_each(&self, visit: &mut dyn FnMut(&ConfigEntry)) {
        for entry in self.entries() {
            visit(entry);
        }
    }
}

/// Opaque cryptographic context shared by the node database and router.
pub trait Crypto: Send + Sync {
    /// 32-byte short hash of `data`.
    fn shorthash(&self, data: &[u8]) -> [u8; 32];

    /// Fill `buf` with random bytes.
    fn random_bytes(&self, buf: &mut [u8]);
}

/// On-disk store of peer records.
pub trait NodeDatabase: Send + Sync {
    /// Create (or validate) the database directory.
    fn ensure_dir(&self, dir: &NodeDbDir) -> std::io::Result<()>;

    /// Number of records found on disk.
    fn record_count(&self) -> usize;
}

/// Bounded pool of threads running queued jobs.
pub trait ThreadPool: Send + Sync {
    fn name(&self) -> &str;

    /// Configured thread count.
    fn threads(&self) -> usize;

    /// Queue a job. Returns `false` once the pool is stopped.
    fn submit(&self, job: Job) -> bool;

    /// Stop accepting new jobs and wake idle workers.
    fn stop(&self);

    /// Block until every queued and in-flight job has finished.
    fn join(&self);

    /// Run queued jobs on the calling thread (cooperative mode only).
    /// Returns the number of jobs run.
    fn pump(&self) -> usize;

    /// Jobs waiting for a worker.
    fn queued(&self) -> usize;

    /// Jobs currently executing.
    fn active(&self) -> usize;
}

/// Single serialized execution context for router-level events.
pub trait Logic: Send + Sync {
    /// Schedule `job` on the logic thread. Returns `false` once stopped.
    fn call(&self, job: Job) -> bool;

    /// Register a pool the mainloop pumps in cooperative mode.
    fn drive(&self, pool: Arc<dyn ThreadPool>);

    /// Block the calling thread until stopped.
    fn run_mainloop(&self);

    /// Mark for exit and wake the mainloop. Lock-free.
    fn request_stop(&self);

    /// Teardown step: stop and unblock the mainloop.
    fn stop(&self);
}

/// I/O multiplexer for network sockets.
pub trait EventLoop: Send + Sync {
    /// Handle for spawning I/O tasks onto the loop.
    fn handle(&self) -> tokio::runtime::Handle;

    /// Block the calling thread, polling until stopped.
    fn run(&self);

    /// Poll once without blocking. Returns `false` once stopped.
    fn tick(&self) -> bool;

    /// Mark for exit and wake the poller. Lock-free on the fast path.
    fn request_stop(&self);

    /// Teardown step: stop polling. Does not wait for a drain.
    fn stop(&self);
}

/// Overlay router, configured last.
pub trait Router: Send + Sync {
    /// Apply configuration. Rejection is a `RouterConfig` error.
    fn configure(&self, config: &dyn ConfigStore) -> crate::Result<()>;

    /// Begin accepting and establishing connections.
    fn start(&self);

    /// Close connections and release network resources.
    fn stop(&self);
}

/// Constructs every subsystem the orchestrator owns.
pub trait SubsystemFactory: Send + Sync {
    fn load_config(&self, path: &Path) -> Result<Arc<dyn ConfigStore>, ConfigError>;

    fn event_loop(&self, threading: Threading) -> std::io::Result<Arc<dyn EventLoop>>;

    fn crypto(&self) -> Arc<dyn Crypto>;

    fn node_db(&self, crypto: Arc<dyn Crypto>) -> Arc<dyn NodeDatabase>;

    fn thread_pool(
        &self,
        threads: usize,
        name: &str,
        threading: Threading,
    ) -> std::io::Result<Arc<dyn ThreadPool>>;

    fn logic(&self, worker: Arc<dyn ThreadPool>, threading: Threading) -> Arc<dyn Logic>;

    fn router(
        &self,
        worker: Arc<dyn ThreadPool>,
        event_loop: Arc<dyn EventLoop>,
        logic: Arc<dyn Logic>,
    ) -> Arc<dyn Router>;
}

/// Factory producing the real subsystems.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSubsystems;

impl SubsystemFactory for DefaultSubsystems {
    fn load_config(&self, path: &Path) -> Result<Arc<dyn ConfigStore>, ConfigError> {
        Ok(Arc::new(TomlConfigStore::load(path)?))
    }

    fn event_loop(&self, threading: Threading) -> std::io::Result<Arc<dyn EventLoop>> {
        Ok(Arc::new(TokioEventLoop::new(threading)?))
    }

    fn crypto(&self) -> Arc<dyn Crypto> {
        Arc::new(CryptoContext::new())
    }

    fn node_db(&self, crypto: Arc<dyn Crypto>) -> Arc<dyn NodeDatabase> {
        Arc::new(NodeDb::new(crypto))
    }

    fn thread_pool(
        &self,
        threads: usize,
        name: &str,
        threading: Threading,
    ) -> std::io::Result<Arc<dyn ThreadPool>> {
        Ok(Arc::new(WorkerPool::new(threads, name, threading)?))
    }

    fn logic(&self, worker: Arc<dyn ThreadPool>, threading: Threading) -> Arc<dyn Logic> {
        Arc::new(LogicScheduler::new(worker, threading))
    }

    fn router(
        &self,
        worker: Arc<dyn ThreadPool>,
        event_loop: Arc<dyn EventLoop>,
        logic: Arc<dyn Logic>,
    ) -> Arc<dyn Router> {
        Arc::new(OverlayRouter::new(worker, event_loop, logic))
    }
}
