//! The daemon context: owns every subsystem and sequences its lifecycle.
//!
//! # Responsibilities
//! - Construct subsystems in dependency order (`setup`)
//! - Wire the stop path, start the router and park in the logic mainloop (`run`)
//! - Tear everything down in the fixed [`TeardownStep::ORDER`] (`shutdown`)
//!
//! # Design Decisions
//! - Each subsystem lives in a typed [`Slot`]; teardown walks the step list
//!   and every step is a no-op for a slot it does not apply to
//! - Startup errors are recorded as the exit code and logged here, once
//! - Shutdown runs at most once; dropping an un-shut context runs it

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::schema::{NodeDbDir, DEFAULT_WORKER_THREADS};
use crate::error::{DaemonError, Result};
use crate::lifecycle::signals::{self, StopHandle};
use crate::lifecycle::startup::{self, StartupPlan, NET_IO_POOL, WORKER_POOL};
use crate::lifecycle::teardown::{Slot, SlotState, Subsystem, TeardownStep};
use crate::observability::metrics;
use crate::pool::Threading;
use crate::subsystem::{
    ConfigStore, Crypto, DefaultSubsystems, EventLoop, Logic, NodeDatabase, Router,
    SubsystemFactory, ThreadPool,
};

/// Owned state of one daemon run.
pub struct DaemonContext {
    factory: Box<dyn SubsystemFactory>,
    threading: Threading,

    config: Slot<dyn ConfigStore>,
    crypto: Slot<dyn Crypto>,
    node_db: Slot<dyn NodeDatabase>,
    worker: Slot<dyn ThreadPool>,
    net_io: Slot<dyn ThreadPool>,
    logic: Slot<dyn Logic>,
    router: Slot<dyn Router>,
    event_loop: Slot<dyn EventLoop>,

    nodedb_dir: Option<NodeDbDir>,
    exit_code: i32,
    ready: bool,
    stop: Arc<StopHandle>,
    journal: Vec<TeardownStep>,
    shut_down: AtomicBool,
}

impl DaemonContext {
    /// Context with the real subsystems, threading chosen from the environment.
    pub fn new() -> Self {
        Self::with_factory(DefaultSubsystems, Threading::from_env())
    }

    pub fn with_factory(factory: impl SubsystemFactory + 'static, threading: Threading) -> Self {
        Self {
            factory: Box::new(factory),
            threading,
            config: Slot::new(Subsystem::Config),
            crypto: Slot::new(Subsystem::Crypto),
            node_db: Slot::new(Subsystem::NodeDb),
            worker: Slot::new(Subsystem::WorkerPool),
            net_io: Slot::new(Subsystem::NetIoPool),
            logic: Slot::new(Subsystem::Logic),
            router: Slot::new(Subsystem::Router),
            event_loop: Slot::new(Subsystem::EventLoop),
            nodedb_dir: None,
            exit_code: 0,
            ready: false,
            stop: Arc::new(StopHandle::new()),
            journal: Vec::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Set up and run until stopped. Returns once the logic mainloop exits
    /// or as soon as a startup step fails.
    pub fn start(&mut self, config_path: &Path) -> Result<()> {
        self.setup(config_path)?;
        self.run()
    }

    /// Construct and configure every subsystem, up to and including the
    /// router. On error, whatever was constructed stays in place for
    /// [`shutdown`](Self::shutdown).
    ///
    /// A repeated call is rejected with `NotReady` and leaves the recorded
    /// exit code alone.
    pub fn setup(&mut self, config_path: &Path) -> Result<()> {
        if !self.config.is_unset() {
            tracing::warn!(path = %config_path.display(), "Setup already ran");
            return Err(DaemonError::NotReady);
        }
        let result = self.try_setup(config_path);
        self.record(result)
    }

    fn try_setup(&mut self, config_path: &Path) -> Result<()> {
        let config = self
            .factory
            .load_config(config_path)
            .map_err(|source| DaemonError::ConfigLoad {
                path: config_path.to_path_buf(),
                source,
            })?;
        let config = self.config.fill(config);
        tracing::info!(
            path = %config_path.display(),
            entries = config.entries().len(),
            "Config loaded"
        );

        let event_loop = self
            .factory
            .event_loop(self.threading)
            .map_err(DaemonError::EventLoopInit)?;
        let event_loop = self.event_loop.fill(event_loop);

        let plan = StartupPlan::from_entries(config.entries());
        if let Some(threads) = plan.worker_threads {
            self.create_worker_pool(threads)?;
        }
        self.nodedb_dir = plan.nodedb_dir;

        let crypto = self.crypto.fill(self.factory.crypto());
        let node_db = self.node_db.fill(self.factory.node_db(crypto));

        let dir = self.nodedb_dir.as_ref().ok_or(DaemonError::NoNodeDbDir)?;
        node_db
            .ensure_dir(dir)
            .map_err(|source| DaemonError::NodeDbInit {
                path: dir.to_path_buf(),
                source,
            })?;

        if self.worker.is_unset() {
            self.create_worker_pool(DEFAULT_WORKER_THREADS)?;
        }
        let worker = self.worker.get().cloned().ok_or(DaemonError::NotReady)?;

        let net_io = self
            .factory
            .thread_pool(1, NET_IO_POOL, self.threading)
            .map_err(|source| DaemonError::ThreadSpawn {
                pool: NET_IO_POOL.to_string(),
                source,
            })?;
        let net_io = self.net_io.fill(net_io);

        let logic = self
            .logic
            .fill(self.factory.logic(Arc::clone(&worker), self.threading));
        if self.threading.is_cooperative() {
            logic.drive(net_io);
        }

        let router = self.router.fill(self.factory.router(worker, event_loop, logic));
        router.configure(config.as_ref())?;

        self.ready = true;
        tracing::info!(threading = ?self.threading, "Daemon set up");
        Ok(())
    }

    fn create_worker_pool(&mut self, threads: usize) -> Result<()> {
        let pool = self
            .factory
            .thread_pool(threads, WORKER_POOL, self.threading)
            .map_err(|source| DaemonError::ThreadSpawn {
                pool: WORKER_POOL.to_string(),
                source,
            })?;
        self.worker.fill(pool);
        Ok(())
    }

    /// Start the router and the event loop, then block in the logic
    /// mainloop until a stop is requested.
    ///
    /// Once a setup has been attempted its outcome is the exit code, so a
    /// run that is not preceded by a fresh successful setup is rejected
    /// without recording anything.
    pub fn run(&mut self) -> Result<()> {
        if !self.ready && !self.config.is_unset() {
            tracing::warn!("Run without a fresh setup");
            return Err(DaemonError::NotReady);
        }
        let result = self.try_run();
        self.record(result)
    }

    fn try_run(&mut self) -> Result<()> {
        if !self.ready {
            return Err(DaemonError::NotReady);
        }
        self.ready = false;

        let (Some(event_loop), Some(logic), Some(router), Some(net_io)) = (
            self.event_loop.get().cloned(),
            self.logic.get().cloned(),
            self.router.get().cloned(),
            self.net_io.get().cloned(),
        ) else {
            return Err(DaemonError::NotReady);
        };

        self.stop.arm(&event_loop, &logic);
        signals::publish(&self.stop);
        if let Err(err) = signals::install(&event_loop.handle()) {
            tracing::warn!(error = %err, "Signal handlers not installed");
        }

        router.start();
        self.router.mark_started();

        let job = startup::event_loop_job(Arc::clone(&event_loop), &net_io, self.threading);
        if net_io.submit(job) {
            self.event_loop.mark_started();
        } else {
            tracing::warn!("Network I/O pool refused the event loop");
        }

        self.logic.mark_started();
        tracing::info!("Daemon running");
        logic.run_mainloop();
        tracing::info!("Daemon mainloop returned");
        Ok(())
    }

    fn record(&mut self, result: Result<()>) -> Result<()> {
        if let Err(err) = &result {
            self.exit_code = err.exit_code();
            tracing::error!(error = %err, kind = err.kind(), "Startup failed");
        }
        result
    }

    /// Tear down every constructed subsystem and return the exit code.
    ///
    /// A second call logs and returns the same code without touching
    /// anything.
    pub fn shutdown(&mut self) -> i32 {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            tracing::warn!("Shutdown already ran");
            return self.exit_code;
        }

        tracing::info!(exit_code = self.exit_code, cause = ?self.stop.cause(), "Shutting down");
        for step in TeardownStep::ORDER {
            if self.apply(step) {
                tracing::debug!(step = step.label(), "Teardown step");
                metrics::record_teardown_step(step.label());
                self.journal.push(step);
            }
        }

        self.ready = false;
        signals::retract(&self.stop);
        tracing::info!(steps = self.journal.len(), exit_code = self.exit_code, "Shutdown complete");
        self.exit_code
    }

    fn apply(&mut self, step: TeardownStep) -> bool {
        match step {
            TeardownStep::StopEventLoop => self.event_loop.stop_with(|ev| ev.stop()),
            TeardownStep::StopWorkerPool => self.worker.stop_with(|pool| pool.stop()),
            TeardownStep::JoinWorkerPool => self.worker.when_stopped(|pool| pool.join()),
            TeardownStep::StopLogic => self.logic.stop_with(|logic| logic.stop()),
            TeardownStep::StopRouter => self.router.stop_with(|router| router.stop()),
            TeardownStep::FreeRouter => self.router.free(),
            TeardownStep::FreeConfig => self.config.free(),
            TeardownStep::FreeEventLoop => self.event_loop.free(),
            TeardownStep::FreeWorkerPool => self.worker.free(),
            TeardownStep::FreeLogic => self.logic.free(),
            TeardownStep::StopNetIoPool => self.net_io.stop_with(|pool| pool.stop()),
            TeardownStep::JoinNetIoPool => self.net_io.when_stopped(|pool| pool.join()),
            TeardownStep::FreeNetIoPool => self.net_io.free(),
            TeardownStep::FreeNodeDb => self.node_db.free(),
            TeardownStep::FreeCrypto => self.crypto.free(),
        }
    }

    /// Exit code recorded so far: 0 unless a startup step failed.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn threading(&self) -> Threading {
        self.threading
    }

    /// Handle that stops this run without going through the global.
    pub fn stop_handle(&self) -> Arc<StopHandle> {
        Arc::clone(&self.stop)
    }

    /// Node database directory resolved from config.
    pub fn nodedb_dir(&self) -> Option<&NodeDbDir> {
        self.nodedb_dir.as_ref()
    }

    pub fn state(&self, subsystem: Subsystem) -> SlotState {
        match subsystem {
            Subsystem::Config => self.config.state(),
            Subsystem::Crypto => self.crypto.state(),
            Subsystem::NodeDb => self.node_db.state(),
            Subsystem::WorkerPool => self.worker.state(),
            Subsystem::NetIoPool => self.net_io.state(),
            Subsystem::Logic => self.logic.state(),
            Subsystem::Router => self.router.state(),
            Subsystem::EventLoop => self.event_loop.state(),
        }
    }

    pub fn worker_pool(&self) -> Option<Arc<dyn ThreadPool>> {
        self.worker.get().cloned()
    }

    pub fn net_io_pool(&self) -> Option<Arc<dyn ThreadPool>> {
        self.net_io.get().cloned()
    }

    pub fn node_db(&self) -> Option<Arc<dyn NodeDatabase>> {
        self.node_db.get().cloned()
    }

    /// Teardown steps that applied, in execution order.
    pub fn teardown_journal(&self) -> &[TeardownStep] {
        &self.journal
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Default for DaemonContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DaemonContext {
    fn drop(&mut self) {
        if !self.is_shut_down() {
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_has_nothing_to_tear_down() {
        let mut ctx = DaemonContext::with_factory(DefaultSubsystems, Threading::Multi);
        for subsystem in Subsystem::ALL {
            assert_eq!(ctx.state(subsystem), SlotState::Unset);
        }

        assert_eq!(ctx.shutdown(), 0);
        assert!(ctx.teardown_journal().is_empty());
    }

    #[test]
    fn run_before_setup_is_not_ready() {
        let mut ctx = DaemonContext::with_factory(DefaultSubsystems, Threading::Multi);
        assert!(matches!(ctx.run(), Err(DaemonError::NotReady)));
        assert_eq!(ctx.exit_code(), 1);
    }

    #[test]
    fn missing_config_leaves_every_slot_unset() {
        let tmp = tempfile::tempdir().unwrap();
        let mut ctx = DaemonContext::with_factory(DefaultSubsystems, Threading::Multi);

        let err = ctx.setup(&tmp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, DaemonError::ConfigLoad { .. }));
        for subsystem in Subsystem::ALL {
            assert_eq!(ctx.state(subsystem), SlotState::Unset);
        }

        assert_eq!(ctx.shutdown(), 1);
        assert!(ctx.teardown_journal().is_empty());
    }

    #[test]
    fn second_shutdown_is_a_no_op() {
        let mut ctx = DaemonContext::with_factory(DefaultSubsystems, Threading::Multi);
        ctx.shutdown();
        assert!(ctx.is_shut_down());
        assert_eq!(ctx.shutdown(), 0);
    }
}
