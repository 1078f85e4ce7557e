//! Shared fakes and helpers for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};

use overlayd::config::loader::ConfigError;
use overlayd::config::{NodeDbDir, TomlConfigStore};
use overlayd::logic::LogicScheduler;
use overlayd::pool::{Threading, WorkerPool};
use overlayd::subsystem::{
    ConfigStore, Crypto, EventLoop, Job, Logic, NodeDatabase, Router, SubsystemFactory, ThreadPool,
};
use overlayd::{DaemonError, Result};

/// Ordered log of every instrumented call.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
    counts: Mutex<HashMap<String, usize>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, event: impl Into<String>) {
        let event = event.into();
        *self.counts.lock().entry(event.clone()).or_default() += 1;
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.counts.lock().get(event).copied().unwrap_or(0)
    }

    /// Events ending in one of `suffixes`, in call order.
    pub fn filtered(&self, suffixes: &[&str]) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| suffixes.iter().any(|s| e.ends_with(s)))
            .collect()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.count(event) > 0
    }
}

/// Knobs for the fake factory.
#[derive(Default, Clone, Copy)]
pub struct Faults {
    pub reject_router_config: bool,
    pub fail_nodedb_dir: bool,
}

pub struct FakeFactory {
    pub recorder: Arc<Recorder>,
    pub faults: Faults,
}

impl FakeFactory {
    pub fn new(recorder: &Arc<Recorder>) -> Self {
        Self {
            recorder: Arc::clone(recorder),
            faults: Faults::default(),
        }
    }

    pub fn with_faults(recorder: &Arc<Recorder>, faults: Faults) -> Self {
        Self {
            recorder: Arc::clone(recorder),
            faults,
        }
    }
}

impl SubsystemFactory for FakeFactory {
    fn load_config(&self, path: &Path) -> std::result::Result<Arc<dyn ConfigStore>, ConfigError> {
        self.recorder.record("config.load");
        Ok(Arc::new(TomlConfigStore::load(path)?))
    }

    fn event_loop(&self, threading: Threading) -> std::io::Result<Arc<dyn EventLoop>> {
        self.recorder.record("event_loop.new");
        Ok(Arc::new(FakeEventLoop::new(&self.recorder, threading)?))
    }

    fn crypto(&self) -> Arc<dyn Crypto> {
        self.recorder.record("crypto.new");
        Arc::new(FakeCrypto)
    }

    fn node_db(&self, _crypto: Arc<dyn Crypto>) -> Arc<dyn NodeDatabase> {
        self.recorder.record("nodedb.new");
        Arc::new(FakeNodeDb {
            recorder: Arc::clone(&self.recorder),
            fail: self.faults.fail_nodedb_dir,
            dirs: Mutex::new(Vec::new()),
        })
    }

    fn thread_pool(
        &self,
        threads: usize,
        name: &str,
        threading: Threading,
    ) -> std::io::Result<Arc<dyn ThreadPool>> {
        self.recorder.record(format!("{}.new:{}", name, threads));
        Ok(Arc::new(FakePool {
            inner: WorkerPool::new(threads, name, threading)?,
            recorder: Arc::clone(&self.recorder),
        }))
    }

    fn logic(&self, worker: Arc<dyn ThreadPool>, threading: Threading) -> Arc<dyn Logic> {
        self.recorder.record("logic.new");
        Arc::new(FakeLogic {
            inner: LogicScheduler::new(worker, threading),
            recorder: Arc::clone(&self.recorder),
        })
    }

    fn router(
        &self,
        _worker: Arc<dyn ThreadPool>,
        _event_loop: Arc<dyn EventLoop>,
        _logic: Arc<dyn Logic>,
    ) -> Arc<dyn Router> {
        self.recorder.record("router.new");
        Arc::new(FakeRouter {
            recorder: Arc::clone(&self.recorder),
            reject: self.faults.reject_router_config,
        })
    }
}

/// Event loop that only polls its runtime and records calls.
pub struct FakeEventLoop {
    runtime: Runtime,
    stopping: AtomicBool,
    recorder: Arc<Recorder>,
}

impl FakeEventLoop {
    fn new(recorder: &Arc<Recorder>, _threading: Threading) -> std::io::Result<Self> {
        Ok(Self {
            runtime: Builder::new_current_thread().enable_all().build()?,
            stopping: AtomicBool::new(false),
            recorder: Arc::clone(recorder),
        })
    }
}

impl EventLoop for FakeEventLoop {
    fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    fn run(&self) {
        self.recorder.record("event_loop.run");
        self.runtime.block_on(async {
            while !self.stopping.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });
    }

    fn tick(&self) -> bool {
        !self.stopping.load(Ordering::SeqCst)
    }

    fn request_stop(&self) {
        self.recorder.record("event_loop.request_stop");
        self.stopping.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.recorder.record("event_loop.stop");
        self.stopping.store(true, Ordering::SeqCst);
    }
}

pub struct FakeCrypto;

impl Crypto for FakeCrypto {
    fn shorthash(&self, data: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, byte) in data.iter().enumerate() {
            out[i % 32] ^= byte;
        }
        out
    }

    fn random_bytes(&self, buf: &mut [u8]) {
        buf.fill(4);
    }
}

pub struct FakeNodeDb {
    recorder: Arc<Recorder>,
    fail: bool,
    dirs: Mutex<Vec<Vec<u8>>>,
}

impl NodeDatabase for FakeNodeDb {
    fn ensure_dir(&self, dir: &NodeDbDir) -> std::io::Result<()> {
        self.recorder.record(format!("nodedb.ensure_dir:{}", dir.as_str()));
        self.dirs.lock().push(dir.as_bytes_with_nul().to_vec());
        if self.fail {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only filesystem",
            ));
        }
        Ok(())
    }

    fn record_count(&self) -> usize {
        0
    }
}

/// Real pool that records lifecycle calls under its name.
pub struct FakePool {
    inner: WorkerPool,
    recorder: Arc<Recorder>,
}

impl ThreadPool for FakePool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn threads(&self) -> usize {
        self.inner.threads()
    }

    fn submit(&self, job: Job) -> bool {
        self.inner.submit(job)
    }

    fn stop(&self) {
        self.recorder.record(format!("{}.stop", self.name()));
        self.inner.stop();
    }

    fn join(&self) {
        self.recorder.record(format!("{}.join", self.name()));
        self.inner.join();
    }

    fn pump(&self) -> usize {
        self.inner.pump()
    }

    fn queued(&self) -> usize {
        self.inner.queued()
    }

    fn active(&self) -> usize {
        self.inner.active()
    }
}

/// Real scheduler that records lifecycle calls.
pub struct FakeLogic {
    inner: LogicScheduler,
    recorder: Arc<Recorder>,
}

impl Logic for FakeLogic {
    fn call(&self, job: Job) -> bool {
        self.inner.call(job)
    }

    fn drive(&self, pool: Arc<dyn ThreadPool>) {
        self.recorder.record(format!("logic.drive:{}", pool.name()));
        self.inner.drive(pool);
    }

    fn run_mainloop(&self) {
        self.recorder.record("logic.run_mainloop");
        self.inner.run_mainloop();
    }

    fn request_stop(&self) {
        self.recorder.record("logic.request_stop");
        self.inner.request_stop();
    }

    fn stop(&self) {
        self.recorder.record("logic.stop");
        self.inner.stop();
    }
}

pub struct FakeRouter {
    recorder: Arc<Recorder>,
    reject: bool,
}

impl Router for FakeRouter {
    fn configure(&self, _config: &dyn ConfigStore) -> Result<()> {
        self.recorder.record("router.configure");
        if self.reject {
            return Err(DaemonError::RouterConfig("netid rejected".into()));
        }
        Ok(())
    }

    fn start(&self) {
        self.recorder.record("router.start");
    }

    fn stop(&self) {
        self.recorder.record("router.stop");
    }
}

/// Write `body` to `<dir>/overlayd.toml`.
pub fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("overlayd.toml");
    std::fs::write(&path, body).unwrap();
    path
}

/// Config with `[netdb] dir` under `dir` plus `extra` appended.
pub fn netdb_config(dir: &Path, extra: &str) -> PathBuf {
    let netdb = dir.join("netdb");
    write_config(
        dir,
        &format!("[netdb]\ndir = '{}'\n\n{}", netdb.display(), extra),
    )
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
