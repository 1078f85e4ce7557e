//! Overlay router.
//!
//! # Responsibilities
//! - Validate router settings and bind listen sockets (`configure`)
//! - Accept inbound peers and dial configured ones (`start`)
//! - Register sessions once a peer completes the hello exchange
//! - Close every connection on `stop`
//!
//! # Data Flow
//! ```text
//! accept / dial                (event loop)
//!     → hello exchange         (event loop)
//!     → handshake digest       (worker pool)
//!     → session registration   (logic thread)
//!     → read until EOF / stop  (event loop)
//!     → session removal        (logic thread)
//! ```
//!
//! # Design Decisions
//! - Session state is only mutated from logic jobs, so the router needs no
//!   lock of its own around it
//! - The connection task waits for registration before serving, so a
//!   removal can never be scheduled ahead of its insert
//! - Wire protocol beyond the hello line is out of scope

pub mod session;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Semaphore};
use uuid::Uuid;

use crate::config::validation::{validate_router, RouterSettings};
use crate::error::DaemonError;
use crate::lifecycle::shutdown::Shutdown;
use crate::net::listener::{self, ConnectionPermit, Listener, ListenerError};
use crate::net::{ConnectionTracker, Direction};
use crate::resilience::DialPolicy;
use crate::subsystem::{ConfigStore, EventLoop, Logic, Router, ThreadPool};

pub use session::{Session, SessionTable};

/// First token of every hello line.
pub const HELLO_PREFIX: &str = "OVERLAY/1";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_HELLO_LEN: usize = 64;
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// State shared with every task the router spawns.
struct Inner {
    worker: Arc<dyn ThreadPool>,
    logic: Arc<dyn Logic>,
    sessions: SessionTable,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
}

/// Router wired to the worker pool, event loop and logic scheduler.
pub struct OverlayRouter {
    event_loop: Arc<dyn EventLoop>,
    inner: Arc<Inner>,
    settings: OnceLock<RouterSettings>,
    pending: Mutex<Vec<(String, std::net::TcpListener)>>,
    local_addrs: Mutex<Vec<SocketAddr>>,
    dial_policy: DialPolicy,
    started: AtomicBool,
}

impl OverlayRouter {
    pub fn new(
        worker: Arc<dyn ThreadPool>,
        event_loop: Arc<dyn EventLoop>,
        logic: Arc<dyn Logic>,
    ) -> Self {
        Self {
            event_loop,
            inner: Arc::new(Inner {
                worker,
                logic,
                sessions: SessionTable::new(),
                tracker: ConnectionTracker::new(),
                shutdown: Shutdown::new(),
            }),
            settings: OnceLock::new(),
            pending: Mutex::new(Vec::new()),
            local_addrs: Mutex::new(Vec::new()),
            dial_policy: DialPolicy::default(),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_dial_policy(mut self, policy: DialPolicy) -> Self {
        self.dial_policy = policy;
        self
    }

    /// Settings accepted by `configure`.
    pub fn settings(&self) -> Option<&RouterSettings> {
        self.settings.get()
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.inner.sessions
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Addresses the listeners are bound to, in `[bind]` order.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.local_addrs.lock().clone()
    }

    /// Open connections, with or without a session.
    pub fn active_connections(&self) -> u64 {
        self.inner.tracker.active_count()
    }
}

impl Router for OverlayRouter {
    fn configure(&self, config: &dyn ConfigStore) -> crate::Result<()> {
        if self.settings.get().is_some() {
            return Err(DaemonError::RouterConfig("router is already configured".into()));
        }

        let settings = validate_router(config.entries()).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            DaemonError::RouterConfig(messages.join("; "))
        })?;

        let mut bound = Vec::with_capacity(settings.binds.len());
        let mut addrs = Vec::with_capacity(settings.binds.len());
        for (name, addr) in &settings.binds {
            let bind_error = |err: String| {
                DaemonError::RouterConfig(format!("[bind] {} ({}): {}", name, addr, err))
            };
            let listener = listener::bind_std(*addr).map_err(|e| bind_error(e.to_string()))?;
            let local = listener
                .local_addr()
                .map_err(|e| bind_error(e.to_string()))?;

            tracing::info!(listener = %name, address = %local, "Listener bound");
            addrs.push(local);
            bound.push((name.clone(), listener));
        }

        tracing::info!(
            netid = %settings.netid,
            nickname = ?settings.nickname,
            max_connections = settings.max_connections,
            binds = bound.len(),
            connects = settings.connects.len(),
            "Router configured"
        );

        *self.pending.lock() = bound;
        *self.local_addrs.lock() = addrs;
        let _ = self.settings.set(settings);
        Ok(())
    }

    fn start(&self) {
        let Some(settings) = self.settings.get() else {
            tracing::warn!("Router started before configuration");
            return;
        };
        if self.started.swap(true, Ordering::SeqCst) || self.inner.shutdown.is_triggered() {
            return;
        }

        let handle = self.event_loop.handle();
        let limit = Arc::new(Semaphore::new(
            settings.max_connections.min(Semaphore::MAX_PERMITS),
        ));
        let hello: Arc<str> = Arc::from(format!("{} {}\n", HELLO_PREFIX, settings.netid));

        let listeners = std::mem::take(&mut *self.pending.lock());
        for (name, listener) in listeners {
            handle.spawn(accept_loop(
                Arc::clone(&self.inner),
                name,
                listener,
                Arc::clone(&limit),
                Arc::clone(&hello),
            ));
        }

        for (name, addr) in settings.connects.iter().cloned() {
            handle.spawn(dial_loop(
                Arc::clone(&self.inner),
                name,
                addr,
                Arc::clone(&limit),
                Arc::clone(&hello),
                self.dial_policy,
            ));
        }

        tracing::info!(
            listeners = self.local_addrs.lock().len(),
            peers = settings.connects.len(),
            "Router started"
        );
    }

    fn stop(&self) {
        self.inner.shutdown.trigger();
        self.pending.lock().clear();

        // The logic thread is already stopped when teardown reaches the router.
        let dropped = self.inner.sessions.len();
        self.inner.sessions.clear();
        tracing::info!(sessions = dropped, "Router stopped");
    }
}

async fn accept_loop(
    inner: Arc<Inner>,
    name: String,
    listener: std::net::TcpListener,
    limit: Arc<Semaphore>,
    hello: Arc<str>,
) {
    let mut shutdown = inner.shutdown.subscribe();
    if inner.shutdown.is_triggered() {
        return;
    }

    let listener = match Listener::from_std(&name, listener, limit) {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(listener = %name, error = %err, "Listener could not join the event loop");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    tokio::spawn(serve(
                        Arc::clone(&inner),
                        stream,
                        peer,
                        Direction::Inbound,
                        permit,
                        Arc::clone(&hello),
                    ));
                }
                Err(ListenerError::Closed) => break,
                Err(err) => {
                    tracing::warn!(listener = listener.name(), error = %err, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                }
            }
        }
    }

    tracing::debug!(listener = %name, "Listener closed");
}

async fn dial_loop(
    inner: Arc<Inner>,
    name: String,
    addr: SocketAddr,
    limit: Arc<Semaphore>,
    hello: Arc<str>,
    policy: DialPolicy,
) {
    let mut shutdown = inner.shutdown.subscribe();
    if inner.shutdown.is_triggered() {
        return;
    }

    let permit = tokio::select! {
        _ = shutdown.recv() => return,
        permit = ConnectionPermit::acquire(&limit) => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
    };

    let mut attempt = 0u32;
    loop {
        let connected = tokio::select! {
            _ = shutdown.recv() => return,
            result = TcpStream::connect(addr) => result,
        };

        match connected {
            Ok(stream) => {
                tracing::info!(peer = %name, address = %addr, attempt, "Connected to peer");
                serve(inner, stream, addr, Direction::Outbound, permit, hello).await;
                return;
            }
            Err(err) => {
                attempt += 1;
                let Some(delay) = policy.delay(attempt) else {
                    tracing::warn!(peer = %name, address = %addr, attempts = attempt, "Giving up on peer");
                    return;
                };
                tracing::debug!(
                    peer = %name,
                    error = %err,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Dial failed, retrying"
                );
                tokio::select! {
                    _ = shutdown.recv() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn serve(
    inner: Arc<Inner>,
    mut stream: TcpStream,
    peer: SocketAddr,
    direction: Direction,
    _permit: ConnectionPermit,
    hello: Arc<str>,
) {
    let guard = inner.tracker.track(direction);
    let mut shutdown = inner.shutdown.subscribe();
    if inner.shutdown.is_triggered() {
        return;
    }

    let theirs = tokio::select! {
        _ = shutdown.recv() => return,
        result = tokio::time::timeout(HANDSHAKE_TIMEOUT, exchange_hello(&mut stream, &hello)) => {
            match result {
                Ok(Ok(line)) => line,
                Ok(Err(err)) => {
                    tracing::debug!(connection_id = %guard.id(), peer = %peer, error = %err, "Hello exchange failed");
                    return;
                }
                Err(_) => {
                    tracing::debug!(connection_id = %guard.id(), peer = %peer, "Hello exchange timed out");
                    return;
                }
            }
        }
    };

    if theirs.trim_end() != hello.trim_end() {
        tracing::warn!(peer = %peer, hello = %theirs, "Peer is on a different network");
        return;
    }

    let id = Uuid::new_v4();
    let registered = register(&inner, id, peer, direction, &hello, &theirs);
    tokio::select! {
        _ = shutdown.recv() => return,
        result = registered => {
            if result.is_err() {
                tracing::debug!(connection_id = %guard.id(), peer = %peer, "Session registration dropped");
                return;
            }
        }
    }

    let mut buf = [0u8; 1024];
    loop {
        tokio::select! {
            // Router stop clears the table itself.
            _ = shutdown.recv() => return,
            read = stream.read(&mut buf) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            },
        }
    }

    let job_inner = Arc::clone(&inner);
    inner.logic.call(Box::new(move || {
        job_inner.sessions.remove(&id);
    }));
}

/// Send our hello and read the peer's, one byte at a time so nothing
/// past the newline is consumed.
async fn exchange_hello(stream: &mut TcpStream, ours: &str) -> std::io::Result<String> {
    stream.write_all(ours.as_bytes()).await?;

    let mut line = Vec::with_capacity(MAX_HELLO_LEN);
    let mut byte = [0u8; 1];
    while line.len() < MAX_HELLO_LEN {
        if stream.read(&mut byte).await? == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        if byte[0] == b'\n' {
            return String::from_utf8(line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e));
        }
        line.push(byte[0]);
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "hello line too long",
    ))
}

/// Digest on the worker pool, then insert on the logic thread. The
/// receiver resolves once the session is in the table, or errors if
/// either stage refused the job.
fn register(
    inner: &Arc<Inner>,
    id: Uuid,
    peer: SocketAddr,
    direction: Direction,
    ours: &str,
    theirs: &str,
) -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();

    let mut transcript = Vec::with_capacity(ours.len() + theirs.len() + 48);
    transcript.extend_from_slice(ours.as_bytes());
    transcript.extend_from_slice(theirs.as_bytes());
    transcript.extend_from_slice(peer.to_string().as_bytes());

    let job_inner = Arc::clone(inner);
    let submitted = inner.worker.submit(Box::new(move || {
        let digest: [u8; 32] = Sha256::digest(&transcript).into();
        let table = Arc::clone(&job_inner);
        job_inner.logic.call(Box::new(move || {
            table.sessions.insert(Session {
                id,
                peer,
                direction,
                digest,
                established: Instant::now(),
            });
            let _ = tx.send(());
        }));
    }));

    if !submitted {
        tracing::debug!(peer = %peer, "Worker pool rejected handshake job");
    }
    rx
}
