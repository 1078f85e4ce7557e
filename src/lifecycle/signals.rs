//! OS signal handling and the process-wide stop path.
//!
//! # Responsibilities
//! - Publish the running daemon's [`StopHandle`] where a signal can reach it
//! - Listen for interrupt, terminate and hangup on the event loop
//! - Turn any of them into exactly one stop request
//!
//! # Design Decisions
//! - The OS-level handler is Tokio's self-pipe; our code runs in a task
//! - `request_stop` flips atomics, wakes the event loop and unparks the
//!   mainloop. It never logs; the listener task reports what happened
//! - No project code runs inside the OS handler itself
//! - The handle is the only global; it holds weak references so a freed
//!   subsystem is never revived by a late signal
//! - Hangup stops the daemon; there is no reload

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use arc_swap::ArcSwapOption;
use tokio::runtime::Handle;

use crate::subsystem::{EventLoop, Logic};

/// Where a stop request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
    Hangup,
    /// Requested in-process, not by the OS.
    Manual,
}

impl Signal {
    pub fn name(self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Hangup => "SIGHUP",
            Signal::Manual => "manual",
        }
    }
}

impl Signal {
    const ALL: [Signal; 4] = [Signal::Interrupt, Signal::Terminate, Signal::Hangup, Signal::Manual];

    fn from_tag(tag: u8) -> Option<Signal> {
        Self::ALL.get(usize::from(tag).checked_sub(1)?).copied()
    }

    fn tag(self) -> u8 {
        match self {
            Signal::Interrupt => 1,
            Signal::Terminate => 2,
            Signal::Hangup => 3,
            Signal::Manual => 4,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct StopTargets {
    event_loop: Weak<dyn EventLoop>,
    logic: Weak<dyn Logic>,
}

impl StopTargets {
    fn request_stop(&self) {
        if let Some(event_loop) = self.event_loop.upgrade() {
            event_loop.request_stop();
        }
        if let Some(logic) = self.logic.upgrade() {
            logic.request_stop();
        }
    }
}

/// Stop flag for one daemon run.
///
/// Requests made before the handle is armed are remembered and applied
/// when it is.
pub struct StopHandle {
    requested: AtomicBool,
    // Tag of the signal that initiated the stop; 0 while none has.
    cause: AtomicU8,
    targets: OnceLock<StopTargets>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            cause: AtomicU8::new(0),
            targets: OnceLock::new(),
        }
    }

    /// Point the handle at the subsystems a stop must reach.
    pub fn arm(&self, event_loop: &Arc<dyn EventLoop>, logic: &Arc<dyn Logic>) {
        let armed = self
            .targets
            .set(StopTargets {
                event_loop: Arc::downgrade(event_loop),
                logic: Arc::downgrade(logic),
            })
            .is_ok();

        if armed && self.is_requested() {
            if let Some(targets) = self.targets.get() {
                targets.request_stop();
            }
        }
    }

    /// Mark the event loop and logic scheduler for exit. Returns `true`
    /// only for the call that initiated the stop.
    pub fn request_stop(&self, signal: Signal) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cause.store(signal.tag(), Ordering::SeqCst);
        if let Some(targets) = self.targets.get() {
            targets.request_stop();
        }
        true
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// The signal that initiated the stop.
    pub fn cause(&self) -> Option<Signal> {
        Signal::from_tag(self.cause.load(Ordering::SeqCst))
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

static ACTIVE: ArcSwapOption<StopHandle> = ArcSwapOption::const_empty();

/// Make `handle` the target of process signals.
pub fn publish(handle: &Arc<StopHandle>) {
    if ACTIVE.swap(Some(Arc::clone(handle))).is_some() {
        tracing::warn!("Replaced the stop handle of another daemon run");
    }
}

/// Clear the global, if it still points at `handle`.
pub fn retract(handle: &Arc<StopHandle>) {
    let current = ACTIVE.load();
    if let Some(active) = current.as_ref() {
        if Arc::ptr_eq(active, handle) {
            let _ = ACTIVE.compare_and_swap(&*current, None);
        }
    }
}

/// The published handle, if a daemon is running.
pub fn active() -> Option<Arc<StopHandle>> {
    ACTIVE.load_full()
}

/// Stop the published daemon. Returns `false` if none is running or a
/// stop was already requested.
pub fn request_stop(signal: Signal) -> bool {
    ACTIVE
        .load()
        .as_ref()
        .is_some_and(|handle| handle.request_stop(signal))
}

/// Forward a received signal and report the outcome.
fn deliver(signal: Signal) {
    if request_stop(signal) {
        tracing::info!(signal = signal.name(), "Stop requested");
    } else {
        tracing::debug!(signal = signal.name(), "No stop pending to start");
    }
}

/// Register signal streams on the event loop and spawn the listener task.
#[cfg(unix)]
pub fn install(handle: &Handle) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    // Registration needs the runtime's signal driver.
    let _guard = handle.enter();
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    handle.spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = interrupt.recv() => Signal::Interrupt,
                Some(()) = terminate.recv() => Signal::Terminate,
                Some(()) = hangup.recv() => Signal::Hangup,
                else => break,
            };
            deliver(received);
        }
    });

    tracing::debug!("Signal handlers installed");
    Ok(())
}

#[cfg(not(unix))]
pub fn install(handle: &Handle) -> std::io::Result<()> {
    handle.spawn(async {
        while tokio::signal::ctrl_c().await.is_ok() {
            deliver(Signal::Interrupt);
        }
    });

    tracing::debug!("Signal handlers installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ev::TokioEventLoop;
    use crate::logic::LogicScheduler;
    use crate::pool::{Threading, WorkerPool};
    use crate::subsystem::ThreadPool;

    fn targets() -> (Arc<dyn EventLoop>, Arc<LogicScheduler>) {
        let worker: Arc<dyn ThreadPool> =
            Arc::new(WorkerPool::new(1, "signals-test", Threading::Multi).unwrap());
        let ev: Arc<dyn EventLoop> = Arc::new(TokioEventLoop::new(Threading::Multi).unwrap());
        (ev, Arc::new(LogicScheduler::new(worker, Threading::Multi)))
    }

    #[test]
    fn only_first_request_initiates() {
        let (ev, logic) = targets();
        let logic_dyn: Arc<dyn Logic> = logic.clone();
        let handle = StopHandle::new();
        handle.arm(&ev, &logic_dyn);

        assert_eq!(handle.cause(), None);
        assert!(handle.request_stop(Signal::Interrupt));
        assert!(!handle.request_stop(Signal::Terminate));
        assert_eq!(handle.cause(), Some(Signal::Interrupt));
        assert!(logic.is_stopping());
        assert!(!ev.tick());
    }

    #[test]
    fn early_request_applies_on_arm() {
        let (ev, logic) = targets();
        let logic_dyn: Arc<dyn Logic> = logic.clone();
        let handle = StopHandle::new();

        assert!(handle.request_stop(Signal::Manual));
        assert!(!logic.is_stopping());

        handle.arm(&ev, &logic_dyn);
        assert!(logic.is_stopping());
    }

    #[test]
    fn freed_targets_are_not_revived() {
        let (ev, logic) = targets();
        let logic_dyn: Arc<dyn Logic> = logic;
        let handle = StopHandle::new();
        handle.arm(&ev, &logic_dyn);

        drop(ev);
        drop(logic_dyn);
        assert!(handle.request_stop(Signal::Hangup));
    }

    #[test]
    fn request_from_an_event_loop_task_ends_the_loop() {
        let (ev, logic) = targets();
        let logic_dyn: Arc<dyn Logic> = logic.clone();
        let handle = Arc::new(StopHandle::new());
        handle.arm(&ev, &logic_dyn);

        let from_task = Arc::clone(&handle);
        ev.handle().spawn(async move {
            assert!(from_task.request_stop(Signal::Terminate));
        });

        ev.run();
        assert!(handle.is_requested());
        assert!(logic.is_stopping());
    }

    #[test]
    fn signal_names() {
        assert_eq!(Signal::Interrupt.to_string(), "SIGINT");
        assert_eq!(Signal::Hangup.name(), "SIGHUP");
    }
}
