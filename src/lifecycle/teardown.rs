//! Subsystem slots and the fixed teardown order.
//!
//! # Responsibilities
//! - Track each subsystem through `Unset → Constructed → Started → Stopped → Freed`
//! - Name every teardown step and fix their order
//!
//! # Design Decisions
//! - A slot only moves forward; a call that does not apply is a no-op
//!   reporting `false`, so teardown after a partial startup runs exactly
//!   the steps that apply
//! - Subsystems with no stop operation (config, crypto, node database) go
//!   straight from constructed to freed
//! - Stopping does not require a start: a constructed subsystem can be
//!   stopped after a failed startup

use std::fmt;
use std::sync::Arc;

/// Lifecycle position of one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotState {
    Unset,
    Constructed,
    Started,
    Stopped,
    Freed,
}

/// The subsystems a daemon context owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Config,
    Crypto,
    NodeDb,
    WorkerPool,
    NetIoPool,
    Logic,
    Router,
    EventLoop,
}

impl Subsystem {
    pub const ALL: [Subsystem; 8] = [
        Subsystem::Config,
        Subsystem::Crypto,
        Subsystem::NodeDb,
        Subsystem::WorkerPool,
        Subsystem::NetIoPool,
        Subsystem::Logic,
        Subsystem::Router,
        Subsystem::EventLoop,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Subsystem::Config => "config",
            Subsystem::Crypto => "crypto",
            Subsystem::NodeDb => "nodedb",
            Subsystem::WorkerPool => "worker_pool",
            Subsystem::NetIoPool => "net_io_pool",
            Subsystem::Logic => "logic",
            Subsystem::Router => "router",
            Subsystem::EventLoop => "event_loop",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One step of shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownStep {
    StopEventLoop,
    StopWorkerPool,
    JoinWorkerPool,
    StopLogic,
    StopRouter,
    FreeRouter,
    FreeConfig,
    FreeEventLoop,
    FreeWorkerPool,
    FreeLogic,
    StopNetIoPool,
    JoinNetIoPool,
    FreeNetIoPool,
    FreeNodeDb,
    FreeCrypto,
}

impl TeardownStep {
    /// Execution order. Later entries may still be referenced by earlier
    /// ones while those stop.
    pub const ORDER: [TeardownStep; 15] = [
        TeardownStep::StopEventLoop,
        TeardownStep::StopWorkerPool,
        TeardownStep::JoinWorkerPool,
        TeardownStep::StopLogic,
        TeardownStep::StopRouter,
        TeardownStep::FreeRouter,
        TeardownStep::FreeConfig,
        TeardownStep::FreeEventLoop,
        TeardownStep::FreeWorkerPool,
        TeardownStep::FreeLogic,
        TeardownStep::StopNetIoPool,
        TeardownStep::JoinNetIoPool,
        TeardownStep::FreeNetIoPool,
        TeardownStep::FreeNodeDb,
        TeardownStep::FreeCrypto,
    ];

    pub fn subsystem(self) -> Subsystem {
        match self {
            TeardownStep::StopEventLoop | TeardownStep::FreeEventLoop => Subsystem::EventLoop,
            TeardownStep::StopWorkerPool
            | TeardownStep::JoinWorkerPool
            | TeardownStep::FreeWorkerPool => Subsystem::WorkerPool,
            TeardownStep::StopLogic | TeardownStep::FreeLogic => Subsystem::Logic,
            TeardownStep::StopRouter | TeardownStep::FreeRouter => Subsystem::Router,
            TeardownStep::FreeConfig => Subsystem::Config,
            TeardownStep::StopNetIoPool
            | TeardownStep::JoinNetIoPool
            | TeardownStep::FreeNetIoPool => Subsystem::NetIoPool,
            TeardownStep::FreeNodeDb => Subsystem::NodeDb,
            TeardownStep::FreeCrypto => Subsystem::Crypto,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TeardownStep::StopEventLoop => "stop_event_loop",
            TeardownStep::StopWorkerPool => "stop_worker_pool",
            TeardownStep::JoinWorkerPool => "join_worker_pool",
            TeardownStep::StopLogic => "stop_logic",
            TeardownStep::StopRouter => "stop_router",
            TeardownStep::FreeRouter => "free_router",
            TeardownStep::FreeConfig => "free_config",
            TeardownStep::FreeEventLoop => "free_event_loop",
            TeardownStep::FreeWorkerPool => "free_worker_pool",
            TeardownStep::FreeLogic => "free_logic",
            TeardownStep::StopNetIoPool => "stop_net_io_pool",
            TeardownStep::JoinNetIoPool => "join_net_io_pool",
            TeardownStep::FreeNetIoPool => "free_net_io_pool",
            TeardownStep::FreeNodeDb => "free_nodedb",
            TeardownStep::FreeCrypto => "free_crypto",
        }
    }
}

/// Owning slot for one subsystem handle.
pub struct Slot<T: ?Sized> {
    subsystem: Subsystem,
    state: SlotState,
    value: Option<Arc<T>>,
}

impl<T: ?Sized> Slot<T> {
    pub fn new(subsystem: Subsystem) -> Self {
        Self {
            subsystem,
            state: SlotState::Unset,
            value: None,
        }
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_unset(&self) -> bool {
        self.state == SlotState::Unset
    }

    /// Store a freshly constructed subsystem and hand back a shared handle.
    /// A slot is filled at most once; a later fill replaces nothing and
    /// returns the handle it was given.
    pub fn fill(&mut self, value: Arc<T>) -> Arc<T> {
        if self.state != SlotState::Unset {
            tracing::warn!(subsystem = %self.subsystem, state = ?self.state, "Slot already filled");
            return value;
        }
        self.value = Some(Arc::clone(&value));
        self.transition(SlotState::Constructed);
        value
    }

    /// Live handle, until the slot is stopped.
    pub fn get(&self) -> Option<&Arc<T>> {
        match self.state {
            SlotState::Constructed | SlotState::Started => self.value.as_ref(),
            _ => None,
        }
    }

    pub fn mark_started(&mut self) -> bool {
        if self.state != SlotState::Constructed {
            return false;
        }
        self.transition(SlotState::Started);
        true
    }

    /// Run `stop` and move to `Stopped`, if the slot is live.
    pub fn stop_with(&mut self, stop: impl FnOnce(&T)) -> bool {
        let Some(value) = self.get() else {
            return false;
        };
        stop(value);
        self.transition(SlotState::Stopped);
        true
    }

    /// Run `action` on a stopped subsystem without changing its state.
    pub fn when_stopped(&self, action: impl FnOnce(&T)) -> bool {
        match (&self.value, self.state) {
            (Some(value), SlotState::Stopped) => {
                action(value);
                true
            }
            _ => false,
        }
    }

    /// Drop the slot's handle. Applies once to any filled slot.
    pub fn free(&mut self) -> bool {
        if matches!(self.state, SlotState::Unset | SlotState::Freed) {
            return false;
        }
        self.value = None;
        self.transition(SlotState::Freed);
        true
    }

    fn transition(&mut self, next: SlotState) {
        tracing::debug!(subsystem = %self.subsystem, from = ?self.state, to = ?next, "Slot transition");
        self.state = next;
    }
}

impl<T: ?Sized> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("subsystem", &self.subsystem)
            .field("state", &self.state)
            .finish()
    }
}
