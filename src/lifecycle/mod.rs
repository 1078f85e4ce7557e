//! Daemon lifecycle.
//!
//! # Data Flow
//! ```text
//! Startup (context.rs, startup.rs):
//!     Load config → event loop → plan (pool size, netdb dir)
//!     → crypto → node database → worker pool → net-io pool
//!     → logic → router (configure)
//!
//! Run (context.rs, signals.rs):
//!     Arm + publish stop handle → install signals → start router
//!     → event loop job on net-io pool → block in logic mainloop
//!
//! Shutdown (teardown.rs):
//!     Walk TeardownStep::ORDER; each step applies to its slot or is skipped
//! ```
//!
//! # Design Decisions
//! - Ordered startup: nothing holds a handle to a subsystem before it exists
//! - Ordered shutdown: a subsystem is stopped before those it depends on
//! - No join timeout: a hung job blocks shutdown

pub mod context;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod teardown;

pub use context::DaemonContext;
pub use shutdown::Shutdown;
pub use signals::{request_stop, Signal, StopHandle};
pub use startup::StartupPlan;
pub use teardown::{Slot, SlotState, Subsystem, TeardownStep};
