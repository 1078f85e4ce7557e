//! overlayd: lifecycle orchestration for an overlay network daemon.
//!
//! A [`DaemonContext`] owns the config store, crypto context, node
//! database, worker and network I/O pools, logic scheduler, router and
//! event loop. It brings them up in dependency order, parks the calling
//! thread in the logic mainloop until a stop is requested, then tears
//! them down in a fixed order.

// Subsystem contracts and their implementations
pub mod config;
pub mod crypto;
pub mod ev;
pub mod logic;
pub mod nodedb;
pub mod pool;
pub mod router;
pub mod subsystem;

// Networking support
pub mod net;
pub mod resilience;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use error::{DaemonError, Result};
pub use lifecycle::{DaemonContext, Signal, StopHandle};
pub use pool::Threading;
