//! Network plumbing used by the router.
//!
//! # Data Flow
//! ```text
//! configure (std bind, synchronous)
//!     → listener.rs (moved onto the event loop, bounded accept)
//!     → connection.rs (lifecycle tracking)
//!     → router (hello exchange, session registration)
//! ```
//!
//! # Design Decisions
//! - Binding happens before the event loop runs, so bind errors surface
//!   as configuration errors
//! - Inbound and outbound connections share one connection budget

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker, Direction};
pub use listener::{ConnectionPermit, Listener, ListenerError};
