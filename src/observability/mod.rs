//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Every subsystem produces:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges via the `metrics` facade)
//! ```
//!
//! # Design Decisions
//! - Lifecycle transitions are always logged, at info or debug
//! - Metrics are cheap no-ops until the embedding process installs a recorder

pub mod logging;
pub mod metrics;
