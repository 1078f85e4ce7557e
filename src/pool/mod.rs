//! Thread pools.
//!
//! # Data Flow
//! ```text
//! submit(job)
//!     → shared queue (mutex + condvar)
//!     → N named worker threads            (Threading::Multi)
//!     → pump() on the logic thread        (Threading::Single)
//! ```
//!
//! # Design Decisions
//! - Stop only closes the queue; queued jobs still drain before join returns
//! - Join has no timeout: a hung job blocks shutdown
//! - A panicking job is logged and never takes its worker down

pub mod worker;

pub use worker::WorkerPool;

/// Environment variable selecting cooperative single-threaded mode.
pub const SINGLE_THREAD_ENV: &str = "OVERLAYD_SINGLE_THREAD";

/// Concurrency model for every pool and scheduler in a daemon run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Threading {
    /// Real OS threads per pool.
    #[default]
    Multi,
    /// All queued work runs cooperatively on the calling thread.
    Single,
}

impl Threading {
    /// `Single` when `OVERLAYD_SINGLE_THREAD=1`, `Multi` otherwise.
    pub fn from_env() -> Self {
        match std::env::var(SINGLE_THREAD_ENV) {
            Ok(value) if value == "1" => Threading::Single,
            _ => Threading::Multi,
        }
    }

    pub fn is_cooperative(self) -> bool {
        self == Threading::Single
    }
}
