//! Resilience helpers for outbound dials.
//!
//! # Design Decisions
//! - Failed dials retry with exponential backoff plus jitter
//! - Attempts are bounded; a peer that never answers is given up on

pub mod backoff;

pub use backoff::{calculate_backoff, DialPolicy};
