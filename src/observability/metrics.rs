//! Daemon metrics.
//!
//! # Metrics
//! - `overlayd_jobs_submitted_total` (counter): jobs queued, by pool
//! - `overlayd_jobs_rejected_total` (counter): jobs refused after stop, by pool
//! - `overlayd_sessions_active` (gauge): registered peer sessions
//! - `overlayd_sessions_total` (counter): sessions established, by direction
//! - `overlayd_teardown_steps_total` (counter): teardown steps applied, by step
//!
//! No exporter is installed here.

use metrics::{counter, gauge};

pub fn record_job_submitted(pool: &str) {
    counter!("overlayd_jobs_submitted_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_job_rejected(pool: &str) {
    counter!("overlayd_jobs_rejected_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_session_opened(direction: &'static str) {
    counter!("overlayd_sessions_total", "direction" => direction).increment(1);
}

pub fn set_active_sessions(count: usize) {
    gauge!("overlayd_sessions_active").set(count as f64);
}

pub fn record_teardown_step(step: &'static str) {
    counter!("overlayd_teardown_steps_total", "step" => step).increment(1);
}
