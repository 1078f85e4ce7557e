//! Connection lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count live connections per direction

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Only uniqueness matters here, so relaxed ordering is enough.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Counts live connections. Cheap to clone; clones share counters.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inbound: Arc<AtomicU64>,
    outbound: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. The guard decrements on drop.
    pub fn track(&self, direction: Direction) -> ConnectionGuard {
        let counter = match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(counter),
            id: ConnectionId::new(),
            direction,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.inbound.load(Ordering::SeqCst) + self.outbound.load(Ordering::SeqCst)
    }

    pub fn count(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Inbound => self.inbound.load(Ordering::SeqCst),
            Direction::Outbound => self.outbound.load(Ordering::SeqCst),
        }
    }
}

/// Tracks one connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
    direction: Direction,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, direction = self.direction.as_str(), "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn tracker_counts_per_direction() {
        let tracker = ConnectionTracker::new();
        let inbound = tracker.track(Direction::Inbound);
        let outbound = tracker.track(Direction::Outbound);
        let shared = tracker.clone();

        assert_eq!(shared.active_count(), 2);
        assert_eq!(shared.count(Direction::Inbound), 1);

        drop(inbound);
        assert_eq!(tracker.count(Direction::Inbound), 0);
        assert_eq!(tracker.count(Direction::Outbound), 1);

        drop(outbound);
        assert_eq!(tracker.active_count(), 0);
    }
}
