//! Established peer sessions.
//!
//! The table is only mutated from logic-thread jobs; the `DashMap` lets
//! other threads read counts without going through the scheduler.

use std::net::SocketAddr;
use std::time::Instant;

use dashmap::DashMap;
use uuid::Uuid;

use crate::net::Direction;
use crate::observability::metrics;

/// A peer that completed the hello exchange.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub peer: SocketAddr,
    pub direction: Direction,
    /// SHA-256 over both hello lines and the peer address.
    pub digest: [u8; 32],
    pub established: Instant,
}

#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: DashMap<Uuid, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) {
        tracing::info!(
            session_id = %session.id,
            peer = %session.peer,
            direction = session.direction.as_str(),
            digest = %hex::encode(&session.digest[..8]),
            "Session established"
        );
        metrics::record_session_opened(session.direction.as_str());
        self.sessions.insert(session.id, session);
        metrics::set_active_sessions(self.sessions.len());
    }

    pub fn remove(&self, id: &Uuid) -> Option<Session> {
        let removed = self.sessions.remove(id).map(|(_, session)| session);
        if let Some(session) = &removed {
            tracing::info!(session_id = %id, peer = %session.peer, "Session closed");
            metrics::set_active_sessions(self.sessions.len());
        }
        removed
    }

    pub fn get(&self, id: &Uuid) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn clear(&self) {
        self.sessions.clear();
        metrics::set_active_sessions(0);
    }
}
