//! Live set of connected sessions and broadcast fanout

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Unique per-connection identifier, assigned at accept time and never
/// reused.
pub type SessionId = u64;

/// A message queued to one session's writer task.
///
/// Replies and snapshot frames travel through the same channel so the
/// writer can serialize them; a frame is never interleaved with a reply.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// One reply line (`CONNECTED`, `SUCCESS:...`, `ERROR:...`)
    Line(String),
    /// A full log snapshot, framed on the wire as
    /// `DATA_START` / lines / `DATA_END`
    Snapshot(Arc<Vec<String>>),
}

/// The set of currently registered sessions' outbound channels.
///
/// Safe for concurrent register/unregister/broadcast from any number of
/// session tasks.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, mpsc::UnboundedSender<Outbound>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Add a session's outbound channel to the live set
    pub fn register(&self, id: SessionId, sender: mpsc::UnboundedSender<Outbound>) {
        self.sessions.insert(id, sender);
    }

    /// Remove a session; removing an absent session is a no-op
    pub fn unregister(&self, id: SessionId) {
        self.sessions.remove(&id);
    }

    /// Number of currently registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether the given session is currently registered
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Deliver a snapshot to every registered session.
    ///
    /// A session whose channel is gone (writer task ended, peer lost) is
    /// silently dropped from the set; delivery to the others proceeds.
    pub fn broadcast(&self, lines: Vec<String>) {
        let snapshot = Arc::new(lines);
        let mut dead = Vec::new();
        for entry in self.sessions.iter() {
            if entry
                .value()
                .send(Outbound::Snapshot(Arc::clone(&snapshot)))
                .is_err()
            {
                dead.push(*entry.key());
            }
        }
        // removal deferred past iteration; dashmap shards stay unlocked
        for id in dead {
            debug!("Dropping unreachable session {} from registry", id);
            self.sessions.remove(&id);
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
