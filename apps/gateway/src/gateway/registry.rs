//! Process-local mapping from authenticated users to live connections.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc::UnboundedSender;

use crate::events::ServerFrame;

/// A live connection's delivery handle.
#[derive(Clone)]
pub struct ConnectionEntry {
    pub conn_id: String,
    pub sender: UnboundedSender<ServerFrame>,
    pub connected_at: DateTime<Utc>,
}

/// In-memory registry of this instance's connections, keyed by user id.
///
/// Entries are mutated only by the local connect/disconnect handlers — never
/// remotely. At most one entry per user: a reconnecting user replaces the
/// previous entry rather than appending. There is no cross-instance registry;
/// the broadcast consumer-group pattern stands in for one.
pub struct ConnectionRegistry {
    inner: DashMap<String, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Register a connection for `user_id`. Last connection wins. Dropping the
    /// replaced entry closes its outbound channel, which ends the old
    /// connection's event loop.
    pub fn insert(&self, user_id: &str, entry: ConnectionEntry) {
        self.inner.insert(user_id.to_string(), entry);
    }

    /// Remove `user_id`'s entry, but only if it still belongs to `conn_id` —
    /// a newer connection for the same user must not be evicted by the old
    /// connection's disconnect handling.
    pub fn remove(&self, user_id: &str, conn_id: &str) {
        self.inner.remove_if(user_id, |_, entry| entry.conn_id == conn_id);
    }

    /// Hand a frame to `user_id`'s live connection, if any. Returns whether a
    /// local channel accepted the frame. A missing entry is the expected
    /// steady state when the user lives on another instance; a closed channel
    /// is treated the same way.
    pub fn send_to(&self, user_id: &str, frame: ServerFrame) -> bool {
        match self.inner.get(user_id) {
            Some(entry) => entry.sender.send(frame).is_ok(),
            None => false,
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.inner.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
