//! Authoritative store of the last state reported by each open connection.
//!
//! The registry is shared between connection handlers (writers) and the
//! broadcast task (reader). Each entry is replaced with a single insert under
//! the write lock, so a snapshot never sees a half-written state.

use log::debug;
use shared::{ConnectionId, PlayerState};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: RwLock<HashMap<ConnectionId, PlayerState>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self {
            players: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the entry for `id` wholesale.
    ///
    /// The stored state always carries `id`, whatever id the caller put in it.
    pub async fn upsert(&self, id: ConnectionId, mut state: PlayerState) {
        state.id = id;
        let mut players = self.players.write().await;
        players.insert(id, state);
    }

    /// Deletes the entry for `id`, returning it if it was present.
    pub async fn remove(&self, id: &ConnectionId) -> Option<PlayerState> {
        let removed = self.players.write().await.remove(id);
        if removed.is_some() {
            debug!("Removed registry entry {}", id);
        }
        removed
    }

    /// Owned copy of every entry. Order is unspecified.
    pub async fn snapshot(&self) -> Vec<PlayerState> {
        self.players.read().await.values().cloned().collect()
    }

    /// Current state of one connection, if it is still registered.
    pub async fn get(&self, id: &ConnectionId) -> Option<PlayerState> {
        self.players.read().await.get(id).cloned()
    }

    /// Number of registered connections.
    ///
    /// Matches the number of players the next snapshot would carry.
    pub async fn len(&self) -> usize {
        self.players.read().await.len()
    }

    /// True when no connection has an entry.
    pub async fn is_empty(&self) -> bool {
        self.players.read().await.is_empty()
    }
}
