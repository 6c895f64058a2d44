//! Roster of open WebSocket connections
//!
//! This module tracks every connection that completed the handshake:
//! - Identity minting for new connections
//! - The outbound queue the broadcast task writes into
//! - Session metadata declared by the client (user id, requested game)
//! - A watchable count of open connections
//!
//! Nothing declared by a client is verified here. The user id from an
//! `authenticate` message is stored as-is and never gates admission.

use log::info;
use shared::ConnectionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

/// One open connection and what it has told us about itself
#[derive(Debug)]
pub struct Client {
    /// Server-assigned identity, also the registry key
    pub id: ConnectionId,
    /// Remote peer address, for logging
    pub addr: SocketAddr,
    /// When the handshake completed
    pub connected_at: Instant,
    /// Identity declared through `authenticate`, unverified
    pub user_id: Option<String>,
    /// Game requested through `join_game`; there is a single room, so this is informational
    pub game_id: Option<String>,
    /// Queue drained by the connection's writer task
    sender: mpsc::Sender<Message>,
}

impl Client {
    /// Creates a roster entry stamped with the current time and no declared
    /// session metadata
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            user_id: None,
            game_id: None,
            sender,
        }
    }
}

/// Manages all open connections
///
/// Owned behind a lock shared by the connection handlers (add/remove) and
/// the broadcast task (list recipients, drop dead ones).
pub struct ClientManager {
    clients: HashMap<ConnectionId, Client>,
    open: watch::Sender<usize>,
}

impl ClientManager {
    pub fn new() -> Self {
        let (open, _) = watch::channel(0);
        Self {
            clients: HashMap::new(),
            open,
        }
    }

    /// Registers a freshly accepted connection and returns its new identity
    pub fn add_client(&mut self, addr: SocketAddr, sender: mpsc::Sender<Message>) -> ConnectionId {
        let mut id = ConnectionId::new();
        while self.clients.contains_key(&id) {
            id = ConnectionId::new();
        }

        info!("Connection {} opened from {}", id, addr);
        self.clients.insert(id, Client::new(id, addr, sender));
        self.publish_count();
        id
    }

    /// Removes a connection, returning true if it was still registered
    ///
    /// Called both on orderly close and when the broadcast task finds the
    /// connection's queue closed, so a second call is expected and harmless.
    pub fn remove_client(&mut self, id: &ConnectionId) -> bool {
        if let Some(client) = self.clients.remove(id) {
            info!(
                "Connection {} closed after {:.1}s",
                client.id,
                client.connected_at.elapsed().as_secs_f32()
            );
            self.publish_count();
            true
        } else {
            false
        }
    }

    /// Looks up an open connection by its identity
    ///
    /// Returns `None` once the connection has been removed, whether by its
    /// own handler or by the broadcast task.
    pub fn get(&self, id: &ConnectionId) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Records the identity a client declared for itself
    pub fn authenticate(&mut self, id: &ConnectionId, user_id: String) -> bool {
        if let Some(client) = self.clients.get_mut(id) {
            client.user_id = Some(user_id);
            true
        } else {
            false
        }
    }

    /// Records (or clears, with `None`) the game a client asked to be in
    pub fn set_game(&mut self, id: &ConnectionId, game_id: Option<String>) -> bool {
        if let Some(client) = self.clients.get_mut(id) {
            client.game_id = game_id;
            true
        } else {
            false
        }
    }

    /// Outbound queues of every open connection, for one broadcast tick
    ///
    /// The senders are cloned so the roster lock can be released before any
    /// message is queued. A connection closed after this call shows up as a
    /// closed queue when the tick writes to it.
    pub fn senders(&self) -> Vec<(ConnectionId, mpsc::Sender<Message>)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.sender.clone()))
            .collect()
    }

    /// Watch channel carrying the number of open connections
    pub fn subscribe_open(&self) -> watch::Receiver<usize> {
        self.open.subscribe()
    }

    /// Number of open connections
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn publish_count(&self) {
        self.open.send_replace(self.clients.len());
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
