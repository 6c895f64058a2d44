//! Connection lifecycle: the only code that writes to the player registry
//! on behalf of a connection.
//!
//! A connection is opened with a default entry, every valid state frame
//! replaces that entry, and closing removes it. Frames that fail to parse are
//! reported to the caller and change nothing.

use crate::broadcast::Broadcaster;
use crate::client_manager::ClientManager;
use crate::registry::PlayerRegistry;
use log::{debug, info};
use shared::{decode_client_message, ClientMessage, ConnectionId, PlayerState, ProtocolError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

#[derive(Clone, Default)]
pub struct Relay {
    registry: Arc<PlayerRegistry>,
    clients: Arc<RwLock<ClientManager>>,
}

impl Relay {
    /// Empty registry and roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Player states, one per open connection.
    pub fn registry(&self) -> &Arc<PlayerRegistry> {
        &self.registry
    }

    /// Roster of open connections and their outbound queues.
    pub fn clients(&self) -> &Arc<RwLock<ClientManager>> {
        &self.clients
    }

    /// Broadcast task reading from this relay's registry.
    pub fn broadcaster(&self, period: Duration) -> Broadcaster {
        Broadcaster::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.clients),
            period,
        )
    }

    /// Admits a connection that finished its handshake.
    pub async fn open_connection(
        &self,
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
    ) -> ConnectionId {
        let id = self.clients.write().await.add_client(addr, sender);
        self.registry.upsert(id, PlayerState::new(id)).await;
        id
    }

    /// Applies one inbound text frame from `id`.
    pub async fn handle_frame(&self, id: ConnectionId, text: &str) -> Result<(), ProtocolError> {
        match decode_client_message(text)? {
            ClientMessage::StateUpdate(update) => {
                self.registry.upsert(id, update.into_player_state(id)).await;
            }
            ClientMessage::Authenticate { user_id } => {
                // Declared identity is trusted as-is and does not gate anything.
                info!("Connection {} declared user {}", id, user_id);
                self.clients.write().await.authenticate(&id, user_id);
            }
            ClientMessage::JoinGame { game_id } => {
                debug!("Connection {} asked to join game {}", id, game_id);
                self.clients.write().await.set_game(&id, Some(game_id));
            }
            ClientMessage::LeaveGame => {
                debug!("Connection {} left its game", id);
                self.clients.write().await.set_game(&id, None);
            }
            ClientMessage::Move { direction } => {
                debug!("Connection {} moving {:?}", id, direction);
            }
        }
        Ok(())
    }

    /// Forgets a connection. Safe to call for an id that is already gone.
    pub async fn close_connection(&self, id: ConnectionId) {
        self.clients.write().await.remove_client(&id);
        self.registry.remove(&id).await;
    }
}
