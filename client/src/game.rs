//! Client-side view of the game as last reported by the server

use shared::{ConnectionId, PlayerState, ServerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No connection, and none was closed on request (never connected, or lost)
    Disconnected,
    Connecting,
    /// Socket open and `authenticate` sent; no acknowledgment is awaited
    Connected,
    /// Closed through `disconnect`
    Closed,
}

/// Which message type carried the snapshot currently held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Players,
    GameState,
    GameUpdate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientGameState {
    pub status: ConnectionStatus,
    /// Identity declared on the current or last connection
    pub user_id: Option<String>,
    /// Game last requested through `join_game`
    pub game_id: Option<String>,
    /// Latest snapshot, replaced wholesale on every update
    pub players: Vec<PlayerState>,
    pub source: Option<SnapshotSource>,
    pub snapshots_received: u64,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            user_id: None,
            game_id: None,
            players: Vec::new(),
            source: None,
            snapshots_received: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Replaces the held snapshot with the one carried by `message`.
    pub fn apply_server_message(&mut self, message: ServerMessage) {
        let source = match &message {
            ServerMessage::Players(_) => SnapshotSource::Players,
            ServerMessage::GameState(_) => SnapshotSource::GameState,
            ServerMessage::GameUpdate(_) => SnapshotSource::GameUpdate,
        };
        self.players = message.into_players();
        self.source = Some(source);
        self.snapshots_received += 1;
    }

    pub fn player(&self, id: &ConnectionId) -> Option<&PlayerState> {
        self.players.iter().find(|player| &player.id == id)
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}
