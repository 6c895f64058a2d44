//! Message protocol shared by the relay server and the client connection manager.
//!
//! Every frame on the wire is a JSON object of the form
//! `{ "type": "...", "payload": { ... } }`. A client frame without a `type`
//! field is treated as a bare full-state update, which is the format older
//! clients send.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_COLOR: &str = "#d55400";
pub const DEFAULT_MONEY: f64 = 1.0;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_PATH: &str = "/ws";
pub const BROADCAST_INTERVAL_MS: u64 = 50;

/// Server-assigned identity of one live WebSocket session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Last state reported by one connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: ConnectionId,
    pub segments: Vec<Point>,
    pub color: String,
    pub money: f64,
}

impl PlayerState {
    /// State of a connection that has not reported anything yet.
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            segments: Vec::new(),
            color: DEFAULT_COLOR.to_string(),
            money: DEFAULT_MONEY,
        }
    }
}

/// Full-state update as sent by a client. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub money: Option<f64>,
}

impl StateUpdate {
    /// Builds the replacement entry for `id`.
    ///
    /// Absent fields take the fixed defaults. Nothing is inherited from the
    /// entry being replaced.
    pub fn into_player_state(self, id: ConnectionId) -> PlayerState {
        PlayerState {
            id,
            segments: self.segments.unwrap_or_default(),
            color: self.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            money: self.money.unwrap_or(DEFAULT_MONEY),
        }
    }
}

/// Movement intent. Clients send a heading in radians, a vector, or a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Direction {
    Angle(f64),
    Vector(Point),
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Authenticate { user_id: String },
    JoinGame { game_id: String },
    Move { direction: Direction },
    LeaveGame,
    StateUpdate(StateUpdate),
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Authenticate { .. } => "authenticate",
            ClientMessage::JoinGame { .. } => "join_game",
            ClientMessage::Move { .. } => "move",
            ClientMessage::LeaveGame => "leave_game",
            ClientMessage::StateUpdate(_) => "state_update",
        }
    }
}

/// Messages pushed by the server. The relay only ever emits `Players`; the
/// other two are accepted by clients as alternative snapshot carriers.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Players(Vec<PlayerState>),
    GameState(Vec<PlayerState>),
    GameUpdate(Vec<PlayerState>),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Players(_) => "players",
            ServerMessage::GameState(_) => "game_state",
            ServerMessage::GameUpdate(_) => "game_update",
        }
    }

    pub fn players(&self) -> &[PlayerState] {
        match self {
            ServerMessage::Players(players)
            | ServerMessage::GameState(players)
            | ServerMessage::GameUpdate(players) => players,
        }
    }

    pub fn into_players(self) -> Vec<PlayerState> {
        match self {
            ServerMessage::Players(players)
            | ServerMessage::GameState(players)
            | ServerMessage::GameUpdate(players) => players,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("message `type` is not a string")]
    InvalidType,
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("invalid `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Wire envelope shared by both directions.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    payload: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticatePayload {
    user_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinGamePayload {
    game_id: String,
}

#[derive(Deserialize)]
struct MovePayload {
    direction: Direction,
}

#[derive(Deserialize)]
struct SnapshotPayload {
    players: Vec<PlayerState>,
}

fn encode_envelope(kind: &str, payload: Value) -> Result<String, ProtocolError> {
    let envelope = Envelope {
        kind: kind.to_string(),
        payload,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Splits a frame into its `type` and payload. `Ok(None)` means the object
/// carried no `type` at all.
fn split_envelope(text: &str) -> Result<(Option<String>, Value), ProtocolError> {
    let Value::Object(mut fields) = serde_json::from_str::<Value>(text)? else {
        return Err(ProtocolError::NotAnObject);
    };

    match fields.remove("type") {
        Some(Value::String(kind)) => {
            let payload = match fields.remove("payload") {
                None | Some(Value::Null) => Value::Object(Map::new()),
                Some(payload) => payload,
            };
            Ok((Some(kind), payload))
        }
        Some(_) => Err(ProtocolError::InvalidType),
        None => Ok((None, Value::Object(fields))),
    }
}

fn from_payload<T: DeserializeOwned>(kind: &str, payload: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::Payload {
        kind: kind.to_string(),
        source,
    })
}

/// Serializes a client intent into one `{type, payload}` text frame.
///
/// State updates are always sent in the typed `state_update` form; absent
/// fields are left out of the payload.
pub fn encode_client_message(message: &ClientMessage) -> Result<String, ProtocolError> {
    let payload = match message {
        ClientMessage::Authenticate { user_id } => json!({ "userId": user_id }),
        ClientMessage::JoinGame { game_id } => json!({ "gameId": game_id }),
        ClientMessage::Move { direction } => json!({ "direction": direction }),
        ClientMessage::LeaveGame => Value::Object(Map::new()),
        ClientMessage::StateUpdate(update) => serde_json::to_value(update)?,
    };
    encode_envelope(message.kind(), payload)
}

/// Parses one text frame received from a client.
///
/// An object without a `type` is read as a bare state update. Anything that
/// is not a JSON object, carries an unknown or non-string `type`, or has an
/// ill-typed payload is rejected with a [`ProtocolError`].
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let (kind, payload) = split_envelope(text)?;
    let Some(kind) = kind else {
        return Ok(ClientMessage::StateUpdate(from_payload(
            "state_update",
            payload,
        )?));
    };

    let message = match kind.as_str() {
        "authenticate" => {
            let AuthenticatePayload { user_id } = from_payload(&kind, payload)?;
            ClientMessage::Authenticate { user_id }
        }
        "join_game" => {
            let JoinGamePayload { game_id } = from_payload(&kind, payload)?;
            ClientMessage::JoinGame { game_id }
        }
        "move" => {
            let MovePayload { direction } = from_payload(&kind, payload)?;
            ClientMessage::Move { direction }
        }
        "leave_game" => ClientMessage::LeaveGame,
        "state_update" => ClientMessage::StateUpdate(from_payload(&kind, payload)?),
        _ => return Err(ProtocolError::UnknownType(kind)),
    };
    Ok(message)
}

/// Serializes a snapshot message as `{type, payload: {players}}`.
pub fn encode_server_message(message: &ServerMessage) -> Result<String, ProtocolError> {
    let payload = json!({ "players": message.players() });
    encode_envelope(message.kind(), payload)
}

/// Parses one text frame received from the server.
///
/// Only the three snapshot-carrying types are understood; every other type,
/// including a missing one, is [`ProtocolError::UnknownType`] so callers can
/// log and skip it.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, ProtocolError> {
    let (kind, payload) = split_envelope(text)?;
    let Some(kind) = kind else {
        return Err(ProtocolError::UnknownType(String::new()));
    };

    let message = match kind.as_str() {
        "players" => ServerMessage::Players(from_payload::<SnapshotPayload>(&kind, payload)?.players),
        "game_state" => {
            ServerMessage::GameState(from_payload::<SnapshotPayload>(&kind, payload)?.players)
        }
        "game_update" => {
            ServerMessage::GameUpdate(from_payload::<SnapshotPayload>(&kind, payload)?.players)
        }
        _ => return Err(ProtocolError::UnknownType(kind)),
    };
    Ok(message)
}
