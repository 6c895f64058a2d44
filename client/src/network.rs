//! Client connection manager: one WebSocket per user, intents out, snapshots in

use crate::error::{ClientError, Result};
use crate::game::{ClientGameState, ConnectionStatus};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::{
    decode_server_message, encode_client_message, ClientMessage, Direction, ProtocolError,
    StateUpdate,
};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Outgoing {
    Text(String),
    Close,
}

struct ActiveConnection {
    outbound: mpsc::UnboundedSender<Outgoing>,
    task: JoinHandle<()>,
}

/// Owns the socket for one user and publishes what the server reports.
///
/// The manager never reconnects on its own; see [`crate::reconnect`] for a
/// policy layered on top of it.
pub struct ConnectionManager {
    url: String,
    active: Mutex<Option<ActiveConnection>>,
    state: Arc<watch::Sender<ClientGameState>>,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ClientGameState::new());
        Self {
            url: url.into(),
            active: Mutex::new(None),
            state: Arc::new(state),
        }
    }

    /// Relay endpoint this manager connects to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Receiver that observes every status change and every applied snapshot
    pub fn subscribe(&self) -> watch::Receiver<ClientGameState> {
        self.state.subscribe()
    }

    /// Copy of the current connection state and latest snapshot
    pub fn state(&self) -> ClientGameState {
        self.state.borrow().clone()
    }

    /// Current connection status, without cloning the snapshot
    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    /// Opens the socket and sends `authenticate` straight away.
    ///
    /// The connection counts as ready as soon as that frame is written; the
    /// server does not acknowledge it. An explicit call always tries, even
    /// after [`disconnect`](Self::disconnect).
    pub async fn connect(&self, user_id: &str) -> Result<()> {
        self.open(user_id, false).await
    }

    /// Like [`connect`](Self::connect), but gives up with
    /// [`ClientError::Closed`] once the user has disconnected.
    ///
    /// The check happens under the same lock `disconnect` takes, so a close
    /// requested while a retry is pending is never overwritten.
    pub(crate) async fn resume(&self, user_id: &str) -> Result<()> {
        self.open(user_id, true).await
    }

    async fn open(&self, user_id: &str, honour_close: bool) -> Result<()> {
        let mut active = self.active.lock().await;
        if honour_close && self.status() == ConnectionStatus::Closed {
            return Err(ClientError::Closed);
        }
        if let Some(connection) = active.as_ref() {
            if !connection.task.is_finished() {
                return Err(ClientError::AlreadyConnected);
            }
        }

        let authenticate = encode_client_message(&ClientMessage::Authenticate {
            user_id: user_id.to_string(),
        })?;

        self.state.send_modify(|state| {
            state.status = ConnectionStatus::Connecting;
            state.user_id = Some(user_id.to_string());
        });
        info!("Connecting to {} as {}", self.url, user_id);

        let ws_stream = match connect_async(self.url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                self.set_status(ConnectionStatus::Disconnected);
                return Err(e.into());
            }
        };

        let (mut ws_sender, ws_receiver) = ws_stream.split();
        if let Err(e) = ws_sender.send(Message::Text(authenticate)).await {
            self.set_status(ConnectionStatus::Disconnected);
            return Err(e.into());
        }

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        self.set_status(ConnectionStatus::Connected);
        let task = tokio::spawn(run_connection(
            ws_sender,
            ws_receiver,
            outbound_rx,
            Arc::clone(&self.state),
        ));

        *active = Some(ActiveConnection { outbound, task });
        info!("Connected to {}", self.url);
        Ok(())
    }

    /// Declares a movement intent. The relay logs it; it does not move the
    /// snake on its own.
    pub async fn send_move(&self, direction: Direction) -> Result<()> {
        self.send(ClientMessage::Move { direction }).await
    }

    /// Asks to join `game_id` and remembers it for rejoining after a
    /// reconnect.
    ///
    /// The game is only recorded locally once the request was queued.
    pub async fn join_game(&self, game_id: &str) -> Result<()> {
        self.send(ClientMessage::JoinGame {
            game_id: game_id.to_string(),
        })
        .await?;
        self.state
            .send_modify(|state| state.game_id = Some(game_id.to_string()));
        Ok(())
    }

    /// Leaves the current game and forgets it, so a reconnect will not
    /// rejoin it.
    pub async fn leave_game(&self) -> Result<()> {
        self.send(ClientMessage::LeaveGame).await?;
        self.state.send_modify(|state| state.game_id = None);
        Ok(())
    }

    /// Sends a full-state update that replaces this player's server entry.
    pub async fn send_state(&self, update: StateUpdate) -> Result<()> {
        self.send(ClientMessage::StateUpdate(update)).await
    }

    /// Closes the socket and waits for the connection task to finish.
    ///
    /// The `Closed` status is set while holding the connection lock, which
    /// also stops any supervisor retrying in the background.
    pub async fn disconnect(&self) {
        let active = {
            let mut active = self.active.lock().await;
            self.set_status(ConnectionStatus::Closed);
            active.take()
        };

        if let Some(connection) = active {
            let _ = connection.outbound.send(Outgoing::Close);
            if let Err(e) = connection.task.await {
                warn!("Connection task ended abnormally: {}", e);
            }
            info!("Disconnected from {}", self.url);
        }
    }

    async fn send(&self, message: ClientMessage) -> Result<()> {
        let text = encode_client_message(&message)?;
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(connection) if self.status() == ConnectionStatus::Connected => connection
                .outbound
                .send(Outgoing::Text(text))
                .map_err(|_| ClientError::NotConnected),
            _ => Err(ClientError::NotConnected),
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.state.send_modify(|state| state.status = status);
    }
}

async fn run_connection(
    mut ws_sender: SplitSink<WsStream, Message>,
    mut ws_receiver: SplitStream<WsStream>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outgoing>,
    state: Arc<watch::Sender<ClientGameState>>,
) {
    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(Outgoing::Text(text)) => {
                        if let Err(e) = ws_sender.send(Message::Text(text)).await {
                            warn!("Failed to send message: {}", e);
                            break;
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            inbound = ws_receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => handle_server_frame(&state, &text),
                    Some(Ok(Message::Close(frame))) => {
                        info!("Server closed the connection: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Connection error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // A requested close has already moved the status to Closed.
    state.send_if_modified(|state| {
        if state.status == ConnectionStatus::Connected {
            state.status = ConnectionStatus::Disconnected;
            true
        } else {
            false
        }
    });
}

/// Applies one inbound frame to the published state.
///
/// Snapshot-carrying messages replace the held snapshot. Anything else is
/// logged and dropped without affecting later frames.
pub(crate) fn handle_server_frame(state: &watch::Sender<ClientGameState>, text: &str) {
    match decode_server_message(text) {
        Ok(message) => state.send_modify(|state| state.apply_server_message(message)),
        Err(ProtocolError::UnknownType(kind)) => {
            debug!("Ignoring server message of type `{}`", kind);
        }
        Err(e) => warn!("Failed to parse server message: {}", e),
    }
}
