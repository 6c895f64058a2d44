//! # Game Client Library
//!
//! This library is the client half of the snake battle royale synchronization
//! layer. It owns the WebSocket to the relay, turns local intents into protocol
//! messages, and publishes the latest snapshot for the rendering layer.
//!
//! ## Architecture Overview
//!
//! ### Connection Manager
//! [`network::ConnectionManager`] opens one socket per user and sends
//! `authenticate` as soon as it is open. It does not wait for an
//! acknowledgment: the relay never sends one. Intents (`move`, `join_game`,
//! `leave_game`, full-state updates) are queued to a background task that owns
//! the socket.
//!
//! ### Reconciliation
//! Inbound `players`, `game_state` and `game_update` messages all carry a
//! player list and replace the local snapshot wholesale. There is no merging
//! or interpolation at this layer. Other message types are logged and ignored.
//!
//! ### Reconnection
//! The manager never retries on its own. [`reconnect`] holds a separate
//! backoff policy and a supervisor that re-establishes lost connections.
//!
//! ## Module Organization
//!
//! - `error`: [`error::ClientError`]
//! - `game`: [`game::ClientGameState`] and connection status
//! - `network`: the connection manager
//! - `reconnect`: backoff policy and supervisor
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::ConnectionManager;
//! use shared::{Direction, Point, StateUpdate};
//!
//! # async fn demo() -> client::error::Result<()> {
//! let manager = ConnectionManager::new("ws://127.0.0.1:3000/ws");
//! manager.connect("user-123").await?;
//! manager.join_game("eu-1").await?;
//!
//! manager
//!     .send_state(StateUpdate {
//!         segments: Some(vec![Point::new(10.0, 10.0)]),
//!         color: Some("#00aaff".to_string()),
//!         money: None,
//!     })
//!     .await?;
//! manager.send_move(Direction::Angle(0.0)).await?;
//!
//! let mut updates = manager.subscribe();
//! updates.changed().await.ok();
//! println!("{} players on the field", updates.borrow().players.len());
//!
//! manager.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod game;
pub mod network;
pub mod reconnect;
