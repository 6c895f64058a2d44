//! # Relay Server Library
//!
//! This library implements the relay half of the snake battle royale
//! synchronization layer. It accepts WebSocket connections, remembers the last
//! state each connection reported, and periodically pushes a snapshot of every
//! player to every connection.
//!
//! ## Core Responsibilities
//!
//! ### Player Registry
//! One entry per open connection, keyed by a server-minted identity. Each
//! inbound state frame replaces the sender's entry wholesale; fields the
//! client left out take fixed defaults rather than their previous values.
//!
//! ### Connection Lifecycle
//! Handshake, admission with a default entry, frame handling, and removal on
//! close. Malformed frames are logged and dropped without closing the
//! connection.
//!
//! ### State Broadcasting
//! A single task serializes one registry snapshot per tick and fans the same
//! payload out to every connection. A connection whose queue is gone is
//! removed; one whose queue is full simply misses that tick.
//!
//! ## Trust Model
//!
//! Clients are trusted. The `userId` sent in `authenticate` is recorded but
//! never verified and does not gate admission, and reported positions, colors
//! and balances are relayed unchecked. Hosting applications that need more must
//! enforce it in front of this server.
//!
//! ## Module Organization
//!
//! - `registry`: the shared `PlayerRegistry`
//! - `client_manager`: roster of open connections and their outbound queues
//! - `broadcast`: the periodic fan-out task
//! - `relay`: lifecycle operations, the registry's only per-connection writer
//! - `network`: TCP/WebSocket listener driving the relay
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind(ServerConfig {
//!         addr: "127.0.0.1:3000".to_string(),
//!         tick_interval: Duration::from_millis(50),
//!         ..ServerConfig::default()
//!     })
//!     .await?;
//!
//!     server.run().await
//! }
//! ```

pub mod broadcast;
pub mod client_manager;
pub mod network;
pub mod registry;
pub mod relay;
