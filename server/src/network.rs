//! WebSocket listener and per-connection socket handling

use crate::relay::Relay;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ConnectionId, BROADCAST_INTERVAL_MS, DEFAULT_PATH, DEFAULT_PORT};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

/// Listener settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind, `host:port`
    pub addr: String,
    /// Request path the WebSocket endpoint is served on
    pub path: String,
    /// Period of the snapshot broadcast
    pub tick_interval: Duration,
    /// Per-connection outbound queue length; a full queue skips snapshots
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            path: DEFAULT_PATH.to_string(),
            tick_interval: Duration::from_millis(BROADCAST_INTERVAL_MS),
            outbound_capacity: 64,
        }
    }
}

/// Relay server: accept loop plus the broadcast task
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    relay: Relay,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.addr).await?;
        info!(
            "Server listening on ws://{}{}",
            listener.local_addr()?,
            config.path
        );

        Ok(Server {
            listener,
            config,
            relay: Relay::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the relay state, shared with every connection task
    pub fn relay(&self) -> Relay {
        self.relay.clone()
    }

    /// Accepts connections until the listener fails for good.
    ///
    /// Individual accept errors are logged and retried; they only affect the
    /// socket that caused them.
    pub async fn run(self) -> std::io::Result<()> {
        tokio::spawn(self.relay.broadcaster(self.config.tick_interval).run());

        let path: Arc<str> = Arc::from(self.config.path.as_str());
        info!("Server started successfully");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let relay = self.relay.clone();
                    let path = Arc::clone(&path);
                    let capacity = self.config.outbound_capacity.max(1);
                    tokio::spawn(async move {
                        handle_connection(stream, addr, relay, path, capacity).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }
}

/// Drives one socket from handshake to close.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    relay: Relay,
    path: Arc<str>,
    capacity: usize,
) {
    let check_path = move |request: &Request, response: Response| {
        if request.uri().path() == &*path {
            Ok(response)
        } else {
            let mut rejection =
                ErrorResponse::new(Some(format!("no endpoint at {}", request.uri().path())));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    };

    let ws_stream = match accept_hdr_async(stream, check_path).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            debug!("Handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel(capacity);
    let id = relay.open_connection(addr, outbound_tx).await;

    loop {
        tokio::select! {
            inbound = ws_receiver.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        apply_frame(&relay, id, &text).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => apply_frame(&relay, id, text).await,
                        Err(_) => warn!("Discarding non-UTF-8 binary frame from {}", id),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Connection {} closed by peer", id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Connection {} failed: {}", id, e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(message) => {
                        if let Err(e) = ws_sender.send(message).await {
                            debug!("Failed to send to {}: {}", id, e);
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    relay.close_connection(id).await;
}

async fn apply_frame(relay: &Relay, id: ConnectionId, text: &str) {
    if let Err(e) = relay.handle_frame(id, text).await {
        warn!("Discarding message from {}: {}", id, e);
    }
}
