//! Periodic fan-out of the registry to every open connection

use crate::client_manager::ClientManager;
use crate::registry::PlayerRegistry;
use log::{debug, error, warn};
use shared::{encode_server_message, ConnectionId, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

/// Outcome of one broadcast tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub recipients: usize,
    pub delivered: usize,
    /// Recipients whose queue was full; they miss this snapshot only
    pub lagging: usize,
    /// Recipients whose queue was closed; dropped from roster and registry
    pub closed: Vec<ConnectionId>,
}

pub struct Broadcaster {
    registry: Arc<PlayerRegistry>,
    clients: Arc<RwLock<ClientManager>>,
    period: Duration,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<PlayerRegistry>,
        clients: Arc<RwLock<ClientManager>>,
        period: Duration,
    ) -> Self {
        Self {
            registry,
            clients,
            period,
        }
    }

    /// Sends one snapshot to every open connection.
    ///
    /// The snapshot is serialized once and the same text goes to everyone.
    /// A failed send never stops delivery to the remaining recipients.
    pub async fn tick(&self) -> TickReport {
        let recipients = self.recipients().await;
        self.fan_out(recipients).await
    }

    async fn recipients(&self) -> Vec<(ConnectionId, mpsc::Sender<Message>)> {
        self.clients.read().await.senders()
    }

    /// Delivers one snapshot to `recipients`, which may include connections
    /// closed since they were listed.
    async fn fan_out(
        &self,
        recipients: Vec<(ConnectionId, mpsc::Sender<Message>)>,
    ) -> TickReport {
        let mut report = TickReport {
            recipients: recipients.len(),
            ..TickReport::default()
        };
        if recipients.is_empty() {
            return report;
        }

        let players = self.registry.snapshot().await;
        let payload = match encode_server_message(&ServerMessage::Players(players)) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize snapshot: {}", e);
                return report;
            }
        };

        for (id, sender) in recipients {
            match sender.try_send(Message::Text(payload.clone())) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue full for {}, skipping snapshot", id);
                    report.lagging += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Connection {} already gone, scheduling cleanup", id);
                    report.closed.push(id);
                }
            }
        }

        if !report.closed.is_empty() {
            let mut clients = self.clients.write().await;
            for id in &report.closed {
                clients.remove_client(id);
            }
            drop(clients);
            for id in &report.closed {
                self.registry.remove(id).await;
            }
        }

        report
    }

    /// Runs ticks forever at the configured period.
    ///
    /// While no connection is open the task parks on the open-connection
    /// count instead of ticking.
    pub async fn run(self) {
        let mut open = self.clients.read().await.subscribe_open();
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let idle = *open.borrow_and_update() == 0;
            if idle {
                debug!("No open connections, broadcast suspended");
                let resumed = open.wait_for(|count| *count > 0).await.is_ok();
                if !resumed {
                    debug!("Connection roster dropped, broadcast stopped");
                    return;
                }
                debug!("Broadcast resumed");
                ticker.reset();
            }

            ticker.tick().await;
            let report = self.tick().await;
            if report.lagging > 0 || !report.closed.is_empty() {
                debug!(
                    "Tick: {} recipients, {} delivered, {} lagging, {} closed",
                    report.recipients,
                    report.delivered,
                    report.lagging,
                    report.closed.len()
                );
            }
        }
    }
}
