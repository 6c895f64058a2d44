//! Reconnection policy layered above [`ConnectionManager`]
//!
//! The manager itself only ever makes a single connection attempt. This module
//! decides when to try again: exponential backoff with optional jitter and an
//! optional cap on attempts.

use crate::error::{ClientError, Result};
use crate::game::ConnectionStatus;
use crate::network::ConnectionManager;
use log::{info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay, before jitter
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Total connection attempts allowed; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Fraction of the delay randomly added or removed, in `0.0..=1.0`
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_attempts: Some(10),
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// A single attempt, no retries.
    pub fn never() -> Self {
        Self {
            max_attempts: Some(1),
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let millis = self.initial_delay.as_secs_f64() * 1000.0 * factor;
        let capped = millis.min(self.max_delay.as_secs_f64() * 1000.0);
        Duration::from_secs_f64(capped.max(0.0) / 1000.0)
    }

    /// Delay to wait after `failed_attempts` consecutive failures, or `None`
    /// once the attempt budget is spent.
    pub fn delay_for<R: Rng>(&self, failed_attempts: u32, rng: &mut R) -> Option<Duration> {
        if failed_attempts == 0 {
            return Some(Duration::ZERO);
        }
        if let Some(max_attempts) = self.max_attempts {
            if failed_attempts >= max_attempts {
                return None;
            }
        }

        let base = self.base_delay(failed_attempts - 1);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return Some(base);
        }
        let scale = rng.gen_range((1.0 - jitter)..=(1.0 + jitter));
        Some(base.mul_f64(scale))
    }
}

/// Connects `manager` until it succeeds or the policy gives up.
///
/// Stops with [`ClientError::Closed`] as soon as the user disconnects, either
/// before an attempt or during the wait between two attempts.
pub async fn connect_with_retry(
    manager: &ConnectionManager,
    user_id: &str,
    policy: &ReconnectPolicy,
) -> Result<()> {
    let mut state = manager.subscribe();
    let mut failed_attempts = 0u32;

    loop {
        match manager.resume(user_id).await {
            Ok(()) => return Ok(()),
            Err(e @ (ClientError::AlreadyConnected | ClientError::Closed)) => return Err(e),
            Err(e) => {
                failed_attempts += 1;
                let delay = policy.delay_for(failed_attempts, &mut rand::thread_rng());
                match delay {
                    Some(delay) => {
                        warn!(
                            "Connection attempt {} failed: {}; retrying in {:?}",
                            failed_attempts, e, delay
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = state.wait_for(|s| s.status == ConnectionStatus::Closed) => {
                                info!("Connection closed while waiting to retry");
                                return Err(ClientError::Closed);
                            }
                        }
                    }
                    None => {
                        return Err(ClientError::RetriesExhausted {
                            attempts: failed_attempts,
                            last: Box::new(e),
                        })
                    }
                }
            }
        }
    }
}

/// Keeps `manager` connected until [`ConnectionManager::disconnect`] is called.
///
/// After a lost connection the game joined before is joined again. Returns an
/// error only when the policy runs out of attempts.
pub async fn supervise(
    manager: Arc<ConnectionManager>,
    user_id: String,
    policy: ReconnectPolicy,
) -> Result<()> {
    let mut state = manager.subscribe();

    loop {
        match connect_with_retry(&manager, &user_id, &policy).await {
            Ok(()) => {}
            Err(ClientError::Closed) => return Ok(()),
            Err(e) => return Err(e),
        }
        rejoin(&manager).await;

        let status = match state
            .wait_for(|state| {
                matches!(
                    state.status,
                    ConnectionStatus::Disconnected | ConnectionStatus::Closed
                )
            })
            .await
        {
            Ok(state) => state.status,
            Err(_) => return Ok(()),
        };

        if status == ConnectionStatus::Closed {
            return Ok(());
        }
        info!("Connection to {} lost, reconnecting", manager.url());
    }
}

/// Re-sends `join_game` for the game joined before the connection dropped.
///
/// A failure here means the new connection is already gone; the supervisor
/// notices that through the status and reconnects.
async fn rejoin(manager: &ConnectionManager) -> bool {
    let Some(game_id) = manager.state().game_id else {
        return true;
    };
    match manager.join_game(&game_id).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to rejoin game {}: {}", game_id, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::{decode_client_message, ClientMessage};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::{sleep, timeout};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{accept_async, WebSocketStream};

    const WAIT: Duration = Duration::from_secs(3);

    async fn unused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{}/ws", addr)
    }

    async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        accept_async(stream).await.unwrap()
    }

    async fn next_intent(socket: &mut WebSocketStream<TcpStream>) -> ClientMessage {
        loop {
            let frame = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
            if let Message::Text(text) = frame {
                return decode_client_message(&text).unwrap();
            }
        }
    }

    fn fast_retries() -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            max_attempts: None,
            ..ReconnectPolicy::default()
        }
    }

    fn no_jitter() -> ReconnectPolicy {
        ReconnectPolicy {
            jitter: 0.0,
            ..ReconnectPolicy::default()
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = no_jitter();
        assert_eq!(policy.base_delay(0), Duration::from_millis(250));
        assert_eq!(policy.base_delay(1), Duration::from_millis(500));
        assert_eq!(policy.base_delay(2), Duration::from_millis(1000));
        assert_eq!(policy.base_delay(10), Duration::from_secs(10));
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_attempt_budget() {
        let mut rng = StdRng::seed_from_u64(7);
        let policy = ReconnectPolicy {
            max_attempts: Some(3),
            ..no_jitter()
        };

        assert_eq!(policy.delay_for(1, &mut rng), Some(Duration::from_millis(250)));
        assert_eq!(policy.delay_for(2, &mut rng), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(3, &mut rng), None);

        let never = ReconnectPolicy::never();
        assert_eq!(never.delay_for(1, &mut rng), None);
    }

    #[test]
    fn test_unbounded_policy_keeps_retrying() {
        let mut rng = StdRng::seed_from_u64(7);
        let policy = ReconnectPolicy {
            max_attempts: None,
            ..no_jitter()
        };
        assert_eq!(policy.delay_for(1_000, &mut rng), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let policy = ReconnectPolicy {
            max_attempts: None,
            jitter: 0.5,
            ..ReconnectPolicy::default()
        };

        for _ in 0..200 {
            let delay = policy.delay_for(2, &mut rng).unwrap();
            assert!(delay >= Duration::from_millis(250));
            assert!(delay <= Duration::from_millis(750));
        }
    }

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        let manager = ConnectionManager::new(unused_url().await);
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            max_attempts: Some(3),
            ..ReconnectPolicy::default()
        };

        match connect_with_retry(&manager, "user-1", &policy).await {
            Err(ClientError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ClientError::WebSocket(_)));
            }
            other => panic!("Expected retries to be exhausted, got {:?}", other),
        }
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_supervise_stops_after_requested_close() {
        let manager = Arc::new(ConnectionManager::new("ws://127.0.0.1:9/ws"));
        manager.disconnect().await;

        tokio_test::assert_ok!(
            supervise(manager, "user-1".to_string(), ReconnectPolicy::never()).await
        );
    }

    #[tokio::test]
    async fn test_connect_with_retry_after_close_makes_no_attempt() {
        let manager = ConnectionManager::new(unused_url().await);
        manager.disconnect().await;

        let result = connect_with_retry(&manager, "user-1", &fast_retries()).await;
        assert!(matches!(result, Err(ClientError::Closed)));
        assert_eq!(manager.status(), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn test_disconnect_during_backoff_stops_supervisor() {
        let manager = Arc::new(ConnectionManager::new(unused_url().await));
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(50),
            max_attempts: None,
            ..no_jitter()
        };
        let supervisor = tokio::spawn(supervise(
            Arc::clone(&manager),
            "user-1".to_string(),
            policy,
        ));

        sleep(Duration::from_millis(120)).await;
        manager.disconnect().await;
        assert_eq!(manager.status(), ConnectionStatus::Closed);

        let result = timeout(Duration::from_secs(2), supervisor)
            .await
            .expect("supervisor kept retrying after disconnect")
            .unwrap();
        tokio_test::assert_ok!(result);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(manager.status(), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn test_failed_rejoin_is_not_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let manager = ConnectionManager::new(url);

        let (connected, mut socket) =
            tokio::join!(manager.connect("user-1"), accept_ws(&listener));
        connected.unwrap();
        manager.join_game("eu-1").await.unwrap();
        assert!(matches!(
            next_intent(&mut socket).await,
            ClientMessage::Authenticate { .. }
        ));
        drop(socket);

        let mut updates = manager.subscribe();
        timeout(
            WAIT,
            updates.wait_for(|s| s.status == ConnectionStatus::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(!rejoin(&manager).await);
        assert_eq!(manager.state().game_id.as_deref(), Some("eu-1"));
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_supervise_keeps_going_when_a_fresh_connection_drops() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let manager = Arc::new(ConnectionManager::new(format!(
            "ws://{}/ws",
            listener.local_addr().unwrap()
        )));
        let supervisor = tokio::spawn(supervise(
            Arc::clone(&manager),
            "user-1".to_string(),
            fast_retries(),
        ));

        let mut first = accept_ws(&listener).await;
        assert!(matches!(
            next_intent(&mut first).await,
            ClientMessage::Authenticate { .. }
        ));
        let mut updates = manager.subscribe();
        timeout(WAIT, updates.wait_for(|s| s.is_connected()))
            .await
            .unwrap()
            .unwrap();
        manager.join_game("eu-1").await.unwrap();
        assert_eq!(
            next_intent(&mut first).await,
            ClientMessage::JoinGame {
                game_id: "eu-1".to_string()
            }
        );
        drop(first);

        // Gone again right after authenticating, racing the rejoin
        let mut second = accept_ws(&listener).await;
        assert!(matches!(
            next_intent(&mut second).await,
            ClientMessage::Authenticate { .. }
        ));
        drop(second);

        let mut third = accept_ws(&listener).await;
        assert!(matches!(
            next_intent(&mut third).await,
            ClientMessage::Authenticate { .. }
        ));
        assert_eq!(
            next_intent(&mut third).await,
            ClientMessage::JoinGame {
                game_id: "eu-1".to_string()
            }
        );
        assert!(!supervisor.is_finished());

        manager.disconnect().await;
        let result = timeout(WAIT, supervisor).await.unwrap().unwrap();
        tokio_test::assert_ok!(result);
    }
}
