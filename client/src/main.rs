use clap::Parser;
use client::game::ConnectionStatus;
use client::network::ConnectionManager;
use client::reconnect::{supervise, ReconnectPolicy};
use log::{error, info, warn};
use shared::{Direction, Point, StateUpdate};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the relay
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3000/ws")]
    server: String,

    /// Identity announced in `authenticate`
    #[arg(short = 'u', long, default_value = "guest")]
    user_id: String,

    /// Game to join after connecting
    #[arg(short = 'g', long)]
    game: Option<String>,

    /// Snake color sent with every update
    #[arg(short = 'c', long, default_value = "#00aaff")]
    color: String,

    /// Interval between state updates in milliseconds
    #[arg(long, default_value = "100")]
    update_ms: u64,

    /// Connection attempts before giving up (0 retries forever)
    #[arg(long, default_value = "10")]
    max_attempts: u32,
}

/// Snake that walks a circle; stands in for the rendering layer's game loop.
struct Walker {
    angle: f64,
    segments: Vec<Point>,
}

impl Walker {
    const LENGTH: usize = 12;
    const RADIUS: f64 = 200.0;
    const STEP: f64 = 0.05;

    fn new() -> Self {
        Self {
            angle: 0.0,
            segments: Vec::with_capacity(Self::LENGTH),
        }
    }

    fn advance(&mut self) -> Direction {
        self.angle += Self::STEP;
        let head = Point::new(
            Self::RADIUS * self.angle.cos(),
            Self::RADIUS * self.angle.sin(),
        );
        self.segments.insert(0, head);
        self.segments.truncate(Self::LENGTH);
        Direction::Angle(self.angle + std::f64::consts::FRAC_PI_2)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {} as {}", args.server, args.user_id);

    let manager = Arc::new(ConnectionManager::new(args.server.clone()));
    let policy = ReconnectPolicy {
        max_attempts: (args.max_attempts > 0).then_some(args.max_attempts),
        ..ReconnectPolicy::default()
    };

    let supervisor = tokio::spawn(supervise(
        Arc::clone(&manager),
        args.user_id.clone(),
        policy,
    ));

    let mut walker = Walker::new();
    let mut update_interval = interval(Duration::from_millis(args.update_ms.max(1)));
    let mut report_interval = interval(Duration::from_secs(1));
    let mut joined = false;

    loop {
        tokio::select! {
            _ = update_interval.tick() => {
                if manager.status() != ConnectionStatus::Connected {
                    continue;
                }
                if let (false, Some(game)) = (joined, args.game.as_deref()) {
                    match manager.join_game(game).await {
                        Ok(()) => joined = true,
                        Err(e) => warn!("Failed to join {}: {}", game, e),
                    }
                }

                let direction = walker.advance();
                let update = StateUpdate {
                    segments: Some(walker.segments.clone()),
                    color: Some(args.color.clone()),
                    money: None,
                };
                if let Err(e) = manager.send_state(update).await {
                    warn!("Failed to send state: {}", e);
                }
                if let Err(e) = manager.send_move(direction).await {
                    warn!("Failed to send move: {}", e);
                }
            }

            _ = report_interval.tick() => {
                let state = manager.state();
                info!(
                    "{:?}: {} players in last snapshot ({} received)",
                    state.status,
                    state.players.len(),
                    state.snapshots_received
                );
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, disconnecting");
                break;
            }
        }

        if supervisor.is_finished() {
            break;
        }
    }

    manager.disconnect().await;
    match supervisor.await {
        Ok(Err(e)) => error!("Connection supervisor stopped: {}", e),
        Err(e) => error!("Connection supervisor panicked: {}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}
