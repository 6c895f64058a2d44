use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Request path of the WebSocket endpoint
    #[arg(long, default_value = shared::DEFAULT_PATH)]
    path: String,

    /// Snapshot broadcast period in milliseconds
    #[arg(short, long, default_value_t = shared::BROADCAST_INTERVAL_MS)]
    tick_ms: u64,

    /// Outbound queue length per connection
    #[arg(long, default_value_t = 64)]
    outbound_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        path: args.path,
        tick_interval: Duration::from_millis(args.tick_ms.max(1)),
        outbound_capacity: args.outbound_capacity,
    };
    info!(
        "Starting relay on {} (broadcast every {:?})",
        config.addr, config.tick_interval
    );

    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
