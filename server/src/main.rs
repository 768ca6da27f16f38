use clap::Parser;
use log::{error, info};
use server::cache::{CacheStore, InMemoryCache};
use server::config::{ServerConfig, ZoneConfig};
use server::network::Server;
use server::terrain::ProceduralTerrain;
use std::sync::Arc;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Milliseconds between simulation ticks
    #[clap(long, default_value = "5")]
    tick_ms: u64,
    /// Worker threads used for shard updates
    #[clap(short, long, default_value = "12")]
    threads: usize,
    /// Number of shards to run
    #[clap(long, default_value = "1")]
    shards: u32,
    /// Maximum players per shard
    #[clap(long, default_value = "64")]
    max_players: usize,
    /// Terrain asset loaded into every shard
    #[clap(long, default_value = "training_grounds")]
    zone: String,
    /// Seconds of silence before a client is dropped
    #[clap(long, default_value = "10")]
    timeout_secs: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            listen_address: args.host,
            port: args.port,
            tick_interval: Duration::from_millis(args.tick_ms),
            worker_threads: args.threads,
            shard_count: args.shards.max(1),
            max_players_per_shard: args.max_players,
            client_timeout: Duration::from_secs(args.timeout_secs),
            zone: ZoneConfig {
                asset_name: args.zone,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig::from(args);
    info!(
        "Starting RiftForged server on {} ({} Hz, {} shard(s))",
        config.bind_address(),
        config.tick_rate_hz(),
        config.shard_count
    );

    let terrain = ProceduralTerrain::with_builtin_assets();
    let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());

    let server = match Server::new(config, &terrain, Some(cache)).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Received Ctrl+C, shutting down gracefully...");
    };

    if let Err(e) = server.run(shutdown).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
