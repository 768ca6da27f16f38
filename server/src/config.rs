//! Runtime configuration consumed by the server library.

use glam::Vec3;
use std::time::Duration;

/// Terrain loaded into every shard at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneConfig {
    pub zone_id: u64,
    pub asset_name: String,
    pub origin: Vec3,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            zone_id: 1,
            asset_name: "training_grounds".to_string(),
            origin: Vec3::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub listen_address: String,
    pub port: u16,
    pub tick_interval: Duration,
    pub worker_threads: usize,
    pub shard_count: u32,
    pub max_players_per_shard: usize,
    pub client_timeout: Duration,
    /// Upper bound on a single tick's delta time, in seconds.
    pub max_delta_secs: f32,
    pub zone: ZoneConfig,
    pub spawn_position: Vec3,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            port: shared::DEFAULT_PORT,
            tick_interval: Duration::from_millis(5),
            worker_threads: 12,
            shard_count: 1,
            max_players_per_shard: 64,
            client_timeout: Duration::from_secs(10),
            max_delta_secs: 0.2,
            zone: ZoneConfig::default(),
            spawn_position: Vec3::new(0.0, 0.0, 1.5),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_address, self.port)
    }

    /// Ticks per second, as reported to joining clients.
    pub fn tick_rate_hz(&self) -> u16 {
        let secs = self.tick_interval.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (1.0 / secs).round().min(u16::MAX as f64) as u16
    }
}
