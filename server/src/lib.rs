//! # RiftForged Server Library
//!
//! Authoritative simulation for RiftForged. Clients send intents over UDP; the
//! server resolves them against its own world state and broadcasts the results.
//!
//! ## Architecture
//!
//! ### Shards
//! A [`shard::Shard`] is an isolated world instance. It owns its players, its
//! physics world and its event bus, and is only ever mutated inside its own
//! `update`. Other threads reach it by pushing [`commands::GameCommand`]s onto its
//! command queue.
//!
//! ### Tick
//! A dedicated simulation thread drives the [`orchestrator::Orchestrator`] at a
//! fixed rate. Each tick it routes inbound packets, admits joins, processes
//! disconnects, and then updates every shard in parallel on the
//! [`worker_pool::WorkerPool`].
//!
//! ### Dispatch
//! Inbound packets pass through the [`dispatch`] pipeline: the sender is resolved
//! to a player, the packet becomes a command, and a handler registered for that
//! command kind either answers directly (ping), defers to the tick (join), or
//! queues the command on the player's shard.
//!
//! ### Events
//! Gameplay resolution in [`gameplay`] returns outcome values. Shards turn those into
//! [`events`] on their [`event_bus::EventBus`]; formatters subscribed there build
//! outbound packets and queue cache writes.
//!
//! ## Module Organization
//!
//! - `network`: UDP receive/send tasks, client timeouts, and the simulation thread
//! - `orchestrator`: shard ownership, joins and disconnects
//! - `dispatch`: packet → command → handler, and event → packet formatters
//! - `shard`: per-world tick and command handling
//! - `gameplay`: movement, rift step and combat resolution
//! - `player`, `player_manager`: authoritative player state
//! - `physics`, `terrain`: collision world and zone geometry
//! - `session`, `cache`, `queue`, `worker_pool`: shared infrastructure
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::terrain::ProceduralTerrain;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), server::error::ServerError> {
//!     let terrain = ProceduralTerrain::with_builtin_assets();
//!     let server = Server::new(ServerConfig::default(), &terrain, None).await?;
//!
//!     server
//!         .run(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod cache;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod gameplay;
pub mod math;
pub mod network;
pub mod orchestrator;
pub mod physics;
pub mod player;
pub mod player_manager;
pub mod queue;
pub mod session;
pub mod shard;
pub mod terrain;
pub mod worker_pool;
