//! Owns every shard plus the process-wide session table, and drives them each tick.
//!
//! Packets arrive from the network layer already decoded. They are routed through
//! the [`PacketProcessor`]: shard-bound commands land in shard queues, pings are
//! answered at once, and joins and disconnects are queued here because only the tick
//! thread may touch a shard's players.

use crate::cache::CacheReplicator;
use crate::commands::{CommandKind, PlayerId};
use crate::config::ServerConfig;
use crate::dispatch::handlers::LatencyStats;
use crate::dispatch::{
    install_formatters, FormatterContext, JoinRequestHandler, JoinTicket, MessageDispatcher,
    PacketProcessor, PingHandler, ShardCommandHandler, ShardRouter,
};
use crate::error::{JoinError, ServerError};
use crate::gameplay::GameplayEngine;
use crate::network::GameMessage;
use crate::physics::{PhysicsWorld, SimplePhysics};
use crate::queue::SwapQueue;
use crate::session::{SessionRegistry, ShardId};
use crate::shard::{Shard, TickSummary};
use crate::terrain::TerrainSource;
use crate::worker_pool::WorkerPool;
use glam::Quat;
use log::{debug, error, info, warn};
use rayon::prelude::*;
use shared::Packet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

pub const WELCOME_MESSAGE: &str = "Welcome to RiftForged!";

pub struct Orchestrator {
    config: ServerConfig,
    shards: Vec<Shard>,
    sessions: Arc<SessionRegistry>,
    joins: Arc<SwapQueue<JoinTicket>>,
    disconnects: Arc<SwapQueue<SocketAddr>>,
    processor: PacketProcessor,
    outbound: mpsc::UnboundedSender<GameMessage>,
    pool: Arc<WorkerPool>,
    latency: Arc<LatencyStats>,
    ticks: u64,
}

impl Orchestrator {
    /// Builds shards backed by [`SimplePhysics`].
    pub fn new(
        config: ServerConfig,
        terrain: &dyn TerrainSource,
        cache: Option<CacheReplicator>,
        outbound: mpsc::UnboundedSender<GameMessage>,
    ) -> Result<Self, ServerError> {
        Self::with_physics(config, terrain, cache, outbound, |_| {
            Box::new(SimplePhysics::new())
        })
    }

    /// Builds `config.shard_count` shards, each with a physics world from
    /// `make_physics` and the configured zone loaded.
    pub fn with_physics<F>(
        config: ServerConfig,
        terrain: &dyn TerrainSource,
        cache: Option<CacheReplicator>,
        outbound: mpsc::UnboundedSender<GameMessage>,
        make_physics: F,
    ) -> Result<Self, ServerError>
    where
        F: Fn(ShardId) -> Box<dyn PhysicsWorld>,
    {
        let pool = Arc::new(WorkerPool::new(config.worker_threads)?);
        let sessions = Arc::new(SessionRegistry::new());
        let joins = Arc::new(SwapQueue::new());
        let disconnects = Arc::new(SwapQueue::new());
        let latency = Arc::new(LatencyStats::default());

        let mut shards = Vec::with_capacity(config.shard_count as usize);
        let mut router = ShardRouter::new(Arc::clone(&sessions));
        for shard_id in 0..config.shard_count {
            let mut shard = Shard::new(
                shard_id,
                config.max_players_per_shard,
                make_physics(shard_id),
                GameplayEngine::default(),
            );
            shard.set_max_delta_secs(config.max_delta_secs);
            shard
                .load_zone(terrain, &config.zone)
                .map_err(|source| ServerError::Shard { shard_id, source })?;
            install_formatters(
                shard.events_mut(),
                FormatterContext {
                    shard_id,
                    sessions: Arc::clone(&sessions),
                    outbound: outbound.clone(),
                    cache: cache.clone(),
                },
            );
            router.add_shard(shard_id, shard.command_queue());
            shards.push(shard);
        }

        let router = Arc::new(router);
        let mut dispatcher = MessageDispatcher::new();
        for kind in CommandKind::SHARD_BOUND {
            dispatcher.register(
                kind,
                Box::new(ShardCommandHandler::new(kind, Arc::clone(&router))),
            );
        }
        dispatcher.register(
            CommandKind::Ping,
            Box::new(PingHandler::new(Arc::clone(&pool), Arc::clone(&latency))),
        );
        dispatcher.register(
            CommandKind::JoinRequest,
            Box::new(JoinRequestHandler::new(Arc::clone(&joins))),
        );

        let processor =
            PacketProcessor::new(dispatcher, Arc::clone(&sessions), Arc::clone(&disconnects));

        info!(
            "Orchestrator ready: {} shard(s), {} players each, {} worker threads",
            shards.len(),
            config.max_players_per_shard,
            pool.threads()
        );

        Ok(Self {
            config,
            shards,
            sessions,
            joins,
            disconnects,
            processor,
            outbound,
            pool,
            latency,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.sessions)
    }

    pub fn disconnect_queue(&self) -> &Arc<SwapQueue<SocketAddr>> {
        &self.disconnects
    }

    pub fn latency(&self) -> &LatencyStats {
        &self.latency
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn shard(&self, shard_id: ShardId) -> Option<&Shard> {
        self.shards.iter().find(|s| s.id() == shard_id)
    }

    pub fn shard_mut(&mut self, shard_id: ShardId) -> Option<&mut Shard> {
        self.shards.iter_mut().find(|s| s.id() == shard_id)
    }

    pub fn player_count(&self) -> usize {
        self.shards.iter().map(Shard::player_count).sum()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    fn send(&self, packet: Packet, addr: SocketAddr) {
        if self
            .outbound
            .send(GameMessage::SendPacket { packet, addr })
            .is_err()
        {
            debug!("Outbound channel closed, dropping packet for {}", addr);
        }
    }

    /// Routes one decoded packet and sends any direct reply.
    pub fn handle_packet(&self, sender: SocketAddr, packet: Packet) {
        if let Some(reply) = self.processor.process_incoming(sender, packet) {
            self.send(reply, sender);
        }
    }

    /// One full server tick: queued joins and disconnects, then ingress, then every
    /// shard in parallel. Joins and disconnects received this tick are admitted on
    /// the next one.
    pub fn tick(
        &mut self,
        dt: f32,
        now: Instant,
        inbound: Vec<(SocketAddr, Packet)>,
    ) -> Vec<TickSummary> {
        self.process_joins();
        self.process_disconnects();
        for (sender, packet) in inbound {
            self.handle_packet(sender, packet);
        }

        let shards = &mut self.shards;
        let summaries: Vec<TickSummary> = self
            .pool
            .install(|| shards.par_iter_mut().map(|s| s.update(dt, now)).collect());

        self.ticks += 1;
        summaries
    }

    fn process_joins(&mut self) {
        for ticket in self.joins.drain() {
            let endpoint = ticket.endpoint;
            let reply = match self.join(&ticket) {
                Ok(player_id) => Packet::JoinSuccess {
                    player_id,
                    welcome_message: WELCOME_MESSAGE.to_string(),
                    server_tick_rate_hz: self.config.tick_rate_hz(),
                },
                Err(e) => {
                    warn!("Join from {} rejected: {}", endpoint, e);
                    Packet::JoinFailed {
                        reason: e.client_message().to_string(),
                        code: e.code(),
                    }
                }
            };
            self.send(reply, endpoint);
        }
    }

    /// Places a new player in the first shard with room and binds its endpoint.
    pub fn join(&mut self, ticket: &JoinTicket) -> Result<PlayerId, JoinError> {
        if let Some(player_id) = self.sessions.player_for_endpoint(ticket.endpoint) {
            return Err(JoinError::EndpointInUse {
                endpoint: ticket.endpoint,
                player_id,
            });
        }
        if ticket.client_version != shared::PROTOCOL_VERSION {
            warn!(
                "Client {} speaks protocol {}, server speaks {}",
                ticket.endpoint,
                ticket.client_version,
                shared::PROTOCOL_VERSION
            );
        }

        let shard = self
            .shards
            .iter_mut()
            .find(|s| !s.is_full())
            .ok_or(JoinError::ServerFull)?;
        let spawn = shard.free_spawn_point(self.config.spawn_position);
        let player_id = shard.spawn_player(&ticket.character_id, spawn, Quat::IDENTITY)?;

        if let Err(e) = self
            .sessions
            .associate(ticket.endpoint, player_id, shard.id())
        {
            shard.discard_player(player_id);
            return Err(e);
        }
        info!(
            "Player {} joined shard {} from {}",
            player_id,
            shard.id(),
            ticket.endpoint
        );
        Ok(player_id)
    }

    fn process_disconnects(&mut self) {
        for endpoint in self.disconnects.drain() {
            self.disconnect(endpoint);
        }
    }

    /// Forgets `endpoint`'s session and removes its player from the owning shard.
    pub fn disconnect(&mut self, endpoint: SocketAddr) -> bool {
        let Some(session) = self.sessions.remove_by_endpoint(endpoint) else {
            debug!("Disconnect for unknown endpoint {}", endpoint);
            return false;
        };
        match self.shard_mut(session.shard_id) {
            Some(shard) => {
                shard.despawn_player(session.player_id);
                info!(
                    "Player {} left shard {}",
                    session.player_id, session.shard_id
                );
            }
            None => error!(
                "Session for player {} names missing shard {}",
                session.player_id, session.shard_id
            ),
        }
        true
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("shards", &self.shards.len())
            .field("sessions", &self.sessions.len())
            .field("ticks", &self.ticks)
            .finish()
    }
}
