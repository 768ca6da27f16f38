//! UDP transport and the simulation thread that drives the orchestrator.

use crate::cache::{CacheReplicator, CacheStore, CacheWorker};
use crate::commands::PlayerId;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::orchestrator::Orchestrator;
use crate::session::{SessionRegistry, ShardId};
use crate::terrain::TerrainSource;
use log::{debug, error, info, warn};
use shared::{decode_packet, encode_packet, Packet};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// How often the timeout checker scans for silent clients.
const TIMEOUT_SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Messages sent from network tasks to the simulation thread
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { addr: SocketAddr },
    Shutdown,
}

/// Messages sent from the simulation to the network sender
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Sent to every session in `shard`, minus `exclude`.
    BroadcastPacket {
        packet: Packet,
        shard: ShardId,
        exclude: Option<PlayerId>,
    },
}

pub struct Server {
    socket: Arc<UdpSocket>,
    sessions: Arc<SessionRegistry>,
    orchestrator: Option<Orchestrator>,
    cache_worker: Option<CacheWorker>,
    tick_interval: Duration,
    client_timeout: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: Option<mpsc::UnboundedReceiver<ServerMessage>>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    /// Binds the socket and builds every shard. Fails if a zone cannot be loaded.
    pub async fn new(
        config: ServerConfig,
        terrain: &dyn TerrainSource,
        cache_store: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(config.bind_address()).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let (cache, cache_worker) = match cache_store {
            Some(store) => {
                let (replicator, worker) = CacheReplicator::new(store);
                (Some(replicator), Some(worker))
            }
            None => (None, None),
        };

        let tick_interval = config.tick_interval;
        let client_timeout = config.client_timeout;
        let orchestrator = Orchestrator::new(config, terrain, cache, game_tx)?;

        Ok(Server {
            socket,
            sessions: orchestrator.sessions(),
            orchestrator: Some(orchestrator),
            cache_worker,
            tick_interval,
            client_timeout,
            server_tx,
            server_rx: Some(server_rx),
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; shared::MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode_packet(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                debug!("Simulation stopped, receiver exiting: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to decode packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that drains the outgoing packet queue
    fn spawn_network_sender(&mut self) -> Result<(), ServerError> {
        let socket = Arc::clone(&self.socket);
        let sessions = Arc::clone(&self.sessions);
        let mut game_rx = self
            .game_rx
            .take()
            .ok_or_else(|| ServerError::Internal("network sender already running".into()))?;

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket {
                        packet,
                        shard,
                        exclude,
                    } => {
                        let data = match encode_packet(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to encode broadcast: {}", e);
                                continue;
                            }
                        };
                        for addr in sessions.endpoints_in_shard(shard, exclude) {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Spawns task that reports clients which have gone silent
    fn spawn_timeout_checker(&self) {
        let sessions = Arc::clone(&self.sessions);
        let server_tx = self.server_tx.clone();
        let timeout = self.client_timeout;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TIMEOUT_SCAN_INTERVAL);

            loop {
                interval.tick().await;

                for addr in sessions.timed_out(timeout) {
                    if server_tx.send(ServerMessage::ClientTimeout { addr }).is_err() {
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let data = encode_packet(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    /// Runs until `shutdown` resolves, then stops the simulation thread.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let orchestrator = self
            .orchestrator
            .take()
            .ok_or_else(|| ServerError::Internal("server already running".into()))?;
        let server_rx = self
            .server_rx
            .take()
            .ok_or_else(|| ServerError::Internal("server already running".into()))?;

        self.spawn_network_receiver();
        self.spawn_network_sender()?;
        self.spawn_timeout_checker();
        if let Some(worker) = self.cache_worker.take() {
            tokio::spawn(worker.run());
        }

        let tick_interval = self.tick_interval;
        let simulation = std::thread::Builder::new()
            .name("riftforged-sim".into())
            .spawn(move || run_simulation(orchestrator, server_rx, tick_interval))?;

        info!("Server started successfully");
        shutdown.await;
        info!("Server shutting down");

        // The thread may already have exited if the channel closed.
        let _ = self.server_tx.send(ServerMessage::Shutdown);
        match tokio::task::spawn_blocking(move || simulation.join()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ServerError::Internal("simulation thread panicked".into())),
            Err(e) => Err(ServerError::Internal(format!(
                "failed to join simulation thread: {}",
                e
            ))),
        }
    }
}

/// Fixed-rate loop: drain network messages, then tick every shard.
fn run_simulation(
    mut orchestrator: Orchestrator,
    mut server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    tick_interval: Duration,
) {
    let mut last_tick = Instant::now();

    loop {
        let mut inbound = Vec::new();
        loop {
            match server_rx.try_recv() {
                Ok(ServerMessage::PacketReceived { packet, addr }) => inbound.push((addr, packet)),
                Ok(ServerMessage::ClientTimeout { addr }) => {
                    info!("Client {} timed out", addr);
                    orchestrator.disconnect_queue().push(addr);
                }
                Ok(ServerMessage::Shutdown) | Err(TryRecvError::Disconnected) => {
                    info!(
                        "Simulation stopped after {} ticks",
                        orchestrator.tick_count()
                    );
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        let now = Instant::now();
        let dt = now.duration_since(last_tick).as_secs_f32();
        last_tick = now;

        orchestrator.tick(dt, now, inbound);

        let elapsed = now.elapsed();
        if elapsed < tick_interval {
            std::thread::sleep(tick_interval - elapsed);
        } else if !tick_interval.is_zero() {
            debug!(
                "Tick {} took {:.2}ms, over the {:.2}ms budget",
                orchestrator.tick_count(),
                elapsed.as_secs_f64() * 1000.0,
                tick_interval.as_secs_f64() * 1000.0
            );
        }
    }
}
