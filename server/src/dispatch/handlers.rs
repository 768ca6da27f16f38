use super::{MessageHandler, ShardRouter};
use crate::commands::{CommandData, CommandKind, GameCommand};
use crate::error::RoutingError;
use crate::queue::SwapQueue;
use crate::worker_pool::WorkerPool;
use log::{debug, trace};
use shared::Packet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Forwards one shard-bound command kind to the owning shard's queue.
pub struct ShardCommandHandler {
    expected: CommandKind,
    router: Arc<ShardRouter>,
}

impl ShardCommandHandler {
    pub fn new(expected: CommandKind, router: Arc<ShardRouter>) -> Self {
        Self { expected, router }
    }
}

impl MessageHandler for ShardCommandHandler {
    fn process(
        &self,
        command: &GameCommand,
        _sender: SocketAddr,
    ) -> Result<Option<Packet>, RoutingError> {
        let actual = command.kind();
        if actual != self.expected {
            return Err(RoutingError::PayloadMismatch {
                expected: self.expected,
                actual,
            });
        }
        if !payload_is_finite(&command.data) {
            return Err(RoutingError::InvalidPayload(actual));
        }

        let shard_id = self.router.route(command.clone())?;
        trace!(
            "Queued {:?} from player {} on shard {}",
            actual,
            command.originating_player_id,
            shard_id
        );
        Ok(None)
    }
}

fn payload_is_finite(data: &CommandData) -> bool {
    match data {
        CommandData::MovementInput(input) => input.local_direction.is_finite(),
        CommandData::TurnIntent(intent) => intent.turn_delta_degrees.is_finite(),
        CommandData::BasicAttack(intent) => intent.aim_direction.is_finite(),
        CommandData::UseAbility(ability) => {
            ability.target_position.map_or(true, |p| p.is_finite())
        }
        _ => true,
    }
}

/// Running totals of client-to-server latency estimates.
#[derive(Debug, Default)]
pub struct LatencyStats {
    samples: AtomicU64,
    total_ms: AtomicU64,
}

impl LatencyStats {
    pub fn record(&self, latency_ms: u64) {
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn average_ms(&self) -> Option<f64> {
        let samples = self.samples();
        if samples == 0 {
            return None;
        }
        Some(self.total_ms.load(Ordering::Relaxed) as f64 / samples as f64)
    }
}

/// Answers pings directly and records a latency sample off the calling thread.
pub struct PingHandler {
    pool: Arc<WorkerPool>,
    stats: Arc<LatencyStats>,
}

impl PingHandler {
    pub fn new(pool: Arc<WorkerPool>, stats: Arc<LatencyStats>) -> Self {
        Self { pool, stats }
    }
}

impl MessageHandler for PingHandler {
    fn process(
        &self,
        command: &GameCommand,
        sender: SocketAddr,
    ) -> Result<Option<Packet>, RoutingError> {
        let CommandData::Ping(ping) = &command.data else {
            return Err(RoutingError::PayloadMismatch {
                expected: CommandKind::Ping,
                actual: command.kind(),
            });
        };

        let server_timestamp_ms = shared::timestamp_ms();
        let client_timestamp_ms = ping.client_timestamp_ms;
        let stats = Arc::clone(&self.stats);
        self.pool.spawn(move || {
            let latency = server_timestamp_ms.saturating_sub(client_timestamp_ms);
            stats.record(latency);
            debug!("Ping from {}: ~{}ms one way", sender, latency);
        });

        Ok(Some(Packet::Pong {
            client_timestamp_ms,
            server_timestamp_ms,
        }))
    }
}

/// A join request waiting for the orchestrator to place it in a shard.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinTicket {
    pub endpoint: SocketAddr,
    pub character_id: String,
    pub client_version: u32,
}

/// Defers joins to the tick thread, which owns the shards.
pub struct JoinRequestHandler {
    joins: Arc<SwapQueue<JoinTicket>>,
}

impl JoinRequestHandler {
    pub fn new(joins: Arc<SwapQueue<JoinTicket>>) -> Self {
        Self { joins }
    }
}

impl MessageHandler for JoinRequestHandler {
    fn process(
        &self,
        command: &GameCommand,
        sender: SocketAddr,
    ) -> Result<Option<Packet>, RoutingError> {
        let CommandData::JoinRequest(request) = &command.data else {
            return Err(RoutingError::PayloadMismatch {
                expected: CommandKind::JoinRequest,
                actual: command.kind(),
            });
        };
        self.joins.push(JoinTicket {
            endpoint: sender,
            character_id: request.character_id.clone(),
            client_version: request.client_version,
        });
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{JoinRequest, MovementInput, Ping, TurnIntent, UseAbility};
    use crate::queue::CommandQueue;
    use crate::session::SessionRegistry;
    use glam::Vec3;
    use std::time::{Duration, Instant};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn router_with_player(player_id: u64) -> (Arc<ShardRouter>, Arc<CommandQueue>) {
        let sessions = Arc::new(SessionRegistry::new());
        sessions.associate(test_addr(), player_id, 0).unwrap();
        let queue = Arc::new(CommandQueue::new());
        let mut router = ShardRouter::new(sessions);
        router.add_shard(0, queue.clone());
        (Arc::new(router), queue)
    }

    fn turn(player_id: u64, degrees: f32) -> GameCommand {
        GameCommand::new(
            player_id,
            CommandData::TurnIntent(TurnIntent {
                client_timestamp_ms: 0,
                turn_delta_degrees: degrees,
            }),
        )
    }

    #[test]
    fn test_shard_handler_enqueues() {
        let (router, queue) = router_with_player(9);
        let handler = ShardCommandHandler::new(CommandKind::TurnIntent, router);

        assert_eq!(handler.process(&turn(9, 30.0), test_addr()), Ok(None));
        assert_eq!(queue.drain(), vec![turn(9, 30.0)]);
    }

    #[test]
    fn test_shard_handler_rejects_mismatch() {
        let (router, queue) = router_with_player(9);
        let handler = ShardCommandHandler::new(CommandKind::MovementInput, router);

        assert_eq!(
            handler.process(&turn(9, 30.0), test_addr()),
            Err(RoutingError::PayloadMismatch {
                expected: CommandKind::MovementInput,
                actual: CommandKind::TurnIntent,
            })
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_shard_handler_rejects_non_finite() {
        let (router, queue) = router_with_player(9);
        let movement = ShardCommandHandler::new(CommandKind::MovementInput, router.clone());
        let command = GameCommand::new(
            9,
            CommandData::MovementInput(MovementInput {
                client_timestamp_ms: 0,
                local_direction: Vec3::new(f32::NAN, 0.0, 0.0),
                is_sprinting: false,
            }),
        );
        assert_eq!(
            movement.process(&command, test_addr()),
            Err(RoutingError::InvalidPayload(CommandKind::MovementInput))
        );

        let ability = ShardCommandHandler::new(CommandKind::UseAbility, router);
        let command = GameCommand::new(
            9,
            CommandData::UseAbility(UseAbility {
                client_timestamp_ms: 0,
                ability_id: 3,
                target_entity_id: None,
                target_position: Some(Vec3::new(0.0, f32::INFINITY, 0.0)),
            }),
        );
        assert!(ability.process(&command, test_addr()).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_shard_handler_unknown_player() {
        let (router, _) = router_with_player(9);
        let handler = ShardCommandHandler::new(CommandKind::TurnIntent, router);
        assert_eq!(
            handler.process(&turn(10, 30.0), test_addr()),
            Err(RoutingError::UnknownPlayer(10))
        );
    }

    #[test]
    fn test_ping_replies_and_samples() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let stats = Arc::new(LatencyStats::default());
        let handler = PingHandler::new(pool, stats.clone());
        let command = GameCommand::new(
            3,
            CommandData::Ping(Ping {
                client_timestamp_ms: 42,
            }),
        );

        match handler.process(&command, test_addr()) {
            Ok(Some(Packet::Pong {
                client_timestamp_ms,
                server_timestamp_ms,
            })) => {
                assert_eq!(client_timestamp_ms, 42);
                assert!(server_timestamp_ms > 42);
            }
            other => panic!("Expected pong, got {:?}", other),
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while stats.samples() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(stats.samples(), 1);
        assert!(stats.average_ms().unwrap() > 0.0);
    }

    #[test]
    fn test_join_handler_queues_ticket() {
        let joins = Arc::new(SwapQueue::new());
        let handler = JoinRequestHandler::new(joins.clone());
        let command = GameCommand::new(
            0,
            CommandData::JoinRequest(JoinRequest {
                client_version: 1,
                character_id: "warden".into(),
            }),
        );

        assert_eq!(handler.process(&command, test_addr()), Ok(None));
        assert_eq!(
            joins.drain(),
            vec![JoinTicket {
                endpoint: test_addr(),
                character_id: "warden".into(),
                client_version: 1,
            }]
        );
    }

    #[test]
    fn test_latency_stats_empty() {
        assert_eq!(LatencyStats::default().average_ms(), None);
    }
}
