//! Integration tests for the RiftForged server
//!
//! These tests drive the server through its public surface: decoded packets into
//! the orchestrator, and real datagrams into a running UDP server.

use assert_approx_eq::assert_approx_eq;
use bincode::serialize;
use glam::{Quat, Vec3};
use server::config::ServerConfig;
use server::network::{GameMessage, Server};
use server::orchestrator::{Orchestrator, WELCOME_MESSAGE};
use server::terrain::ProceduralTerrain;
use shared::{decode_packet, encode_packet, CombatEventKind, Packet, WireVec3};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

fn test_addr(port: u16) -> SocketAddr {
    format!("127.0.0.1:{}", port).parse().unwrap()
}

fn join_packet(character: &str) -> Packet {
    Packet::JoinRequest {
        client_version: shared::PROTOCOL_VERSION,
        character_id: character.to_string(),
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<GameMessage>) -> Vec<GameMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

fn direct_replies(messages: &[GameMessage], to: SocketAddr) -> Vec<Packet> {
    messages
        .iter()
        .filter_map(|m| match m {
            GameMessage::SendPacket { packet, addr } if *addr == to => Some(packet.clone()),
            _ => None,
        })
        .collect()
}

fn broadcasts(messages: &[GameMessage]) -> Vec<Packet> {
    messages
        .iter()
        .filter_map(|m| match m {
            GameMessage::BroadcastPacket { packet, .. } => Some(packet.clone()),
            _ => None,
        })
        .collect()
}

/// ORCHESTRATOR SCENARIOS
mod orchestrator_tests {
    use super::*;

    struct World {
        orchestrator: Orchestrator,
        rx: mpsc::UnboundedReceiver<GameMessage>,
        clock: Instant,
    }

    impl World {
        fn new(max_players: usize) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let terrain = ProceduralTerrain::with_builtin_assets();
            let config = ServerConfig {
                worker_threads: 2,
                max_players_per_shard: max_players,
                ..Default::default()
            };
            Self {
                orchestrator: Orchestrator::new(config, &terrain, None, tx).unwrap(),
                rx,
                clock: Instant::now(),
            }
        }

        fn tick(&mut self, inbound: Vec<(SocketAddr, Packet)>) -> Vec<GameMessage> {
            self.clock += Duration::from_millis(50);
            self.orchestrator.tick(0.05, self.clock, inbound);
            drain(&mut self.rx)
        }

        /// Joins are admitted on the tick after they arrive.
        fn tick_twice(&mut self, inbound: Vec<(SocketAddr, Packet)>) -> Vec<GameMessage> {
            let mut messages = self.tick(inbound);
            messages.extend(self.tick(Vec::new()));
            messages
        }

        fn join(&mut self, port: u16) -> u64 {
            let messages = self.tick_twice(vec![(test_addr(port), join_packet("tester"))]);
            match direct_replies(&messages, test_addr(port)).as_slice() {
                [Packet::JoinSuccess { player_id, .. }] => *player_id,
                other => panic!("Expected JoinSuccess, got {:?}", other),
            }
        }

        fn position(&self, player_id: u64) -> Vec3 {
            self.orchestrator
                .shard(0)
                .unwrap()
                .players()
                .find_player(player_id)
                .unwrap()
                .position()
        }
    }

    #[test]
    fn join_reply_carries_welcome_and_tick_rate() {
        let mut world = World::new(4);
        let messages = world.tick_twice(vec![(test_addr(6000), join_packet("warden"))]);
        assert_eq!(
            direct_replies(&messages, test_addr(6000)),
            vec![Packet::JoinSuccess {
                player_id: 1,
                welcome_message: WELCOME_MESSAGE.to_string(),
                server_tick_rate_hz: 200,
            }]
        );
        let player = world.orchestrator.shard(0).unwrap().players().find_player(1).unwrap();
        assert_eq!(player.character_id(), "warden");
        assert_eq!(player.orientation(), Quat::IDENTITY);
    }

    #[test]
    fn second_join_from_same_endpoint_fails_with_code_1() {
        let mut world = World::new(4);
        world.join(6000);
        let messages = world.tick_twice(vec![(test_addr(6000), join_packet("again"))]);
        match direct_replies(&messages, test_addr(6000)).as_slice() {
            [Packet::JoinFailed { code, .. }] => assert_eq!(*code, 1),
            other => panic!("Expected JoinFailed, got {:?}", other),
        }
    }

    #[test]
    fn commands_from_unknown_endpoints_are_dropped() {
        let mut world = World::new(4);
        let id = world.join(6000);
        let before = world.position(id);

        let movement = Packet::MovementInput {
            client_timestamp_ms: 1,
            local_direction: WireVec3::new(0.0, 1.0, 0.0),
            is_sprinting: true,
        };
        let messages = world.tick(vec![(test_addr(6001), movement)]);
        assert!(direct_replies(&messages, test_addr(6001)).is_empty());
        assert_eq!(world.position(id), before);
    }

    #[test]
    fn walking_then_rift_step_is_broadcast() {
        let mut world = World::new(4);
        let id = world.join(6000);
        let start = world.position(id);

        let movement = Packet::MovementInput {
            client_timestamp_ms: 1,
            local_direction: WireVec3::new(0.0, 1.0, 0.0),
            is_sprinting: false,
        };
        world.tick(vec![(test_addr(6000), movement)]);
        let after_walk = world.position(id);
        assert!(after_walk.y > start.y);

        let step = Packet::RiftStepActivation {
            client_timestamp_ms: 2,
            directional_intent: shared::rift_intent::FORWARD,
        };
        let messages = world.tick(vec![(test_addr(6000), step)]);
        let initiated: Vec<_> = broadcasts(&messages)
            .into_iter()
            .filter(|p| matches!(p, Packet::RiftStepInitiated { .. }))
            .collect();
        assert_eq!(initiated.len(), 1);
        if let Packet::RiftStepInitiated {
            instigator_id,
            final_position,
            start_vfx_id,
            ..
        } = &initiated[0]
        {
            assert_eq!(*instigator_id, id);
            assert!(final_position.y > after_walk.y + 10.0);
            assert_eq!(start_vfx_id, "vfx_riftstep_basic_start");
        }

        // Second step inside the cooldown is refused to the caster only.
        let step = Packet::RiftStepActivation {
            client_timestamp_ms: 3,
            directional_intent: shared::rift_intent::FORWARD,
        };
        let messages = world.tick(vec![(test_addr(6000), step)]);
        assert_eq!(
            direct_replies(&messages, test_addr(6000)),
            vec![Packet::AbilityFailed {
                ability_id: 1,
                reason: "ON_COOLDOWN".into(),
            }]
        );
    }

    #[test]
    fn melee_swing_hits_player_in_front() {
        let mut world = World::new(4);
        let attacker = world.join(6000);
        let target = world.join(6001);

        // Joins spawn apart; put the target just ahead of the attacker.
        let shard = world.orchestrator.shard_mut(0).unwrap();
        let attacker_at = shard.players().find_player(attacker).unwrap().position();
        let ahead = attacker_at + Vec3::new(0.0, 1.5, 0.0);
        shard.physics_mut().set_controller_position(target, ahead).unwrap();
        shard.players_mut().find_player_mut(target).unwrap().set_position(ahead);

        let attack = Packet::BasicAttack {
            client_timestamp_ms: 1,
            aim_direction: WireVec3::new(0.0, 1.0, 0.0),
            target_entity_id: 0,
        };
        let messages = world.tick(vec![(test_addr(6000), attack)]);
        let combat: Vec<_> = broadcasts(&messages)
            .into_iter()
            .filter_map(|p| match p {
                Packet::CombatEvent {
                    kind,
                    source_id,
                    target_id,
                    damage,
                    ..
                } => Some((kind, source_id, target_id, damage)),
                _ => None,
            })
            .collect();
        assert_eq!(combat.len(), 1);
        let (kind, source, struck, damage) = combat[0];
        assert_eq!(kind, CombatEventKind::DamageDealt);
        assert_eq!(source, attacker);
        assert_eq!(struck, target);
        assert!(damage > 0);

        let health = world
            .orchestrator
            .shard(0)
            .unwrap()
            .players()
            .find_player(target)
            .unwrap()
            .health();
        assert_eq!(health, 250 - damage);
    }

    #[test]
    fn arcane_bolt_spawns_projectile() {
        let mut world = World::new(4);
        let caster = world.join(6000);
        let ability = Packet::UseAbility {
            client_timestamp_ms: 1,
            ability_id: 4,
            target_entity_id: 0,
            target_position: None,
        };
        let messages = world.tick(vec![(test_addr(6000), ability)]);
        let spawned = broadcasts(&messages)
            .into_iter()
            .find(|p| matches!(p, Packet::ProjectileSpawned { .. }));
        match spawned {
            Some(Packet::ProjectileSpawned {
                owner_id, speed, ..
            }) => {
                assert_eq!(owner_id, caster);
                assert_approx_eq!(speed, 25.0);
            }
            other => panic!("Expected ProjectileSpawned, got {:?}", other),
        }
    }

    #[test]
    fn unknown_ability_is_reported_to_caster() {
        let mut world = World::new(4);
        world.join(6000);
        let ability = Packet::UseAbility {
            client_timestamp_ms: 1,
            ability_id: 99,
            target_entity_id: 0,
            target_position: None,
        };
        let messages = world.tick(vec![(test_addr(6000), ability)]);
        assert_eq!(
            direct_replies(&messages, test_addr(6000)),
            vec![Packet::AbilityFailed {
                ability_id: 99,
                reason: "UNKNOWN_ABILITY".into(),
            }]
        );
    }

    #[test]
    fn disconnect_broadcasts_removal() {
        let mut world = World::new(4);
        let id = world.join(6000);
        world.join(6001);

        let messages = world.tick_twice(vec![(test_addr(6000), Packet::Disconnect)]);
        assert!(broadcasts(&messages).contains(&Packet::EntityRemoved { entity_id: id }));
        assert_eq!(world.orchestrator.player_count(), 1);
    }
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    async fn start_server() -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
        let terrain = ProceduralTerrain::with_builtin_assets();
        let config = ServerConfig {
            listen_address: "127.0.0.1".into(),
            port: 0,
            worker_threads: 2,
            ..Default::default()
        };
        let server = Server::new(config, &terrain, None).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = stop_rx.await;
            };
            server.run(shutdown).await.unwrap();
        });
        (addr, stop_tx, handle)
    }

    async fn recv_until<F>(socket: &UdpSocket, mut accept: F) -> Packet
    where
        F: FnMut(&Packet) -> bool,
    {
        let mut buf = [0u8; shared::MAX_DATAGRAM_SIZE];
        loop {
            let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
                .await
                .expect("Timed out waiting for server")
                .unwrap();
            let packet = decode_packet(&buf[..len]).unwrap();
            if accept(&packet) {
                return packet;
            }
        }
    }

    #[tokio::test]
    async fn udp_join_and_state_round_trip() {
        let (server_addr, stop, handle) = start_server().await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let join = encode_packet(&join_packet("udp")).unwrap();
        client.send_to(&join, server_addr).await.unwrap();

        let reply = recv_until(&client, |p| matches!(p, Packet::JoinSuccess { .. })).await;
        let Packet::JoinSuccess { player_id, .. } = reply else {
            unreachable!()
        };

        let state = recv_until(&client, |p| matches!(p, Packet::EntityStateUpdate { .. })).await;
        if let Packet::EntityStateUpdate { state, .. } = state {
            assert_eq!(state.entity_id, player_id);
            assert_eq!(state.max_health, 250);
        }

        let ping = encode_packet(&Packet::Ping {
            client_timestamp_ms: 11,
        })
        .unwrap();
        client.send_to(&ping, server_addr).await.unwrap();
        let pong = recv_until(&client, |p| matches!(p, Packet::Pong { .. })).await;
        assert!(matches!(
            pong,
            Packet::Pong {
                client_timestamp_ms: 11,
                ..
            }
        ));

        let _ = stop.send(());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_datagrams_are_ignored() {
        let (server_addr, stop, handle) = start_server().await;
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        client.send_to(&[0xff, 0x00, 0x13], server_addr).await.unwrap();
        let oversized = vec![0u8; shared::MAX_DATAGRAM_SIZE + 100];
        let _ = client.send_to(&oversized, server_addr).await;

        let join = serialize(&join_packet("after-garbage")).unwrap();
        client.send_to(&join, server_addr).await.unwrap();
        let reply = recv_until(&client, |p| {
            matches!(p, Packet::JoinSuccess { .. } | Packet::JoinFailed { .. })
        })
        .await;
        assert!(matches!(reply, Packet::JoinSuccess { .. }));

        let _ = stop.send(());
        handle.await.unwrap();
    }
}
