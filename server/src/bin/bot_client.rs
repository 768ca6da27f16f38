//! Headless bot that joins a server, wanders, turns and casts, and reports what it
//! hears back. Useful as a smoke test and for load testing with many instances.

use clap::Parser;
use log::{info, warn};
use rand::Rng;
use shared::{decode_packet, encode_packet, rift_intent, Packet, WireVec3};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server address
    #[clap(short, long, default_value = "127.0.0.1:12345")]
    server: SocketAddr,
    /// Character id sent in the join request
    #[clap(short, long, default_value = "bot")]
    character: String,
    /// How long to play before disconnecting, in seconds
    #[clap(short, long, default_value = "10")]
    duration_secs: u64,
    /// Inputs sent per second
    #[clap(short, long, default_value = "20")]
    rate: u32,
}

#[derive(Debug, Default)]
struct BotStats {
    state_updates: usize,
    combat_events: usize,
    rift_steps: usize,
    ability_failures: usize,
    last_rtt_ms: Option<u64>,
}

impl BotStats {
    fn record(&mut self, packet: &Packet) {
        match packet {
            Packet::EntityStateUpdate { .. } => self.state_updates += 1,
            Packet::CombatEvent { .. } => self.combat_events += 1,
            Packet::RiftStepInitiated { .. } => self.rift_steps += 1,
            Packet::AbilityFailed { .. } => self.ability_failures += 1,
            Packet::Pong {
                client_timestamp_ms,
                ..
            } => {
                let now = shared::timestamp_ms();
                self.last_rtt_ms = Some(now.saturating_sub(*client_timestamp_ms));
            }
            _ => {}
        }
    }
}

async fn send(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    socket.send_to(&encode_packet(packet)?, addr).await?;
    Ok(())
}

/// Picks the next thing the bot does. Mostly walking, sometimes something louder.
fn next_action(rng: &mut impl Rng) -> Packet {
    let now = shared::timestamp_ms();
    match rng.gen_range(0..100) {
        0..=59 => Packet::MovementInput {
            client_timestamp_ms: now,
            local_direction: WireVec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), 0.0),
            is_sprinting: rng.gen_bool(0.3),
        },
        60..=79 => Packet::TurnIntent {
            client_timestamp_ms: now,
            turn_delta_degrees: rng.gen_range(-45.0..45.0),
        },
        80..=87 => Packet::BasicAttack {
            client_timestamp_ms: now,
            aim_direction: WireVec3::new(0.0, 1.0, 0.0),
            target_entity_id: shared::NO_ENTITY,
        },
        88..=93 => Packet::RiftStepActivation {
            client_timestamp_ms: now,
            directional_intent: rng.gen_range(rift_intent::DEFAULT_BACKWARD..=rift_intent::RIGHT),
        },
        94..=96 => Packet::UseAbility {
            client_timestamp_ms: now,
            ability_id: rng.gen_range(3..=4),
            target_entity_id: shared::NO_ENTITY,
            target_position: None,
        },
        _ => Packet::Ping {
            client_timestamp_ms: now,
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Bot socket bound to {}", socket.local_addr()?);

    let join = Packet::JoinRequest {
        client_version: shared::PROTOCOL_VERSION,
        character_id: args.character.clone(),
    };
    send(&socket, &join, args.server).await?;

    let mut buf = [0u8; shared::MAX_DATAGRAM_SIZE];
    let player_id = loop {
        let (len, _) = timeout(Duration::from_secs(5), socket.recv_from(&mut buf)).await??;
        match decode_packet(&buf[..len]) {
            Ok(Packet::JoinSuccess {
                player_id,
                welcome_message,
                server_tick_rate_hz,
            }) => {
                info!(
                    "Joined as player {} ({} Hz): {}",
                    player_id, server_tick_rate_hz, welcome_message
                );
                break player_id;
            }
            Ok(Packet::JoinFailed { reason, code }) => {
                return Err(format!("Join failed ({}): {}", code, reason).into());
            }
            Ok(_) => continue,
            Err(e) => warn!("Failed to decode packet: {}", e),
        }
    };

    let mut rng = rand::thread_rng();
    let mut stats = BotStats::default();
    let mut ticker = interval(Duration::from_secs_f64(1.0 / args.rate.max(1) as f64));
    let deadline = Instant::now() + Duration::from_secs(args.duration_secs);

    while Instant::now() < deadline {
        tokio::select! {
            _ = ticker.tick() => {
                send(&socket, &next_action(&mut rng), args.server).await?;
            }
            received = socket.recv_from(&mut buf) => {
                let (len, _) = received?;
                match decode_packet(&buf[..len]) {
                    Ok(packet) => stats.record(&packet),
                    Err(e) => warn!("Failed to decode packet: {}", e),
                }
            }
        }
    }

    send(&socket, &Packet::Disconnect, args.server).await?;
    info!("Player {} done: {:?}", player_id, stats);
    Ok(())
}
