//! Wire protocol shared by the RiftForged server, bots and other server processes.
//!
//! Every datagram is one bincode-encoded [`Packet`]. Vectors and rotations travel as
//! plain [`WireVec3`] / [`WireQuat`] values so that the protocol stays independent of
//! any math library. [`PlayerStateCache`] is the blob other processes read back from
//! the shared cache under `player:<id>:state`.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 12345;
/// Largest datagram either side will try to decode.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Player id carried by packets that have no associated player yet.
pub const NO_ENTITY: u64 = 0;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct WireVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl WireVec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct WireQuat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for WireQuat {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// Codes used by `RiftStepActivation::directional_intent`.
///
/// Anything outside this table is treated by the server as a backward step.
pub mod rift_intent {
    pub const DEFAULT_BACKWARD: u8 = 0;
    pub const FORWARD: u8 = 1;
    pub const BACKWARD: u8 = 2;
    pub const LEFT: u8 = 3;
    pub const RIGHT: u8 = 4;
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum CombatEventKind {
    DamageDealt,
    Miss,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum WireEffectKind {
    AreaDamage,
    AreaStun,
    ApplyStatus,
    PersistentArea,
}

/// Area effect attached to a rift step, ready for client-side presentation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WireEffect {
    pub kind: WireEffectKind,
    pub center: WireVec3,
    pub radius: f32,
    pub duration_ms: u32,
    pub damage: i32,
    pub damage_type: u8,
    pub stun_duration_ms: u32,
    pub status_effect: Option<u8>,
    pub vfx_tag: String,
}

/// Authoritative snapshot of one entity.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EntityState {
    pub entity_id: u64,
    pub position: WireVec3,
    pub orientation: WireQuat,
    pub health: i32,
    pub max_health: i32,
    pub will: i32,
    pub max_will: i32,
    pub animation_state: u32,
    pub movement_state: u8,
    pub status_effects: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Client -> server
    JoinRequest {
        client_version: u32,
        character_id: String,
    },
    MovementInput {
        client_timestamp_ms: u64,
        local_direction: WireVec3,
        is_sprinting: bool,
    },
    TurnIntent {
        client_timestamp_ms: u64,
        turn_delta_degrees: f32,
    },
    RiftStepActivation {
        client_timestamp_ms: u64,
        directional_intent: u8,
    },
    BasicAttack {
        client_timestamp_ms: u64,
        aim_direction: WireVec3,
        target_entity_id: u64,
    },
    UseAbility {
        client_timestamp_ms: u64,
        ability_id: u32,
        target_entity_id: u64,
        target_position: Option<WireVec3>,
    },
    Ping {
        client_timestamp_ms: u64,
    },
    Disconnect,

    // Server -> client
    JoinSuccess {
        player_id: u64,
        welcome_message: String,
        server_tick_rate_hz: u16,
    },
    JoinFailed {
        reason: String,
        code: u32,
    },
    Pong {
        client_timestamp_ms: u64,
        server_timestamp_ms: u64,
    },
    EntityStateUpdate {
        server_timestamp_ms: u64,
        state: EntityState,
    },
    EntityRemoved {
        entity_id: u64,
    },
    RiftStepInitiated {
        instigator_id: u64,
        start_position: WireVec3,
        intended_target_position: WireVec3,
        final_position: WireVec3,
        travel_duration_sec: f32,
        entry_effects: Vec<WireEffect>,
        exit_effects: Vec<WireEffect>,
        start_vfx_id: String,
        travel_vfx_id: String,
        end_vfx_id: String,
    },
    CombatEvent {
        kind: CombatEventKind,
        source_id: u64,
        target_id: u64,
        damage: i32,
        damage_type: u8,
        was_crit: bool,
        was_kill: bool,
        server_timestamp_ms: u64,
    },
    ProjectileSpawned {
        projectile_id: u64,
        owner_id: u64,
        start_position: WireVec3,
        direction: WireVec3,
        speed: f32,
        max_range: f32,
        vfx_tag: String,
    },
    AbilityFailed {
        ability_id: u32,
        reason: String,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// True for the packet kinds a client is allowed to send.
    pub fn is_client_message(&self) -> bool {
        matches!(
            self,
            Packet::JoinRequest { .. }
                | Packet::MovementInput { .. }
                | Packet::TurnIntent { .. }
                | Packet::RiftStepActivation { .. }
                | Packet::BasicAttack { .. }
                | Packet::UseAbility { .. }
                | Packet::Ping { .. }
                | Packet::Disconnect
        )
    }
}

/// Player state blob replicated to the shared cache for other server processes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerStateCache {
    pub player_id: u64,
    pub shard_id: u32,
    pub position: WireVec3,
    pub orientation: WireQuat,
    pub health: i32,
    pub max_health: i32,
    pub will: i32,
    pub max_will: i32,
    pub movement_state: u8,
    pub status_effects: Vec<u8>,
    pub updated_at_ms: u64,
}

pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(packet)
}

/// Decodes a datagram, rejecting anything larger than [`MAX_DATAGRAM_SIZE`].
pub fn decode_packet(bytes: &[u8]) -> Result<Packet, bincode::Error> {
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(Box::new(bincode::ErrorKind::Custom(format!(
            "datagram of {} bytes exceeds limit",
            bytes.len()
        ))));
    }
    bincode::deserialize(bytes)
}

/// Wall-clock milliseconds since the unix epoch, saturating instead of failing.
pub fn timestamp_ms() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}
