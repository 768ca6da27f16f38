//! Gameplay events raised by a shard during its tick.

use crate::commands::{EntityId, PlayerId};
use crate::gameplay::outcome::{
    DamageApplicationDetails, FailureReason, RiftStepOutcome, SpawnedProjectile,
};
use crate::player::{AnimationState, MovementState, Player, StatusEffect};
use glam::{Quat, Vec3};
use std::fmt::Debug;

/// Anything that can travel over an [`EventBus`](crate::event_bus::EventBus).
pub trait GameEvent: Send + Sync + Debug + 'static {
    /// Name used in logs.
    fn event_type() -> &'static str
    where
        Self: Sized;
}

/// Snapshot of a player whose replicated state changed this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStateUpdated {
    pub entity_id: PlayerId,
    pub position: Vec3,
    pub orientation: Quat,
    pub health: i32,
    pub max_health: i32,
    pub will: i32,
    pub max_will: i32,
    pub movement_state: MovementState,
    pub animation_state: AnimationState,
    pub status_effects: Vec<StatusEffect>,
}

impl EntityStateUpdated {
    pub fn from_player(player: &Player) -> Self {
        Self {
            entity_id: player.id(),
            position: player.position(),
            orientation: player.orientation(),
            health: player.health(),
            max_health: player.max_health(),
            will: player.will(),
            max_will: player.max_will(),
            movement_state: player.movement_state(),
            animation_state: player.animation_state(),
            status_effects: player.status_effects().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiftStepExecuted {
    pub outcome: RiftStepOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiftStepFailed {
    pub player_id: PlayerId,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityDealtDamage {
    pub details: DamageApplicationDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttackMissed {
    pub attacker_id: PlayerId,
    pub is_melee: bool,
    pub animation_tag: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicAttackFailed {
    pub player_id: PlayerId,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileSpawned {
    pub projectile: SpawnedProjectile,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbilityFailed {
    pub player_id: PlayerId,
    pub ability_id: u32,
    pub reason: FailureReason,
}

/// A player left the shard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityRemoved {
    pub entity_id: EntityId,
}

macro_rules! game_events {
    ($($ty:ident),* $(,)?) => {
        $(
            impl GameEvent for $ty {
                fn event_type() -> &'static str {
                    stringify!($ty)
                }
            }
        )*
    };
}

game_events!(
    EntityStateUpdated,
    RiftStepExecuted,
    RiftStepFailed,
    EntityDealtDamage,
    AttackMissed,
    BasicAttackFailed,
    ProjectileSpawned,
    AbilityFailed,
    EntityRemoved,
);
