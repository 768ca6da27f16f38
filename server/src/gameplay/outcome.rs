//! Result values produced by gameplay resolution.
//!
//! Outcomes are plain data. They say what happened, and the event formatters decide
//! how it is sent out.

use crate::commands::{EntityId, PlayerId};
use crate::gameplay::rift_step::RiftStepType;
use crate::player::{DamageType, MovementState, StatusEffect};
use glam::Vec3;
use std::fmt;

/// Why a gameplay action was refused or could not be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    CasterNotFound,
    OnCooldown,
    InvalidState(MovementState),
    SceneUnavailable,
    UnknownAbility(u32),
    ProjectileCreationFailed,
}

impl FailureReason {
    /// Stable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::CasterNotFound => "CASTER_NOT_FOUND",
            FailureReason::OnCooldown => "ON_COOLDOWN",
            FailureReason::InvalidState(_) => "INVALID_STATE",
            FailureReason::SceneUnavailable => "SCENE_UNAVAILABLE",
            FailureReason::UnknownAbility(_) => "UNKNOWN_ABILITY",
            FailureReason::ProjectileCreationFailed => "PROJECTILE_PHYSICS_CREATION_FAILED",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::InvalidState(state) => write!(f, "{} ({:?})", self.code(), state),
            FailureReason::UnknownAbility(id) => write!(f, "{} ({})", self.code(), id),
            _ => f.write_str(self.code()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageInstance {
    pub amount: i32,
    pub damage_type: DamageType,
    pub is_crit: bool,
}

impl DamageInstance {
    pub fn new(amount: i32, damage_type: DamageType) -> Self {
        Self {
            amount,
            damage_type,
            is_crit: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EffectPayload {
    AreaDamage(DamageInstance),
    AreaStun { stun_duration_ms: u32 },
    ApplyStatus(StatusEffect),
    /// A lingering zone that keeps applying its status and/or damage.
    PersistentArea {
        status: Option<StatusEffect>,
        periodic_damage: Option<DamageInstance>,
    },
}

/// An area-shaped, time-bounded effect anchored at a world position.
#[derive(Debug, Clone, PartialEq)]
pub struct GameplayEffectInstance {
    pub center: Vec3,
    pub radius: f32,
    pub duration_ms: u32,
    pub payload: EffectPayload,
    pub vfx_tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiftStepOutcome {
    pub success: bool,
    pub failure: Option<FailureReason>,
    pub rift_step_type: RiftStepType,
    pub instigator_id: PlayerId,
    pub start_position: Vec3,
    /// Where the step would have ended without obstruction.
    pub intended_target_position: Vec3,
    /// Where the step actually ended.
    pub final_position: Vec3,
    pub travel_duration_secs: f32,
    pub entry_effects: Vec<GameplayEffectInstance>,
    pub exit_effects: Vec<GameplayEffectInstance>,
    pub start_vfx_id: String,
    pub travel_vfx_id: String,
    pub end_vfx_id: String,
}

impl RiftStepOutcome {
    pub fn failed(instigator_id: PlayerId, reason: FailureReason, start_position: Vec3) -> Self {
        Self {
            success: false,
            failure: Some(reason),
            rift_step_type: RiftStepType::None,
            instigator_id,
            start_position,
            intended_target_position: start_position,
            final_position: start_position,
            travel_duration_secs: 0.0,
            entry_effects: Vec::new(),
            exit_effects: Vec::new(),
            start_vfx_id: String::new(),
            travel_vfx_id: String::new(),
            end_vfx_id: String::new(),
        }
    }

    /// True when geometry stopped the step short of its intended target.
    pub fn was_obstructed(&self) -> bool {
        self.success
            && self
                .final_position
                .distance_squared(self.intended_target_position)
                > 1e-8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatEventType {
    None,
    DamageDealt,
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageApplicationDetails {
    pub target_id: EntityId,
    pub source_id: EntityId,
    pub final_damage: i32,
    pub damage_type: DamageType,
    pub was_crit: bool,
    pub was_kill: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnedProjectile {
    pub projectile_id: EntityId,
    pub owner_id: PlayerId,
    pub ability_id: u32,
    pub start_position: Vec3,
    pub direction: Vec3,
    pub speed: f32,
    pub max_range: f32,
    pub damage: DamageInstance,
    pub vfx_tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttackOutcome {
    pub success: bool,
    pub is_melee: bool,
    pub event_type: CombatEventType,
    pub damage_events: Vec<DamageApplicationDetails>,
    pub spawned_projectile: Option<SpawnedProjectile>,
    pub failure: Option<FailureReason>,
    pub animation_tag: String,
}

impl AttackOutcome {
    pub fn failed(is_melee: bool, reason: FailureReason) -> Self {
        Self {
            success: false,
            is_melee,
            event_type: CombatEventType::None,
            damage_events: Vec::new(),
            spawned_projectile: None,
            failure: Some(reason),
            animation_tag: String::new(),
        }
    }
}
