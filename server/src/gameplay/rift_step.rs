//! RiftStep: a short-range blink with optional area effects at either end.
//!
//! Resolution is split in two. [`resolve_rift_step`] only reads the player and
//! queries physics, so a refused or failed step never touches state.
//! [`commit_rift_step`] then applies the result.

use crate::commands::{RiftStepDirectionalIntent, RIFTSTEP_ABILITY_ID};
use crate::error::PhysicsError;
use crate::gameplay::outcome::{
    DamageInstance, EffectPayload, FailureReason, GameplayEffectInstance, RiftStepOutcome,
};
use crate::math::{forward_vector, normalize_or_zero, right_vector, WORLD_FORWARD};
use crate::physics::{BodyHandle, CapsuleShape, PhysicsWorld};
use crate::player::{DamageType, MovementState, Player, StatusEffect};
use glam::{Quat, Vec3};
use log::{debug, warn};
use std::time::Instant;

/// Distance kept between the caster and whatever stopped the step.
pub const RIFT_STEP_SKIN_MARGIN: f32 = 0.06;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RiftStepType {
    #[default]
    None,
    Basic,
    SolarExplosionExit,
    SolarFlareBlindEntrance,
    GlacialFrozenAttackerEntrance,
    GlacialChilledGroundExit,
    RootingVinesEntrance,
    NatureShieldExit,
    StealthEntrance,
}

/// Effect shape carried by a definition; anchored to a position when the step
/// resolves.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectTemplate {
    pub radius: f32,
    pub duration_ms: u32,
    pub payload: EffectPayload,
    pub vfx_tag: String,
}

impl EffectTemplate {
    fn new(radius: f32, duration_ms: u32, payload: EffectPayload, vfx_tag: &str) -> Self {
        Self {
            radius,
            duration_ms,
            payload,
            vfx_tag: vfx_tag.to_string(),
        }
    }

    pub fn instantiate(&self, center: Vec3) -> GameplayEffectInstance {
        GameplayEffectInstance {
            center,
            radius: self.radius,
            duration_ms: self.duration_ms,
            payload: self.payload.clone(),
            vfx_tag: self.vfx_tag.clone(),
        }
    }
}

/// Tuning for one RiftStep variant.
#[derive(Debug, Clone, PartialEq)]
pub struct RiftStepDefinition {
    pub kind: RiftStepType,
    pub name: String,
    pub max_travel_distance: f32,
    pub base_cooldown_secs: f32,
    pub travel_duration_secs: f32,
    pub start_vfx_id: String,
    pub travel_vfx_id: String,
    pub end_vfx_id: String,
    /// Anchored at the start position.
    pub entry_effects: Vec<EffectTemplate>,
    /// Anchored at the final position.
    pub exit_effects: Vec<EffectTemplate>,
}

impl RiftStepDefinition {
    fn with_kind(kind: RiftStepType, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            max_travel_distance: 15.0,
            base_cooldown_secs: 1.25,
            travel_duration_secs: 0.05,
            start_vfx_id: "vfx_riftstep_basic_start".to_string(),
            travel_vfx_id: "vfx_riftstep_basic_travel".to_string(),
            end_vfx_id: "vfx_riftstep_basic_end".to_string(),
            entry_effects: Vec::new(),
            exit_effects: Vec::new(),
        }
    }

    pub fn basic() -> Self {
        Self::with_kind(RiftStepType::Basic, "Basic Rift Step")
    }

    pub fn solar_explosion_exit() -> Self {
        let mut def = Self::with_kind(RiftStepType::SolarExplosionExit, "Solar Explosion");
        def.exit_effects.push(EffectTemplate::new(
            5.0,
            0,
            EffectPayload::AreaDamage(DamageInstance::new(35, DamageType::Radiant)),
            "vfx_solar_explosion",
        ));
        def
    }

    pub fn solar_flare_blind_entrance() -> Self {
        let mut def = Self::with_kind(RiftStepType::SolarFlareBlindEntrance, "Solar Flare");
        def.entry_effects.push(EffectTemplate::new(
            5.0,
            2000,
            EffectPayload::ApplyStatus(StatusEffect::AwarenessReduced),
            "vfx_solar_flare",
        ));
        def
    }

    pub fn glacial_frozen_attacker_entrance() -> Self {
        let mut def =
            Self::with_kind(RiftStepType::GlacialFrozenAttackerEntrance, "Glacial Freeze");
        def.entry_effects.push(EffectTemplate::new(
            3.0,
            1500,
            EffectPayload::AreaStun {
                stun_duration_ms: 1500,
            },
            "vfx_glacial_freeze",
        ));
        def
    }

    pub fn glacial_chilled_ground_exit() -> Self {
        let mut def = Self::with_kind(RiftStepType::GlacialChilledGroundExit, "Chilled Ground");
        def.exit_effects.push(EffectTemplate::new(
            4.0,
            5000,
            EffectPayload::PersistentArea {
                status: Some(StatusEffect::Slowed),
                periodic_damage: Some(DamageInstance::new(4, DamageType::Frost)),
            },
            "vfx_glacial_chill_ground",
        ));
        def
    }

    pub fn rooting_vines_entrance() -> Self {
        let mut def = Self::with_kind(RiftStepType::RootingVinesEntrance, "Rooting Vines");
        def.entry_effects.push(EffectTemplate::new(
            3.0,
            2500,
            EffectPayload::ApplyStatus(StatusEffect::Rooted),
            "vfx_rooting_vines",
        ));
        def
    }

    pub fn nature_shield_exit() -> Self {
        let mut def = Self::with_kind(RiftStepType::NatureShieldExit, "Nature's Ward");
        def.exit_effects.push(EffectTemplate::new(
            0.5,
            5000,
            EffectPayload::ApplyStatus(StatusEffect::DamageAbsorptionShield),
            "vfx_nature_shield_exit",
        ));
        def.exit_effects.push(EffectTemplate::new(
            3.0,
            3000,
            EffectPayload::PersistentArea {
                status: Some(StatusEffect::HealOverTime),
                periodic_damage: None,
            },
            "vfx_nature_heal_aura",
        ));
        def
    }

    pub fn stealth_entrance() -> Self {
        let mut def = Self::with_kind(RiftStepType::StealthEntrance, "Shadow Slip");
        def.entry_effects.push(EffectTemplate::new(
            0.5,
            3000,
            EffectPayload::ApplyStatus(StatusEffect::Stealthed),
            "vfx_stealth_entrance",
        ));
        def
    }

    pub fn for_type(kind: RiftStepType) -> Option<Self> {
        let def = match kind {
            RiftStepType::None => return None,
            RiftStepType::Basic => Self::basic(),
            RiftStepType::SolarExplosionExit => Self::solar_explosion_exit(),
            RiftStepType::SolarFlareBlindEntrance => Self::solar_flare_blind_entrance(),
            RiftStepType::GlacialFrozenAttackerEntrance => Self::glacial_frozen_attacker_entrance(),
            RiftStepType::GlacialChilledGroundExit => Self::glacial_chilled_ground_exit(),
            RiftStepType::RootingVinesEntrance => Self::rooting_vines_entrance(),
            RiftStepType::NatureShieldExit => Self::nature_shield_exit(),
            RiftStepType::StealthEntrance => Self::stealth_entrance(),
        };
        Some(def)
    }
}

/// Unit world direction of a step taken with `intent` while facing `orientation`.
pub fn travel_direction(orientation: Quat, intent: RiftStepDirectionalIntent) -> Vec3 {
    let raw = match intent {
        RiftStepDirectionalIntent::Forward => forward_vector(orientation),
        RiftStepDirectionalIntent::Backward | RiftStepDirectionalIntent::DefaultBackward => {
            -forward_vector(orientation)
        }
        RiftStepDirectionalIntent::Left => -right_vector(orientation),
        RiftStepDirectionalIntent::Right => right_vector(orientation),
    };
    let dir = normalize_or_zero(raw);
    if dir == Vec3::ZERO {
        -WORLD_FORWARD
    } else {
        dir
    }
}

/// Works out where a step would land without changing anything.
pub fn resolve_rift_step(
    player: &Player,
    intent: RiftStepDirectionalIntent,
    physics: &dyn PhysicsWorld,
    now: Instant,
) -> RiftStepOutcome {
    let start = player.position();
    if let Err(reason) = player.check_ability_ready(RIFTSTEP_ABILITY_ID, now) {
        return RiftStepOutcome::failed(player.id(), reason, start);
    }

    let def = player.rift_step();
    let direction = travel_direction(player.orientation(), intent);
    let intended = start + direction * def.max_travel_distance;
    let shape = CapsuleShape::new(player.capsule_radius(), player.capsule_half_height());

    let hit = match physics.sweep_capsule(
        start,
        shape,
        direction,
        def.max_travel_distance,
        Some(BodyHandle::character(player.id())),
    ) {
        Ok(hit) => hit,
        Err(e) => {
            warn!("RiftStep sweep for player {} failed: {}", player.id(), e);
            return RiftStepOutcome::failed(player.id(), FailureReason::SceneUnavailable, start);
        }
    };

    let final_position = match hit {
        Some(hit) => {
            let travel = (hit.distance - RIFT_STEP_SKIN_MARGIN).clamp(0.0, def.max_travel_distance);
            debug!(
                "RiftStep of player {} blocked by {:?} after {:.2}m",
                player.id(),
                hit.body,
                travel
            );
            start + direction * travel
        }
        None => intended,
    };

    RiftStepOutcome {
        success: true,
        failure: None,
        rift_step_type: def.kind,
        instigator_id: player.id(),
        start_position: start,
        intended_target_position: intended,
        final_position,
        travel_duration_secs: def.travel_duration_secs,
        entry_effects: def.entry_effects.iter().map(|e| e.instantiate(start)).collect(),
        exit_effects: def
            .exit_effects
            .iter()
            .map(|e| e.instantiate(final_position))
            .collect(),
        start_vfx_id: def.start_vfx_id.clone(),
        travel_vfx_id: def.travel_vfx_id.clone(),
        end_vfx_id: def.end_vfx_id.clone(),
    }
}

/// Applies a successful outcome: teleports the controller and player, then starts
/// the cooldown. The controller is moved first so a failure leaves the player as
/// it was.
pub fn commit_rift_step(
    player: &mut Player,
    physics: &mut dyn PhysicsWorld,
    outcome: &RiftStepOutcome,
    now: Instant,
) -> Result<(), PhysicsError> {
    physics.set_controller_position(player.id(), outcome.final_position)?;

    player.set_movement_state(MovementState::Rifting);
    player.set_position(outcome.final_position);
    let base_cooldown = player.rift_step().base_cooldown_secs;
    player.start_ability_cooldown(RIFTSTEP_ABILITY_ID, base_cooldown, now);
    player.settle_movement_state();
    Ok(())
}

/// Resolves and, when allowed, commits a step.
pub fn execute_rift_step(
    player: &mut Player,
    physics: &mut dyn PhysicsWorld,
    intent: RiftStepDirectionalIntent,
    now: Instant,
) -> RiftStepOutcome {
    let outcome = resolve_rift_step(player, intent, physics, now);
    if !outcome.success {
        return outcome;
    }
    if let Err(e) = commit_rift_step(player, physics, &outcome, now) {
        warn!("Could not move player {} for RiftStep: {}", player.id(), e);
        return RiftStepOutcome::failed(
            player.id(),
            FailureReason::SceneUnavailable,
            player.position(),
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::from_angle_axis_degrees;
    use crate::player::AnimationState;
    use crate::math::WORLD_UP;
    use crate::physics::testing::OfflinePhysics;
    use crate::physics::SimplePhysics;
    use assert_approx_eq::assert_approx_eq;
    use std::time::Duration;

    fn setup() -> (Player, SimplePhysics) {
        let player = Player::new(7, Vec3::ZERO, Quat::IDENTITY);
        let mut physics = SimplePhysics::new();
        physics
            .create_character_controller(7, Vec3::ZERO, CapsuleShape::new(0.5, 0.9))
            .unwrap();
        (player, physics)
    }

    #[test]
    fn test_directions_follow_orientation() {
        let q = Quat::IDENTITY;
        assert_eq!(travel_direction(q, RiftStepDirectionalIntent::Forward), Vec3::Y);
        assert_eq!(travel_direction(q, RiftStepDirectionalIntent::Backward), -Vec3::Y);
        assert_eq!(
            travel_direction(q, RiftStepDirectionalIntent::DefaultBackward),
            -Vec3::Y
        );
        assert_eq!(travel_direction(q, RiftStepDirectionalIntent::Left), -Vec3::X);
        assert_eq!(travel_direction(q, RiftStepDirectionalIntent::Right), Vec3::X);

        let turned = from_angle_axis_degrees(90.0, WORLD_UP);
        let forward = travel_direction(turned, RiftStepDirectionalIntent::Forward);
        assert_approx_eq!(forward.x, -1.0, 1e-5);
    }

    #[test]
    fn test_unobstructed_step_travels_full_distance() {
        let (mut player, mut physics) = setup();
        let now = Instant::now();

        let outcome = execute_rift_step(
            &mut player,
            &mut physics,
            RiftStepDirectionalIntent::DefaultBackward,
            now,
        );

        assert!(outcome.success);
        assert_eq!(outcome.rift_step_type, RiftStepType::Basic);
        assert_approx_eq!(outcome.final_position.y, -15.0, 1e-4);
        assert_eq!(outcome.final_position, outcome.intended_target_position);
        assert!(!outcome.was_obstructed());
        assert_eq!(player.position(), outcome.final_position);
        assert_eq!(physics.controller_position(7), Some(outcome.final_position));
        assert_eq!(player.movement_state(), MovementState::Idle);
        assert!(player.is_ability_on_cooldown(RIFTSTEP_ABILITY_ID, now));
        assert_eq!(outcome.start_vfx_id, "vfx_riftstep_basic_start");
    }

    #[test]
    fn test_step_returns_to_latched_movement_state() {
        let (mut player, mut physics) = setup();
        player.apply_movement_intent(Vec3::Y, true);
        assert_eq!(player.movement_state(), MovementState::Sprinting);

        let outcome = execute_rift_step(
            &mut player,
            &mut physics,
            RiftStepDirectionalIntent::Forward,
            Instant::now(),
        );
        assert!(outcome.success);
        assert_eq!(player.movement_state(), MovementState::Sprinting);
        assert_eq!(player.animation_state(), AnimationState::Running);
    }

    #[test]
    fn test_wall_stops_step_short_with_margin() {
        let (mut player, mut physics) = setup();
        // Box face at y = -5.5; the capsule touches it after 5.0m.
        physics
            .create_static_box(100, Vec3::new(0.0, -6.0, 0.0), Vec3::new(2.0, 0.5, 2.0))
            .unwrap();

        let outcome = execute_rift_step(
            &mut player,
            &mut physics,
            RiftStepDirectionalIntent::Backward,
            Instant::now(),
        );

        assert!(outcome.success);
        assert!(outcome.was_obstructed());
        assert_approx_eq!(outcome.final_position.y, -(5.0 - RIFT_STEP_SKIN_MARGIN), 1e-4);
        assert_approx_eq!(outcome.intended_target_position.y, -15.0, 1e-4);
    }

    #[test]
    fn test_contact_closer_than_margin_stays_put() {
        let (mut player, mut physics) = setup();
        physics
            .create_static_box(100, Vec3::new(0.0, -1.02, 0.0), Vec3::new(2.0, 0.5, 2.0))
            .unwrap();

        let outcome = resolve_rift_step(
            &player,
            RiftStepDirectionalIntent::Backward,
            &physics,
            Instant::now(),
        );
        assert!(outcome.success);
        assert_eq!(outcome.final_position, player.position());
        execute_rift_step(
            &mut player,
            &mut physics,
            RiftStepDirectionalIntent::Backward,
            Instant::now(),
        );
        assert_eq!(player.position(), Vec3::ZERO);
    }

    #[test]
    fn test_cooldown_refuses_second_step() {
        let (mut player, mut physics) = setup();
        let now = Instant::now();
        let forward = RiftStepDirectionalIntent::Forward;
        assert!(execute_rift_step(&mut player, &mut physics, forward, now).success);
        let landed = player.position();

        let second = execute_rift_step(
            &mut player,
            &mut physics,
            RiftStepDirectionalIntent::Forward,
            now + Duration::from_millis(100),
        );
        assert!(!second.success);
        assert_eq!(second.failure, Some(FailureReason::OnCooldown));
        assert_eq!(player.position(), landed);

        let later = execute_rift_step(
            &mut player,
            &mut physics,
            RiftStepDirectionalIntent::Forward,
            now + Duration::from_secs(2),
        );
        assert!(later.success);
    }

    #[test]
    fn test_stunned_player_cannot_step() {
        let (mut player, mut physics) = setup();
        player.set_movement_state(MovementState::Stunned);
        let outcome = execute_rift_step(
            &mut player,
            &mut physics,
            RiftStepDirectionalIntent::Forward,
            Instant::now(),
        );
        assert_eq!(
            outcome.failure,
            Some(FailureReason::InvalidState(MovementState::Stunned))
        );
        assert_eq!(player.position(), Vec3::ZERO);
    }

    #[test]
    fn test_scene_failure_leaves_player_untouched() {
        let mut player = Player::new(7, Vec3::ZERO, Quat::IDENTITY);
        let mut physics = OfflinePhysics;
        let now = Instant::now();
        let outcome =
            execute_rift_step(&mut player, &mut physics, RiftStepDirectionalIntent::Left, now);
        assert_eq!(outcome.failure, Some(FailureReason::SceneUnavailable));
        assert!(!player.is_ability_on_cooldown(RIFTSTEP_ABILITY_ID, now));
        assert_eq!(player.position(), Vec3::ZERO);
    }

    #[test]
    fn test_effects_anchor_at_entry_and_exit() {
        let (mut player, mut physics) = setup();
        player.set_rift_step(RiftStepDefinition::solar_explosion_exit());
        let outcome = execute_rift_step(
            &mut player,
            &mut physics,
            RiftStepDirectionalIntent::Right,
            Instant::now(),
        );
        assert_eq!(outcome.rift_step_type, RiftStepType::SolarExplosionExit);
        assert!(outcome.entry_effects.is_empty());
        assert_eq!(outcome.exit_effects.len(), 1);
        assert_eq!(outcome.exit_effects[0].center, outcome.final_position);
        assert_approx_eq!(outcome.exit_effects[0].radius, 5.0);

        player.set_rift_step(RiftStepDefinition::rooting_vines_entrance());
        let start = player.position();
        let outcome = execute_rift_step(
            &mut player,
            &mut physics,
            RiftStepDirectionalIntent::Left,
            Instant::now() + Duration::from_secs(5),
        );
        assert_eq!(outcome.entry_effects[0].center, start);
        assert_eq!(
            outcome.entry_effects[0].payload,
            EffectPayload::ApplyStatus(StatusEffect::Rooted)
        );
    }

    #[test]
    fn test_every_variant_has_a_definition() {
        assert!(RiftStepDefinition::for_type(RiftStepType::None).is_none());
        let nature = RiftStepDefinition::for_type(RiftStepType::NatureShieldExit).unwrap();
        assert_eq!(nature.exit_effects.len(), 2);
        assert_eq!(nature.exit_effects[0].vfx_tag, "vfx_nature_shield_exit");
        let chill = RiftStepDefinition::for_type(RiftStepType::GlacialChilledGroundExit).unwrap();
        assert_eq!(chill.exit_effects[0].duration_ms, 5000);
    }
}
