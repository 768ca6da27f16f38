//! Basic attacks, projectile abilities and projectile impacts.

use crate::commands::{EntityId, PlayerId, BASIC_ATTACK_ABILITY_ID, RIFTSTEP_ABILITY_ID};
use crate::gameplay::outcome::{
    AttackOutcome, CombatEventType, DamageApplicationDetails, DamageInstance, FailureReason,
    SpawnedProjectile,
};
use crate::math::{normalize_or_zero, WORLD_FORWARD};
use crate::physics::{
    BodyHandle, BodyKind, CapsuleShape, PhysicsWorld, ProjectileImpact, ProjectileSpawn,
};
use crate::player::DamageType;
use crate::player_manager::PlayerManager;
use glam::Vec3;
use log::{debug, warn};
use std::collections::HashMap;
use std::time::Instant;

const RANGED_ANIMATION_TAG: &str = "RangedAttack_Generic";

/// Shape and reach of the melee swing.
#[derive(Debug, Clone, PartialEq)]
pub struct MeleeAttackProperties {
    pub sweep_distance: f32,
    pub capsule_radius: f32,
    /// How far in front of the caster the sweep begins.
    pub sweep_start_offset: f32,
    pub weapon_range: f32,
    /// Minimum cosine between the aim direction and a target.
    pub cone_cos_threshold: f32,
    pub damage: DamageInstance,
    pub animation_tag: String,
}

impl Default for MeleeAttackProperties {
    fn default() -> Self {
        Self {
            sweep_distance: 2.0,
            capsule_radius: 0.6,
            sweep_start_offset: 0.5,
            weapon_range: 3.0,
            cone_cos_threshold: 0.5,
            damage: DamageInstance::new(15, DamageType::Physical),
            animation_tag: "BasicMelee_Sword_01".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileAbility {
    pub ability_id: u32,
    pub name: String,
    pub speed: f32,
    pub damage: DamageInstance,
    pub radius: f32,
    pub gravity_enabled: bool,
    pub max_range: f32,
    pub cooldown_secs: f32,
    pub vfx_tag: String,
}

impl ProjectileAbility {
    /// Fired by the basic attack when a ranged weapon is equipped. Its cooldown
    /// comes from the caster's basic attack cooldown instead.
    pub fn ranged_basic_attack() -> Self {
        Self {
            ability_id: BASIC_ATTACK_ABILITY_ID,
            name: "Ranged Attack".to_string(),
            speed: 40.0,
            damage: DamageInstance::new(20, DamageType::Physical),
            radius: 0.1,
            gravity_enabled: false,
            max_range: 80.0,
            cooldown_secs: 0.0,
            vfx_tag: "VFX_Bolt_Flying_Basic".to_string(),
        }
    }

    pub fn arrow_shot() -> Self {
        Self {
            ability_id: 3,
            name: "Arrow Shot".to_string(),
            speed: 40.0,
            damage: DamageInstance::new(20, DamageType::Physical),
            radius: 0.05,
            gravity_enabled: true,
            max_range: 100.0,
            cooldown_secs: 0.8,
            vfx_tag: "VFX_Arrow_Flying_Standard".to_string(),
        }
    }

    pub fn arcane_bolt() -> Self {
        Self {
            ability_id: 4,
            name: "Arcane Bolt".to_string(),
            speed: 25.0,
            damage: DamageInstance::new(30, DamageType::Aetherial),
            radius: 0.15,
            gravity_enabled: false,
            max_range: 60.0,
            cooldown_secs: 2.0,
            vfx_tag: "VFX_Arcane_Bolt".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbilityDefinition {
    RiftStep,
    /// The weapon's basic attack, aimed along the caster's forward vector.
    BasicAttack,
    Projectile(ProjectileAbility),
}

/// Abilities a client may name in a use-ability request.
#[derive(Debug, Clone)]
pub struct AbilityBook {
    abilities: HashMap<u32, AbilityDefinition>,
}

impl Default for AbilityBook {
    fn default() -> Self {
        let mut book = Self {
            abilities: HashMap::new(),
        };
        book.register(RIFTSTEP_ABILITY_ID, AbilityDefinition::RiftStep);
        book.register(BASIC_ATTACK_ABILITY_ID, AbilityDefinition::BasicAttack);
        let arrow = ProjectileAbility::arrow_shot();
        book.register(arrow.ability_id, AbilityDefinition::Projectile(arrow));
        let bolt = ProjectileAbility::arcane_bolt();
        book.register(bolt.ability_id, AbilityDefinition::Projectile(bolt));
        book
    }
}

impl AbilityBook {
    pub fn register(&mut self, ability_id: u32, definition: AbilityDefinition) {
        self.abilities.insert(ability_id, definition);
    }

    pub fn get(&self, ability_id: u32) -> Option<&AbilityDefinition> {
        self.abilities.get(&ability_id)
    }
}

/// Where a projectile should head. Earlier fields win.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProjectileRequest {
    pub target_position: Option<Vec3>,
    pub target_entity_id: Option<EntityId>,
    pub aim_direction: Option<Vec3>,
}

/// Picks the launch direction: explicit target position, then target entity,
/// then aim. A degenerate result falls back to the caster's forward and finally to
/// world forward.
pub fn projectile_direction(
    origin: Vec3,
    target_position: Option<Vec3>,
    target_entity_position: Option<Vec3>,
    aim_direction: Option<Vec3>,
    caster_forward: Vec3,
) -> Vec3 {
    let candidate = target_position
        .map(|p| p - origin)
        .or_else(|| target_entity_position.map(|p| p - origin))
        .or(aim_direction)
        .unwrap_or(caster_forward);

    let dir = normalize_or_zero(candidate);
    if dir != Vec3::ZERO {
        return dir;
    }
    let dir = normalize_or_zero(caster_forward);
    if dir != Vec3::ZERO {
        return dir;
    }
    WORLD_FORWARD
}

/// Sweeps in front of the caster and damages every live player inside range and
/// the aim cone. No targets is a successful miss.
pub fn process_basic_melee_attack(
    caster_id: PlayerId,
    aim_direction: Vec3,
    players: &mut PlayerManager,
    physics: &dyn PhysicsWorld,
    props: &MeleeAttackProperties,
    now: Instant,
) -> AttackOutcome {
    let Some(caster) = players.find_player(caster_id) else {
        return AttackOutcome::failed(true, FailureReason::CasterNotFound);
    };
    if let Err(reason) = caster.check_ability_ready(BASIC_ATTACK_ABILITY_ID, now) {
        return AttackOutcome::failed(true, reason);
    }

    let origin = caster.position();
    let forward = caster.forward_vector();
    let aim = match normalize_or_zero(aim_direction) {
        v if v == Vec3::ZERO => forward,
        v => v,
    };
    let sweep_start = origin + forward * props.sweep_start_offset;
    let shape = CapsuleShape::new(props.capsule_radius, caster.capsule_half_height());
    let cooldown_secs = caster.basic_attack_cooldown_secs();

    let hits = match physics.sweep_capsule_all(
        sweep_start,
        shape,
        forward,
        props.sweep_distance,
        Some(BodyHandle::character(caster_id)),
    ) {
        Ok(hits) => hits,
        Err(e) => {
            warn!("Melee sweep for player {} failed: {}", caster_id, e);
            return AttackOutcome::failed(true, FailureReason::SceneUnavailable);
        }
    };

    let mut targets: Vec<PlayerId> = Vec::new();
    for hit in hits {
        let target_id = hit.body.entity_id;
        if hit.body.kind != BodyKind::Character
            || target_id == caster_id
            || targets.contains(&target_id)
        {
            continue;
        }
        let Some(target) = players.find_player(target_id) else {
            continue;
        };
        if target.is_dead() {
            continue;
        }
        let to_target = target.position() - origin;
        if to_target.length() > props.weapon_range {
            continue;
        }
        let dir = normalize_or_zero(to_target);
        if dir != Vec3::ZERO && aim.dot(dir) < props.cone_cos_threshold {
            continue;
        }
        targets.push(target_id);
    }

    if let Some(caster) = players.find_player_mut(caster_id) {
        caster.start_ability_cooldown(BASIC_ATTACK_ABILITY_ID, cooldown_secs, now);
    }

    let mut damage_events = Vec::with_capacity(targets.len());
    for target_id in targets {
        let Some(target) = players.find_player_mut(target_id) else {
            continue;
        };
        let dealt = target.take_damage(props.damage.amount, props.damage.damage_type);
        damage_events.push(DamageApplicationDetails {
            target_id,
            source_id: caster_id,
            final_damage: dealt,
            damage_type: props.damage.damage_type,
            was_crit: props.damage.is_crit,
            was_kill: target.is_dead(),
        });
    }

    let event_type = if damage_events.is_empty() {
        CombatEventType::Miss
    } else {
        CombatEventType::DamageDealt
    };
    debug!(
        "Player {} melee swing: {:?}, {} target(s)",
        caster_id,
        event_type,
        damage_events.len()
    );

    AttackOutcome {
        success: true,
        is_melee: true,
        event_type,
        damage_events,
        spawned_projectile: None,
        failure: None,
        animation_tag: props.animation_tag.clone(),
    }
}

/// Spawns a projectile for `ability` from the caster's muzzle.
///
/// `cooldown_secs` overrides the ability's own cooldown when given.
pub fn launch_projectile(
    caster_id: PlayerId,
    ability: &ProjectileAbility,
    request: &ProjectileRequest,
    cooldown_secs: Option<f32>,
    players: &mut PlayerManager,
    physics: &mut dyn PhysicsWorld,
    now: Instant,
) -> AttackOutcome {
    let Some(caster) = players.find_player(caster_id) else {
        return AttackOutcome::failed(false, FailureReason::CasterNotFound);
    };
    if let Err(reason) = caster.check_ability_ready(ability.ability_id, now) {
        return AttackOutcome::failed(false, reason);
    }

    let start = caster.muzzle_position();
    let forward = caster.forward_vector();
    let target_entity_position = request.target_entity_id.and_then(|id| {
        let position = players.find_player(id).map(|p| p.position());
        if position.is_none() {
            debug!("Projectile target {} not found, using aim", id);
        }
        position
    });
    let direction = projectile_direction(
        start,
        request.target_position,
        target_entity_position,
        request.aim_direction,
        forward,
    );

    let projectile_id = players.next_projectile_id();
    let spawn = ProjectileSpawn {
        projectile_id,
        owner_id: caster_id,
        position: start,
        velocity: direction * ability.speed,
        radius: ability.radius,
        gravity_enabled: ability.gravity_enabled,
        max_range: ability.max_range,
        damage: ability.damage,
    };
    if let Err(e) = physics.spawn_projectile(spawn) {
        warn!("Projectile spawn for player {} failed: {}", caster_id, e);
        return AttackOutcome::failed(false, FailureReason::ProjectileCreationFailed);
    }

    if let Some(caster) = players.find_player_mut(caster_id) {
        caster.start_ability_cooldown(
            ability.ability_id,
            cooldown_secs.unwrap_or(ability.cooldown_secs),
            now,
        );
    }

    AttackOutcome {
        success: true,
        is_melee: false,
        event_type: CombatEventType::None,
        damage_events: Vec::new(),
        spawned_projectile: Some(SpawnedProjectile {
            projectile_id,
            owner_id: caster_id,
            ability_id: ability.ability_id,
            start_position: start,
            direction,
            speed: ability.speed,
            max_range: ability.max_range,
            damage: ability.damage,
            vfx_tag: ability.vfx_tag.clone(),
        }),
        failure: None,
        animation_tag: RANGED_ANIMATION_TAG.to_string(),
    }
}

/// Applies a projectile hit to the struck player, if it struck a live one other
/// than its owner.
pub fn apply_projectile_impact(
    impact: &ProjectileImpact,
    players: &mut PlayerManager,
) -> Option<DamageApplicationDetails> {
    if impact.struck.kind != BodyKind::Character || impact.struck.entity_id == impact.owner_id {
        return None;
    }
    let target = players.find_player_mut(impact.struck.entity_id)?;
    if target.is_dead() {
        return None;
    }
    let dealt = target.take_damage(impact.damage.amount, impact.damage.damage_type);
    Some(DamageApplicationDetails {
        target_id: impact.struck.entity_id,
        source_id: impact.owner_id,
        final_damage: dealt,
        damage_type: impact.damage.damage_type,
        was_crit: impact.damage.is_crit,
        was_kill: target.is_dead(),
    })
}
