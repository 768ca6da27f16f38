//! Authoritative per-player state.
//!
//! Every mutation goes through a setter that compares before writing and raises the
//! dirty flag only on a real change, so the end-of-tick publication sends nothing for
//! players that did not change.

use crate::commands::PlayerId;
use crate::gameplay::outcome::FailureReason;
use crate::gameplay::rift_step::RiftStepDefinition;
use crate::math::{self, forward_vector, normalize_quat, orientations_match, right_vector};
use glam::{Quat, Vec3};
use log::debug;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const DEFAULT_CAPSULE_RADIUS: f32 = 0.5;
pub const DEFAULT_CAPSULE_HALF_HEIGHT: f32 = 0.9;
pub const DEFAULT_MAX_HEALTH: i32 = 250;
pub const DEFAULT_MAX_WILL: i32 = 100;
pub const DEFAULT_BASIC_ATTACK_COOLDOWN_SECS: f32 = 1.0;

/// Moves shorter than 1e-4 units are ignored.
const POSITION_EPSILON_SQ: f32 = 1e-8;
/// Floor applied to every scaled cooldown.
pub const MIN_ABILITY_COOLDOWN_SECS: f32 = 0.05;
/// Movement input shorter than this is read as "stand still".
const MOVEMENT_DEADZONE_SQ: f32 = 1e-4;
/// Projectile spawn point in the player's local frame.
const MUZZLE_OFFSET: Vec3 = Vec3::new(0.0, 1.0, 0.5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MovementState {
    Idle = 0,
    Walking = 1,
    Sprinting = 2,
    Rifting = 3,
    AbilityInUse = 4,
    Stunned = 5,
    Rooted = 6,
    Dead = 7,
}

impl MovementState {
    /// States that ignore movement input.
    pub fn blocks_movement(self) -> bool {
        matches!(
            self,
            MovementState::Stunned | MovementState::Rooted | MovementState::Dead
        )
    }

    /// States in which no ability may be started.
    pub fn blocks_abilities(self) -> bool {
        matches!(
            self,
            MovementState::Stunned
                | MovementState::Rooted
                | MovementState::Dead
                | MovementState::AbilityInUse
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AnimationState {
    Idle = 0,
    Walking = 1,
    Running = 2,
    Rifting = 3,
    Casting = 4,
    Stunned = 5,
    Rooted = 6,
    Dead = 7,
}

impl From<MovementState> for AnimationState {
    fn from(state: MovementState) -> Self {
        match state {
            MovementState::Idle => AnimationState::Idle,
            MovementState::Walking => AnimationState::Walking,
            MovementState::Sprinting => AnimationState::Running,
            MovementState::Rifting => AnimationState::Rifting,
            MovementState::AbilityInUse => AnimationState::Casting,
            MovementState::Stunned => AnimationState::Stunned,
            MovementState::Rooted => AnimationState::Rooted,
            MovementState::Dead => AnimationState::Dead,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DamageType {
    None = 0,
    Physical = 1,
    Radiant = 2,
    Frost = 3,
    Shock = 4,
    Necrotic = 5,
    Void = 6,
    Cosmic = 7,
    Poison = 8,
    Nature = 9,
    Aetherial = 10,
}

/// Flat and percentage reduction against one damage type.
///
/// `percent` is in percentage points, so `25.0` removes a quarter of the damage that
/// survives the flat reduction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Resistance {
    pub flat: i32,
    pub percent: f32,
}

impl Resistance {
    pub fn new(flat: i32, percent: f32) -> Self {
        Self { flat, percent }
    }
}

/// Damage left after `resistance` is applied to `raw`.
///
/// Negative reductions never amplify damage, so the result always lies in `[0, raw]`.
pub fn mitigate_damage(raw: i32, resistance: Resistance) -> i32 {
    if raw <= 0 {
        return 0;
    }
    let after_flat = (raw - resistance.flat.max(0)).max(0);
    let percent = if resistance.percent.is_finite() {
        (resistance.percent / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let reduced = (after_flat as f32 * (1.0 - percent)).floor() as i32;
    reduced.clamp(0, after_flat)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResistanceTable {
    entries: HashMap<DamageType, Resistance>,
}

impl Default for ResistanceTable {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert(DamageType::Physical, Resistance::new(10, 0.0));
        entries.insert(DamageType::Void, Resistance::new(0, -15.0));
        entries.insert(DamageType::Aetherial, Resistance::new(0, -50.0));
        Self { entries }
    }
}

impl ResistanceTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, damage_type: DamageType) -> Resistance {
        self.entries.get(&damage_type).copied().unwrap_or_default()
    }

    pub fn set(&mut self, damage_type: DamageType, resistance: Resistance) {
        self.entries.insert(damage_type, resistance);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusEffect {
    Slowed = 0,
    Rooted = 1,
    Stunned = 2,
    AwarenessReduced = 3,
    DamageAbsorptionShield = 4,
    HealOverTime = 5,
    Stealthed = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WeaponCategory {
    #[default]
    Unarmed,
    Sword,
    Axe,
    Maul,
    Bow,
    Gun,
    Staff,
    Wand,
}

impl WeaponCategory {
    pub fn is_ranged(self) -> bool {
        matches!(
            self,
            WeaponCategory::Bow | WeaponCategory::Gun | WeaponCategory::Staff | WeaponCategory::Wand
        )
    }
}

/// One connected player, owned by its shard's
/// [`PlayerManager`](crate::player_manager::PlayerManager).
#[derive(Debug, Clone)]
pub struct Player {
    id: PlayerId,
    character_id: String,
    position: Vec3,
    orientation: Quat,
    capsule_radius: f32,
    capsule_half_height: f32,
    health: i32,
    max_health: i32,
    will: i32,
    max_will: i32,
    resistances: ResistanceTable,
    cooldown_modifier: f32,
    basic_attack_cooldown_secs: f32,
    weapon: WeaponCategory,
    rift_step: RiftStepDefinition,
    cooldowns: HashMap<u32, Instant>,
    movement_state: MovementState,
    animation_state: AnimationState,
    status_effects: Vec<StatusEffect>,
    movement_intent: Vec3,
    sprint_intent: bool,
    dirty: bool,
}

impl Player {
    /// Creates a player at full health; new players start dirty so their first
    /// state is published.
    pub fn new(id: PlayerId, position: Vec3, orientation: Quat) -> Self {
        Self {
            id,
            character_id: String::new(),
            position,
            orientation: normalize_quat(orientation),
            capsule_radius: DEFAULT_CAPSULE_RADIUS,
            capsule_half_height: DEFAULT_CAPSULE_HALF_HEIGHT,
            health: DEFAULT_MAX_HEALTH,
            max_health: DEFAULT_MAX_HEALTH,
            will: DEFAULT_MAX_WILL,
            max_will: DEFAULT_MAX_WILL,
            resistances: ResistanceTable::default(),
            cooldown_modifier: 1.0,
            basic_attack_cooldown_secs: DEFAULT_BASIC_ATTACK_COOLDOWN_SECS,
            weapon: WeaponCategory::default(),
            rift_step: RiftStepDefinition::basic(),
            cooldowns: HashMap::new(),
            movement_state: MovementState::Idle,
            animation_state: AnimationState::Idle,
            status_effects: Vec::new(),
            movement_intent: Vec3::ZERO,
            sprint_intent: false,
            dirty: true,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn character_id(&self) -> &str {
        &self.character_id
    }

    pub fn set_character_id(&mut self, character_id: impl Into<String>) {
        self.character_id = character_id.into();
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn capsule_radius(&self) -> f32 {
        self.capsule_radius
    }

    pub fn capsule_half_height(&self) -> f32 {
        self.capsule_half_height
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn max_health(&self) -> i32 {
        self.max_health
    }

    pub fn will(&self) -> i32 {
        self.will
    }

    pub fn max_will(&self) -> i32 {
        self.max_will
    }

    pub fn resistances(&self) -> &ResistanceTable {
        &self.resistances
    }

    pub fn cooldown_modifier(&self) -> f32 {
        self.cooldown_modifier
    }

    pub fn basic_attack_cooldown_secs(&self) -> f32 {
        self.basic_attack_cooldown_secs
    }

    pub fn weapon(&self) -> WeaponCategory {
        self.weapon
    }

    pub fn rift_step(&self) -> &RiftStepDefinition {
        &self.rift_step
    }

    pub fn movement_state(&self) -> MovementState {
        self.movement_state
    }

    pub fn animation_state(&self) -> AnimationState {
        self.animation_state
    }

    pub fn status_effects(&self) -> &[StatusEffect] {
        &self.status_effects
    }

    pub fn is_dead(&self) -> bool {
        self.movement_state == MovementState::Dead
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn forward_vector(&self) -> Vec3 {
        forward_vector(self.orientation)
    }

    pub fn right_vector(&self) -> Vec3 {
        right_vector(self.orientation)
    }

    /// World-space point projectiles leave from.
    pub fn muzzle_position(&self) -> Vec3 {
        self.position + self.orientation * MUZZLE_OFFSET
    }

    /// Returns true when the position actually changed.
    pub fn set_position(&mut self, position: Vec3) -> bool {
        if self.position.distance_squared(position) <= POSITION_EPSILON_SQ {
            return false;
        }
        self.position = position;
        self.dirty = true;
        true
    }

    /// Normalizes and stores `orientation`; returns true when it actually changed.
    pub fn set_orientation(&mut self, orientation: Quat) -> bool {
        let orientation = normalize_quat(orientation);
        if orientations_match(self.orientation, orientation) {
            return false;
        }
        self.orientation = orientation;
        self.dirty = true;
        true
    }

    /// Clamps to `[0, max]`; reaching zero kills the player.
    pub fn set_health(&mut self, health: i32) {
        let health = health.clamp(0, self.max_health);
        if health != self.health {
            self.health = health;
            self.dirty = true;
        }
        if self.health == 0 && !self.is_dead() {
            self.set_movement_state(MovementState::Dead);
        }
    }

    /// Applies mitigated damage and returns the health actually lost.
    pub fn take_damage(&mut self, raw: i32, damage_type: DamageType) -> i32 {
        if raw <= 0 || self.is_dead() {
            return 0;
        }
        let final_damage = match damage_type {
            DamageType::None => raw,
            other => mitigate_damage(raw, self.resistances.get(other)),
        };
        if final_damage == 0 {
            return 0;
        }
        let before = self.health;
        self.set_health(before - final_damage);
        debug!(
            "Player {} took {} {:?} damage ({} raw), health {} -> {}",
            self.id, final_damage, damage_type, raw, before, self.health
        );
        before - self.health
    }

    pub fn set_resistance(&mut self, damage_type: DamageType, resistance: Resistance) {
        self.resistances.set(damage_type, resistance);
    }

    pub fn set_cooldown_modifier(&mut self, modifier: f32) {
        if modifier.is_finite() {
            self.cooldown_modifier = modifier.max(0.0);
        }
    }

    pub fn set_weapon(&mut self, weapon: WeaponCategory) {
        if self.weapon != weapon {
            self.weapon = weapon;
            self.dirty = true;
        }
    }

    pub fn set_rift_step(&mut self, definition: RiftStepDefinition) {
        self.rift_step = definition;
    }

    /// Moves to `state` and updates the animation id to match.
    ///
    /// Leaving `Dead` is refused; only a respawn outside the simulation may do that.
    pub fn set_movement_state(&mut self, state: MovementState) -> bool {
        if self.movement_state == state {
            return false;
        }
        if self.is_dead() {
            debug!(
                "Player {} is dead, ignoring transition to {:?}",
                self.id, state
            );
            return false;
        }
        self.movement_state = state;
        self.animation_state = AnimationState::from(state);
        self.dirty = true;
        true
    }

    /// Latches the latest movement input and updates the movement state from it.
    pub fn apply_movement_intent(&mut self, local_direction: Vec3, sprinting: bool) {
        let local_direction = if local_direction.is_finite()
            && local_direction.length_squared() >= MOVEMENT_DEADZONE_SQ
        {
            local_direction
        } else {
            Vec3::ZERO
        };
        self.movement_intent = local_direction;
        self.sprint_intent = sprinting;
        self.settle_movement_state();
    }

    /// Re-derives Idle/Walking/Sprinting from the latched intent. Stunned, Rooted
    /// and Dead are left alone.
    pub fn settle_movement_state(&mut self) -> bool {
        if self.movement_state.blocks_movement() {
            return false;
        }
        let next = if self.movement_intent == Vec3::ZERO {
            MovementState::Idle
        } else if self.sprint_intent {
            MovementState::Sprinting
        } else {
            MovementState::Walking
        };
        self.set_movement_state(next)
    }

    pub fn movement_intent(&self) -> Vec3 {
        self.movement_intent
    }

    pub fn sprint_intent(&self) -> bool {
        self.sprint_intent
    }

    pub fn cooldown_deadline(&self, ability_id: u32) -> Option<Instant> {
        self.cooldowns.get(&ability_id).copied()
    }

    pub fn is_ability_on_cooldown(&self, ability_id: u32, now: Instant) -> bool {
        self.cooldowns
            .get(&ability_id)
            .is_some_and(|deadline| now < *deadline)
    }

    /// Time left on `ability_id`'s cooldown, zero when ready.
    pub fn cooldown_remaining(&self, ability_id: u32, now: Instant) -> Duration {
        self.cooldowns
            .get(&ability_id)
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Starts a cooldown of `base_secs` scaled by the cooldown modifier.
    ///
    /// The stored deadline never moves earlier. A non-positive base leaves any
    /// existing deadline untouched.
    pub fn start_ability_cooldown(
        &mut self,
        ability_id: u32,
        base_secs: f32,
        now: Instant,
    ) -> Option<Instant> {
        if base_secs.is_nan() || base_secs <= 0.0 {
            return self.cooldown_deadline(ability_id);
        }
        let scaled = (base_secs * self.cooldown_modifier).max(MIN_ABILITY_COOLDOWN_SECS);
        let candidate = now + Duration::from_secs_f32(scaled);
        let deadline = self
            .cooldowns
            .entry(ability_id)
            .and_modify(|existing| *existing = (*existing).max(candidate))
            .or_insert(candidate);
        Some(*deadline)
    }

    /// Checks the movement state and cooldown gates shared by every ability.
    pub fn check_ability_ready(&self, ability_id: u32, now: Instant) -> Result<(), FailureReason> {
        if self.movement_state.blocks_abilities() {
            return Err(FailureReason::InvalidState(self.movement_state));
        }
        if self.is_ability_on_cooldown(ability_id, now) {
            return Err(FailureReason::OnCooldown);
        }
        Ok(())
    }

    pub fn has_status_effect(&self, effect: StatusEffect) -> bool {
        self.status_effects.contains(&effect)
    }

    pub fn add_status_effect(&mut self, effect: StatusEffect) -> bool {
        if self.has_status_effect(effect) {
            return false;
        }
        self.status_effects.push(effect);
        self.dirty = true;
        true
    }

    pub fn remove_status_effect(&mut self, effect: StatusEffect) -> bool {
        let before = self.status_effects.len();
        self.status_effects.retain(|e| *e != effect);
        let removed = self.status_effects.len() != before;
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Distance the player's capsule centre sits above its feet.
    pub fn standing_height(&self) -> f32 {
        self.capsule_half_height + self.capsule_radius
    }

    pub fn world_direction(&self, local_direction: Vec3) -> Vec3 {
        math::rotate_direction(self.orientation, local_direction)
    }
}
