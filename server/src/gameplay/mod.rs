//! Gameplay resolution.
//!
//! [`GameplayEngine`] turns validated commands into state changes on a shard's
//! players and physics world and returns outcome values. It performs no I/O and
//! publishes nothing; the owning shard decides which events to raise.

pub mod combat;
pub mod movement;
pub mod outcome;
pub mod rift_step;

use crate::commands::{
    BasicAttackIntent, PlayerId, RiftStepDirectionalIntent, UseAbility,
};
use crate::error::PhysicsError;
use crate::physics::{CapsuleShape, PhysicsWorld, ProjectileImpact};
use crate::player::Player;
use crate::player_manager::PlayerManager;
use combat::{
    AbilityBook, AbilityDefinition, MeleeAttackProperties, ProjectileAbility, ProjectileRequest,
};
use glam::Vec3;
use log::{debug, warn};
use movement::MovementSettings;
use outcome::{AttackOutcome, DamageApplicationDetails, FailureReason, RiftStepOutcome};
use std::time::Instant;

/// Result of a use-ability request.
#[derive(Debug, Clone, PartialEq)]
pub enum AbilityOutcome {
    RiftStep(RiftStepOutcome),
    Attack(AttackOutcome),
    Failed(FailureReason),
}

/// Tunables shared by every player in a shard.
#[derive(Debug, Clone, Default)]
pub struct GameplaySettings {
    pub movement: MovementSettings,
    pub melee: MeleeAttackProperties,
    pub ranged_basic_attack: Option<ProjectileAbility>,
    pub abilities: AbilityBook,
}

#[derive(Debug, Clone)]
pub struct GameplayEngine {
    settings: GameplaySettings,
    ranged_basic_attack: ProjectileAbility,
}

impl Default for GameplayEngine {
    fn default() -> Self {
        Self::new(GameplaySettings::default())
    }
}

impl GameplayEngine {
    pub fn new(settings: GameplaySettings) -> Self {
        let ranged_basic_attack = settings
            .ranged_basic_attack
            .clone()
            .unwrap_or_else(ProjectileAbility::ranged_basic_attack);
        Self {
            settings,
            ranged_basic_attack,
        }
    }

    pub fn settings(&self) -> &GameplaySettings {
        &self.settings
    }

    /// Gives a freshly created player its character controller.
    pub fn initialize_player_in_world(
        &self,
        player: &Player,
        physics: &mut dyn PhysicsWorld,
    ) -> Result<(), PhysicsError> {
        let shape = CapsuleShape::new(player.capsule_radius(), player.capsule_half_height());
        physics.create_character_controller(player.id(), player.position(), shape)?;
        if let Err(e) = physics.set_controller_orientation(player.id(), player.orientation()) {
            physics.remove_character_controller(player.id());
            return Err(e);
        }
        Ok(())
    }

    /// Latches movement input; the displacement itself happens in
    /// [`GameplayEngine::process_movement`].
    pub fn apply_movement_input(
        &self,
        player: &mut Player,
        local_direction: Vec3,
        sprinting: bool,
    ) {
        player.apply_movement_intent(local_direction, sprinting);
    }

    pub fn turn(
        &self,
        player: &mut Player,
        physics: &mut dyn PhysicsWorld,
        delta_degrees: f32,
    ) -> bool {
        movement::turn_player(player, physics, delta_degrees)
    }

    /// Moves every player with a latched intent. Returns how many moved.
    pub fn process_movement(
        &self,
        players: &mut PlayerManager,
        physics: &mut dyn PhysicsWorld,
        dt: f32,
    ) -> usize {
        let mut moved = 0;
        for player in players.all_players_mut() {
            match movement::process_movement(player, physics, dt, &self.settings.movement) {
                Ok(true) => moved += 1,
                Ok(false) => {}
                Err(e) => warn!("Movement for player {} failed: {}", player.id(), e),
            }
        }
        moved
    }

    pub fn execute_rift_step(
        &self,
        players: &mut PlayerManager,
        physics: &mut dyn PhysicsWorld,
        player_id: PlayerId,
        intent: RiftStepDirectionalIntent,
        now: Instant,
    ) -> RiftStepOutcome {
        match players.find_player_mut(player_id) {
            Some(player) => rift_step::execute_rift_step(player, physics, intent, now),
            None => RiftStepOutcome::failed(player_id, FailureReason::CasterNotFound, Vec3::ZERO),
        }
    }

    /// Melee swing, or a projectile when the caster wields a ranged weapon.
    pub fn execute_basic_attack(
        &self,
        players: &mut PlayerManager,
        physics: &mut dyn PhysicsWorld,
        player_id: PlayerId,
        intent: &BasicAttackIntent,
        now: Instant,
    ) -> AttackOutcome {
        let Some(caster) = players.find_player(player_id) else {
            return AttackOutcome::failed(true, FailureReason::CasterNotFound);
        };

        if caster.weapon().is_ranged() {
            let cooldown = caster.basic_attack_cooldown_secs();
            let request = ProjectileRequest {
                target_position: None,
                target_entity_id: intent.target_entity_id,
                aim_direction: Some(intent.aim_direction),
            };
            return combat::launch_projectile(
                player_id,
                &self.ranged_basic_attack,
                &request,
                Some(cooldown),
                players,
                physics,
                now,
            );
        }

        combat::process_basic_melee_attack(
            player_id,
            intent.aim_direction,
            players,
            physics,
            &self.settings.melee,
            now,
        )
    }

    pub fn execute_ability(
        &self,
        players: &mut PlayerManager,
        physics: &mut dyn PhysicsWorld,
        player_id: PlayerId,
        request: &UseAbility,
        now: Instant,
    ) -> AbilityOutcome {
        if !players.contains(player_id) {
            return AbilityOutcome::Failed(FailureReason::CasterNotFound);
        }
        match self.settings.abilities.get(request.ability_id) {
            Some(AbilityDefinition::RiftStep) => AbilityOutcome::RiftStep(self.execute_rift_step(
                players,
                physics,
                player_id,
                RiftStepDirectionalIntent::default(),
                now,
            )),
            Some(AbilityDefinition::BasicAttack) => {
                let aim = players
                    .find_player(player_id)
                    .map_or(crate::math::WORLD_FORWARD, Player::forward_vector);
                let intent = BasicAttackIntent {
                    client_timestamp_ms: request.client_timestamp_ms,
                    aim_direction: aim,
                    target_entity_id: request.target_entity_id,
                };
                AbilityOutcome::Attack(
                    self.execute_basic_attack(players, physics, player_id, &intent, now),
                )
            }
            Some(AbilityDefinition::Projectile(ability)) => {
                let projectile_request = ProjectileRequest {
                    target_position: request.target_position,
                    target_entity_id: request.target_entity_id,
                    aim_direction: None,
                };
                AbilityOutcome::Attack(combat::launch_projectile(
                    player_id,
                    ability,
                    &projectile_request,
                    None,
                    players,
                    physics,
                    now,
                ))
            }
            None => {
                debug!(
                    "Player {} requested unknown ability {}",
                    player_id, request.ability_id
                );
                AbilityOutcome::Failed(FailureReason::UnknownAbility(request.ability_id))
            }
        }
    }

    pub fn apply_projectile_impacts(
        &self,
        players: &mut PlayerManager,
        impacts: &[ProjectileImpact],
    ) -> Vec<DamageApplicationDetails> {
        impacts
            .iter()
            .filter_map(|impact| combat::apply_projectile_impact(impact, players))
            .collect()
    }

    /// Copies controller positions back onto players after a physics step.
    pub fn reconcile_positions(&self, players: &mut PlayerManager, physics: &dyn PhysicsWorld) {
        for player in players.all_players_mut() {
            if let Some(position) = physics.controller_position(player.id()) {
                player.set_position(position);
            }
        }
    }
}
