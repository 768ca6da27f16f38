//! One isolated world instance and its fixed-step update.
//!
//! A shard exclusively owns its players, physics world and event bus. Other threads
//! reach it only through its [`CommandQueue`]; everything else happens inside
//! [`Shard::update`] on whichever thread drives the tick.

use crate::commands::{CommandData, GameCommand, PlayerId};
use crate::config::ZoneConfig;
use crate::error::{JoinError, ShardError, TerrainError};
use crate::event_bus::EventBus;
use crate::events::{
    AbilityFailed, AttackMissed, BasicAttackFailed, EntityDealtDamage, EntityRemoved,
    EntityStateUpdated, ProjectileSpawned, RiftStepExecuted, RiftStepFailed,
};
use crate::gameplay::outcome::{AttackOutcome, CombatEventType, FailureReason, RiftStepOutcome};
use crate::gameplay::{AbilityOutcome, GameplayEngine};
use crate::physics::PhysicsWorld;
use crate::player_manager::PlayerManager;
use crate::queue::CommandQueue;
use crate::session::ShardId;
use crate::terrain::TerrainSource;
use glam::{Quat, Vec3};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Instant;

pub const MIN_DELTA_SECS: f32 = 0.001;
pub const DEFAULT_MAX_DELTA_SECS: f32 = 0.2;
/// Minimum horizontal gap between a new spawn and any player already present.
pub const SPAWN_SPACING: f32 = 2.0;
const SPAWN_RINGS: u32 = 8;

/// What one call to [`Shard::update`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub commands_processed: usize,
    pub commands_dropped: usize,
    pub projectile_hits: usize,
    pub states_published: usize,
}

pub struct Shard {
    id: ShardId,
    players: PlayerManager,
    physics: Box<dyn PhysicsWorld>,
    commands: Arc<CommandQueue>,
    engine: GameplayEngine,
    events: EventBus,
    tick: u64,
    max_delta_secs: f32,
}

impl Shard {
    pub fn new(
        id: ShardId,
        max_players: usize,
        physics: Box<dyn PhysicsWorld>,
        engine: GameplayEngine,
    ) -> Self {
        Self {
            id,
            players: PlayerManager::new(id, max_players),
            physics,
            commands: Arc::new(CommandQueue::new()),
            engine,
            events: EventBus::new(),
            tick: 0,
            max_delta_secs: DEFAULT_MAX_DELTA_SECS,
        }
    }

    pub fn id(&self) -> ShardId {
        self.id
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Producer handle for the dispatch pipeline.
    pub fn command_queue(&self) -> Arc<CommandQueue> {
        Arc::clone(&self.commands)
    }

    pub fn push_command(&self, command: GameCommand) {
        self.commands.push(command);
    }

    pub fn players(&self) -> &PlayerManager {
        &self.players
    }

    pub fn players_mut(&mut self) -> &mut PlayerManager {
        &mut self.players
    }

    pub fn physics(&self) -> &dyn PhysicsWorld {
        self.physics.as_ref()
    }

    pub fn physics_mut(&mut self) -> &mut dyn PhysicsWorld {
        self.physics.as_mut()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn is_full(&self) -> bool {
        self.players.is_full()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn set_max_delta_secs(&mut self, max_delta_secs: f32) {
        self.max_delta_secs = max_delta_secs.max(MIN_DELTA_SECS);
    }

    /// Builds the zone's terrain and hands it to physics. An empty mesh is an error.
    pub fn load_zone(
        &mut self,
        terrain: &dyn TerrainSource,
        zone: &ZoneConfig,
    ) -> Result<(), ShardError> {
        let mesh = terrain.generate_mesh(&zone.asset_name, zone.origin)?;
        if mesh.is_empty() {
            return Err(TerrainError::EmptyMesh {
                asset: zone.asset_name.clone(),
            }
            .into());
        }
        self.physics
            .create_terrain(zone.zone_id, &mesh.vertices, &mesh.indices)?;
        info!(
            "Shard {} loaded zone '{}' ({} triangles)",
            self.id,
            zone.asset_name,
            mesh.triangle_count()
        );
        Ok(())
    }

    /// Creates a player and its physics presence. Nothing is left behind on failure.
    pub fn spawn_player(
        &mut self,
        character_id: &str,
        position: Vec3,
        orientation: Quat,
    ) -> Result<PlayerId, JoinError> {
        if self.players.is_full() {
            return Err(JoinError::ServerFull);
        }
        let id = self.players.next_player_id();
        let player = self.players.create_player(id, position, orientation)?;
        player.set_character_id(character_id);

        if let Err(e) = self
            .engine
            .initialize_player_in_world(player, self.physics.as_mut())
        {
            self.players.remove_player(id);
            return Err(e.into());
        }
        info!("Shard {} spawned player {} ({})", self.id, id, character_id);
        Ok(id)
    }

    /// First free point around `base`: the base itself, then rings `SPAWN_SPACING`
    /// apart with six more slots per ring. Falls back to `base` when all are taken.
    pub fn free_spawn_point(&self, base: Vec3) -> Vec3 {
        let is_free = |point: Vec3| {
            self.players
                .all_players()
                .all(|p| (p.position() - point).truncate().length() >= SPAWN_SPACING)
        };
        if is_free(base) {
            return base;
        }
        for ring in 1..=SPAWN_RINGS {
            let slots = 6 * ring;
            let radius = ring as f32 * SPAWN_SPACING;
            for slot in 0..slots {
                let angle = slot as f32 / slots as f32 * std::f32::consts::TAU;
                let point = base + Vec3::new(angle.cos(), angle.sin(), 0.0) * radius;
                if is_free(point) {
                    return point;
                }
            }
        }
        warn!("Shard {} has no free spawn point near {}", self.id, base);
        base
    }

    /// Removes a player and its controller, then announces the removal.
    pub fn despawn_player(&mut self, player_id: PlayerId) -> bool {
        if !self.discard_player(player_id) {
            return false;
        }
        self.events.publish(&EntityRemoved {
            entity_id: player_id,
        });
        true
    }

    /// Removes a player nobody has been told about yet. Publishes nothing.
    pub fn discard_player(&mut self, player_id: PlayerId) -> bool {
        self.physics.remove_character_controller(player_id);
        self.players.remove_player(player_id)
    }

    pub fn clamp_delta(&self, dt: f32) -> f32 {
        if !dt.is_finite() {
            warn!("Shard {} got non-finite dt, using minimum", self.id);
            return MIN_DELTA_SECS;
        }
        if dt > self.max_delta_secs {
            warn!(
                "Shard {} tick overran ({:.3}s), clamping to {:.3}s",
                self.id, dt, self.max_delta_secs
            );
            return self.max_delta_secs;
        }
        dt.max(MIN_DELTA_SECS)
    }

    /// Advances the shard one tick: commands, movement, physics, reconciliation,
    /// then state publication.
    pub fn update(&mut self, dt: f32, now: Instant) -> TickSummary {
        let dt = self.clamp_delta(dt);
        let mut summary = TickSummary::default();

        for command in self.commands.drain() {
            if self.handle_command(command, now) {
                summary.commands_processed += 1;
            } else {
                summary.commands_dropped += 1;
            }
        }

        self.engine
            .process_movement(&mut self.players, self.physics.as_mut(), dt);

        let impacts = self.physics.step(dt);
        for details in self.engine.apply_projectile_impacts(&mut self.players, &impacts) {
            summary.projectile_hits += 1;
            self.events.publish(&EntityDealtDamage { details });
        }

        self.engine
            .reconcile_positions(&mut self.players, self.physics.as_ref());
        summary.states_published = self.publish_dirty_states();

        self.tick += 1;
        if summary.commands_processed > 0 || summary.projectile_hits > 0 {
            debug!("Shard {} tick {}: {:?}", self.id, self.tick, summary);
        }
        summary
    }

    fn handle_command(&mut self, command: GameCommand, now: Instant) -> bool {
        let player_id = command.originating_player_id;
        let kind = command.kind();
        if !self.players.contains(player_id) {
            debug!(
                "Shard {} dropping {:?} for absent player {}",
                self.id, kind, player_id
            );
            return false;
        }
        let physics = self.physics.as_mut();

        match command.data {
            CommandData::MovementInput(input) => {
                if let Some(player) = self.players.find_player_mut(player_id) {
                    self.engine
                        .apply_movement_input(player, input.local_direction, input.is_sprinting);
                }
            }
            CommandData::TurnIntent(turn) => {
                if let Some(player) = self.players.find_player_mut(player_id) {
                    self.engine.turn(player, physics, turn.turn_delta_degrees);
                }
            }
            CommandData::RiftStepActivation(activation) => {
                let outcome = self.engine.execute_rift_step(
                    &mut self.players,
                    physics,
                    player_id,
                    activation.directional_intent,
                    now,
                );
                self.publish_rift_step(outcome);
            }
            CommandData::BasicAttack(intent) => {
                let outcome =
                    self.engine
                        .execute_basic_attack(&mut self.players, physics, player_id, &intent, now);
                self.publish_attack(player_id, None, outcome);
            }
            CommandData::UseAbility(request) => {
                match self
                    .engine
                    .execute_ability(&mut self.players, physics, player_id, &request, now)
                {
                    AbilityOutcome::RiftStep(outcome) => self.publish_rift_step(outcome),
                    AbilityOutcome::Attack(outcome) => {
                        self.publish_attack(player_id, Some(request.ability_id), outcome)
                    }
                    AbilityOutcome::Failed(FailureReason::CasterNotFound) => {}
                    AbilityOutcome::Failed(reason) => {
                        self.events.publish(&AbilityFailed {
                            player_id,
                            ability_id: request.ability_id,
                            reason,
                        });
                    }
                }
            }
            CommandData::Ping(_) | CommandData::JoinRequest(_) => {
                warn!(
                    "Shard {} received {:?}, which is answered before routing",
                    self.id, kind
                );
                return false;
            }
        }
        true
    }

    fn publish_rift_step(&self, outcome: RiftStepOutcome) {
        match outcome.failure {
            None => {
                self.events.publish(&RiftStepExecuted { outcome });
            }
            Some(FailureReason::CasterNotFound) => {}
            Some(reason) => {
                self.events.publish(&RiftStepFailed {
                    player_id: outcome.instigator_id,
                    reason,
                });
            }
        }
    }

    /// `ability_id` is `None` for basic attacks.
    fn publish_attack(&self, player_id: PlayerId, ability_id: Option<u32>, outcome: AttackOutcome) {
        if let Some(reason) = outcome.failure {
            if reason == FailureReason::CasterNotFound {
                return;
            }
            match ability_id {
                None => {
                    self.events.publish(&BasicAttackFailed { player_id, reason });
                }
                Some(ability_id) => {
                    self.events.publish(&AbilityFailed {
                        player_id,
                        ability_id,
                        reason,
                    });
                }
            }
            return;
        }

        for details in outcome.damage_events {
            self.events.publish(&EntityDealtDamage { details });
        }
        if outcome.event_type == CombatEventType::Miss {
            self.events.publish(&AttackMissed {
                attacker_id: player_id,
                is_melee: outcome.is_melee,
                animation_tag: outcome.animation_tag,
            });
        }
        if let Some(projectile) = outcome.spawned_projectile {
            self.events.publish(&ProjectileSpawned { projectile });
        }
    }

    fn publish_dirty_states(&mut self) -> usize {
        let mut published = 0;
        for player in self.players.all_players_mut() {
            if !player.is_dirty() {
                continue;
            }
            self.events.publish(&EntityStateUpdated::from_player(player));
            player.clear_dirty();
            published += 1;
        }
        published
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("id", &self.id)
            .field("tick", &self.tick)
            .field("players", &self.players.len())
            .finish()
    }
}
