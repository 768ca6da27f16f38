//! Physics collaborator contract.
//!
//! Gameplay code only talks to physics through [`PhysicsWorld`]: character
//! controllers, capsule sweeps, raycasts, body creation and stepping. Each shard owns
//! exactly one world. [`SimplePhysics`] is the in-crate implementation used by the
//! server binary and the tests.

mod geometry;
mod simple;

pub use simple::SimplePhysics;

use crate::commands::{EntityId, PlayerId};
use crate::error::PhysicsError;
use crate::gameplay::outcome::DamageInstance;
use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    Character,
    Projectile,
    Static,
    Terrain,
}

/// Opaque reference to a body, tagged with the entity it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle {
    pub kind: BodyKind,
    pub entity_id: u64,
}

impl BodyHandle {
    pub fn character(entity_id: PlayerId) -> Self {
        Self {
            kind: BodyKind::Character,
            entity_id,
        }
    }

    pub fn projectile(entity_id: EntityId) -> Self {
        Self {
            kind: BodyKind::Projectile,
            entity_id,
        }
    }
}

/// Upright capsule: a vertical segment of `2 * half_height` inflated by `radius`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapsuleShape {
    pub radius: f32,
    pub half_height: f32,
}

impl CapsuleShape {
    pub fn new(radius: f32, half_height: f32) -> Self {
        Self {
            radius,
            half_height,
        }
    }

    /// Distance from the centre to the top or bottom of the capsule.
    pub fn vertical_extent(&self) -> f32 {
        self.half_height + self.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub body: BodyHandle,
    pub point: Vec3,
    pub normal: Vec3,
    /// Distance travelled along the query direction before contact.
    pub distance: f32,
}

impl HitResult {
    /// A contact the query starts inside of and is moving out of. Such contacts
    /// never block movement.
    pub fn is_separating(&self, direction: Vec3) -> bool {
        self.distance <= 0.0 && self.normal.dot(direction) > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollisionFlags {
    pub sides: bool,
    pub above: bool,
    pub below: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveResult {
    pub position: Vec3,
    pub collisions: CollisionFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileSpawn {
    pub projectile_id: EntityId,
    pub owner_id: PlayerId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub radius: f32,
    pub gravity_enabled: bool,
    pub max_range: f32,
    pub damage: DamageInstance,
}

/// A projectile that struck something during [`PhysicsWorld::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileImpact {
    pub projectile_id: EntityId,
    pub owner_id: PlayerId,
    pub struck: BodyHandle,
    pub point: Vec3,
    pub damage: DamageInstance,
}

/// Queries and mutations a shard needs from its physics world.
///
/// Capsules are always upright, so queries take no orientation; controller
/// orientation is stored for collaborators that need it.
pub trait PhysicsWorld: Send {
    fn create_character_controller(
        &mut self,
        entity_id: PlayerId,
        position: Vec3,
        shape: CapsuleShape,
    ) -> Result<BodyHandle, PhysicsError>;

    /// Returns false when no controller existed.
    fn remove_character_controller(&mut self, entity_id: PlayerId) -> bool;

    /// Moves a controller by `displacement`, clipping against geometry.
    fn move_character_controller(
        &mut self,
        entity_id: PlayerId,
        displacement: Vec3,
        dt: f32,
    ) -> Result<MoveResult, PhysicsError>;

    fn set_controller_position(
        &mut self,
        entity_id: PlayerId,
        position: Vec3,
    ) -> Result<(), PhysicsError>;

    fn controller_position(&self, entity_id: PlayerId) -> Option<Vec3>;

    fn set_controller_orientation(
        &mut self,
        entity_id: PlayerId,
        orientation: Quat,
    ) -> Result<(), PhysicsError>;

    fn controller_orientation(&self, entity_id: PlayerId) -> Option<Quat>;

    /// First blocking contact of `shape` swept from `start` along `direction`.
    fn sweep_capsule(
        &self,
        start: Vec3,
        shape: CapsuleShape,
        direction: Vec3,
        max_distance: f32,
        ignore: Option<BodyHandle>,
    ) -> Result<Option<HitResult>, PhysicsError>;

    /// Every contact along the sweep, nearest first. Overlaps at the start report
    /// distance zero.
    fn sweep_capsule_all(
        &self,
        start: Vec3,
        shape: CapsuleShape,
        direction: Vec3,
        max_distance: f32,
        ignore: Option<BodyHandle>,
    ) -> Result<Vec<HitResult>, PhysicsError>;

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        ignore: Option<BodyHandle>,
    ) -> Result<Option<HitResult>, PhysicsError>;

    fn create_static_box(
        &mut self,
        entity_id: EntityId,
        center: Vec3,
        half_extents: Vec3,
    ) -> Result<BodyHandle, PhysicsError>;

    fn create_terrain(
        &mut self,
        zone_id: u64,
        vertices: &[Vec3],
        indices: &[u32],
    ) -> Result<BodyHandle, PhysicsError>;

    fn spawn_projectile(&mut self, spawn: ProjectileSpawn) -> Result<BodyHandle, PhysicsError>;

    /// Advances the world and reports projectile impacts from this step.
    fn step(&mut self, dt: f32) -> Vec<ProjectileImpact>;
}
