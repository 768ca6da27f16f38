use super::geometry::{ray_vs_aabb, ray_vs_triangle, ray_vs_vertical_cylinder};
use super::{
    BodyHandle, BodyKind, CapsuleShape, CollisionFlags, HitResult, MoveResult, PhysicsWorld,
    ProjectileImpact, ProjectileSpawn,
};
use crate::commands::{EntityId, PlayerId};
use crate::error::PhysicsError;
use glam::{Quat, Vec3};
use log::{debug, warn};
use std::collections::BTreeMap;

/// Downward acceleration applied to projectiles with gravity enabled.
const GRAVITY: Vec3 = Vec3::new(0.0, 0.0, -9.81);
/// Gap left between a controller and whatever stopped it.
const CONTROLLER_SKIN: f32 = 0.01;
/// Height above the feet at which terrain is probed during sweeps.
const STEP_HEIGHT: f32 = 0.3;
/// How far below its feet a controller will snap down onto terrain.
const SNAP_DOWN_DISTANCE: f32 = 0.5;
/// Terrain up to this far above the feet still counts as ground to stand on.
const GROUND_PROBE_LIFT: f32 = 1.0;

#[derive(Debug, Clone)]
struct Controller {
    position: Vec3,
    orientation: Quat,
    shape: CapsuleShape,
}

#[derive(Debug, Clone)]
struct StaticBox {
    entity_id: EntityId,
    min: Vec3,
    max: Vec3,
}

#[derive(Debug, Clone)]
struct TerrainBody {
    zone_id: u64,
    triangles: Vec<[Vec3; 3]>,
}

#[derive(Debug, Clone)]
struct Projectile {
    spawn: ProjectileSpawn,
    position: Vec3,
    velocity: Vec3,
    travelled: f32,
}

/// Lightweight physics world: upright capsule controllers, static boxes,
/// triangle-mesh terrain and ballistic projectiles.
///
/// Queries are answered by inflating every target by the query shape and casting a
/// ray, which is exact for box faces and upright capsule sides and slightly
/// conservative at corners.
#[derive(Debug, Default)]
pub struct SimplePhysics {
    controllers: BTreeMap<PlayerId, Controller>,
    boxes: Vec<StaticBox>,
    terrain: Vec<TerrainBody>,
    projectiles: Vec<Projectile>,
}

impl SimplePhysics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    pub fn projectile_position(&self, projectile_id: EntityId) -> Option<Vec3> {
        self.projectiles
            .iter()
            .find(|p| p.spawn.projectile_id == projectile_id)
            .map(|p| p.position)
    }

    /// Collects every contact of a ray whose targets are inflated by `inflate`.
    ///
    /// `inflate` is `(radius, vertical half extent)` of the moving shape; a ray is
    /// `(0, 0)`. `terrain_probe` lifts the terrain test to the given offset from
    /// the origin so shapes can slide over flat ground.
    fn cast(
        &self,
        origin: Vec3,
        dir: Vec3,
        max_distance: f32,
        inflate: (f32, f32),
        terrain_probe: Option<f32>,
        ignore: Option<BodyHandle>,
    ) -> Vec<HitResult> {
        let (radius, extent) = inflate;
        let mut hits = Vec::new();
        let mut push = |body: BodyHandle, (t, normal): (f32, Vec3)| {
            if t <= max_distance {
                hits.push(HitResult {
                    body,
                    point: origin + dir * t,
                    normal,
                    distance: t,
                });
            }
        };

        for (id, controller) in &self.controllers {
            let body = BodyHandle::character(*id);
            if Some(body) == ignore {
                continue;
            }
            let r = controller.shape.radius + radius;
            let z = controller.shape.half_height + controller.shape.radius + extent;
            if let Some(hit) = ray_vs_vertical_cylinder(origin, dir, controller.position, r, z) {
                push(body, hit);
            }
        }

        let grow = Vec3::new(radius, radius, extent);
        for static_box in &self.boxes {
            let body = BodyHandle {
                kind: BodyKind::Static,
                entity_id: static_box.entity_id,
            };
            if Some(body) == ignore {
                continue;
            }
            let (min, max) = (static_box.min - grow, static_box.max + grow);
            if let Some(hit) = ray_vs_aabb(origin, dir, min, max) {
                push(body, hit);
            }
        }

        if let Some(offset) = terrain_probe {
            let probe = origin + Vec3::new(0.0, 0.0, offset);
            for terrain in &self.terrain {
                let body = BodyHandle {
                    kind: BodyKind::Terrain,
                    entity_id: terrain.zone_id,
                };
                if let Some(hit) = terrain
                    .triangles
                    .iter()
                    .filter_map(|[a, b, c]| ray_vs_triangle(probe, dir, *a, *b, *c))
                    .min_by(|x, y| x.0.total_cmp(&y.0))
                {
                    push(body, hit);
                }
            }
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    /// Highest terrain surface under `feet`, probing from slightly above them.
    fn ground_height_below(&self, feet: Vec3) -> Option<f32> {
        let probe = feet + Vec3::new(0.0, 0.0, GROUND_PROBE_LIFT);
        self.terrain
            .iter()
            .flat_map(|t| t.triangles.iter())
            .filter_map(|[a, b, c]| ray_vs_triangle(probe, -Vec3::Z, *a, *b, *c))
            .map(|(t, _)| probe.z - t)
            .reduce(f32::max)
    }

    /// Keeps a controller standing on terrain. Returns true when grounded.
    fn settle_on_ground(&self, controller: &mut Controller) -> bool {
        let standing = controller.shape.vertical_extent();
        let feet = controller.position - Vec3::new(0.0, 0.0, standing);
        match self.ground_height_below(feet) {
            Some(ground) if feet.z - ground <= SNAP_DOWN_DISTANCE => {
                controller.position.z = ground + standing;
                true
            }
            _ => false,
        }
    }

    fn settle_all_controllers(&mut self) {
        if self.terrain.is_empty() {
            return;
        }
        let mut controllers = std::mem::take(&mut self.controllers);
        for controller in controllers.values_mut() {
            self.settle_on_ground(controller);
        }
        self.controllers = controllers;
    }

    fn advance_projectiles(&mut self, dt: f32) -> Vec<ProjectileImpact> {
        let mut impacts = Vec::new();
        let mut survivors = Vec::with_capacity(self.projectiles.len());

        for mut projectile in std::mem::take(&mut self.projectiles) {
            if projectile.spawn.gravity_enabled {
                projectile.velocity += GRAVITY * dt;
            }
            let delta = projectile.velocity * dt;
            let distance = delta.length();
            if distance <= f32::EPSILON {
                survivors.push(projectile);
                continue;
            }
            let dir = delta / distance;
            let owner = Some(BodyHandle::character(projectile.spawn.owner_id));
            let radius = projectile.spawn.radius;
            let hit = self
                .cast(projectile.position, dir, distance, (radius, radius), Some(0.0), owner)
                .into_iter()
                .next();

            match hit {
                Some(hit) => {
                    debug!(
                        "Projectile {} struck {:?} at {}",
                        projectile.spawn.projectile_id, hit.body, hit.point
                    );
                    impacts.push(ProjectileImpact {
                        projectile_id: projectile.spawn.projectile_id,
                        owner_id: projectile.spawn.owner_id,
                        struck: hit.body,
                        point: hit.point,
                        damage: projectile.spawn.damage,
                    });
                }
                None => {
                    projectile.position += delta;
                    projectile.travelled += distance;
                    if projectile.travelled < projectile.spawn.max_range {
                        survivors.push(projectile);
                    } else {
                        debug!(
                            "Projectile {} expired after {:.1}m",
                            projectile.spawn.projectile_id, projectile.travelled
                        );
                    }
                }
            }
        }

        self.projectiles = survivors;
        impacts
    }
}

fn unit_direction(direction: Vec3) -> Result<Vec3, PhysicsError> {
    let dir = direction.normalize_or_zero();
    if dir == Vec3::ZERO {
        return Err(PhysicsError::InvalidBody("degenerate query direction".into()));
    }
    Ok(dir)
}

impl PhysicsWorld for SimplePhysics {
    fn create_character_controller(
        &mut self,
        entity_id: PlayerId,
        position: Vec3,
        shape: CapsuleShape,
    ) -> Result<BodyHandle, PhysicsError> {
        if self.controllers.contains_key(&entity_id) {
            return Err(PhysicsError::ControllerExists(entity_id));
        }
        if !(shape.radius > 0.0 && shape.half_height >= 0.0) {
            return Err(PhysicsError::InvalidBody(format!(
                "capsule r={} hh={}",
                shape.radius, shape.half_height
            )));
        }
        let mut controller = Controller {
            position,
            orientation: Quat::IDENTITY,
            shape,
        };
        self.settle_on_ground(&mut controller);
        self.controllers.insert(entity_id, controller);
        Ok(BodyHandle::character(entity_id))
    }

    fn remove_character_controller(&mut self, entity_id: PlayerId) -> bool {
        self.controllers.remove(&entity_id).is_some()
    }

    fn move_character_controller(
        &mut self,
        entity_id: PlayerId,
        displacement: Vec3,
        _dt: f32,
    ) -> Result<MoveResult, PhysicsError> {
        let mut controller = self
            .controllers
            .get(&entity_id)
            .cloned()
            .ok_or(PhysicsError::ControllerNotFound(entity_id))?;
        let mut collisions = CollisionFlags::default();

        let length = displacement.length();
        if length > f32::EPSILON {
            let dir = displacement / length;
            let inflate = (controller.shape.radius, controller.shape.vertical_extent());
            let probe = STEP_HEIGHT - controller.shape.vertical_extent();
            let blocking = self
                .cast(
                    controller.position,
                    dir,
                    length,
                    inflate,
                    Some(probe),
                    Some(BodyHandle::character(entity_id)),
                )
                .into_iter()
                .find(|hit| !hit.is_separating(dir));

            let travel = match blocking {
                Some(hit) => {
                    collisions.sides = hit.normal.z.abs() < 0.7;
                    collisions.above = hit.normal.z <= -0.7;
                    collisions.below = hit.normal.z >= 0.7;
                    (hit.distance - CONTROLLER_SKIN).max(0.0)
                }
                None => length,
            };
            controller.position += dir * travel;
        }

        if self.settle_on_ground(&mut controller) {
            collisions.below = true;
        }
        let position = controller.position;
        self.controllers.insert(entity_id, controller);
        Ok(MoveResult {
            position,
            collisions,
        })
    }

    fn set_controller_position(
        &mut self,
        entity_id: PlayerId,
        position: Vec3,
    ) -> Result<(), PhysicsError> {
        let controller = self
            .controllers
            .get_mut(&entity_id)
            .ok_or(PhysicsError::ControllerNotFound(entity_id))?;
        controller.position = position;
        Ok(())
    }

    fn controller_position(&self, entity_id: PlayerId) -> Option<Vec3> {
        self.controllers.get(&entity_id).map(|c| c.position)
    }

    fn set_controller_orientation(
        &mut self,
        entity_id: PlayerId,
        orientation: Quat,
    ) -> Result<(), PhysicsError> {
        let controller = self
            .controllers
            .get_mut(&entity_id)
            .ok_or(PhysicsError::ControllerNotFound(entity_id))?;
        controller.orientation = orientation;
        Ok(())
    }

    fn controller_orientation(&self, entity_id: PlayerId) -> Option<Quat> {
        self.controllers.get(&entity_id).map(|c| c.orientation)
    }

    fn sweep_capsule(
        &self,
        start: Vec3,
        shape: CapsuleShape,
        direction: Vec3,
        max_distance: f32,
        ignore: Option<BodyHandle>,
    ) -> Result<Option<HitResult>, PhysicsError> {
        Ok(self
            .sweep_capsule_all(start, shape, direction, max_distance, ignore)?
            .into_iter()
            .find(|hit| !hit.is_separating(direction)))
    }

    fn sweep_capsule_all(
        &self,
        start: Vec3,
        shape: CapsuleShape,
        direction: Vec3,
        max_distance: f32,
        ignore: Option<BodyHandle>,
    ) -> Result<Vec<HitResult>, PhysicsError> {
        let dir = unit_direction(direction)?;
        let probe = STEP_HEIGHT - shape.vertical_extent();
        Ok(self.cast(
            start,
            dir,
            max_distance.max(0.0),
            (shape.radius, shape.vertical_extent()),
            Some(probe),
            ignore,
        ))
    }

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        ignore: Option<BodyHandle>,
    ) -> Result<Option<HitResult>, PhysicsError> {
        let dir = unit_direction(direction)?;
        Ok(self
            .cast(origin, dir, max_distance.max(0.0), (0.0, 0.0), Some(0.0), ignore)
            .into_iter()
            .next())
    }

    fn create_static_box(
        &mut self,
        entity_id: EntityId,
        center: Vec3,
        half_extents: Vec3,
    ) -> Result<BodyHandle, PhysicsError> {
        if !half_extents.cmpgt(Vec3::ZERO).all() {
            return Err(PhysicsError::InvalidBody(format!(
                "box half extents {}",
                half_extents
            )));
        }
        self.boxes.push(StaticBox {
            entity_id,
            min: center - half_extents,
            max: center + half_extents,
        });
        Ok(BodyHandle {
            kind: BodyKind::Static,
            entity_id,
        })
    }

    fn create_terrain(
        &mut self,
        zone_id: u64,
        vertices: &[Vec3],
        indices: &[u32],
    ) -> Result<BodyHandle, PhysicsError> {
        if vertices.is_empty() || indices.is_empty() || indices.len() % 3 != 0 {
            return Err(PhysicsError::InvalidBody(format!(
                "terrain with {} vertices and {} indices",
                vertices.len(),
                indices.len()
            )));
        }
        let mut triangles = Vec::with_capacity(indices.len() / 3);
        for tri in indices.chunks_exact(3) {
            let fetch = |i: u32| {
                vertices.get(i as usize).copied().ok_or_else(|| {
                    PhysicsError::InvalidBody(format!("terrain index {} out of range", i))
                })
            };
            triangles.push([fetch(tri[0])?, fetch(tri[1])?, fetch(tri[2])?]);
        }
        debug!("Terrain {} created with {} triangles", zone_id, triangles.len());
        self.terrain.push(TerrainBody { zone_id, triangles });
        self.settle_all_controllers();
        Ok(BodyHandle {
            kind: BodyKind::Terrain,
            entity_id: zone_id,
        })
    }

    fn spawn_projectile(&mut self, spawn: ProjectileSpawn) -> Result<BodyHandle, PhysicsError> {
        if !spawn.velocity.is_finite() || spawn.velocity.length_squared() <= f32::EPSILON {
            return Err(PhysicsError::InvalidBody(format!(
                "projectile {} has no velocity",
                spawn.projectile_id
            )));
        }
        if !(spawn.radius > 0.0) || !(spawn.max_range > 0.0) {
            warn!(
                "Rejecting projectile {} with radius {} and range {}",
                spawn.projectile_id, spawn.radius, spawn.max_range
            );
            return Err(PhysicsError::InvalidBody("projectile shape".into()));
        }
        let handle = BodyHandle::projectile(spawn.projectile_id);
        self.projectiles.push(Projectile {
            position: spawn.position,
            velocity: spawn.velocity,
            travelled: 0.0,
            spawn,
        });
        Ok(handle)
    }

    fn step(&mut self, dt: f32) -> Vec<ProjectileImpact> {
        if !(dt > 0.0) {
            return Vec::new();
        }
        let impacts = self.advance_projectiles(dt);
        self.settle_all_controllers();
        impacts
    }
}
