//! Walking, sprinting and turning.

use crate::error::PhysicsError;
use crate::math::{from_angle_axis_degrees, normalize_or_zero, normalize_quat, WORLD_UP};
use crate::physics::PhysicsWorld;
use crate::player::Player;
use glam::{Quat, Vec3};
use log::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementSettings {
    /// Walking speed in metres per second.
    pub base_speed: f32,
    pub sprint_multiplier: f32,
}

impl Default for MovementSettings {
    fn default() -> Self {
        Self {
            base_speed: 5.0,
            sprint_multiplier: 1.5,
        }
    }
}

impl MovementSettings {
    pub fn speed(&self, sprinting: bool) -> f32 {
        if sprinting {
            self.base_speed * self.sprint_multiplier
        } else {
            self.base_speed
        }
    }
}

/// World-space displacement for one step of local-space movement input.
pub fn world_displacement(
    orientation: Quat,
    local_direction: Vec3,
    sprinting: bool,
    dt: f32,
    settings: &MovementSettings,
) -> Vec3 {
    let local = normalize_or_zero(local_direction);
    if local == Vec3::ZERO || !(dt > 0.0) {
        return Vec3::ZERO;
    }
    let world = orientation * local;
    world * settings.speed(sprinting) * dt
}

/// Moves `player` along its latched movement intent through the physics controller.
///
/// Returns `Ok(false)` when there was nothing to do.
pub fn process_movement(
    player: &mut Player,
    physics: &mut dyn PhysicsWorld,
    dt: f32,
    settings: &MovementSettings,
) -> Result<bool, PhysicsError> {
    if player.movement_state().blocks_movement() {
        return Ok(false);
    }
    let displacement = world_displacement(
        player.orientation(),
        player.movement_intent(),
        player.sprint_intent(),
        dt,
        settings,
    );
    if displacement == Vec3::ZERO {
        return Ok(false);
    }

    let result = physics.move_character_controller(player.id(), displacement, dt)?;
    player.set_position(result.position);
    Ok(true)
}

/// `orientation` yawed by `delta_degrees` about the world up axis.
pub fn turned_orientation(orientation: Quat, delta_degrees: f32) -> Quat {
    normalize_quat(orientation * from_angle_axis_degrees(delta_degrees, WORLD_UP))
}

/// Applies a yaw turn to `player` and mirrors it onto its controller.
pub fn turn_player(
    player: &mut Player,
    physics: &mut dyn PhysicsWorld,
    delta_degrees: f32,
) -> bool {
    if !delta_degrees.is_finite() || player.is_dead() {
        return false;
    }
    let orientation = turned_orientation(player.orientation(), delta_degrees);
    if !player.set_orientation(orientation) {
        return false;
    }
    if let Err(e) = physics.set_controller_orientation(player.id(), player.orientation()) {
        warn!("Player {} turned without a controller: {}", player.id(), e);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{CapsuleShape, SimplePhysics};
    use crate::player::MovementState;
    use assert_approx_eq::assert_approx_eq;

    fn setup() -> (Player, SimplePhysics) {
        let player = Player::new(1, Vec3::ZERO, Quat::IDENTITY);
        let mut physics = SimplePhysics::new();
        physics
            .create_character_controller(1, Vec3::ZERO, CapsuleShape::new(0.5, 0.9))
            .unwrap();
        (player, physics)
    }

    #[test]
    fn test_displacement_scales_with_speed_and_dt() {
        let settings = MovementSettings::default();
        let input = Vec3::new(0.0, 3.0, 0.0);
        let walk = world_displacement(Quat::IDENTITY, input, false, 0.5, &settings);
        assert_approx_eq!(walk.y, 2.5, 1e-5);

        let sprint = world_displacement(Quat::IDENTITY, Vec3::Y, true, 0.5, &settings);
        assert_approx_eq!(sprint.y, 3.75, 1e-5);

        assert_eq!(
            world_displacement(Quat::IDENTITY, Vec3::ZERO, true, 0.5, &settings),
            Vec3::ZERO
        );
        assert_eq!(
            world_displacement(Quat::IDENTITY, Vec3::Y, false, 0.0, &settings),
            Vec3::ZERO
        );
    }

    #[test]
    fn test_displacement_follows_orientation() {
        let settings = MovementSettings::default();
        let facing_left = turned_orientation(Quat::IDENTITY, 90.0);
        let step = world_displacement(facing_left, Vec3::Y, false, 1.0, &settings);
        assert_approx_eq!(step.x, -5.0, 1e-4);
        assert_approx_eq!(step.y, 0.0, 1e-4);
    }

    #[test]
    fn test_process_movement_writes_back_position() {
        let (mut player, mut physics) = setup();
        player.apply_movement_intent(Vec3::Y, false);
        player.clear_dirty();

        let moved = process_movement(&mut player, &mut physics, 0.2, &MovementSettings::default())
            .unwrap();
        assert!(moved);
        assert_approx_eq!(player.position().y, 1.0, 1e-4);
        assert!(player.is_dirty());
        assert_eq!(physics.controller_position(1), Some(player.position()));
    }

    #[test]
    fn test_rooted_players_do_not_move() {
        let (mut player, mut physics) = setup();
        player.apply_movement_intent(Vec3::Y, false);
        player.set_movement_state(MovementState::Rooted);

        let moved = process_movement(&mut player, &mut physics, 0.2, &MovementSettings::default())
            .unwrap();
        assert!(!moved);
        assert_eq!(player.position(), Vec3::ZERO);
    }

    #[test]
    fn test_movement_without_controller_errors() {
        let mut player = Player::new(9, Vec3::ZERO, Quat::IDENTITY);
        let mut physics = SimplePhysics::new();
        player.apply_movement_intent(Vec3::Y, false);
        let result = process_movement(&mut player, &mut physics, 0.1, &MovementSettings::default());
        assert!(matches!(result, Err(PhysicsError::ControllerNotFound(9))));
        assert_eq!(player.position(), Vec3::ZERO);
    }

    #[test]
    fn test_repeated_turns_stay_normalized() {
        let (mut player, mut physics) = setup();
        for _ in 0..3600 {
            turn_player(&mut player, &mut physics, 0.7);
        }
        assert_approx_eq!(player.orientation().length(), 1.0, 1e-4);
        assert_approx_eq!(player.forward_vector().length(), 1.0, 1e-4);
    }

    #[test]
    fn test_turn_updates_controller_orientation() {
        let (mut player, mut physics) = setup();
        assert!(turn_player(&mut player, &mut physics, 45.0));
        let stored = physics.controller_orientation(1).unwrap();
        assert!(crate::math::orientations_match(stored, player.orientation()));

        assert!(!turn_player(&mut player, &mut physics, f32::NAN));
        assert!(!turn_player(&mut player, &mut physics, 0.0));
    }
}
