//! Vector and rotation helpers on top of `glam`.
//!
//! World space is Z-up. An entity's local forward axis is +Y and its local right axis
//! is +X, so a yaw turn is a rotation about [`WORLD_UP`].

use glam::{Quat, Vec3};
use shared::{WireQuat, WireVec3};

pub const WORLD_UP: Vec3 = Vec3::Z;
pub const WORLD_FORWARD: Vec3 = Vec3::Y;
pub const WORLD_RIGHT: Vec3 = Vec3::X;

/// Squared length below which a vector is treated as having no direction.
pub const NORMALIZATION_EPSILON_SQ: f32 = 1e-8;
/// Dot product above which two rotations count as the same orientation.
pub const ORIENTATION_MATCH_DOT: f32 = 0.99999;

/// Normalizes `v`, returning zero for degenerate input instead of NaN.
pub fn normalize_or_zero(v: Vec3) -> Vec3 {
    let len_sq = v.length_squared();
    if len_sq > NORMALIZATION_EPSILON_SQ && len_sq.is_finite() {
        v / len_sq.sqrt()
    } else {
        Vec3::ZERO
    }
}

/// Normalizes `q`, falling back to identity for degenerate input.
pub fn normalize_quat(q: Quat) -> Quat {
    let len_sq = q.length_squared();
    if len_sq > NORMALIZATION_EPSILON_SQ && len_sq.is_finite() {
        q.normalize()
    } else {
        Quat::IDENTITY
    }
}

pub fn is_degenerate(v: Vec3) -> bool {
    normalize_or_zero(v) == Vec3::ZERO
}

pub fn forward_vector(orientation: Quat) -> Vec3 {
    normalize_or_zero(orientation * WORLD_FORWARD)
}

pub fn right_vector(orientation: Quat) -> Vec3 {
    normalize_or_zero(orientation * WORLD_RIGHT)
}

/// Rotation of `degrees` about `axis`. A degenerate axis yields identity.
pub fn from_angle_axis_degrees(degrees: f32, axis: Vec3) -> Quat {
    let axis = normalize_or_zero(axis);
    if axis == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_axis_angle(axis, degrees.to_radians())
}

/// Rotates `v` by `q` and renormalizes the result.
pub fn rotate_direction(q: Quat, v: Vec3) -> Vec3 {
    normalize_or_zero(q * v)
}

/// Whether `a` and `b` describe the same rotation (q and -q included).
pub fn orientations_match(a: Quat, b: Quat) -> bool {
    a.dot(b).abs() > ORIENTATION_MATCH_DOT
}

pub fn to_wire_vec3(v: Vec3) -> WireVec3 {
    WireVec3::new(v.x, v.y, v.z)
}

pub fn from_wire_vec3(v: WireVec3) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub fn to_wire_quat(q: Quat) -> WireQuat {
    WireQuat {
        x: q.x,
        y: q.y,
        z: q.z,
        w: q.w,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_identity_axes() {
        let forward = forward_vector(Quat::IDENTITY);
        let right = right_vector(Quat::IDENTITY);
        assert_approx_eq!(forward.y, 1.0);
        assert_approx_eq!(right.x, 1.0);
        assert_approx_eq!(forward.dot(right), 0.0);
    }

    #[test]
    fn test_yaw_turn_rotates_forward_toward_negative_x() {
        let q = from_angle_axis_degrees(90.0, WORLD_UP);
        let forward = forward_vector(q);
        assert_approx_eq!(forward.x, -1.0, 1e-5);
        assert_approx_eq!(forward.y, 0.0, 1e-5);
        assert_approx_eq!(forward.z, 0.0, 1e-5);
    }

    #[test]
    fn test_rotated_directions_stay_unit_length() {
        let rotations = [
            Quat::IDENTITY,
            from_angle_axis_degrees(37.0, WORLD_UP),
            from_angle_axis_degrees(-123.5, Vec3::new(1.0, 1.0, 0.0)),
            from_angle_axis_degrees(271.0, Vec3::new(0.2, -0.7, 0.4)),
        ];
        let mut checked = 0;
        for x in -3..=3 {
            for y in -3..=3 {
                for z in -3..=3 {
                    let d = Vec3::new(x as f32 * 0.7, y as f32 * 1.3, z as f32 * 0.01);
                    if is_degenerate(d) {
                        continue;
                    }
                    for q in rotations {
                        let rotated = rotate_direction(q, d);
                        assert_approx_eq!(rotated.length(), 1.0, 1e-4);
                        checked += 1;
                    }
                }
            }
        }
        assert!(checked > 1000);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(normalize_or_zero(Vec3::ZERO), Vec3::ZERO);
        assert_eq!(normalize_or_zero(Vec3::splat(1e-6)), Vec3::ZERO);
        assert_eq!(normalize_or_zero(Vec3::new(f32::NAN, 0.0, 0.0)), Vec3::ZERO);
        assert_eq!(normalize_quat(Quat::from_xyzw(0.0, 0.0, 0.0, 0.0)), Quat::IDENTITY);
        assert_eq!(from_angle_axis_degrees(45.0, Vec3::ZERO), Quat::IDENTITY);
    }

    #[test]
    fn test_orientations_match_handles_double_cover() {
        let q = from_angle_axis_degrees(30.0, WORLD_UP);
        assert!(orientations_match(q, q));
        assert!(orientations_match(q, -q));
        assert!(!orientations_match(q, Quat::IDENTITY));
    }
}
