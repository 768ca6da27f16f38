//! Ray intersection primitives. Swept capsules are reduced to rays against
//! Minkowski-expanded targets before reaching these functions.
//!
//! Every function takes a unit `dir` and returns `(distance, surface normal)`.

use glam::Vec3;

const PARALLEL_EPSILON: f32 = 1e-8;
/// Slack on barycentric bounds so rays through shared edges hit a neighbour.
const EDGE_TOLERANCE: f32 = 1e-6;

fn inside_aabb(point: Vec3, min: Vec3, max: Vec3) -> bool {
    point.cmpge(min).all() && point.cmple(max).all()
}

/// Slab test. A ray starting inside the box hits at distance zero.
pub fn ray_vs_aabb(origin: Vec3, dir: Vec3, min: Vec3, max: Vec3) -> Option<(f32, Vec3)> {
    if inside_aabb(origin, min, max) {
        return Some((0.0, -dir));
    }

    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    for axis in 0..3 {
        let o = origin[axis];
        let d = dir[axis];
        if d.abs() < PARALLEL_EPSILON {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }

        let inv = 1.0 / d;
        let mut t0 = (min[axis] - o) * inv;
        let mut t1 = (max[axis] - o) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        if t0 > t_enter {
            t_enter = t0;
            normal = Vec3::ZERO;
            normal[axis] = -d.signum();
        }
        t_exit = t_exit.min(t1);
        if t_enter > t_exit {
            return None;
        }
    }

    if t_enter < 0.0 || t_exit < 0.0 {
        return None;
    }
    Some((t_enter, normal))
}

/// Ray against an upright cylinder with flat caps, centred on `center`.
///
/// A ray starting inside hits at distance zero with the outward radial normal, so
/// callers can tell a ray digging deeper from one already on its way out.
pub fn ray_vs_vertical_cylinder(
    origin: Vec3,
    dir: Vec3,
    center: Vec3,
    radius: f32,
    half_extent_z: f32,
) -> Option<(f32, Vec3)> {
    let o = origin - center;
    let radial_sq = o.x * o.x + o.y * o.y;
    let r_sq = radius * radius;

    if radial_sq <= r_sq && o.z.abs() <= half_extent_z {
        // Starting inside: report the side the origin would leave through.
        let outward = Vec3::new(o.x, o.y, 0.0).normalize_or_zero();
        let normal = if outward == Vec3::ZERO { dir } else { outward };
        return Some((0.0, normal));
    }

    let mut best: Option<(f32, Vec3)> = None;
    let mut consider = |t: f32, n: Vec3| {
        if t >= 0.0 && best.map_or(true, |(bt, _)| t < bt) {
            best = Some((t, n));
        }
    };

    let a = dir.x * dir.x + dir.y * dir.y;
    if a > PARALLEL_EPSILON {
        let b = 2.0 * (o.x * dir.x + o.y * dir.y);
        let c = radial_sq - r_sq;
        let disc = b * b - 4.0 * a * c;
        if disc >= 0.0 {
            let t = (-b - disc.sqrt()) / (2.0 * a);
            let z = o.z + t * dir.z;
            if z.abs() <= half_extent_z {
                let p = o + dir * t;
                let n = Vec3::new(p.x, p.y, 0.0).normalize_or_zero();
                consider(t, n);
            }
        }
    }

    if dir.z.abs() > PARALLEL_EPSILON {
        for sign in [1.0f32, -1.0] {
            let plane = sign * half_extent_z;
            if sign * o.z < half_extent_z {
                continue;
            }
            let t = (plane - o.z) / dir.z;
            let p = o + dir * t;
            if p.x * p.x + p.y * p.y <= r_sq {
                consider(t, Vec3::new(0.0, 0.0, sign));
            }
        }
    }

    best
}

/// Two-sided Möller-Trumbore. The normal faces back toward the ray.
pub fn ray_vs_triangle(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<(f32, Vec3)> {
    let e1 = b - a;
    let e2 = c - a;
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < PARALLEL_EPSILON {
        return None;
    }
    let inv = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv;
    if !(-EDGE_TOLERANCE..=1.0 + EDGE_TOLERANCE).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv;
    if v < -EDGE_TOLERANCE || u + v > 1.0 + EDGE_TOLERANCE {
        return None;
    }
    let t = e2.dot(q) * inv;
    if t < 0.0 {
        return None;
    }
    let mut normal = e1.cross(e2).normalize_or_zero();
    if normal.dot(dir) > 0.0 {
        normal = -normal;
    }
    Some((t, normal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_ray_hits_box_face() {
        let hit = ray_vs_aabb(
            Vec3::ZERO,
            Vec3::Y,
            Vec3::new(-1.0, 5.0, -1.0),
            Vec3::new(1.0, 6.0, 1.0),
        )
        .unwrap();
        assert_approx_eq!(hit.0, 5.0);
        assert_eq!(hit.1, Vec3::new(0.0, -1.0, 0.0));
    }

    #[test]
    fn test_ray_misses_box_behind_or_beside() {
        let min = Vec3::new(-1.0, 5.0, -1.0);
        let max = Vec3::new(1.0, 6.0, 1.0);
        assert!(ray_vs_aabb(Vec3::ZERO, -Vec3::Y, min, max).is_none());
        assert!(ray_vs_aabb(Vec3::new(3.0, 0.0, 0.0), Vec3::Y, min, max).is_none());
    }

    #[test]
    fn test_ray_starting_inside_box() {
        let hit = ray_vs_aabb(Vec3::ZERO, Vec3::X, Vec3::splat(-1.0), Vec3::splat(1.0)).unwrap();
        assert_eq!(hit.0, 0.0);
    }

    #[test]
    fn test_ray_hits_cylinder_side() {
        let hit =
            ray_vs_vertical_cylinder(Vec3::ZERO, Vec3::Y, Vec3::new(0.0, 10.0, 0.0), 1.0, 2.0)
                .unwrap();
        assert_approx_eq!(hit.0, 9.0, 1e-4);
        assert_approx_eq!(hit.1.y, -1.0, 1e-4);
    }

    #[test]
    fn test_ray_starting_inside_cylinder_reports_outward_normal() {
        let center = Vec3::new(0.0, -0.4, 0.0);
        let (t, normal) =
            ray_vs_vertical_cylinder(Vec3::ZERO, Vec3::Y, center, 1.0, 2.0).unwrap();
        assert_eq!(t, 0.0);
        assert_approx_eq!(normal.y, 1.0, 1e-5);

        // Coincident centres have no preferred side, so any direction leaves.
        let (_, normal) =
            ray_vs_vertical_cylinder(Vec3::ZERO, Vec3::X, Vec3::ZERO, 1.0, 2.0).unwrap();
        assert_eq!(normal, Vec3::X);
    }

    #[test]
    fn test_ray_hits_cylinder_cap() {
        let hit = ray_vs_vertical_cylinder(
            Vec3::new(0.0, 0.0, 10.0),
            -Vec3::Z,
            Vec3::ZERO,
            1.0,
            2.0,
        )
        .unwrap();
        assert_approx_eq!(hit.0, 8.0, 1e-4);
        assert_eq!(hit.1, Vec3::Z);
    }

    #[test]
    fn test_ray_passes_over_cylinder() {
        let hit = ray_vs_vertical_cylinder(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::Y,
            Vec3::new(0.0, 10.0, 0.0),
            1.0,
            2.0,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn test_ray_hits_triangle() {
        let hit = ray_vs_triangle(
            Vec3::new(0.2, 0.2, 5.0),
            -Vec3::Z,
            Vec3::ZERO,
            Vec3::X,
            Vec3::Y,
        )
        .unwrap();
        assert_approx_eq!(hit.0, 5.0, 1e-5);
        assert_eq!(hit.1, Vec3::Z);
        assert!(ray_vs_triangle(Vec3::new(2.0, 2.0, 5.0), -Vec3::Z, Vec3::ZERO, Vec3::X, Vec3::Y)
            .is_none());
    }
}
