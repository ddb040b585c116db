//! Ray type and operations

use crate::core::types::Vec3;

/// A ray defined by origin and direction
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray (direction should be normalized)
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Get point along ray at parameter t
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Both roots of the ray-sphere intersection, unclamped.
    ///
    /// Solved in double precision: planet-sized radii lose meters of
    /// accuracy in the f32 discriminant.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> Option<(f32, f32)> {
        let oc = (self.origin - center).as_dvec3();
        let dir = self.direction.as_dvec3();
        let b = oc.dot(dir);
        // Closest-approach form keeps the discriminant well conditioned
        let perp = oc - dir * b;
        let r = radius as f64;
        let discriminant = r * r - perp.length_squared();
        if discriminant < 0.0 {
            return None;
        }
        let sq = discriminant.sqrt();
        Some(((-b - sq) as f32, (-b + sq) as f32))
    }

    /// First segment of the ray inside a spherical shell `[inner, outer]`.
    ///
    /// Returns `(t_enter, t_exit)` with `t_enter >= 0`. A ray that starts
    /// below the inner sphere and hits the ground never enters the shell.
    pub fn intersects_shell(&self, center: Vec3, inner: f32, outer: f32) -> Option<(f32, f32)> {
        let (_, outer_far) = self.intersects_sphere(center, outer)?;
        if outer_far < 0.0 {
            return None;
        }
        let outer_near = self.intersects_sphere(center, outer).map_or(0.0, |(n, _)| n.max(0.0));
        let r = (self.origin - center).length();

        match self.intersects_sphere(center, inner) {
            Some((inner_near, inner_far)) if inner_far > 0.0 => {
                if r < inner {
                    // Inside the inner sphere: shell starts where we leave it
                    Some((inner_far, outer_far))
                } else if inner_near > 0.0 {
                    // Above the shell or inside it, looking down through the core
                    Some((outer_near, inner_near))
                } else {
                    Some((outer_near, outer_far))
                }
            }
            _ => Some((outer_near, outer_far)),
        }
    }
}
