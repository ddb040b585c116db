//! Reference ellipsoid used for horizon-error correction.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Idealized planetary surface: an ellipsoid given by its center and
/// squared radii, plus the radius of the sphere that atmosphere lookups
/// treat as the ground.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EllipsoidFrame {
    pub center: Vec3,
    pub radii_squared: Vec3,
    pub reference_radius: f32,
}

impl EllipsoidFrame {
    pub fn sphere(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radii_squared: Vec3::splat(radius * radius),
            reference_radius: radius,
        }
    }

    /// WGS 84 ellipsoid with the polar axis along world Y.
    pub fn wgs84(center: Vec3, reference_radius: f32) -> Self {
        let equatorial = 6_378_137.0_f32;
        let polar = 6_356_752.314_2_f32;
        Self {
            center,
            radii_squared: Vec3::new(equatorial * equatorial, polar * polar, equatorial * equatorial),
            reference_radius,
        }
    }

    /// Normalized gradient of the implicit surface through `position`.
    pub fn surface_normal(&self, position: Vec3) -> Vec3 {
        ((position - self.center) / self.radii_squared).normalize_or(Vec3::Y)
    }

    /// Position on the reference sphere along the surface normal.
    pub fn reference_position(&self, position: Vec3) -> Vec3 {
        self.center + self.surface_normal(position) * self.reference_radius
    }

    /// Approximate height of `position` above the ellipsoid surface.
    pub fn height(&self, position: Vec3) -> f32 {
        let offset = position - self.center;
        let distance = offset.length();
        if distance <= 0.0 {
            return -self.radii_squared.min_element().sqrt();
        }
        // Surface point along the same radial direction
        let scale = (offset * offset / self.radii_squared).element_sum().sqrt();
        distance - distance / scale
    }
}

impl Default for EllipsoidFrame {
    fn default() -> Self {
        Self::sphere(Vec3::new(0.0, -6_360_000.0, 0.0), 6_360_000.0)
    }
}
