//! Mathematical utilities

pub mod aabb;
pub mod ray;
pub mod frustum;

pub use aabb::Aabb;
pub use ray::Ray;
pub use frustum::slice_corners;

/// Hermite interpolation between two edges, clamped to `[0, 1]`.
///
/// Returns 0 at or below `edge0` and 1 at or above `edge1`.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if x <= edge0 {
        return 0.0;
    }
    if x >= edge1 {
        return 1.0;
    }
    let t = (x - edge0) / (edge1 - edge0);
    t * t * (3.0 - 2.0 * t)
}
