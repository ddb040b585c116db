//! Reversed-logarithmic depth encoding and view-space reconstruction.
//!
//! The opaque scene writes `log2(w + 1) / log2(far + 1)`, with `w` the
//! positive view distance along -Z. A value of 1.0 is the far clip plane.

use glam::{Vec2, Vec3};

use crate::core::CameraUniforms;

/// Raw depth within this distance of 1.0 is treated as the far plane.
pub const FAR_PLANE_EPSILON: f32 = 1e-7;

#[inline]
pub fn is_far_plane(depth: f32) -> bool {
    depth >= 1.0 - FAR_PLANE_EPSILON
}

/// Encode a view-space Z (negative in front of the camera).
pub fn encode_log_depth(view_z: f32, far: f32) -> f32 {
    (-view_z + 1.0).log2() / (far + 1.0).log2()
}

/// View distance `w` stored in a log depth value.
#[inline]
fn log_depth_to_w(depth: f32, far: f32) -> f32 {
    (depth * (far + 1.0).log2()).exp2() - 1.0
}

/// Convert log depth back into perspective depth in `[0, 1]`.
pub fn reverse_log_depth(depth: f32, near: f32, far: f32) -> f32 {
    let w = log_depth_to_w(depth, far);
    let a = far / (far - near);
    let b = far * near / (near - far);
    a + b / w
}

/// View-space Z of a perspective depth value.
pub fn perspective_depth_to_view_z(depth: f32, near: f32, far: f32) -> f32 {
    near * far / ((far - near) * depth - far)
}

/// View-space Z of a log depth value.
///
/// Equal to [`reverse_log_depth`] followed by
/// [`perspective_depth_to_view_z`], without losing precision in the
/// intermediate perspective depth.
pub fn log_depth_to_view_z(depth: f32, far: f32) -> f32 {
    -log_depth_to_w(depth, far)
}

/// View-space position of a screen UV at the given view-space Z.
pub fn view_position(uv: Vec2, view_z: f32, camera: &CameraUniforms) -> Vec3 {
    let ndc = Vec3::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 1.0);
    let on_far = camera.inverse_projection.project_point3(ndc);
    on_far * (view_z / on_far.z)
}
