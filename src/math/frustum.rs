//! View frustum slices for cascade fitting

use crate::core::CameraUniforms;
use crate::core::types::Vec3;

/// World-space corners of the view frustum between two view depths.
///
/// The first four corners lie on the `near` slice, the last four on `far`.
pub fn slice_corners(camera: &CameraUniforms, near: f32, far: f32) -> [Vec3; 8] {
    const NDC: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut corners = [Vec3::ZERO; 8];
    for (i, &(x, y)) in NDC.iter().enumerate() {
        let view = camera.inverse_projection.project_point3(Vec3::new(x, y, 1.0));
        // Rescale the far-plane point onto each slice depth
        let unit = view / -view.z;
        corners[i] = camera.inverse_view.transform_point3(unit * near);
        corners[i + 4] = camera.inverse_view.transform_point3(unit * far);
    }
    corners
}
