//! Camera and per-frame camera matrices

use crate::core::types::{Vec2, Vec3, Vec4, Mat4, Quat};
use crate::math::Ray;

/// Camera with position, rotation, and projection parameters
#[derive(Clone, Debug)]
pub struct Camera {
    /// World position
    pub position: Vec3,
    /// Rotation as quaternion
    pub rotation: Quat,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
}

impl Camera {
    /// Create a new camera
    pub fn new(position: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near: 1.0,
            far: 1.0e6,
        }
    }

    /// Create camera looking at a target
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let forward = (target - position).normalize();
        let right = forward.cross(up).normalize();
        let up = right.cross(forward);

        let rotation = Quat::from_mat3(&glam::Mat3::from_cols(right, up, -forward));

        Self {
            rotation,
            ..Self::new(position, 60.0, 16.0 / 9.0)
        }
    }

    /// Get view matrix (world to camera space)
    pub fn view_matrix(&self) -> Mat4 {
        let rotation_matrix = Mat4::from_quat(self.rotation.conjugate());
        let translation_matrix = Mat4::from_translation(-self.position);
        rotation_matrix * translation_matrix
    }

    /// Get projection matrix (camera to clip space, depth in [0, 1])
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Get forward direction (negative Z in camera space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Update aspect ratio (call on resize)
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.aspect = width / height;
    }

    /// Build this frame's matrices.
    ///
    /// `previous` is last frame's uniforms; without it the previous
    /// view-projection equals the current one (zero camera motion).
    pub fn uniforms(&self, previous: Option<&CameraUniforms>) -> CameraUniforms {
        let view = self.view_matrix();
        let projection = self.projection_matrix();
        let view_projection = projection * view;
        CameraUniforms {
            view,
            inverse_view: view.inverse(),
            projection,
            inverse_projection: projection.inverse(),
            view_projection,
            previous_view_projection: previous.map_or(view_projection, |p| p.view_projection),
            position: self.position,
            near: self.near,
            far: self.far,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 5.0), 60.0, 16.0 / 9.0)
    }
}

/// Camera matrices for one frame, passed by value into every stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraUniforms {
    pub view: Mat4,
    pub inverse_view: Mat4,
    pub projection: Mat4,
    pub inverse_projection: Mat4,
    pub view_projection: Mat4,
    pub previous_view_projection: Mat4,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
}

impl CameraUniforms {
    /// World-space ray through a screen UV (origin top-left, y down).
    pub fn ray(&self, uv: Vec2) -> Ray {
        let ndc = Vec3::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, 1.0);
        let view_dir = self.inverse_projection.project_point3(ndc).normalize();
        let direction = self.inverse_view.transform_vector3(view_dir).normalize();
        Ray::new(self.position, direction)
    }

    /// Distance along the view axis (positive in front of the camera).
    pub fn view_depth(&self, world: Vec3) -> f32 {
        -self.view.transform_point3(world).z
    }

    /// Screen UV of a world position in the previous frame.
    pub fn previous_uv(&self, world: Vec3) -> Vec2 {
        clip_to_uv(self.previous_view_projection * world.extend(1.0))
    }

    /// Screen UV of a world position in the current frame.
    pub fn current_uv(&self, world: Vec3) -> Vec2 {
        clip_to_uv(self.view_projection * world.extend(1.0))
    }
}

fn clip_to_uv(clip: Vec4) -> Vec2 {
    let ndc = clip.truncate() / clip.w.max(1e-6);
    Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directions() {
        let camera = Camera::default();

        // Default camera looks down -Z
        let forward = camera.forward();
        assert!((forward.z - (-1.0)).abs() < 0.001);
    }

    #[test]
    fn test_view_matrix_translation() {
        let mut camera = Camera::default();
        camera.position = Vec3::new(10.0, 0.0, 0.0);

        let view = camera.view_matrix();
        // View matrix should translate world origin to (-10, 0, 0) in camera space
        let origin_in_camera = view.transform_point3(Vec3::ZERO);
        assert!((origin_in_camera.x - (-10.0)).abs() < 0.001);
    }

    #[test]
    fn test_center_ray_follows_forward() {
        let camera = Camera::look_at(Vec3::new(0.0, 100.0, 0.0), Vec3::new(0.0, 100.0, -50.0), Vec3::Y);
        let uniforms = camera.uniforms(None);
        let ray = uniforms.ray(Vec2::splat(0.5));
        assert!((ray.direction - camera.forward()).length() < 1e-4, "ray {:?}", ray.direction);
        assert_eq!(ray.origin, camera.position);
    }

    #[test]
    fn test_uv_round_trip() {
        let camera = Camera::default();
        let uniforms = camera.uniforms(None);
        let uv = Vec2::new(0.25, 0.8);
        let world = uniforms.ray(uv).at(40.0);
        let back = uniforms.current_uv(world);
        assert!((back - uv).length() < 1e-4, "uv {back:?}");
        // No previous frame: previous UV matches current
        assert!((uniforms.previous_uv(world) - uv).length() < 1e-4);
    }

    #[test]
    fn test_previous_uv_moves_with_camera() {
        let mut camera = Camera::default();
        let first = camera.uniforms(None);
        camera.position.x += 1.0;
        let second = camera.uniforms(Some(&first));
        let world = Vec3::new(0.0, 0.0, -20.0);
        // Point shifts left on screen as camera moves right
        assert!(second.current_uv(world).x < second.previous_uv(world).x);
    }

    #[test]
    fn test_view_depth() {
        let uniforms = Camera::default().uniforms(None);
        let depth = uniforms.view_depth(Vec3::new(0.0, 0.0, -15.0));
        assert!((depth - 20.0).abs() < 1e-3, "depth = {depth}");
    }
}
