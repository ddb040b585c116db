//! Uniform blocks mirroring the typed per-frame parameters.
//!
//! Layouts follow WGSL uniform rules: vec3 fields take 16 bytes, so each is
//! followed by a scalar or explicit padding, and every struct is a multiple
//! of 16 bytes.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::core::{CameraUniforms, FrameState};
use crate::render::pipeline::{PipelineConfig, ResolveMode, METERS_PER_UNIT};

pub const COMPOSITE_SUN_IRRADIANCE: u32 = 1 << 0;
pub const COMPOSITE_SKY_IRRADIANCE: u32 = 1 << 1;
pub const COMPOSITE_TRANSMITTANCE: u32 = 1 << 2;
pub const COMPOSITE_INSCATTER: u32 = 1 << 3;
pub const COMPOSITE_HORIZON_CORRECTION: u32 = 1 << 4;
pub const COMPOSITE_CLOUD_SHADOW: u32 = 1 << 5;

/// Camera matrices (352 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CameraUniform {
    /// World to view (offset 0)
    pub view: [[f32; 4]; 4],
    /// View to world (offset 64)
    pub inverse_view: [[f32; 4]; 4],
    /// View to clip (offset 128)
    pub projection: [[f32; 4]; 4],
    /// Clip to view (offset 192)
    pub inverse_projection: [[f32; 4]; 4],
    /// Last frame's world to clip, for reprojection (offset 256)
    pub previous_view_projection: [[f32; 4]; 4],
    /// Camera position in world space (offset 320)
    pub position: [f32; 3],
    pub near: f32,
    pub far: f32,
    pub _pad: [f32; 3],
}

impl CameraUniform {
    pub fn from_uniforms(camera: &CameraUniforms) -> Self {
        Self {
            view: camera.view.to_cols_array_2d(),
            inverse_view: camera.inverse_view.to_cols_array_2d(),
            projection: camera.projection.to_cols_array_2d(),
            inverse_projection: camera.inverse_projection.to_cols_array_2d(),
            previous_view_projection: camera.previous_view_projection.to_cols_array_2d(),
            position: camera.position.to_array(),
            near: camera.near,
            far: camera.far,
            _pad: [0.0; 3],
        }
    }
}

/// Temporal resolver parameters (64 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ResolveUniforms {
    pub frame_index: u32,
    /// 0 = antialias, 1 = upscale
    pub mode: u32,
    pub temporal_alpha: f32,
    pub variance_gamma: f32,
    /// Sample offset in render texels
    pub jitter: [f32; 2],
    /// Size of one render texel in UV units
    pub texel_size: [f32; 2],
    pub output_size: [u32; 2],
    pub render_size: [u32; 2],
    pub shadow_length: u32,
    pub debug_view: u32,
    pub _pad: [u32; 2],
}

/// Compositor parameters (64 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CompositeUniforms {
    pub sun_direction: [f32; 3],
    /// `COMPOSITE_*` bits
    pub flags: u32,
    pub ellipsoid_center: [f32; 3],
    pub irradiance_scale: f32,
    pub ellipsoid_radii_squared: [f32; 3],
    pub reference_radius: f32,
    pub horizon_min_height: f32,
    pub horizon_max_height: f32,
    pub meters_per_unit: f32,
    pub _pad: f32,
}

/// All uniform blocks for one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameUniforms {
    pub camera: CameraUniform,
    pub resolve: ResolveUniforms,
    pub composite: CompositeUniforms,
}

impl FrameUniforms {
    pub fn new(config: &PipelineConfig, camera: &CameraUniforms, frame: &FrameState, sun_direction: Vec3) -> Self {
        let render_size = config.render_size();
        let compositor = &config.compositor;

        let flags = [
            (compositor.sun_irradiance, COMPOSITE_SUN_IRRADIANCE),
            (compositor.sky_irradiance, COMPOSITE_SKY_IRRADIANCE),
            (compositor.transmittance, COMPOSITE_TRANSMITTANCE),
            (compositor.inscatter, COMPOSITE_INSCATTER),
            (compositor.horizon_correction, COMPOSITE_HORIZON_CORRECTION),
            (compositor.cloud_shadow, COMPOSITE_CLOUD_SHADOW),
        ]
        .into_iter()
        .filter(|&(enabled, _)| enabled)
        .fold(0, |bits, (_, bit)| bits | bit);

        Self {
            camera: CameraUniform::from_uniforms(camera),
            resolve: ResolveUniforms {
                frame_index: frame.frame_index,
                mode: match config.resolve.mode {
                    ResolveMode::Antialias => 0,
                    ResolveMode::Upscale => 1,
                },
                temporal_alpha: config.resolve.temporal_alpha,
                variance_gamma: config.resolve.variance_gamma,
                jitter: frame.jitter.to_array(),
                texel_size: (1.0 / render_size.as_vec2()).to_array(),
                output_size: config.output_size,
                render_size: render_size.to_array(),
                shadow_length: config.resolve.shadow_length as u32,
                debug_view: config.debug_view.as_u32(),
                _pad: [0; 2],
            },
            composite: CompositeUniforms {
                sun_direction: sun_direction.normalize_or(Vec3::Y).to_array(),
                flags,
                ellipsoid_center: compositor.ellipsoid.center.to_array(),
                irradiance_scale: compositor.irradiance_scale,
                ellipsoid_radii_squared: compositor.ellipsoid.radii_squared.to_array(),
                reference_radius: compositor.ellipsoid.reference_radius,
                horizon_min_height: compositor.horizon_min_height,
                horizon_max_height: compositor.horizon_max_height,
                meters_per_unit: METERS_PER_UNIT,
                _pad: 0.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Camera;
    use crate::render::pipeline::DebugView;

    #[test]
    fn test_uniform_sizes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 352);
        assert_eq!(std::mem::size_of::<ResolveUniforms>(), 64);
        assert_eq!(std::mem::size_of::<CompositeUniforms>(), 64);
        for (name, size) in [
            ("camera", std::mem::size_of::<CameraUniform>()),
            ("resolve", std::mem::size_of::<ResolveUniforms>()),
            ("composite", std::mem::size_of::<CompositeUniforms>()),
        ] {
            assert_eq!(size % 16, 0, "{name} uniform is {size} bytes, not 16-byte aligned");
        }
    }

    #[test]
    fn test_frame_uniforms_from_config() {
        let mut config = PipelineConfig::upscale([64, 32]);
        config.compositor.sun_irradiance = true;
        config.debug_view = DebugView::Velocity;
        let camera = Camera::default().uniforms(None);
        let frame = FrameState {
            frame_index: 7,
            ..Default::default()
        };
        let u = FrameUniforms::new(&config, &camera, &frame, Vec3::new(0.0, 2.0, 0.0));

        assert_eq!(u.resolve.frame_index, 7);
        assert_eq!(u.resolve.mode, 1);
        assert_eq!(u.resolve.render_size, [16, 8]);
        assert_eq!(u.resolve.debug_view, 7);
        assert_eq!(u.composite.sun_direction, [0.0, 1.0, 0.0]);
        assert_ne!(u.composite.flags & COMPOSITE_SUN_IRRADIANCE, 0);
        assert_eq!(u.composite.flags & COMPOSITE_SKY_IRRADIANCE, 0);
        assert_eq!(u.camera.near, camera.near);
        assert_eq!(bytemuck::bytes_of(&u.resolve).len(), 64);
    }
}
