//! Aerial-perspective compositing onto opaque scene geometry.
//!
//! Per pixel: reconstruct the world position and normal from the
//! reversed-log depth buffer, optionally pull both toward the reference
//! ellipsoid when the camera is high enough for curvature error to show,
//! relight the albedo with sun and sky irradiance, then apply atmospheric
//! transmittance and inscatter along the view segment.

use glam::{IVec2, Mat3, UVec2, Vec2, Vec3, Vec4};

use crate::atmosphere::AtmosphereModel;
use crate::core::CameraUniforms;
use crate::math::smoothstep;
use crate::render::depth::{is_far_plane, log_depth_to_view_z, view_position};
use crate::render::texture::Texture2D;

use super::config::CompositorConfig;
use super::shadows::ShadowCascades;

/// World meters per scene unit.
pub const METERS_PER_UNIT: f32 = 1.0;

/// Scene buffers and per-frame state read by the compositor.
pub struct CompositeInputs<'a> {
    /// Scene color; rgb is albedo when relighting is enabled
    pub color: &'a Texture2D<Vec4>,
    /// Reversed-logarithmic depth
    pub depth: &'a Texture2D<f32>,
    /// View-space normals. Reconstructed from depth when absent.
    pub normal: Option<&'a Texture2D<Vec3>>,
    pub camera: &'a CameraUniforms,
    pub sun_direction: Vec3,
    /// Resolved premultiplied cloud color composited over the result
    pub clouds: Option<&'a Texture2D<Vec4>>,
    /// Resolved distance along each view ray spent in cloud shadow
    pub shadow_length: Option<&'a Texture2D<f32>>,
    pub shadows: Option<&'a ShadowCascades>,
}

/// Applies sun/sky lighting and aerial perspective to the opaque scene.
#[derive(Clone, Debug)]
pub struct AerialPerspectiveCompositor {
    config: CompositorConfig,
}

impl AerialPerspectiveCompositor {
    pub fn new(config: CompositorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Weight of the ellipsoid-corrected position for a camera at `camera_height`.
    pub fn horizon_blend(&self, camera_height: f32) -> f32 {
        if !self.config.horizon_correction {
            return 0.0;
        }
        smoothstep(self.config.horizon_min_height, self.config.horizon_max_height, camera_height)
    }

    /// Composite every pixel of `inputs.color`.
    pub fn composite(&self, inputs: &CompositeInputs<'_>, atmosphere: &dyn AtmosphereModel) -> Texture2D<Vec4> {
        let camera_position = inputs.camera.position * METERS_PER_UNIT;
        let blend = self.horizon_blend(self.config.ellipsoid.height(camera_position));

        Texture2D::from_fn(inputs.color.size(), |x, y| {
            let shaded = self.shade_pixel(inputs, atmosphere, UVec2::new(x, y), blend);
            match inputs.clouds {
                Some(clouds) => {
                    let cloud = clouds.get(x, y);
                    let rgb = shaded.truncate() * (1.0 - cloud.w) + cloud.truncate();
                    rgb.extend(shaded.w)
                }
                None => shaded,
            }
        })
    }

    fn shade_pixel(
        &self,
        inputs: &CompositeInputs<'_>,
        atmosphere: &dyn AtmosphereModel,
        pixel: UVec2,
        blend: f32,
    ) -> Vec4 {
        let config = &self.config;
        let color = inputs.color.get(pixel.x, pixel.y);
        let depth = inputs.depth.get(pixel.x, pixel.y);
        if is_far_plane(depth) {
            return color;
        }

        let camera = inputs.camera;
        let uv = inputs.color.texel_uv(pixel.x, pixel.y);
        let view = view_position(uv, log_depth_to_view_z(depth, camera.far), camera);
        let view_normal = match inputs.normal {
            Some(normals) => normals.get(pixel.x, pixel.y),
            None => reconstruct_normal(inputs.depth, pixel, camera),
        };

        let camera_position = camera.position * METERS_PER_UNIT;
        let mut position = camera.inverse_view.transform_point3(view) * METERS_PER_UNIT;
        let mut normal = (Mat3::from_mat4(camera.inverse_view) * view_normal).normalize_or(Vec3::Y);

        if blend > 0.0 {
            let ellipsoid = &config.ellipsoid;
            let surface_normal = ellipsoid.surface_normal(position);
            position = position.lerp(ellipsoid.reference_position(position), blend);
            normal = normal.lerp(surface_normal, blend).normalize_or(surface_normal);
        }

        let mut radiance = color.truncate();

        if config.sun_irradiance || config.sky_irradiance {
            let irradiance = atmosphere.sun_sky_irradiance(camera_position, position, inputs.sun_direction);
            let mut light = Vec3::ZERO;
            if config.sun_irradiance {
                let shadow = match inputs.shadows {
                    Some(shadows) if config.cloud_shadow => shadows.transmittance(position),
                    _ => 1.0,
                };
                light += irradiance.sun * (normal.dot(inputs.sun_direction).max(0.0) * shadow);
            }
            if config.sky_irradiance {
                let up = config.ellipsoid.surface_normal(position);
                light += irradiance.sky * ((1.0 + normal.dot(up)) * 0.5);
            }
            radiance *= light * config.irradiance_scale;
        }

        if config.transmittance || config.inscatter {
            let scattering = atmosphere.transmittance_and_inscatter(camera_position, position, inputs.sun_direction);
            if config.transmittance {
                radiance *= scattering.transmittance;
            }
            if config.inscatter {
                let lit = inputs.shadow_length.map_or(1.0, |lengths| {
                    let path = camera_position.distance(position).max(1e-3);
                    (1.0 - lengths.get(pixel.x, pixel.y) * METERS_PER_UNIT / path).max(0.0)
                });
                radiance += scattering.inscatter * lit;
            }
        }

        radiance.extend(color.w)
    }
}

/// View-space normal from the depth buffer.
///
/// Uses the neighbor on each axis whose depth is closest to the center so
/// silhouettes do not bleed into the normal, and orients the result toward
/// the camera.
pub fn reconstruct_normal(depth: &Texture2D<f32>, pixel: UVec2, camera: &CameraUniforms) -> Vec3 {
    let size = depth.size().as_ivec2();
    let position_at = |p: IVec2| -> Option<Vec3> {
        if p.x < 0 || p.y < 0 || p.x >= size.x || p.y >= size.y {
            return None;
        }
        let d = depth.get(p.x as u32, p.y as u32);
        if is_far_plane(d) {
            return None;
        }
        let uv = (p.as_vec2() + 0.5) / size.as_vec2();
        Some(view_position(uv, log_depth_to_view_z(d, camera.far), camera))
    };

    let center_pixel = pixel.as_ivec2();
    let Some(center) = position_at(center_pixel) else {
        return Vec3::Z;
    };

    let tangent = |axis: IVec2| -> Option<Vec3> {
        let forward = position_at(center_pixel + axis).map(|p| p - center);
        let backward = position_at(center_pixel - axis).map(|p| center - p);
        match (forward, backward) {
            (Some(f), Some(b)) => Some(if f.z.abs() <= b.z.abs() { f } else { b }),
            (f, b) => f.or(b),
        }
    };

    let (Some(dx), Some(dy)) = (tangent(IVec2::X), tangent(IVec2::Y)) else {
        return -center.normalize_or(Vec3::Z);
    };
    let n = dy.cross(dx).normalize_or(Vec3::Z);
    if n.dot(center) > 0.0 { -n } else { n }
}

/// Screen UV helper for callers building inputs.
#[inline]
pub fn pixel_uv(pixel: UVec2, size: UVec2) -> Vec2 {
    (pixel.as_vec2() + 0.5) / size.as_vec2()
}
