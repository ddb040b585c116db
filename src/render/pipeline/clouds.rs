//! Primary cloud raymarch at render resolution.
//!
//! Marches one jittered view ray per render texel through the density
//! field, integrating sun, sky and ground-bounce light with per-step
//! secondary marches toward the sun and the ground.

use glam::{UVec2, Vec2, Vec3, Vec4};
use rayon::prelude::*;

use crate::atmosphere::{AtmosphereModel, EllipsoidFrame};
use crate::clouds::phase::{dual_lobe, powder, ISOTROPIC_PHASE};
use crate::clouds::{DensityField, RaymarchParameters, ScatteringCoefficients};
use crate::core::{CameraUniforms, FrameState};
use crate::math::Ray;
use crate::render::texture::Texture2D;

use super::config::ResolutionScale;

/// March stops once the view transmittance falls below this value.
pub const MIN_TRANSMITTANCE: f32 = 0.01;

/// Per-frame inputs to the primary raymarch.
pub struct PrimaryInputs<'a> {
    pub camera: &'a CameraUniforms,
    pub frame: FrameState,
    /// Unit vector toward the sun
    pub sun_direction: Vec3,
    /// Surface used for the local up direction of ground bounce
    pub ground: &'a EllipsoidFrame,
    pub density: &'a dyn DensityField,
    pub atmosphere: &'a dyn AtmosphereModel,
    /// Distance along each view ray to opaque geometry, at output resolution
    pub scene_distance: Option<&'a Texture2D<f32>>,
}

/// Render-resolution buffers written by the primary raymarch.
#[derive(Clone, Debug)]
pub struct PrimaryOutput {
    /// Premultiplied radiance in rgb, opacity `1 - transmittance` in alpha
    pub color: Texture2D<Vec4>,
    /// Front depth in x, velocity in render texels in yz
    pub depth_velocity: Texture2D<Vec3>,
    /// Number of density samples taken per texel
    pub sample_count: Texture2D<f32>,
    /// Distance marched inside cloud shadow, when enabled
    pub shadow_length: Option<Texture2D<f32>>,
}

#[derive(Clone, Copy, Debug, Default)]
struct MarchResult {
    radiance: Vec3,
    transmittance: f32,
    depth: f32,
    samples: u32,
    shadow_length: f32,
}

#[derive(Clone, Copy, Debug, Default)]
struct TexelResult {
    color: Vec4,
    depth_velocity: Vec3,
    samples: f32,
    shadow_length: f32,
}

/// Primary view-ray raymarch stage.
#[derive(Clone, Debug)]
pub struct PrimaryRaymarchStage {
    params: RaymarchParameters,
    scattering: ScatteringCoefficients,
    resolution: ResolutionScale,
    shadow_length: bool,
}

impl PrimaryRaymarchStage {
    pub fn new(
        params: RaymarchParameters,
        scattering: ScatteringCoefficients,
        resolution: ResolutionScale,
        shadow_length: bool,
    ) -> Self {
        Self {
            params,
            scattering,
            resolution,
            shadow_length,
        }
    }

    pub fn params(&self) -> &RaymarchParameters {
        &self.params
    }

    /// Raymarch every render texel for an output of `output_size`.
    pub fn render(&self, inputs: &PrimaryInputs<'_>, output_size: UVec2) -> PrimaryOutput {
        let render_size = self.resolution.render_size(output_size);
        let width = render_size.x as usize;
        let texels = if self.shadow_length {
            self.render_texels::<true>(inputs, render_size)
        } else {
            self.render_texels::<false>(inputs, render_size)
        };

        let at = |x: u32, y: u32| texels[y as usize * width + x as usize];
        PrimaryOutput {
            color: Texture2D::from_fn(render_size, |x, y| at(x, y).color),
            depth_velocity: Texture2D::from_fn(render_size, |x, y| at(x, y).depth_velocity),
            sample_count: Texture2D::from_fn(render_size, |x, y| at(x, y).samples),
            shadow_length: self
                .shadow_length
                .then(|| Texture2D::from_fn(render_size, |x, y| at(x, y).shadow_length)),
        }
    }

    /// March every texel, with the shadow-length integral compiled in only
    /// when `SHADOW_LENGTH` is set.
    fn render_texels<const SHADOW_LENGTH: bool>(
        &self,
        inputs: &PrimaryInputs<'_>,
        render_size: UVec2,
    ) -> Vec<TexelResult> {
        let width = render_size.x as usize;
        let texel_count = (render_size.x * render_size.y) as usize;
        (0..texel_count)
            .into_par_iter()
            .map(|i| {
                let x = (i % width) as u32;
                let y = (i / width) as u32;
                self.render_texel::<SHADOW_LENGTH>(inputs, UVec2::new(x, y), render_size)
            })
            .collect()
    }

    fn render_texel<const SHADOW_LENGTH: bool>(
        &self,
        inputs: &PrimaryInputs<'_>,
        texel: UVec2,
        render_size: UVec2,
    ) -> TexelResult {
        let uv = (texel.as_vec2() + 0.5 + inputs.frame.jitter) / render_size.as_vec2();
        let ray = inputs.camera.ray(uv);

        let scene_distance = inputs.scene_distance.map_or(f32::INFINITY, |scene| {
            let pixel = (uv * scene.size().as_vec2()).floor().as_ivec2();
            scene.fetch(pixel)
        });

        let result = self.march::<SHADOW_LENGTH>(&ray, scene_distance, inputs);

        let front = ray.at(result.depth);
        let velocity = (inputs.camera.current_uv(front) - inputs.camera.previous_uv(front)) * render_size.as_vec2();

        TexelResult {
            color: result.radiance.extend(1.0 - result.transmittance),
            depth_velocity: Vec3::new(result.depth, velocity.x, velocity.y),
            samples: result.samples as f32,
            shadow_length: result.shadow_length,
        }
    }

    fn march<const SHADOW_LENGTH: bool>(&self, ray: &Ray, scene_distance: f32, inputs: &PrimaryInputs<'_>) -> MarchResult {
        let params = &self.params;
        let miss_depth = scene_distance.min(params.max_ray_distance);
        let mut result = MarchResult {
            transmittance: 1.0,
            depth: miss_depth,
            ..Default::default()
        };

        let Some((enter, exit)) = inputs.density.ray_interval(ray) else {
            return result;
        };
        let end = exit.min(scene_distance);
        if enter >= end {
            return result;
        }

        let sun = inputs.sun_direction;
        let extinction_coefficient = self.scattering.extinction_coefficient();
        let phase = dual_lobe(ray.direction.dot(sun), &self.scattering);

        let mut t = enter;
        let mut marched = 0.0;
        let mut front_depth = None;

        for _ in 0..params.max_iterations {
            if t >= end || marched > params.max_ray_distance || result.transmittance < MIN_TRANSMITTANCE {
                break;
            }
            let step = params.step_size_at(marched).min(end - t);
            let position = ray.at(t + step * 0.5);
            let sample = inputs.density.density(position);
            result.samples += 1;

            let sigma_t = sample.extinction * extinction_coefficient;
            let sun_transmittance = if sigma_t > 0.0 || SHADOW_LENGTH {
                (-self.optical_depth(inputs.density, position, sun, params.max_sun_iterations)).exp()
            } else {
                1.0
            };
            if SHADOW_LENGTH {
                result.shadow_length += step * (1.0 - sun_transmittance) * result.transmittance;
            }

            if sigma_t > 0.0 {
                front_depth.get_or_insert(t);

                let sigma_s = sample.extinction * self.scattering.scattering_coefficient * sample.scattering_albedo;
                let irradiance = inputs.atmosphere.sun_sky_irradiance(inputs.camera.position, position, sun);
                let sun_light = irradiance.sun * (sun_transmittance * phase * powder(sigma_t, &self.scattering));
                let sky_light = irradiance.sky * (self.scattering.sky_irradiance_scale * ISOTROPIC_PHASE);
                let ground_light = self.ground_radiance(inputs, position, irradiance.sun);
                let source = (sun_light + sky_light + ground_light) * sigma_s;

                // Analytic integral of the source over the step
                let step_transmittance = (-sigma_t * step).exp();
                let integrated = (source - source * step_transmittance) / sigma_t;
                result.radiance += integrated * result.transmittance;
                result.transmittance *= step_transmittance;
            }

            t += step;
            marched += step;
        }

        result.depth = front_depth.unwrap_or(miss_depth);
        result
    }

    /// Optical depth along `direction` sampled at the secondary step size.
    fn optical_depth(&self, density: &dyn DensityField, origin: Vec3, direction: Vec3, iterations: u32) -> f32 {
        let step = self.params.secondary_step_size;
        let coefficient = self.scattering.extinction_coefficient();
        (0..iterations)
            .map(|i| {
                let p = origin + direction * (step * (i as f32 + 0.5));
                density.density(p).extinction * coefficient * step
            })
            .sum()
    }

    /// Sunlight reflected off the ground below `position` and attenuated on the way up.
    fn ground_radiance(&self, inputs: &PrimaryInputs<'_>, position: Vec3, sun_irradiance: Vec3) -> Vec3 {
        let iterations = self.params.max_ground_iterations;
        if iterations == 0 {
            return Vec3::ZERO;
        }
        let up = inputs.ground.surface_normal(position);
        let cos_sun = up.dot(inputs.sun_direction).max(0.0);
        let transmittance = (-self.optical_depth(inputs.density, position, -up, iterations)).exp();
        sun_irradiance
            * (cos_sun
                * self.scattering.ground_albedo
                * transmittance
                * self.scattering.ground_irradiance_scale
                * ISOTROPIC_PHASE)
    }
}

/// Split a depth-velocity texel into depth and velocity.
#[inline]
pub fn unpack_depth_velocity(texel: Vec3) -> (f32, Vec2) {
    (texel.x, Vec2::new(texel.y, texel.z))
}
