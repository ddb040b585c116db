//! Cloud shadow cascades.
//!
//! Each cascade covers a slice of view depth with an orthographic map
//! looking down the sun direction. A map texel stores
//! `(front_depth, mean_extinction, max_optical_depth, transmittance)` for
//! the light ray through it, measured from a start plane `offset` meters
//! toward the sun. Optical depth at any point below the front is then
//! estimated as `mean_extinction * (t - front_depth)`, capped at the max.

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};

use crate::clouds::{DensityField, ScatteringCoefficients, ShadowCascadeConfig};
use crate::core::{CameraUniforms, FrameState};
use crate::math::{slice_corners, Aabb, Ray};
use crate::render::texture::{PingPong, Texture2D};
use crate::render::upscale::halton_jitter;

use super::resolve::temporal_antialias;

/// Upper bound on the per-cascade step scale.
const MAX_STEP_SCALE: f32 = 8.0;

/// Orthographic frame of one cascade, perpendicular to the sun.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightFrame {
    pub center: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    /// Unit vector toward the sun
    pub direction: Vec3,
    /// Half extent of the map in meters
    pub radius: f32,
}

impl LightFrame {
    /// Fit a stable frame around `corners`.
    ///
    /// The bounding sphere keeps the extent independent of camera rotation.
    /// The center is snapped to whole texels so the map does not shimmer as
    /// the camera translates, with a one-texel border absorbing the shift.
    pub fn fit(corners: &[Vec3; 8], sun_direction: Vec3, map_size: u32) -> Self {
        let bounds = Aabb::from_points(corners.iter().copied());
        let center = bounds.center();
        let sphere = corners.iter().map(|c| c.distance(center)).fold(0.0f32, f32::max);
        let radius = (sphere * (1.0 + 2.0 / map_size as f32)).ceil().max(1.0);

        let direction = sun_direction.normalize();
        let hint = if direction.y.abs() < 0.99 { Vec3::Y } else { Vec3::Z };
        let right = hint.cross(direction).normalize();
        let up = direction.cross(right);

        let texel = 2.0 * radius / map_size as f32;
        let (cx, cy) = (center.dot(right), center.dot(up));
        let snapped = center + right * ((cx / texel).round() * texel - cx) + up * ((cy / texel).round() * texel - cy);

        Self {
            center: snapped,
            right,
            up,
            direction,
            radius,
        }
    }

    /// World size of one texel
    pub fn texel_world_size(&self, map_size: u32) -> f32 {
        2.0 * self.radius / map_size as f32
    }

    /// Map UV of the light ray through `world`.
    pub fn uv(&self, world: Vec3) -> Vec2 {
        let d = world - self.center;
        let scale = 0.5 / self.radius;
        Vec2::new(0.5 + d.dot(self.right) * scale, 0.5 - d.dot(self.up) * scale)
    }

    /// Point on the plane through the center for a map UV.
    pub fn plane_point(&self, uv: Vec2) -> Vec3 {
        let extent = 2.0 * self.radius;
        self.center + self.right * ((uv.x - 0.5) * extent) + self.up * ((0.5 - uv.y) * extent)
    }

    /// Light ray through `uv`, starting `offset` meters toward the sun.
    pub fn ray(&self, uv: Vec2, offset: f32) -> Ray {
        Ray::new(self.plane_point(uv) + self.direction * offset, -self.direction)
    }

    /// Distance from the start plane to `world` along the light ray.
    pub fn ray_distance(&self, world: Vec3, offset: f32) -> f32 {
        offset - (world - self.center).dot(self.direction)
    }
}

/// Practical split distances: `count + 1` view depths from `near` to `far`.
pub fn practical_splits(near: f32, far: f32, count: u32, lambda: f32) -> Vec<f32> {
    (0..=count)
        .map(|i| {
            let f = i as f32 / count as f32;
            let uniform = near + (far - near) * f;
            let log = near * (far / near).powf(f);
            uniform + (log - uniform) * lambda
        })
        .collect()
}

/// One cascade's fitted frame and its maps.
#[derive(Clone, Debug)]
pub struct ShadowCascade {
    pub near: f32,
    pub far: f32,
    pub frame: LightFrame,
    fitted: bool,
    previous_frame: Option<LightFrame>,
    raw: Texture2D<Vec4>,
    history: Option<PingPong<Vec4>>,
}

impl ShadowCascade {
    fn new(map_size: u32, temporal: bool) -> Self {
        let size = UVec2::splat(map_size);
        Self {
            near: 0.0,
            far: 0.0,
            frame: LightFrame {
                center: Vec3::ZERO,
                right: Vec3::X,
                up: Vec3::Z,
                direction: Vec3::Y,
                radius: 1.0,
            },
            fitted: false,
            previous_frame: None,
            raw: Texture2D::new(size),
            history: temporal.then(|| PingPong::new(size)),
        }
    }

    /// Resolved map: the temporal output when enabled, otherwise this frame's march.
    pub fn map(&self) -> &Texture2D<Vec4> {
        self.history.as_ref().and_then(|h| h.latest()).unwrap_or(&self.raw)
    }
}

/// Fitted cascades plus the camera view used to select among them.
#[derive(Clone, Debug)]
pub struct ShadowCascades {
    cascades: Vec<ShadowCascade>,
    view: Mat4,
    offset: f32,
}

impl ShadowCascades {
    pub fn cascades(&self) -> &[ShadowCascade] {
        &self.cascades
    }

    /// Cascade covering a view depth, or `None` outside the shadowed range.
    pub fn cascade_index(&self, view_depth: f32) -> Option<usize> {
        if view_depth < 0.0 {
            return None;
        }
        self.cascades.iter().position(|c| view_depth < c.far)
    }

    /// Sun transmittance through the clouds at `world`. 1.0 outside every cascade.
    pub fn transmittance(&self, world: Vec3) -> f32 {
        let view_depth = -self.view.transform_point3(world).z;
        let Some(cascade) = self.cascade_index(view_depth).map(|i| &self.cascades[i]) else {
            return 1.0;
        };
        let uv = cascade.frame.uv(world);
        if !(0.0..=1.0).contains(&uv.x) || !(0.0..=1.0).contains(&uv.y) {
            return 1.0;
        }
        let texel = cascade.map().sample(uv);
        let t = cascade.frame.ray_distance(world, self.offset);
        let optical_depth = (texel.y * (t - texel.x).max(0.0)).min(texel.z);
        (-optical_depth).exp()
    }
}

/// Marches light rays for every cascade and keeps their histories.
pub struct ShadowRaymarchStage {
    config: ShadowCascadeConfig,
    extinction_coefficient: f32,
    cascades: ShadowCascades,
}

impl ShadowRaymarchStage {
    pub fn new(config: ShadowCascadeConfig, scattering: &ScatteringCoefficients) -> Self {
        let cascades = (0..config.cascade_count)
            .map(|_| ShadowCascade::new(config.map_size, config.temporal_pass))
            .collect();
        Self {
            extinction_coefficient: scattering.extinction_coefficient(),
            cascades: ShadowCascades {
                cascades,
                view: Mat4::IDENTITY,
                offset: config.far_distance,
            },
            config,
        }
    }

    pub fn cascades(&self) -> &ShadowCascades {
        &self.cascades
    }

    /// Replace march parameters, keeping cascades and their histories.
    ///
    /// Cascade count, map size and the temporal pass must be unchanged;
    /// changing those requires a new stage.
    pub fn set_parameters(&mut self, config: ShadowCascadeConfig, scattering: &ScatteringCoefficients) {
        self.config = config;
        self.extinction_coefficient = scattering.extinction_coefficient();
        self.cascades.offset = config.far_distance;
    }

    /// Drop every cascade's history.
    pub fn reset(&mut self) {
        for cascade in &mut self.cascades.cascades {
            cascade.fitted = false;
            cascade.previous_frame = None;
            if let Some(history) = &mut cascade.history {
                history.reset();
            }
        }
    }

    /// Fit and march all cascades for this frame.
    pub fn render(
        &mut self,
        camera: &CameraUniforms,
        frame: &FrameState,
        sun_direction: Vec3,
        density: &dyn DensityField,
    ) -> &ShadowCascades {
        let config = self.config;
        let near = camera.near;
        let far = config.far_distance.min(camera.far);
        let splits = practical_splits(near, far, config.cascade_count, config.split_lambda);
        let jitter = if config.temporal_jitter {
            halton_jitter(frame.frame_index)
        } else {
            Vec2::ZERO
        };

        self.cascades.view = camera.view;
        let offset = self.cascades.offset;
        let mut base_texel = None;

        for (index, cascade) in self.cascades.cascades.iter_mut().enumerate() {
            let (slice_near, slice_far) = (splits[index], splits[index + 1]);
            let corners = slice_corners(camera, slice_near, slice_far);
            let fitted = LightFrame::fit(&corners, sun_direction, config.map_size);

            cascade.previous_frame = cascade.fitted.then_some(cascade.frame);
            cascade.fitted = true;
            cascade.near = slice_near;
            cascade.far = slice_far;
            cascade.frame = fitted;

            let texel = fitted.texel_world_size(config.map_size);
            let base = *base_texel.get_or_insert(texel);
            let step_scale = (texel / base).clamp(1.0, MAX_STEP_SCALE);
            log::trace!(
                "Cascade {}: depth [{:.0}, {:.0}] radius {:.0} m, step scale {:.2}",
                index,
                slice_near,
                slice_far,
                fitted.radius,
                step_scale
            );

            let march = CascadeMarch {
                frame: fitted,
                offset,
                jitter,
                step_scale,
                config: &config,
                extinction_coefficient: self.extinction_coefficient,
                density,
            };
            cascade.raw.par_fill(|x, y| march.texel(x, y));

            let raw = &cascade.raw;
            if let Some(history) = &mut cascade.history {
                let size = raw.size();
                let previous = cascade.previous_frame;
                let depth_velocity = Texture2D::from_fn(size, |x, y| {
                    let uv = raw.texel_uv(x, y);
                    let velocity = previous.map_or(Vec2::ZERO, |p| (uv - p.uv(fitted.plane_point(uv))) * size.as_vec2());
                    Vec3::new(raw.get(x, y).x, velocity.x, velocity.y)
                });
                let (output, previous_map) = history.output_and_history();
                temporal_antialias(
                    raw,
                    &depth_velocity,
                    previous_map,
                    config.temporal_alpha,
                    config.variance_gamma,
                    output,
                );
                history.swap();
            }
        }

        &self.cascades
    }
}

struct CascadeMarch<'a> {
    frame: LightFrame,
    offset: f32,
    jitter: Vec2,
    step_scale: f32,
    config: &'a ShadowCascadeConfig,
    extinction_coefficient: f32,
    density: &'a dyn DensityField,
}

impl CascadeMarch<'_> {
    fn texel(&self, x: u32, y: u32) -> Vec4 {
        let size = self.config.map_size as f32;
        let uv = (Vec2::new(x as f32, y as f32) + 0.5 + self.jitter) / size;
        self.march(&self.frame.ray(uv, self.offset)).0
    }

    /// March `ray` through the density field, returning the texel value and
    /// the number of density samples taken.
    fn march(&self, ray: &Ray) -> (Vec4, u32) {
        let far_front = 2.0 * self.offset;
        let Some((enter, exit)) = self.density.ray_interval(ray) else {
            return (Vec4::new(far_front, 0.0, 0.0, 1.0), 0);
        };

        let params = &self.config.raymarch;
        let min_step = params.min_step_size * self.step_scale;
        let max_step = params.max_step_size * self.step_scale;

        let mut t = enter;
        let mut optical_depth = 0.0;
        let mut inside = 0.0;
        let mut front = None;
        let mut samples = 0;

        for _ in 0..params.max_iterations {
            if t >= exit {
                break;
            }
            // Grow the step once the ray is already dense
            let step = (min_step * (1.0 + self.config.optical_depth_tail_scale * optical_depth))
                .min(max_step)
                .min(exit - t);
            let sigma_t = self.density.density(ray.at(t + step * 0.5)).extinction * self.extinction_coefficient;
            samples += 1;
            if sigma_t > 0.0 {
                front.get_or_insert(t);
                optical_depth += sigma_t * step;
                inside += step;
            }
            t += step;
        }

        let value = match front {
            Some(front) => Vec4::new(front, optical_depth / inside, optical_depth, (-optical_depth).exp()),
            None => Vec4::new(far_front, 0.0, 0.0, 1.0),
        };
        (value, samples)
    }
}
