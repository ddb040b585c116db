//! Per-frame cloud and atmosphere pipeline.
//!
//! Stage order within a frame: primary raymarch and shadow cascades (run
//! concurrently), temporal resolve, aerial-perspective composite. Each stage
//! completes before the next reads its output.

pub mod aerial;
pub mod clouds;
pub mod config;
pub mod debug;
pub mod resolve;
pub mod shadows;

pub use aerial::{AerialPerspectiveCompositor, CompositeInputs, METERS_PER_UNIT};
pub use clouds::{PrimaryInputs, PrimaryOutput, PrimaryRaymarchStage};
pub use config::{CompositorConfig, HistoryKey, PipelineConfig, ResolutionScale, ResolveConfig, ResolveMode};
pub use debug::DebugView;
pub use resolve::{ResolveInputs, ResolvedFrame, TemporalResolver};
pub use shadows::{ShadowCascades, ShadowRaymarchStage};

use std::time::Instant;

use glam::{UVec2, Vec3, Vec4};

use crate::atmosphere::AtmosphereModel;
use crate::clouds::DensityField;
use crate::core::{CameraUniforms, Error, FrameSequencer, FrameState, Result};
use crate::render::buffer::FrameUniforms;
use crate::render::depth::{is_far_plane, log_depth_to_view_z, view_position};
use crate::render::texture::Texture2D;

use self::aerial::pixel_uv;
use self::debug::DebugInputs;

/// Scene buffers and collaborators for one frame. All textures are at output resolution.
pub struct FrameInputs<'a> {
    pub camera: &'a CameraUniforms,
    /// Unit vector toward the sun
    pub sun_direction: Vec3,
    pub scene_color: &'a Texture2D<Vec4>,
    /// Reversed-logarithmic depth of the opaque scene
    pub scene_depth: &'a Texture2D<f32>,
    /// View-space scene normals
    pub scene_normal: Option<&'a Texture2D<Vec3>>,
    pub density: &'a dyn DensityField,
    pub atmosphere: &'a dyn AtmosphereModel,
}

/// Final color handed to the post stack.
#[derive(Clone, Debug)]
pub struct FrameOutput {
    pub color: Texture2D<Vec4>,
    pub frame_index: u32,
    /// False while a debug view is active
    pub tone_mapping: bool,
}

/// Owns every stage and its history for one view.
pub struct FramePipeline {
    config: PipelineConfig,
    pending: Option<PipelineConfig>,
    sequencer: FrameSequencer,
    primary: PrimaryRaymarchStage,
    shadow: ShadowRaymarchStage,
    resolver: TemporalResolver,
    compositor: AerialPerspectiveCompositor,
}

impl FramePipeline {
    /// Validate `config` and allocate all stages.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let output = config.output_size();
        let render = config.render_size();
        log::info!(
            "Cloud pipeline: output {}x{}, render {}x{}, {:?} resolve, {} shadow cascades of {}^2",
            output.x,
            output.y,
            render.x,
            render.y,
            config.resolve.mode,
            config.shadow.cascade_count,
            config.shadow.map_size
        );

        Ok(Self {
            sequencer: FrameSequencer::new(),
            primary: primary_stage(&config),
            shadow: ShadowRaymarchStage::new(config.shadow, &config.scattering),
            resolver: TemporalResolver::new(config.resolve, output, config.resolution),
            compositor: AerialPerspectiveCompositor::new(config.compositor),
            pending: None,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// State the next rendered frame will use
    pub fn frame_state(&self) -> FrameState {
        self.sequencer.state()
    }

    /// Queue a new configuration for the next frame boundary.
    ///
    /// Validation happens now. Changes to resolve mode, resolution, output
    /// size, the shadow-length channel or cascade layout reset all history
    /// when applied.
    pub fn reconfigure(&mut self, config: PipelineConfig) -> Result<()> {
        config.validate()?;
        self.pending = Some(config);
        Ok(())
    }

    /// Queue an output-resolution change.
    pub fn resize(&mut self, output_size: [u32; 2]) -> Result<()> {
        let mut config = self.pending.clone().unwrap_or_else(|| self.config.clone());
        config.output_size = output_size;
        self.reconfigure(config)
    }

    /// Discard all temporal history and restart the frame cycle.
    pub fn reset_history(&mut self) {
        self.resolver.reset();
        self.shadow.reset();
        self.sequencer.reset();
    }

    /// GPU uniform blocks mirroring this frame's parameters.
    pub fn uniforms(&self, camera: &CameraUniforms, sun_direction: Vec3) -> FrameUniforms {
        FrameUniforms::new(&self.config, camera, &self.sequencer.state(), sun_direction)
    }

    fn apply_pending(&mut self) {
        let Some(next) = self.pending.take() else {
            return;
        };

        if next.output_size != self.config.output_size {
            log::info!(
                "Output resolution {}x{} -> {}x{}",
                self.config.output_size[0],
                self.config.output_size[1],
                next.output_size[0],
                next.output_size[1]
            );
        }
        if next.resolve.mode != self.config.resolve.mode {
            log::info!("Resolve mode {:?} -> {:?}", self.config.resolve.mode, next.resolve.mode);
        }

        self.primary = primary_stage(&next);
        self.compositor = AerialPerspectiveCompositor::new(next.compositor);

        if next.history_key() != self.config.history_key() {
            log::warn!("Pipeline configuration changed layout; resetting temporal history");
            self.resolver = TemporalResolver::new(next.resolve, next.output_size(), next.resolution);
            self.shadow = ShadowRaymarchStage::new(next.shadow, &next.scattering);
            self.sequencer.reset();
        } else {
            self.resolver
                .set_parameters(next.resolve.temporal_alpha, next.resolve.variance_gamma);
            self.shadow.set_parameters(next.shadow, &next.scattering);
        }

        self.config = next;
    }

    /// Render one frame and advance the frame index.
    pub fn render(&mut self, inputs: &FrameInputs<'_>) -> Result<FrameOutput> {
        self.apply_pending();

        let output_size = self.config.output_size();
        check_size("scene color", inputs.scene_color.size(), output_size)?;
        check_size("scene depth", inputs.scene_depth.size(), output_size)?;
        if let Some(normal) = inputs.scene_normal {
            check_size("scene normal", normal.size(), output_size)?;
        }

        let frame = self.sequencer.state();
        let sun_direction = inputs.sun_direction.normalize_or(Vec3::Y);
        let started = Instant::now();

        let scene_distance = scene_distances(inputs.scene_depth, inputs.camera);
        let primary_inputs = PrimaryInputs {
            camera: inputs.camera,
            frame,
            sun_direction,
            ground: &self.config.compositor.ellipsoid,
            density: inputs.density,
            atmosphere: inputs.atmosphere,
            scene_distance: Some(&scene_distance),
        };

        let primary = &self.primary;
        let shadow = &mut self.shadow;
        let (primary_output, ()) = rayon::join(
            || primary.render(&primary_inputs, output_size),
            || {
                shadow.render(inputs.camera, &frame, sun_direction, inputs.density);
            },
        );
        let raymarched = started.elapsed();

        let resolved = self.resolver.resolve(
            &frame,
            ResolveInputs {
                color: &primary_output.color,
                depth_velocity: &primary_output.depth_velocity,
                shadow_length: primary_output.shadow_length.as_ref(),
            },
        )?;
        let resolved_at = started.elapsed();

        let cascades = self.shadow.cascades();
        let composite_inputs = CompositeInputs {
            color: inputs.scene_color,
            depth: inputs.scene_depth,
            normal: inputs.scene_normal,
            camera: inputs.camera,
            sun_direction,
            clouds: Some(resolved.color),
            shadow_length: resolved.shadow_length,
            shadows: Some(cascades),
        };
        let mut color = self.compositor.composite(&composite_inputs, inputs.atmosphere);

        let debug_inputs = DebugInputs {
            camera: inputs.camera,
            primary: &primary_output,
            shadows: cascades,
            shadow_length: resolved.shadow_length,
            max_iterations: self.config.raymarch.max_iterations,
            max_ray_distance: self.config.raymarch.max_ray_distance,
        };
        if let Some(view) = debug::visualize(self.config.debug_view, &debug_inputs, output_size) {
            color = view;
        }

        log::debug!(
            "Frame {}: raymarch {:.2?}, resolve {:.2?}, total {:.2?}",
            frame.frame_index,
            raymarched,
            resolved_at - raymarched,
            started.elapsed()
        );

        self.sequencer.advance();
        Ok(FrameOutput {
            color,
            frame_index: frame.frame_index,
            tone_mapping: self.config.debug_view.tone_mapping(),
        })
    }
}

fn primary_stage(config: &PipelineConfig) -> PrimaryRaymarchStage {
    PrimaryRaymarchStage::new(
        config.raymarch,
        config.scattering,
        config.resolution,
        config.resolve.shadow_length,
    )
}

fn check_size(name: &str, size: UVec2, expected: UVec2) -> Result<()> {
    if size == expected {
        Ok(())
    } else {
        Err(Error::Resolution(format!(
            "{name} is {}x{}, expected {}x{}",
            size.x, size.y, expected.x, expected.y
        )))
    }
}

/// Distance along each view ray to the opaque scene; infinite on the far plane.
fn scene_distances(depth: &Texture2D<f32>, camera: &CameraUniforms) -> Texture2D<f32> {
    let size = depth.size();
    Texture2D::from_fn(size, |x, y| {
        let d = depth.get(x, y);
        if is_far_plane(d) {
            return f32::INFINITY;
        }
        view_position(pixel_uv(UVec2::new(x, y), size), log_depth_to_view_z(d, camera.far), camera).length()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atmosphere::{ScatteringSample, SunSkyIrradiance};
    use crate::clouds::{DensitySample, HomogeneousSlab, RaymarchParameters, ScatteringCoefficients};
    use crate::core::Camera;
    use crate::render::upscale::checkerboard::CYCLE_LENGTH;

    struct FlatLight;

    impl AtmosphereModel for FlatLight {
        fn sun_sky_irradiance(&self, _camera: Vec3, _surface: Vec3, _sun: Vec3) -> SunSkyIrradiance {
            SunSkyIrradiance {
                sun: Vec3::ONE,
                sky: Vec3::splat(0.25),
            }
        }

        fn transmittance_and_inscatter(&self, _start: Vec3, _end: Vec3, _sun: Vec3) -> ScatteringSample {
            ScatteringSample::default()
        }
    }

    /// Medium filling all of space, so every view ray sees the same column.
    fn fog(extinction: f32) -> HomogeneousSlab {
        HomogeneousSlab {
            bottom: -1.0e9,
            top: 1.0e9,
            sample: DensitySample {
                extinction,
                scattering_albedo: 1.0,
            },
        }
    }

    fn test_config(mut config: PipelineConfig) -> PipelineConfig {
        config.shadow.map_size = 8;
        config.raymarch = RaymarchParameters {
            max_ground_iterations: 0,
            ..Default::default()
        };
        config.scattering = ScatteringCoefficients {
            anisotropy_1: 0.0,
            anisotropy_2: 0.0,
            ..Default::default()
        };
        config
    }

    struct Scene {
        camera: CameraUniforms,
        color: Texture2D<Vec4>,
        depth: Texture2D<f32>,
    }

    fn sky_scene(size: [u32; 2]) -> Scene {
        let mut camera = Camera::new(Vec3::ZERO, 60.0, 1.0);
        camera.set_aspect(size[0] as f32, size[1] as f32);
        let size = UVec2::from(size);
        Scene {
            camera: camera.uniforms(None),
            color: Texture2D::filled(size, Vec4::new(0.1, 0.2, 0.4, 1.0)),
            depth: Texture2D::filled(size, 1.0),
        }
    }

    fn render(pipeline: &mut FramePipeline, scene: &Scene, density: &dyn DensityField) -> FrameOutput {
        pipeline
            .render(&FrameInputs {
                camera: &scene.camera,
                sun_direction: Vec3::Y,
                scene_color: &scene.color,
                scene_depth: &scene.depth,
                scene_normal: None,
                density,
                atmosphere: &FlatLight,
            })
            .expect("frame renders")
    }

    fn max_difference(a: &Texture2D<Vec4>, b: &Texture2D<Vec4>) -> f32 {
        a.data()
            .iter()
            .zip(b.data())
            .map(|(x, y)| (*x - *y).abs().max_element())
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_output_matches_configured_size() {
        let mut pipeline = FramePipeline::new(test_config(PipelineConfig::upscale([16, 8]))).unwrap();
        let scene = sky_scene([16, 8]);
        let out = render(&mut pipeline, &scene, &fog(0.01));
        assert_eq!(out.color.size(), UVec2::new(16, 8));
        assert_eq!(out.frame_index, 0);
        assert!(out.tone_mapping);
    }

    #[test]
    fn test_frame_index_cycles() {
        let mut pipeline = FramePipeline::new(test_config(PipelineConfig::upscale([8, 8]))).unwrap();
        let scene = sky_scene([8, 8]);
        let indices: Vec<u32> = (0..18).map(|_| render(&mut pipeline, &scene, &fog(0.01)).frame_index).collect();
        assert_eq!(indices[15], 15);
        assert_eq!(indices[16], 0);
        assert_eq!(indices[17], 1);
    }

    #[test]
    fn test_reset_history_restarts_cycle() {
        let mut pipeline = FramePipeline::new(test_config(PipelineConfig::upscale([8, 8]))).unwrap();
        let scene = sky_scene([8, 8]);
        for _ in 0..5 {
            render(&mut pipeline, &scene, &fog(0.01));
        }
        assert_eq!(pipeline.frame_state().frame_index, 5);

        pipeline.reset_history();
        assert_eq!(pipeline.frame_state(), FrameSequencer::new().state());
        assert_eq!(render(&mut pipeline, &scene, &fog(0.01)).frame_index, 0);
    }

    /// Slab between 100 and 300 units up, seen at a slant so opacity varies across rows.
    fn slab(extinction: f32) -> HomogeneousSlab {
        HomogeneousSlab {
            bottom: 100.0,
            top: 300.0,
            sample: DensitySample {
                extinction,
                scattering_albedo: 1.0,
            },
        }
    }

    fn tilted_scene(size: [u32; 2]) -> Scene {
        let pitch = 60f32.to_radians();
        let mut camera = Camera::look_at(Vec3::ZERO, Vec3::new(0.0, pitch.sin(), -pitch.cos()), Vec3::Y);
        camera.set_aspect(size[0] as f32, size[1] as f32);
        let size = UVec2::from(size);
        Scene {
            camera: camera.uniforms(None),
            color: Texture2D::filled(size, Vec4::new(0.1, 0.2, 0.4, 1.0)),
            depth: Texture2D::filled(size, 1.0),
        }
    }

    /// Render `frames` frames of `target` on a fresh pipeline and on one whose history
    /// was first filled by a full cycle of `primer`, returning both final images.
    fn fresh_and_primed(
        config: PipelineConfig,
        scene: &Scene,
        primer: &dyn DensityField,
        target: &dyn DensityField,
        frames: usize,
    ) -> (Texture2D<Vec4>, Texture2D<Vec4>) {
        let mut fresh = FramePipeline::new(config.clone()).unwrap();
        let mut primed = FramePipeline::new(config).unwrap();
        // A full cycle leaves both pipelines on the same frame index
        for _ in 0..CYCLE_LENGTH {
            render(&mut primed, scene, primer);
        }
        let mut last = None;
        for _ in 0..frames {
            last = Some((render(&mut fresh, scene, target).color, render(&mut primed, scene, target).color));
        }
        last.expect("frames rendered")
    }

    #[test]
    fn test_tilted_slab_is_not_uniform() {
        let mut pipeline = FramePipeline::new(test_config(PipelineConfig::upscale([16, 16]))).unwrap();
        let out = render(&mut pipeline, &tilted_scene([16, 16]), &slab(0.002));
        let spread = (out.color.get(8, 1) - out.color.get(8, 14)).abs().max_element();
        assert!(spread > 0.02, "rows should differ across the slant, spread {spread}");
    }

    #[test]
    fn test_upscale_converges_independent_of_history() {
        let scene = tilted_scene([16, 16]);
        let config = test_config(PipelineConfig::upscale([16, 16]));
        let (a, b) = fresh_and_primed(config, &scene, &slab(0.02), &slab(0.002), CYCLE_LENGTH as usize);
        let diff = max_difference(&a, &b);
        assert!(diff < 1e-4, "histories did not converge: max difference {diff}");
    }

    #[test]
    fn test_antialias_converges_within_four_frames() {
        let scene = tilted_scene([16, 16]);
        let config = test_config(PipelineConfig::antialias([16, 16]));
        let (a, b) = fresh_and_primed(config, &scene, &slab(0.02), &slab(0.002), 4);
        let diff = max_difference(&a, &b);
        assert!(diff < 5e-3, "antialias did not converge: max difference {diff}");
    }

    #[test]
    fn test_sky_shows_clouds_over_scene() {
        let mut pipeline = FramePipeline::new(test_config(PipelineConfig::antialias([4, 4]))).unwrap();
        let scene = sky_scene([4, 4]);
        let clear = render(&mut pipeline, &scene, &fog(0.0));
        assert_eq!(clear.color, scene.color);

        let cloudy = render(&mut pipeline, &scene, &fog(0.01));
        let c = cloudy.color.get(1, 1);
        assert_ne!(c, scene.color.get(1, 1));
        assert_eq!(c.w, 1.0);
    }

    #[test]
    fn test_resize_reallocates_at_frame_boundary() {
        let mut pipeline = FramePipeline::new(test_config(PipelineConfig::upscale([8, 8]))).unwrap();
        render(&mut pipeline, &sky_scene([8, 8]), &fog(0.01));
        render(&mut pipeline, &sky_scene([8, 8]), &fog(0.01));

        pipeline.resize([16, 12]).unwrap();
        assert_eq!(pipeline.config().output_size, [8, 8], "resize applies at the next frame");

        let out = render(&mut pipeline, &sky_scene([16, 12]), &fog(0.01));
        assert_eq!(out.color.size(), UVec2::new(16, 12));
        assert_eq!(out.frame_index, 0, "history reset restarts the frame cycle");
    }

    #[test]
    fn test_parameter_change_keeps_frame_cycle() {
        let mut pipeline = FramePipeline::new(test_config(PipelineConfig::upscale([8, 8]))).unwrap();
        let scene = sky_scene([8, 8]);
        render(&mut pipeline, &scene, &fog(0.01));

        let mut config = pipeline.config().clone();
        config.resolve.variance_gamma = 1.5;
        pipeline.reconfigure(config).unwrap();
        let out = render(&mut pipeline, &scene, &fog(0.01));
        assert_eq!(out.frame_index, 1);
    }

    #[test]
    fn test_invalid_reconfigure_is_rejected() {
        let mut pipeline = FramePipeline::new(test_config(PipelineConfig::upscale([8, 8]))).unwrap();
        let mut config = pipeline.config().clone();
        config.shadow.cascade_count = 5;
        assert!(pipeline.reconfigure(config).is_err());
    }

    #[test]
    fn test_mismatched_scene_buffer_is_error() {
        let mut pipeline = FramePipeline::new(test_config(PipelineConfig::upscale([8, 8]))).unwrap();
        let scene = sky_scene([8, 4]);
        let result = pipeline.render(&FrameInputs {
            camera: &scene.camera,
            sun_direction: Vec3::Y,
            scene_color: &scene.color,
            scene_depth: &scene.depth,
            scene_normal: None,
            density: &fog(0.01),
            atmosphere: &FlatLight,
        });
        assert!(matches!(result, Err(Error::Resolution(_))));
    }

    #[test]
    fn test_debug_view_replaces_output() {
        let mut config = test_config(PipelineConfig::upscale([8, 8]));
        config.debug_view = DebugView::SampleCount;
        let mut pipeline = FramePipeline::new(config).unwrap();
        let out = render(&mut pipeline, &sky_scene([8, 8]), &fog(0.01));
        assert!(!out.tone_mapping);
        assert_ne!(out.color.get(0, 0), Vec4::new(0.1, 0.2, 0.4, 1.0));
    }

    #[test]
    fn test_scene_distances_on_axis() {
        let scene = sky_scene([3, 3]);
        let w = 250.0;
        let depth = Texture2D::filled(UVec2::new(3, 3), crate::render::depth::encode_log_depth(-w, scene.camera.far));
        let distances = scene_distances(&depth, &scene.camera);
        assert!((distances.get(1, 1) - w).abs() < 0.1, "center distance {}", distances.get(1, 1));
        assert!(distances.get(0, 0) > w);
        assert_eq!(scene_distances(&scene.depth, &scene.camera).get(0, 0), f32::INFINITY);
    }
}
