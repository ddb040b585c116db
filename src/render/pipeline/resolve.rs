//! Temporal resolve: variance-clipped history reprojection.
//!
//! Two modes share the same primitives. Antialiasing blends the clipped
//! history with a full-resolution current sample. Upscaling reconstructs a
//! full-resolution image from quarter-resolution samples, taking a raw
//! sample for the one sub-pixel per 4x4 block scheduled this frame and a
//! clipped history value for the other fifteen.
//!
//! The depth-velocity buffer stores `(depth, velocity.x, velocity.y)` per
//! render texel, velocity in texels of that buffer. A pixel's previous UV is
//! `uv - velocity * texel_size`.

use glam::{IVec2, UVec2, Vec2, Vec3, Vec4};

use crate::core::{Error, FrameState, Result};
use crate::render::texture::{PingPong, Texel, Texture2D};
use crate::render::upscale::checkerboard;

use super::config::{ResolveConfig, ResolveMode, ResolutionScale};

/// Added to the clip box extent so a flat neighborhood still has a volume.
const CLIP_EPSILON: f32 = 1e-7;

/// Per-channel arithmetic needed by the variance clip.
pub trait Channels: Texel {
    fn splat(value: f32) -> Self;
    fn mul_elem(self, other: Self) -> Self;
    fn div_elem(self, other: Self) -> Self;
    fn max_elem(self, other: Self) -> Self;
    fn abs_elem(self) -> Self;
    fn max_component(self) -> f32;
}

impl Channels for f32 {
    fn splat(value: f32) -> Self {
        value
    }
    fn mul_elem(self, other: Self) -> Self {
        self * other
    }
    fn div_elem(self, other: Self) -> Self {
        self / other
    }
    fn max_elem(self, other: Self) -> Self {
        self.max(other)
    }
    fn abs_elem(self) -> Self {
        self.abs()
    }
    fn max_component(self) -> f32 {
        self
    }
}

impl Channels for Vec4 {
    fn splat(value: f32) -> Self {
        Vec4::splat(value)
    }
    fn mul_elem(self, other: Self) -> Self {
        self * other
    }
    fn div_elem(self, other: Self) -> Self {
        self / other
    }
    fn max_elem(self, other: Self) -> Self {
        self.max(other)
    }
    fn abs_elem(self) -> Self {
        self.abs()
    }
    fn max_component(self) -> f32 {
        self.max_element()
    }
}

/// Mean and variance of a sample neighborhood.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborhoodStats<T> {
    pub mean: T,
    pub variance: T,
}

impl<T: Channels> NeighborhoodStats<T> {
    pub fn from_samples(samples: &[T]) -> Self {
        let n = samples.len().max(1) as f32;
        let mut sum = T::default();
        let mut sum_sq = T::default();
        for &s in samples {
            sum = sum + s;
            sum_sq = sum_sq + s.mul_elem(s);
        }
        let mean = sum * (1.0 / n);
        Self {
            mean,
            variance: (sum_sq * (1.0 / n) - mean.mul_elem(mean)).max_elem(T::splat(0.0)),
        }
    }

    /// Clip `history` toward the mean into the box `mean ± gamma * variance`.
    pub fn clip(&self, history: T, gamma: f32) -> T {
        let extent = self.variance * gamma + T::splat(CLIP_EPSILON);
        let offset = history - self.mean;
        let units = offset.div_elem(extent).abs_elem().max_component();
        if units > 1.0 {
            self.mean + offset * (1.0 / units)
        } else {
            history
        }
    }
}

/// Clip a history value into the color box of a 3x3 neighborhood.
pub fn variance_clip<T: Channels>(neighborhood: &[T], history: T, gamma: f32) -> T {
    NeighborhoodStats::from_samples(neighborhood).clip(history, gamma)
}

/// Depth-velocity texel with the smallest depth in the 3x3 window around `coord`.
pub fn closest_fragment(depth_velocity: &Texture2D<Vec3>, coord: IVec2) -> Vec3 {
    depth_velocity
        .neighborhood(coord)
        .into_iter()
        .fold(Vec3::splat(f32::INFINITY), |closest, s| if s.x < closest.x { s } else { closest })
}

/// Previous-frame UV of `uv` given a velocity in texels of a buffer with `texel_size`.
#[inline]
pub fn reprojected_uv(uv: Vec2, velocity: Vec2, texel_size: Vec2) -> Vec2 {
    uv - velocity * texel_size
}

/// History is usable only when the previous UV lies inside `[0, 1]^2`.
#[inline]
pub fn history_accepted(previous_uv: Vec2) -> bool {
    (0.0..=1.0).contains(&previous_uv.x) && (0.0..=1.0).contains(&previous_uv.y)
}

fn reproject(depth_velocity: &Texture2D<Vec3>, coord: IVec2, uv: Vec2) -> Vec2 {
    let closest = closest_fragment(depth_velocity, coord);
    reprojected_uv(uv, Vec2::new(closest.y, closest.z), depth_velocity.texel_size())
}

/// Temporal antialiasing of one channel.
///
/// `current` and `depth_velocity` share a size. A larger `output` upsamples
/// the current samples bilinearly. Without history or when reprojection
/// leaves the screen, the current sample is written unblended.
pub fn temporal_antialias<T: Channels>(
    current: &Texture2D<T>,
    depth_velocity: &Texture2D<Vec3>,
    history: Option<&Texture2D<T>>,
    temporal_alpha: f32,
    variance_gamma: f32,
    output: &mut Texture2D<T>,
) {
    let output_size = output.size();
    let scale = current.size().as_vec2() / output_size.as_vec2();
    output.par_fill(|x, y| {
        let uv = output_uv(x, y, output_size);
        let coord = (Vec2::new(x as f32, y as f32) * scale).as_ivec2();
        let sample = current.sample(uv);
        let Some(history) = history else {
            return sample;
        };
        let previous_uv = reproject(depth_velocity, coord, uv);
        if !history_accepted(previous_uv) {
            return sample;
        }
        let clipped = variance_clip(&current.neighborhood(coord), history.sample(previous_uv), variance_gamma);
        clipped + (sample - clipped) * temporal_alpha
    });
}

/// Reconstruct a full-resolution channel from quarter-resolution samples.
///
/// The sub-pixel scheduled for `frame_index` in each 4x4 block takes the
/// raw current sample. Every other pixel takes its reprojected history
/// clipped into the surrounding low-resolution neighborhood, with no blend.
pub fn checkerboard_upscale<T: Channels>(
    current: &Texture2D<T>,
    depth_velocity: &Texture2D<Vec3>,
    history: Option<&Texture2D<T>>,
    frame_index: u32,
    variance_gamma: f32,
    output: &mut Texture2D<T>,
) {
    let max_low = current.size().as_ivec2() - 1;
    let block = checkerboard::BLOCK_SIZE;
    output.par_fill(|x, y| {
        let low = IVec2::new((x / block) as i32, (y / block) as i32).min(max_low);
        let sample = current.fetch(low);
        if checkerboard::is_current(UVec2::new(x % block, y % block), frame_index) {
            return sample;
        }
        let Some(history) = history else {
            return sample;
        };
        let previous_uv = reproject(depth_velocity, low, output_uv(x, y, history.size()));
        if !history_accepted(previous_uv) {
            return sample;
        }
        variance_clip(&current.neighborhood(low), history.sample(previous_uv), variance_gamma)
    });
}

#[inline]
fn output_uv(x: u32, y: u32, size: UVec2) -> Vec2 {
    (Vec2::new(x as f32, y as f32) + 0.5) / size.as_vec2()
}

/// Render-resolution inputs to one resolve.
pub struct ResolveInputs<'a> {
    pub color: &'a Texture2D<Vec4>,
    pub depth_velocity: &'a Texture2D<Vec3>,
    pub shadow_length: Option<&'a Texture2D<f32>>,
}

/// Resolved full-resolution outputs, valid until the next resolve.
pub struct ResolvedFrame<'a> {
    pub color: &'a Texture2D<Vec4>,
    pub shadow_length: Option<&'a Texture2D<f32>>,
}

/// Owns the color and shadow-length histories across frames.
///
/// The shadow-length channel is reprojected with the same depth-velocity
/// buffer as color. That velocity follows the scene depth, so it is exact at
/// opaque silhouettes and only approximate near pure cloud edges, which have
/// no surface motion of their own.
pub struct TemporalResolver {
    config: ResolveConfig,
    output_size: UVec2,
    render_size: UVec2,
    color: PingPong<Vec4>,
    shadow_length: Option<PingPong<f32>>,
}

impl TemporalResolver {
    pub fn new(config: ResolveConfig, output_size: UVec2, resolution: ResolutionScale) -> Self {
        Self {
            color: PingPong::new(output_size),
            shadow_length: config.shadow_length.then(|| PingPong::new(output_size)),
            render_size: resolution.render_size(output_size),
            output_size,
            config,
        }
    }

    pub fn config(&self) -> &ResolveConfig {
        &self.config
    }

    pub fn output_size(&self) -> UVec2 {
        self.output_size
    }

    /// Update blend parameters. History is kept.
    pub fn set_parameters(&mut self, temporal_alpha: f32, variance_gamma: f32) {
        self.config.temporal_alpha = temporal_alpha;
        self.config.variance_gamma = variance_gamma;
    }

    /// Discard history. The next frame resolves from its current samples only.
    pub fn reset(&mut self) {
        self.color.reset();
        if let Some(shadow_length) = &mut self.shadow_length {
            shadow_length.reset();
        }
    }

    /// Resolve one frame and rotate history.
    ///
    /// Fails if an input does not match the configured render size or the
    /// shadow-length channel is enabled but missing, so a stale buffer is
    /// never sampled.
    pub fn resolve(&mut self, frame: &FrameState, inputs: ResolveInputs<'_>) -> Result<ResolvedFrame<'_>> {
        self.check_size("color", inputs.color.size())?;
        self.check_size("depth-velocity", inputs.depth_velocity.size())?;

        let config = self.config;
        resolve_channel(&config, frame, inputs.color, inputs.depth_velocity, &mut self.color);

        match (&mut self.shadow_length, inputs.shadow_length) {
            (Some(history), Some(current)) => {
                if current.size() != self.render_size {
                    return Err(Error::Resolution(format!(
                        "shadow-length buffer is {}x{}, expected {}x{}",
                        current.size().x,
                        current.size().y,
                        self.render_size.x,
                        self.render_size.y
                    )));
                }
                resolve_channel(&config, frame, current, inputs.depth_velocity, history);
            }
            (Some(_), None) => {
                return Err(Error::Resolution("shadow-length channel enabled but not rendered".into()));
            }
            (None, _) => {}
        }

        Ok(ResolvedFrame {
            color: self.color.latest().ok_or_else(|| Error::Resolution("color history empty".into()))?,
            shadow_length: self.shadow_length.as_ref().and_then(|h| h.latest()),
        })
    }

    fn check_size(&self, name: &str, size: UVec2) -> Result<()> {
        if size == self.render_size {
            Ok(())
        } else {
            Err(Error::Resolution(format!(
                "{name} buffer is {}x{}, expected {}x{}",
                size.x, size.y, self.render_size.x, self.render_size.y
            )))
        }
    }
}

fn resolve_channel<T: Channels>(
    config: &ResolveConfig,
    frame: &FrameState,
    current: &Texture2D<T>,
    depth_velocity: &Texture2D<Vec3>,
    history: &mut PingPong<T>,
) {
    let (output, previous) = history.output_and_history();
    match config.mode {
        ResolveMode::Antialias => temporal_antialias(
            current,
            depth_velocity,
            previous,
            config.temporal_alpha,
            config.variance_gamma,
            output,
        ),
        ResolveMode::Upscale => checkerboard_upscale(
            current,
            depth_velocity,
            previous,
            frame.frame_index,
            config.variance_gamma,
            output,
        ),
    }
    history.swap();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn still(size: UVec2) -> Texture2D<Vec3> {
        Texture2D::filled(size, Vec3::new(100.0, 0.0, 0.0))
    }

    #[test]
    fn test_stats_of_constant_neighborhood() {
        let stats = NeighborhoodStats::from_samples(&[2.0f32; 9]);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.variance, 0.0);
    }

    #[test]
    fn test_clip_leaves_inside_value() {
        let samples = [0.0f32, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0];
        assert_eq!(variance_clip(&samples, 1.2, 1.0), 1.2);
    }

    #[test]
    fn test_stats_variance() {
        let samples = [0.0f32, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0];
        let stats = NeighborhoodStats::from_samples(&samples);
        assert!((stats.mean - 1.0).abs() < 1e-6, "mean {}", stats.mean);
        assert!((stats.variance - 2.0 / 3.0).abs() < 1e-6, "variance {}", stats.variance);
    }

    #[test]
    fn test_clip_bounds_outlier() {
        let samples = [0.0f32, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0];
        let stats = NeighborhoodStats::from_samples(&samples);
        for gamma in [0.5, 1.0, 2.0] {
            for history in [50.0, -50.0] {
                let clipped = variance_clip(&samples, history, gamma);
                let upper = stats.mean + gamma * stats.variance;
                let lower = stats.mean - gamma * stats.variance;
                assert!(clipped <= upper + 1e-5, "gamma {gamma}: {clipped} > {upper}");
                assert!(clipped >= lower - 1e-5, "gamma {gamma}: {clipped} < {lower}");
            }
        }
        // gamma 1 puts the clipped outlier on the upper face
        let clipped = variance_clip(&samples, 50.0, 1.0);
        assert!((clipped - 5.0 / 3.0).abs() < 1e-5, "clipped {clipped}");
    }

    #[test]
    fn test_clip_bounds_color_per_channel() {
        let samples: Vec<Vec4> = (0..9).map(|i| Vec4::new(0.1 * i as f32, 0.2, 0.05 * (i % 3) as f32, 0.5)).collect();
        let stats = NeighborhoodStats::from_samples(&samples);
        let gamma = 1.5;
        let clipped = stats.clip(Vec4::new(3.0, -1.0, 0.9, 0.5), gamma);
        let extent = stats.variance * gamma + Vec4::splat(CLIP_EPSILON);
        let offset = (clipped - stats.mean).abs();
        assert!(offset.cmple(extent + Vec4::splat(1e-6)).all(), "{clipped:?} outside {:?} ± {extent:?}", stats.mean);
    }

    #[test]
    fn test_clip_moves_along_line_to_mean() {
        let samples = [Vec4::ZERO, Vec4::ONE, Vec4::ZERO, Vec4::ONE, Vec4::ZERO, Vec4::ONE, Vec4::ZERO, Vec4::ONE, Vec4::ZERO];
        let stats = NeighborhoodStats::from_samples(&samples);
        let history = Vec4::new(10.0, 5.0, 0.5, 0.5);
        let clipped = stats.clip(history, 1.0);
        let a = (history - stats.mean).normalize();
        let b = (clipped - stats.mean).normalize();
        assert!(a.dot(b) > 0.9999, "clip left the mean-history line: {clipped:?}");
    }

    #[test]
    fn test_closest_fragment_picks_smallest_depth() {
        let mut dv = still(UVec2::new(3, 3));
        dv.set(2, 0, Vec3::new(5.0, 1.0, 2.0));
        let closest = closest_fragment(&dv, IVec2::new(1, 1));
        assert_eq!(closest, Vec3::new(5.0, 1.0, 2.0));
    }

    #[test]
    fn test_history_acceptance_edges() {
        assert!(history_accepted(Vec2::new(0.0, 0.5)));
        assert!(history_accepted(Vec2::new(1.0, 1.0)));
        assert!(!history_accepted(Vec2::new(-1e-4, 0.5)));
        assert!(!history_accepted(Vec2::new(0.5, 1.0001)));
    }

    #[test]
    fn test_antialias_without_history_is_current() {
        let size = UVec2::new(4, 4);
        let current = Texture2D::from_fn(size, |x, y| (x * 3 + y) as f32);
        let mut out = Texture2D::new(size);
        temporal_antialias(&current, &still(size), None, 0.1, 1.0, &mut out);
        assert_eq!(out, current);
    }

    #[test]
    fn test_antialias_rejects_offscreen_history() {
        let size = UVec2::new(4, 4);
        let current = Texture2D::filled(size, 1.0f32);
        let history = Texture2D::filled(size, 9.0f32);
        // Moving right by 4 texels: previous UV of column 0 is off screen
        let dv = Texture2D::filled(size, Vec3::new(100.0, 4.0, 0.0));
        let mut out = Texture2D::new(size);
        temporal_antialias(&current, &dv, Some(&history), 0.1, 1.0, &mut out);
        assert_eq!(out.get(0, 0), 1.0);
    }

    #[test]
    fn test_history_accepted_exactly_at_left_edge() {
        let size = UVec2::new(4, 1);
        let current = Texture2D::from_fn(size, |x, _| if x % 2 == 0 { 0.0f32 } else { 2.0 });
        let history = Texture2D::filled(size, 1.5f32);
        let alpha = 0.1;

        // Column 0 sits at u = 0.125; half a texel of motion puts it at u = 0.0
        let on_edge = Texture2D::filled(size, Vec3::new(10.0, 0.5, 0.0));
        let mut out = Texture2D::new(size);
        temporal_antialias(&current, &on_edge, Some(&history), alpha, 1.0, &mut out);
        let expected = 1.5 + (0.0 - 1.5) * alpha;
        assert!((out.get(0, 0) - expected).abs() < 1e-5, "edge pixel {} != {expected}", out.get(0, 0));

        let past_edge = Texture2D::filled(size, Vec3::new(10.0, 0.5 + 4e-4, 0.0));
        temporal_antialias(&current, &past_edge, Some(&history), alpha, 1.0, &mut out);
        assert_eq!(out.get(0, 0), 0.0);
    }

    #[test]
    fn test_antialias_upsamples_lower_resolution() {
        let current = Texture2D::filled(UVec2::new(2, 2), 3.0f32);
        let mut out = Texture2D::new(UVec2::new(4, 4));
        temporal_antialias(&current, &still(UVec2::new(2, 2)), None, 0.1, 1.0, &mut out);
        assert!(out.data().iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_upscale_current_sub_pixel_takes_raw_sample() {
        let low = Texture2D::from_fn(UVec2::new(2, 2), |x, y| (1 + x + 2 * y) as f32);
        let history = Texture2D::filled(UVec2::new(8, 8), 100.0f32);
        let mut out = Texture2D::new(UVec2::new(8, 8));
        let frame = 5;
        checkerboard_upscale(&low, &still(UVec2::new(2, 2)), Some(&history), frame, 1.0, &mut out);

        let sub = checkerboard::sub_pixel_for_frame(frame);
        for by in 0..2 {
            for bx in 0..2 {
                let (x, y) = (bx * 4 + sub.x, by * 4 + sub.y);
                assert_eq!(out.get(x, y), low.get(bx, by), "block ({bx}, {by})");
            }
        }
        // Other sub-pixels hold history clipped into the low-res box
        assert!(out.get((sub.x + 1) % 4, sub.y) <= 4.0 + 1e-3);
    }

    #[test]
    fn test_resolver_rejects_wrong_size() {
        let mut resolver = TemporalResolver::new(ResolveConfig::upscale(), UVec2::new(8, 8), ResolutionScale::Quarter);
        let color = Texture2D::<Vec4>::new(UVec2::new(3, 2));
        let dv = still(UVec2::new(2, 2));
        let result = resolver.resolve(
            &FrameState::default(),
            ResolveInputs {
                color: &color,
                depth_velocity: &dv,
                shadow_length: None,
            },
        );
        assert!(matches!(result, Err(Error::Resolution(_))));
    }

    #[test]
    fn test_resolver_requires_enabled_shadow_length() {
        let config = ResolveConfig {
            shadow_length: true,
            ..ResolveConfig::antialias()
        };
        let size = UVec2::new(4, 4);
        let mut resolver = TemporalResolver::new(config, size, ResolutionScale::Full);
        let color = Texture2D::<Vec4>::new(size);
        let dv = still(size);
        let result = resolver.resolve(
            &FrameState::default(),
            ResolveInputs {
                color: &color,
                depth_velocity: &dv,
                shadow_length: None,
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_reset_drops_history() {
        let size = UVec2::new(4, 4);
        let mut resolver = TemporalResolver::new(ResolveConfig::antialias(), size, ResolutionScale::Full);
        let dv = still(size);
        let bright = Texture2D::filled(size, Vec4::ONE);
        let frame = FrameState::default();
        resolver
            .resolve(&frame, ResolveInputs { color: &bright, depth_velocity: &dv, shadow_length: None })
            .unwrap();
        resolver.reset();

        let dark = Texture2D::from_fn(size, |x, _| Vec4::splat(x as f32 * 0.1));
        let resolved = resolver
            .resolve(&frame, ResolveInputs { color: &dark, depth_velocity: &dv, shadow_length: None })
            .unwrap();
        assert_eq!(*resolved.color, dark);
    }
}
