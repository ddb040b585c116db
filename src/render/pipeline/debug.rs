//! Debug visualizations of intermediate frame data

use glam::{UVec2, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::core::CameraUniforms;
use crate::render::texture::Texture2D;

use super::clouds::{unpack_depth_velocity, PrimaryOutput};
use super::shadows::ShadowCascades;

/// Which intermediate buffer replaces the final image.
///
/// Exactly one view is active at a time. Any view other than `None`
/// disables tone mapping so the raw values stay legible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebugView {
    #[default]
    None,
    SampleCount,
    FrontDepth,
    ShadowMap,
    CascadeIndex,
    UvFlow,
    ShadowLength,
    Velocity,
}

impl DebugView {
    pub fn is_active(self) -> bool {
        self != DebugView::None
    }

    /// Whether the presenter should tone map this frame
    pub fn tone_mapping(self) -> bool {
        !self.is_active()
    }

    /// Index used in GPU uniform blocks
    pub fn as_u32(self) -> u32 {
        match self {
            DebugView::None => 0,
            DebugView::SampleCount => 1,
            DebugView::FrontDepth => 2,
            DebugView::ShadowMap => 3,
            DebugView::CascadeIndex => 4,
            DebugView::UvFlow => 5,
            DebugView::ShadowLength => 6,
            DebugView::Velocity => 7,
        }
    }
}

const CASCADE_COLORS: [Vec3; 4] = [
    Vec3::new(1.0, 0.0, 0.0),
    Vec3::new(0.0, 1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(1.0, 1.0, 0.0),
];

/// Buffers a debug view may read.
pub struct DebugInputs<'a> {
    pub camera: &'a CameraUniforms,
    pub primary: &'a PrimaryOutput,
    pub shadows: &'a ShadowCascades,
    pub shadow_length: Option<&'a Texture2D<f32>>,
    pub max_iterations: u32,
    pub max_ray_distance: f32,
}

/// Render `view` at output resolution. Returns `None` for [`DebugView::None`].
pub fn visualize(view: DebugView, inputs: &DebugInputs<'_>, output_size: UVec2) -> Option<Texture2D<Vec4>> {
    if !view.is_active() {
        return None;
    }

    let primary = inputs.primary;
    let render_size = primary.depth_velocity.size();
    let scale = (render_size.as_vec2() / output_size.as_vec2()).min(Vec2::ONE);

    Some(Texture2D::from_fn(output_size, |x, y| {
        let uv = (Vec2::new(x as f32, y as f32) + 0.5) / output_size.as_vec2();
        let low = (Vec2::new(x as f32, y as f32) * scale).as_uvec2().min(render_size - 1);
        let (depth, velocity) = unpack_depth_velocity(primary.depth_velocity.get(low.x, low.y));

        let rgb = match view {
            DebugView::None => Vec3::ZERO,
            DebugView::SampleCount => {
                let t = primary.sample_count.get(low.x, low.y) / inputs.max_iterations.max(1) as f32;
                heat(t)
            }
            DebugView::FrontDepth => Vec3::splat(depth / inputs.max_ray_distance),
            DebugView::ShadowMap => {
                let world = inputs.camera.ray(uv).at(depth);
                Vec3::splat(inputs.shadows.transmittance(world))
            }
            DebugView::CascadeIndex => {
                let world = inputs.camera.ray(uv).at(depth);
                inputs
                    .shadows
                    .cascade_index(inputs.camera.view_depth(world))
                    .map_or(Vec3::ZERO, |i| CASCADE_COLORS[i % CASCADE_COLORS.len()])
            }
            DebugView::UvFlow => {
                let previous = uv - velocity / render_size.as_vec2();
                previous.extend(0.0)
            }
            DebugView::ShadowLength => {
                let length = inputs.shadow_length.map_or(0.0, |t| t.get(x, y));
                Vec3::splat(length / inputs.max_ray_distance)
            }
            DebugView::Velocity => velocity.abs().extend(velocity.length()),
        };
        rgb.extend(1.0)
    }))
}

/// Blue to red ramp for normalized counts
fn heat(t: f32) -> Vec3 {
    let t = t.clamp(0.0, 1.0);
    Vec3::new(t, 1.0 - (2.0 * t - 1.0).abs(), 1.0 - t)
}
