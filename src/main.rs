//! Headless driver: renders a short camera pan over a procedural cloud layer
//! and logs per-frame statistics.
//!
//! Usage: cargo run --release -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>   Pipeline configuration JSON (default: antialias preset)
//!   --frames <N>      Frames to render (default: 8)
//!   --width <PX>      Output width when no config is given (default: 320)
//!   --height <PX>     Output height when no config is given (default: 180)

use std::path::PathBuf;
use std::time::Instant;

use glam::{Quat, UVec2, Vec2, Vec3, Vec4};

use stratus::atmosphere::{AtmosphereConfig, PrecomputedAtmosphere};
use stratus::clouds::{CloudLayer, CloudLayerConfig};
use stratus::core::{logging, Camera, CameraUniforms, Result};
use stratus::render::depth::encode_log_depth;
use stratus::render::pipeline::{FrameInputs, FramePipeline, PipelineConfig};
use stratus::render::texture::Texture2D;

const GROUND_ALBEDO: Vec4 = Vec4::new(0.18, 0.16, 0.12, 1.0);
const PAN_DEGREES_PER_FRAME: f32 = 0.25;

fn main() {
    logging::init();
    log::info!("Stratus starting...");

    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let frames = parse_arg::<u32>(&args, "--frames").unwrap_or(8);

    let config = match parse_arg::<PathBuf>(&args, "--config") {
        Some(path) => {
            log::info!("Loading pipeline configuration from {}", path.display());
            PipelineConfig::load(&path)?
        }
        None => {
            let mut config = PipelineConfig::antialias([
                parse_arg(&args, "--width").unwrap_or(320),
                parse_arg(&args, "--height").unwrap_or(180),
            ]);
            // Scene color is albedo; relight it
            config.compositor.sun_irradiance = true;
            config.compositor.sky_irradiance = true;
            config
        }
    };

    let atmosphere = PrecomputedAtmosphere::new(AtmosphereConfig::default())?;
    let clouds = CloudLayer::new(CloudLayerConfig::default());
    let mut pipeline = FramePipeline::new(config)?;

    let size = pipeline.config().output_size();
    let sun_direction = Vec3::new(0.3, 0.5, -0.8).normalize();
    let mut camera = Camera::look_at(
        Vec3::new(0.0, 200.0, 0.0),
        Vec3::new(0.0, 1200.0, -10_000.0),
        Vec3::Y,
    );
    camera.set_aspect(size.x as f32, size.y as f32);

    let mut previous: Option<CameraUniforms> = None;
    let started = Instant::now();
    for _ in 0..frames {
        let uniforms = camera.uniforms(previous.as_ref());
        let (scene_color, scene_depth) = ground_plane(&uniforms, size);

        let frame_start = Instant::now();
        let output = pipeline.render(&FrameInputs {
            camera: &uniforms,
            sun_direction,
            scene_color: &scene_color,
            scene_depth: &scene_depth,
            scene_normal: None,
            density: &clouds,
            atmosphere: &atmosphere,
        })?;

        let luminance = mean_luminance(&output.color);
        log::info!(
            "Frame {:>3}: {:>7.2} ms, mean luminance {:.4}",
            output.frame_index,
            frame_start.elapsed().as_secs_f64() * 1000.0,
            luminance
        );

        previous = Some(uniforms);
        camera.rotation = Quat::from_rotation_y(PAN_DEGREES_PER_FRAME.to_radians()) * camera.rotation;
    }

    let elapsed = started.elapsed().as_secs_f64();
    if frames > 0 {
        log::info!(
            "Rendered {} frames in {:.2}s ({:.1} ms/frame)",
            frames,
            elapsed,
            elapsed * 1000.0 / frames as f64
        );
    }
    Ok(())
}

/// Flat ground at y = 0 below the horizon, sky above.
fn ground_plane(camera: &CameraUniforms, size: UVec2) -> (Texture2D<Vec4>, Texture2D<f32>) {
    // View depth of the ground hit, 0 where the ray sees sky
    let hits = Texture2D::from_fn(size, |x, y| {
        let ray = camera.ray(screen_uv(x, y, size));
        if ray.direction.y >= 0.0 {
            return 0.0;
        }
        let view_depth = camera.view_depth(ray.at(-ray.origin.y / ray.direction.y));
        if view_depth < camera.far { view_depth } else { 0.0 }
    });

    let color = Texture2D::from_fn(size, |x, y| {
        if hits.get(x, y) > 0.0 {
            GROUND_ALBEDO
        } else {
            Vec4::new(0.0, 0.0, 0.0, 1.0)
        }
    });
    let depth = Texture2D::from_fn(size, |x, y| match hits.get(x, y) {
        view_depth if view_depth > 0.0 => encode_log_depth(-view_depth, camera.far),
        _ => 1.0,
    });
    (color, depth)
}

fn screen_uv(x: u32, y: u32, size: UVec2) -> Vec2 {
    (Vec2::new(x as f32, y as f32) + 0.5) / size.as_vec2()
}

fn mean_luminance(color: &Texture2D<Vec4>) -> f32 {
    let weights = Vec3::new(0.2126, 0.7152, 0.0722);
    let total: f32 = color.data().iter().map(|c| c.truncate().dot(weights)).sum();
    total / color.data().len().max(1) as f32
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
