//! Cloud density fields queried by the raymarch stages.

use glam::Vec3;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::math::Ray;

/// Medium properties at one point.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DensitySample {
    /// Density scaling the extinction coefficient; 0 outside the medium
    pub extinction: f32,
    /// Fraction of extinction that scatters, in `[0, 1]`
    pub scattering_albedo: f32,
}

impl DensitySample {
    pub const EMPTY: Self = Self {
        extinction: 0.0,
        scattering_albedo: 0.0,
    };
}

/// Participating medium sampled by the primary and shadow marches.
///
/// Implementations must be pure: the same position always yields the same
/// sample within a frame, and positions outside the medium return
/// [`DensitySample::EMPTY`].
pub trait DensityField: Send + Sync {
    fn density(&self, position: Vec3) -> DensitySample;

    /// Parametric interval of `ray` that may contain non-zero density.
    ///
    /// The default covers the whole ray.
    fn ray_interval(&self, _ray: &Ray) -> Option<(f32, f32)> {
        Some((0.0, f32::INFINITY))
    }
}

// ---------------------------------------------------------------------------
// Procedural cloud layer
// ---------------------------------------------------------------------------

/// Shape of the procedural cloud shell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudLayerConfig {
    pub seed: u32,
    /// Center of the planet in world space
    pub planet_center: [f32; 3],
    pub planet_radius: f32,
    /// Cloud base above the surface (meters)
    pub min_altitude: f32,
    /// Cloud top above the surface (meters)
    pub max_altitude: f32,
    /// Fraction of the sky covered, `[0, 1]`
    pub coverage: f32,
    pub density_scale: f32,
    /// Noise frequency in cycles per meter
    pub frequency: f32,
    pub octaves: usize,
    /// Accumulated wind displacement of the noise domain
    pub wind_offset: [f32; 3],
    pub scattering_albedo: f32,
}

impl Default for CloudLayerConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            planet_center: [0.0, -6_360_000.0, 0.0],
            planet_radius: 6_360_000.0,
            min_altitude: 1500.0,
            max_altitude: 4000.0,
            coverage: 0.4,
            density_scale: 0.02,
            frequency: 1.0 / 8000.0,
            octaves: 4,
            wind_offset: [0.0; 3],
            scattering_albedo: 0.98,
        }
    }
}

/// Fractal-noise clouds inside a spherical shell around the planet.
pub struct CloudLayer {
    config: CloudLayerConfig,
    center: Vec3,
    noise: Fbm<Perlin>,
}

impl CloudLayer {
    pub fn new(config: CloudLayerConfig) -> Self {
        let noise = Fbm::<Perlin>::new(config.seed)
            .set_octaves(config.octaves)
            .set_persistence(0.5)
            .set_lacunarity(2.0);
        Self {
            center: Vec3::from(config.planet_center),
            noise,
            config,
        }
    }

    pub fn config(&self) -> &CloudLayerConfig {
        &self.config
    }

    fn inner_radius(&self) -> f32 {
        self.config.planet_radius + self.config.min_altitude
    }

    fn outer_radius(&self) -> f32 {
        self.config.planet_radius + self.config.max_altitude
    }

    /// Vertical profile: zero at base and top, peaking in the lower half.
    fn height_gradient(h: f32) -> f32 {
        let rise = (h / 0.2).clamp(0.0, 1.0);
        let fall = ((1.0 - h) / 0.6).clamp(0.0, 1.0);
        rise * fall
    }
}

impl DensityField for CloudLayer {
    fn density(&self, position: Vec3) -> DensitySample {
        let r = (position - self.center).length();
        let h = (r - self.inner_radius()) / (self.outer_radius() - self.inner_radius());
        if !(0.0..=1.0).contains(&h) {
            return DensitySample::EMPTY;
        }

        let p = (position + Vec3::from(self.config.wind_offset)) * self.config.frequency;
        let n = self.noise.get([p.x as f64, p.y as f64, p.z as f64]) as f32 * 0.5 + 0.5;

        let coverage = self.config.coverage.clamp(1e-3, 1.0);
        let shaped = n * Self::height_gradient(h);
        let d = ((shaped - (1.0 - coverage)) / coverage).clamp(0.0, 1.0);
        if d <= 0.0 {
            return DensitySample::EMPTY;
        }
        DensitySample {
            extinction: d * self.config.density_scale,
            scattering_albedo: self.config.scattering_albedo,
        }
    }

    fn ray_interval(&self, ray: &Ray) -> Option<(f32, f32)> {
        ray.intersects_shell(self.center, self.inner_radius(), self.outer_radius())
    }
}

// ---------------------------------------------------------------------------
// Homogeneous slab
// ---------------------------------------------------------------------------

/// Constant density between two world heights. Used for calibration
/// scenes where the analytic transmittance is known.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HomogeneousSlab {
    pub bottom: f32,
    pub top: f32,
    pub sample: DensitySample,
}

impl DensityField for HomogeneousSlab {
    fn density(&self, position: Vec3) -> DensitySample {
        if position.y >= self.bottom && position.y <= self.top {
            self.sample
        } else {
            DensitySample::EMPTY
        }
    }

    fn ray_interval(&self, ray: &Ray) -> Option<(f32, f32)> {
        let dy = ray.direction.y;
        if dy.abs() < 1e-6 {
            let inside = ray.origin.y >= self.bottom && ray.origin.y <= self.top;
            return inside.then_some((0.0, f32::INFINITY));
        }
        let t0 = (self.bottom - ray.origin.y) / dy;
        let t1 = (self.top - ray.origin.y) / dy;
        let (near, far) = (t0.min(t1), t0.max(t1));
        (far >= 0.0).then_some((near.max(0.0), far))
    }
}
