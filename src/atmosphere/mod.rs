//! Atmosphere model queried for sun/sky lighting and aerial perspective.
//!
//! Stages only see the [`AtmosphereModel`] trait; [`PrecomputedAtmosphere`]
//! is the table-backed implementation. Positions are world-space meters.

pub mod config;
pub mod ellipsoid;
pub mod lut;

pub use config::AtmosphereConfig;
pub use ellipsoid::EllipsoidFrame;
pub use lut::PrecomputedAtmosphere;

use glam::Vec3;

/// Direct sun and diffuse sky irradiance at a surface point.
///
/// `sun` is the irradiance on a surface facing the sun; callers apply the
/// cosine term. Both values are pre-divided by pi so a Lambertian surface
/// reflects `albedo * irradiance`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SunSkyIrradiance {
    pub sun: Vec3,
    pub sky: Vec3,
}

/// Transmittance and inscattered radiance along a view segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScatteringSample {
    pub transmittance: Vec3,
    pub inscatter: Vec3,
}

impl Default for ScatteringSample {
    fn default() -> Self {
        Self {
            transmittance: Vec3::ONE,
            inscatter: Vec3::ZERO,
        }
    }
}

/// Pure lookups against precomputed atmosphere data. No side effects.
pub trait AtmosphereModel: Send + Sync {
    fn sun_sky_irradiance(&self, camera: Vec3, surface: Vec3, sun_direction: Vec3) -> SunSkyIrradiance;

    fn transmittance_and_inscatter(&self, start: Vec3, end: Vec3, sun_direction: Vec3) -> ScatteringSample;
}
