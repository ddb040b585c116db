//! Physical atmosphere parameters.

use serde::{Deserialize, Serialize};

use crate::clouds::config::{in_range, positive};
use crate::core::ConfigError;

/// Planet and scattering constants of the precomputed atmosphere.
///
/// Lengths are meters and coefficients are per meter. The defaults describe
/// an Earth-like atmosphere with the planet center directly below the world
/// origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmosphereConfig {
    pub planet_center: [f32; 3],
    pub bottom_radius: f32,
    pub top_radius: f32,
    /// Extraterrestrial solar irradiance (linear RGB)
    pub solar_irradiance: [f32; 3],
    pub rayleigh_scattering: [f32; 3],
    pub rayleigh_scale_height: f32,
    pub mie_scattering: f32,
    pub mie_extinction: f32,
    pub mie_scale_height: f32,
    /// Mie phase anisotropy
    pub mie_g: f32,
    /// Transmittance table resolution (cos zenith, altitude)
    pub lut_size: [u32; 2],
    /// Integration steps per table entry
    pub lut_steps: u32,
}

impl Default for AtmosphereConfig {
    fn default() -> Self {
        Self {
            planet_center: [0.0, -6_360_000.0, 0.0],
            bottom_radius: 6_360_000.0,
            top_radius: 6_420_000.0,
            solar_irradiance: [1.474, 1.8504, 1.91198],
            rayleigh_scattering: [5.802e-6, 13.558e-6, 33.1e-6],
            rayleigh_scale_height: 8000.0,
            mie_scattering: 3.996e-6,
            mie_extinction: 4.44e-6,
            mie_scale_height: 1200.0,
            mie_g: 0.8,
            lut_size: [256, 64],
            lut_steps: 40,
        }
    }
}

impl AtmosphereConfig {
    /// Same planet with every coefficient zeroed: transmittance 1, no inscatter.
    pub fn vacuum() -> Self {
        Self {
            rayleigh_scattering: [0.0; 3],
            mie_scattering: 0.0,
            mie_extinction: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        const GROUP: &str = "atmosphere";
        positive(GROUP, "bottom_radius", self.bottom_radius)?;
        in_range(GROUP, "top_radius", self.top_radius, self.bottom_radius, f32::MAX)?;
        positive(GROUP, "rayleigh_scale_height", self.rayleigh_scale_height)?;
        positive(GROUP, "mie_scale_height", self.mie_scale_height)?;
        in_range(GROUP, "mie_scattering", self.mie_scattering, 0.0, self.mie_extinction.max(0.0))?;
        in_range(GROUP, "mie_g", self.mie_g, -1.0, 1.0)?;
        positive(GROUP, "lut_size", self.lut_size[0].min(self.lut_size[1]) as f32)?;
        positive(GROUP, "lut_steps", self.lut_steps as f32)?;
        Ok(())
    }
}
