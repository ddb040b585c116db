//! Cloud raymarching, scattering and shadow cascade parameters.

use serde::{Deserialize, Serialize};

use crate::core::ConfigError;

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

pub(crate) fn positive(group: &'static str, field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { group, field, value })
    }
}

pub(crate) fn in_range(
    group: &'static str,
    field: &'static str,
    value: f32,
    min: f32,
    max: f32,
) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { group, field, value, min, max })
    }
}

fn step_range(group: &'static str, min: f32, max: f32) -> Result<(), ConfigError> {
    positive(group, "min_step_size", min)?;
    if min > max {
        return Err(ConfigError::StepRange { group, min, max });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Primary raymarch
// ---------------------------------------------------------------------------

/// Step and iteration limits for camera rays through the cloud layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaymarchParameters {
    pub max_iterations: u32,
    /// Step length at the start of the ray (meters)
    pub min_step_size: f32,
    /// Step length reached at `max_ray_distance`
    pub max_step_size: f32,
    /// Distance marched beyond which the ray terminates
    pub max_ray_distance: f32,
    /// Steps toward the sun per sample (0 disables sun shadowing)
    pub max_sun_iterations: u32,
    /// Steps toward the ground per sample (0 disables ground bounce)
    pub max_ground_iterations: u32,
    /// Step length of the sun and ground marches
    pub secondary_step_size: f32,
}

impl Default for RaymarchParameters {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            min_step_size: 50.0,
            max_step_size: 1000.0,
            max_ray_distance: 2.0e5,
            max_sun_iterations: 3,
            max_ground_iterations: 2,
            secondary_step_size: 100.0,
        }
    }
}

impl RaymarchParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        const GROUP: &str = "raymarch";
        positive(GROUP, "max_iterations", self.max_iterations as f32)?;
        step_range(GROUP, self.min_step_size, self.max_step_size)?;
        positive(GROUP, "max_ray_distance", self.max_ray_distance)?;
        positive(GROUP, "secondary_step_size", self.secondary_step_size)?;
        Ok(())
    }

    /// Step length after marching `distance` along the ray.
    #[inline]
    pub fn step_size_at(&self, distance: f32) -> f32 {
        let t = (distance / self.max_ray_distance).clamp(0.0, 1.0);
        self.min_step_size + (self.max_step_size - self.min_step_size) * t
    }
}

// ---------------------------------------------------------------------------
// Scattering
// ---------------------------------------------------------------------------

/// Physical scattering constants of the cloud medium.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatteringCoefficients {
    /// Scattering coefficient per unit density (1/m)
    pub scattering_coefficient: f32,
    /// Absorption coefficient per unit density (1/m)
    pub absorption_coefficient: f32,
    /// Forward lobe anisotropy
    pub anisotropy_1: f32,
    /// Backward lobe anisotropy
    pub anisotropy_2: f32,
    /// Weight of the second lobe
    pub anisotropy_mix: f32,
    pub sky_irradiance_scale: f32,
    pub ground_irradiance_scale: f32,
    /// Albedo of the ground below the clouds for the bounce term
    pub ground_albedo: f32,
    pub powder_scale: f32,
    pub powder_exponent: f32,
}

impl Default for ScatteringCoefficients {
    fn default() -> Self {
        Self {
            scattering_coefficient: 1.0,
            absorption_coefficient: 0.0,
            anisotropy_1: 0.7,
            anisotropy_2: -0.2,
            anisotropy_mix: 0.5,
            sky_irradiance_scale: 2.5,
            ground_irradiance_scale: 3.0,
            ground_albedo: 0.3,
            powder_scale: 0.8,
            powder_exponent: 150.0,
        }
    }
}

impl ScatteringCoefficients {
    pub fn validate(&self) -> Result<(), ConfigError> {
        const GROUP: &str = "scattering";
        in_range(GROUP, "scattering_coefficient", self.scattering_coefficient, 0.0, f32::MAX)?;
        in_range(GROUP, "absorption_coefficient", self.absorption_coefficient, 0.0, f32::MAX)?;
        in_range(GROUP, "anisotropy_1", self.anisotropy_1, -1.0, 1.0)?;
        in_range(GROUP, "anisotropy_2", self.anisotropy_2, -1.0, 1.0)?;
        in_range(GROUP, "anisotropy_mix", self.anisotropy_mix, 0.0, 1.0)?;
        in_range(GROUP, "sky_irradiance_scale", self.sky_irradiance_scale, 0.0, f32::MAX)?;
        in_range(GROUP, "ground_irradiance_scale", self.ground_irradiance_scale, 0.0, f32::MAX)?;
        in_range(GROUP, "ground_albedo", self.ground_albedo, 0.0, 1.0)?;
        in_range(GROUP, "powder_scale", self.powder_scale, 0.0, 1.0)?;
        in_range(GROUP, "powder_exponent", self.powder_exponent, 1.0, f32::MAX)?;
        Ok(())
    }

    /// Extinction per unit density
    #[inline]
    pub fn extinction_coefficient(&self) -> f32 {
        self.scattering_coefficient + self.absorption_coefficient
    }
}

// ---------------------------------------------------------------------------
// Shadow cascades
// ---------------------------------------------------------------------------

/// Step limits for the light-space march of cascade 0; farther cascades
/// scale the step sizes with their texel footprint.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowRaymarchParameters {
    pub max_iterations: u32,
    pub min_step_size: f32,
    pub max_step_size: f32,
}

impl Default for ShadowRaymarchParameters {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            min_step_size: 100.0,
            max_step_size: 1000.0,
        }
    }
}

/// Layout and temporal behavior of the cloud shadow cascades.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowCascadeConfig {
    /// Number of cascades in `[1, 4]`
    pub cascade_count: u32,
    /// Edge length of each cascade map in texels
    pub map_size: u32,
    /// Reuse each cascade's previous map as history
    pub temporal_pass: bool,
    /// Offset texel samples per frame to raise effective resolution
    pub temporal_jitter: bool,
    /// Step growth per unit of accumulated optical depth
    pub optical_depth_tail_scale: f32,
    /// Blend between uniform (0) and logarithmic (1) cascade splits
    pub split_lambda: f32,
    /// View distance covered by the last cascade
    pub far_distance: f32,
    /// Blend weight of the fresh map when `temporal_pass` is on
    pub temporal_alpha: f32,
    pub variance_gamma: f32,
    pub raymarch: ShadowRaymarchParameters,
}

impl Default for ShadowCascadeConfig {
    fn default() -> Self {
        Self {
            cascade_count: 3,
            map_size: 512,
            temporal_pass: true,
            temporal_jitter: true,
            optical_depth_tail_scale: 2.0,
            split_lambda: 0.6,
            far_distance: 1.0e5,
            temporal_alpha: 0.1,
            variance_gamma: 1.0,
            raymarch: ShadowRaymarchParameters::default(),
        }
    }
}

impl ShadowCascadeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        const GROUP: &str = "shadow";
        if !(1..=4).contains(&self.cascade_count) {
            return Err(ConfigError::CascadeCount(self.cascade_count));
        }
        positive(GROUP, "map_size", self.map_size as f32)?;
        in_range(GROUP, "optical_depth_tail_scale", self.optical_depth_tail_scale, 0.0, f32::MAX)?;
        in_range(GROUP, "split_lambda", self.split_lambda, 0.0, 1.0)?;
        positive(GROUP, "far_distance", self.far_distance)?;
        in_range(GROUP, "temporal_alpha", self.temporal_alpha, 0.0, 1.0)?;
        positive(GROUP, "variance_gamma", self.variance_gamma)?;
        positive(GROUP, "max_iterations", self.raymarch.max_iterations as f32)?;
        step_range(GROUP, self.raymarch.min_step_size, self.raymarch.max_step_size)?;
        Ok(())
    }
}
