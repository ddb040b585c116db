//! Whole-pipeline configuration and validation.

use std::path::Path;

use glam::UVec2;
use serde::{Deserialize, Serialize};

use crate::atmosphere::EllipsoidFrame;
use crate::clouds::config::{in_range, positive};
use crate::clouds::{RaymarchParameters, ScatteringCoefficients, ShadowCascadeConfig};
use crate::core::ConfigError;
use crate::render::pipeline::debug::DebugView;

/// Resolution of the primary raymarch relative to the output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionScale {
    Full,
    Half,
    #[default]
    Quarter,
}

impl ResolutionScale {
    /// Output pixels per render texel along each axis
    pub fn divisor(self) -> u32 {
        match self {
            Self::Full => 1,
            Self::Half => 2,
            Self::Quarter => 4,
        }
    }

    /// Render size covering `output` (rounded up)
    pub fn render_size(self, output: UVec2) -> UVec2 {
        let d = self.divisor();
        (output + (d - 1)) / d
    }
}

/// How the temporal resolver treats its input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolveMode {
    /// Full-resolution input, light temporal smoothing
    Antialias,
    /// Quarter-resolution input accumulated into full resolution over 16 frames
    #[default]
    Upscale,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub mode: ResolveMode,
    /// Weight of the fresh sample in antialias mode
    pub temporal_alpha: f32,
    /// Variance-clip box scale; small suppresses ghosts, large suppresses flicker
    pub variance_gamma: f32,
    /// Resolve the shadow-length channel alongside color
    pub shadow_length: bool,
}

impl ResolveConfig {
    pub fn antialias() -> Self {
        Self {
            mode: ResolveMode::Antialias,
            temporal_alpha: 0.1,
            variance_gamma: 1.0,
            shadow_length: true,
        }
    }

    pub fn upscale() -> Self {
        Self {
            mode: ResolveMode::Upscale,
            temporal_alpha: 0.1,
            variance_gamma: 2.0,
            shadow_length: true,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        in_range("resolve", "temporal_alpha", self.temporal_alpha, 0.0, 1.0)?;
        positive("resolve", "variance_gamma", self.variance_gamma)
    }
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self::upscale()
    }
}

/// Feature toggles and constants of the aerial-perspective compositor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Light the input as albedo with direct sun irradiance
    pub sun_irradiance: bool,
    /// Light the input as albedo with sky irradiance
    pub sky_irradiance: bool,
    pub transmittance: bool,
    pub inscatter: bool,
    pub horizon_correction: bool,
    /// Attenuate sun irradiance by the cloud shadow cascades
    pub cloud_shadow: bool,
    pub irradiance_scale: f32,
    /// Camera height at which horizon correction starts (meters)
    pub horizon_min_height: f32,
    /// Camera height at which horizon correction is complete (meters)
    pub horizon_max_height: f32,
    pub ellipsoid: EllipsoidFrame,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            sun_irradiance: false,
            sky_irradiance: false,
            transmittance: true,
            inscatter: true,
            horizon_correction: true,
            cloud_shadow: true,
            irradiance_scale: 1.0,
            horizon_min_height: 2.0e5,
            horizon_max_height: 6.0e5,
            ellipsoid: EllipsoidFrame::default(),
        }
    }
}

impl CompositorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        const GROUP: &str = "compositor";
        in_range(GROUP, "irradiance_scale", self.irradiance_scale, 0.0, f32::MAX)?;
        in_range(GROUP, "horizon_max_height", self.horizon_max_height, self.horizon_min_height, f32::MAX)?;
        positive(GROUP, "reference_radius", self.ellipsoid.reference_radius)?;
        positive(GROUP, "radii_squared", self.ellipsoid.radii_squared.min_element())
    }
}

/// Everything a [`FramePipeline`](super::FramePipeline) needs besides its collaborators.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output resolution in pixels
    pub output_size: [u32; 2],
    /// Primary raymarch resolution
    pub resolution: ResolutionScale,
    pub raymarch: RaymarchParameters,
    pub scattering: ScatteringCoefficients,
    pub shadow: ShadowCascadeConfig,
    pub resolve: ResolveConfig,
    pub compositor: CompositorConfig,
    pub debug_view: DebugView,
}

/// Settings whose change invalidates temporal history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    pub output_size: [u32; 2],
    pub resolution: ResolutionScale,
    pub mode: ResolveMode,
    pub shadow_length: bool,
    pub cascade_count: u32,
    pub map_size: u32,
    pub shadow_temporal: bool,
}

impl PipelineConfig {
    pub fn output_size(&self) -> UVec2 {
        UVec2::from(self.output_size)
    }

    pub fn render_size(&self) -> UVec2 {
        self.resolution.render_size(self.output_size())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let [width, height] = self.output_size;
        if width == 0 || height == 0 {
            return Err(ConfigError::EmptyOutput { width, height });
        }
        self.raymarch.validate()?;
        self.scattering.validate()?;
        self.shadow.validate()?;
        self.resolve.validate()?;
        self.compositor.validate()?;
        if self.resolve.mode == ResolveMode::Upscale && self.resolution != ResolutionScale::Quarter {
            return Err(ConfigError::UpscaleResolution(self.resolution));
        }
        Ok(())
    }

    pub fn history_key(&self) -> HistoryKey {
        HistoryKey {
            output_size: self.output_size,
            resolution: self.resolution,
            mode: self.resolve.mode,
            shadow_length: self.resolve.shadow_length,
            cascade_count: self.shadow.cascade_count,
            map_size: self.shadow.map_size,
            shadow_temporal: self.shadow.temporal_pass,
        }
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> crate::core::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> crate::core::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Antialias-mode configuration at full resolution.
    pub fn antialias(output_size: [u32; 2]) -> Self {
        Self {
            output_size,
            resolution: ResolutionScale::Full,
            resolve: ResolveConfig::antialias(),
            ..Default::default()
        }
    }

    /// Checkerboard-upscale configuration at quarter resolution.
    pub fn upscale(output_size: [u32; 2]) -> Self {
        Self {
            output_size,
            resolution: ResolutionScale::Quarter,
            resolve: ResolveConfig::upscale(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use std::io::Write;

    #[test]
    fn test_render_size_rounds_up() {
        assert_eq!(ResolutionScale::Quarter.render_size(UVec2::new(10, 8)), UVec2::new(3, 2));
        assert_eq!(ResolutionScale::Half.render_size(UVec2::new(10, 8)), UVec2::new(5, 4));
        assert_eq!(ResolutionScale::Full.render_size(UVec2::new(10, 8)), UVec2::new(10, 8));
    }

    #[test]
    fn test_presets_validate() {
        assert_eq!(PipelineConfig::antialias([64, 32]).validate(), Ok(()));
        assert_eq!(PipelineConfig::upscale([64, 32]).validate(), Ok(()));
    }

    #[test]
    fn test_default_has_no_output() {
        assert_eq!(
            PipelineConfig::default().validate(),
            Err(ConfigError::EmptyOutput { width: 0, height: 0 })
        );
    }

    #[test]
    fn test_upscale_requires_quarter() {
        let mut config = PipelineConfig::upscale([64, 64]);
        config.resolution = ResolutionScale::Half;
        assert_eq!(config.validate(), Err(ConfigError::UpscaleResolution(ResolutionScale::Half)));
    }

    #[test]
    fn test_rejects_bad_cascades_from_json() {
        let json = r#"{ "output_size": [32, 32], "shadow": { "cascade_count": 6 } }"#;
        match PipelineConfig::from_json_str(json) {
            Err(Error::Config(ConfigError::CascadeCount(6))) => {}
            other => panic!("expected cascade count error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_inverted_horizon_range() {
        let mut config = PipelineConfig::antialias([8, 8]);
        config.compositor.horizon_min_height = 10.0;
        config.compositor.horizon_max_height = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "output_size": [128, 64], "resolution": "Full", "resolve": {{ "mode": "Antialias" }} }}"#
        )
        .unwrap();
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.render_size(), UVec2::new(128, 64));
        assert_eq!(config.resolve.mode, ResolveMode::Antialias);
        // Unspecified resolve fields fall back to the default preset
        assert_eq!(config.resolve.variance_gamma, ResolveConfig::default().variance_gamma);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = PipelineConfig::load("/nonexistent/stratus.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err}");
    }

    #[test]
    fn test_history_key_tracks_mode() {
        let a = PipelineConfig::upscale([32, 32]);
        let mut b = a.clone();
        b.compositor.irradiance_scale = 2.0;
        assert_eq!(a.history_key(), b.history_key());
        b.shadow.cascade_count = 2;
        assert_ne!(a.history_key(), b.history_key());
    }
}
