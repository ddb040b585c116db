//! Error types for the stratus renderer

use thiserror::Error;

/// Main error type for the renderer
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Resolution error: {0}")]
    Resolution(String),
}

/// Malformed configuration, rejected before any stage runs.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("cascade count {0} is outside [1, 4]")]
    CascadeCount(u32),

    #[error("{group}: min step size {min} exceeds max step size {max}")]
    StepRange { group: &'static str, min: f32, max: f32 },

    #[error("{group}: {field} must be positive, got {value}")]
    NonPositive {
        group: &'static str,
        field: &'static str,
        value: f32,
    },

    #[error("{group}: {field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        group: &'static str,
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    #[error("checkerboard upscaling requires quarter resolution input, got {0:?}")]
    UpscaleResolution(crate::render::pipeline::config::ResolutionScale),

    #[error("output size {width}x{height} is empty")]
    EmptyOutput { width: u32, height: u32 },
}
