//! Cloud medium: density fields, phase functions and march parameters.

pub mod config;
pub mod density;
pub mod phase;

pub use config::{RaymarchParameters, ScatteringCoefficients, ShadowCascadeConfig, ShadowRaymarchParameters};
pub use density::{CloudLayer, CloudLayerConfig, DensityField, DensitySample, HomogeneousSlab};
