//! GPU uniform layouts

pub mod uniforms;

pub use uniforms::{CameraUniform, CompositeUniforms, FrameUniforms, ResolveUniforms};
