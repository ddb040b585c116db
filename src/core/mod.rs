//! Core renderer types and utilities

pub mod types;
pub mod error;
pub mod logging;
pub mod camera;
pub mod frame;

pub use types::*;
pub use error::{ConfigError, Error};
pub use camera::{Camera, CameraUniforms};
pub use frame::{FrameSequencer, FrameState};
