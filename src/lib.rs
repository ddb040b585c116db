//! Stratus - volumetric cloud and aerial perspective renderer
//!
//! A CPU reference pipeline that raymarches a cloud density field, builds
//! cascaded cloud shadow maps, resolves the result temporally and composites
//! it over an opaque scene with atmospheric scattering.

pub mod core;
pub mod math;
pub mod atmosphere;
pub mod clouds;
pub mod render;
