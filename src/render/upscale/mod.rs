//! Checkerboard scheduling and jitter for temporal upscaling

pub mod checkerboard;
pub mod jitter;

pub use jitter::{halton, halton_jitter};
