//! Render targets and temporal history buffers

pub mod image;
pub mod history;

pub use image::{Texel, Texture2D};
pub use history::PingPong;
