//! Rendering pipeline and the buffers it exchanges

pub mod buffer;
pub mod depth;
pub mod pipeline;
pub mod texture;
pub mod upscale;
