//! 4x4 checkerboard schedule for temporal upscaling
//!
//! Every sub-pixel of a 4x4 block carries a distinct priority in `[0, 16)`.
//! A sub-pixel is "current" on the frame whose index matches its priority,
//! so over any 16 consecutive frames each offset is rendered exactly once.

use glam::{UVec2, Vec2};

/// Frames in one full cycle of the schedule
pub const CYCLE_LENGTH: u32 = 16;

/// Block edge in full-resolution pixels
pub const BLOCK_SIZE: u32 = 4;

/// Ordered-dither priority of each sub-pixel, row-major.
pub const PRIORITY: [[u32; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 7, 13, 5],
];

/// Priority assigned to a sub-pixel (coordinates taken modulo the block).
#[inline]
pub fn priority(sub_pixel: UVec2) -> u32 {
    PRIORITY[(sub_pixel.y % BLOCK_SIZE) as usize][(sub_pixel.x % BLOCK_SIZE) as usize]
}

/// Whether a sub-pixel receives the fresh sample on this frame.
#[inline]
pub fn is_current(sub_pixel: UVec2, frame_index: u32) -> bool {
    priority(sub_pixel) == frame_index % CYCLE_LENGTH
}

/// Sub-pixel whose priority equals `frame_index mod 16`.
pub fn sub_pixel_for_frame(frame_index: u32) -> UVec2 {
    let target = frame_index % CYCLE_LENGTH;
    for (y, row) in PRIORITY.iter().enumerate() {
        for (x, &p) in row.iter().enumerate() {
            if p == target {
                return UVec2::new(x as u32, y as u32);
            }
        }
    }
    unreachable!("priority matrix is a permutation of 0..16")
}

/// Offset of the current sub-pixel center from its block center, in block units.
pub fn jitter_for_frame(frame_index: u32) -> Vec2 {
    (sub_pixel_for_frame(frame_index).as_vec2() + 0.5) / BLOCK_SIZE as f32 - 0.5
}
