//! Low-discrepancy jitter for shadow map accumulation
//!
//! Shadow cascades are not rendered on the checkerboard schedule; when
//! temporal jitter is enabled they offset their texel samples along a
//! Halton (2, 3) sequence instead, spreading 16 distinct positions across
//! the cycle.

use glam::Vec2;

/// Generate a Halton number for the given index and base
///
/// # Arguments
/// * `index` - Sequence index (0-based)
/// * `base` - Prime number base (typically 2, 3, 5, 7, etc.)
///
/// # Returns
/// A value in the range [0, 1)
pub fn halton(mut index: u32, base: u32) -> f32 {
    let mut result = 0.0;
    let mut f = 1.0 / base as f32;

    while index > 0 {
        result += f * (index % base) as f32;
        index /= base;
        f /= base as f32;
    }

    result
}

/// Texel offset in `[-0.5, 0.5)` for a frame index.
///
/// Uses `index + 1` so the first frame is not the degenerate (0, 0) sample.
pub fn halton_jitter(frame_index: u32) -> Vec2 {
    Vec2::new(halton(frame_index + 1, 2), halton(frame_index + 1, 3)) - 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halton_base2() {
        // Base 2: 1/2, 1/4, 3/4, 1/8, 5/8, 3/8, 7/8, ...
        assert_eq!(halton(1, 2), 0.5);
        assert_eq!(halton(2, 2), 0.25);
        assert_eq!(halton(3, 2), 0.75);
        assert_eq!(halton(4, 2), 0.125);
    }

    #[test]
    fn test_halton_base3() {
        let h1 = halton(1, 3);
        let h2 = halton(2, 3);
        assert!((h1 - 1.0 / 3.0).abs() < 1e-6);
        assert!((h2 - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_jitter_distinct_over_cycle() {
        let points: Vec<Vec2> = (0..16).map(halton_jitter).collect();
        for i in 0..points.len() {
            assert!(points[i].abs().max_element() < 0.5, "{:?}", points[i]);
            for j in (i + 1)..points.len() {
                assert_ne!(points[i], points[j]);
            }
        }
    }
}
