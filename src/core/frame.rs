//! Per-frame sequencing state

use crate::core::types::{UVec2, Vec2};
use crate::render::upscale::checkerboard;

/// Frame counter and sub-pixel jitter for one render context.
///
/// Each independent view owns its own sequencer, so split views and tests
/// never share a counter.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameState {
    /// Frame index in `[0, 16)`
    pub frame_index: u32,
    /// Offset of this frame's sample from the render texel center, in texels
    pub jitter: Vec2,
}

impl FrameState {
    /// Sub-pixel of a 4x4 block that receives a fresh sample this frame.
    pub fn current_sub_pixel(&self) -> UVec2 {
        checkerboard::sub_pixel_for_frame(self.frame_index)
    }
}

/// Advances the frame index and derives the jitter schedule from it.
#[derive(Clone, Debug, Default)]
pub struct FrameSequencer {
    state: FrameState,
}

impl FrameSequencer {
    /// Create a sequencer at frame 0
    pub fn new() -> Self {
        let mut seq = Self::default();
        seq.state.jitter = checkerboard::jitter_for_frame(0);
        seq
    }

    /// Increment the frame index (wrapping at 16) and return it.
    pub fn advance(&mut self) -> u32 {
        let next = (self.state.frame_index + 1) % checkerboard::CYCLE_LENGTH;
        self.state = FrameState {
            frame_index: next,
            jitter: checkerboard::jitter_for_frame(next),
        };
        next
    }

    /// Current state (read-only to every stage)
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Restart the cycle at frame 0
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_wraps_at_16() {
        let mut seq = FrameSequencer::new();
        assert_eq!(seq.state().frame_index, 0);
        for expected in 1..16 {
            assert_eq!(seq.advance(), expected);
        }
        assert_eq!(seq.advance(), 0);
        assert_eq!(seq.advance(), 1);
    }

    #[test]
    fn test_jitter_tracks_current_sub_pixel() {
        let mut seq = FrameSequencer::new();
        for _ in 0..20 {
            let state = seq.state();
            let sub = state.current_sub_pixel();
            let expected = (sub.as_vec2() + 0.5) / 4.0 - 0.5;
            assert_eq!(state.jitter, expected, "frame {}", state.frame_index);
            assert!(state.jitter.abs().max_element() < 0.5);
            seq.advance();
        }
    }

    #[test]
    fn test_independent_sequencers() {
        let mut a = FrameSequencer::new();
        let b = FrameSequencer::new();
        a.advance();
        a.advance();
        assert_eq!(a.state().frame_index, 2);
        assert_eq!(b.state().frame_index, 0);
    }

    #[test]
    fn test_reset() {
        let mut seq = FrameSequencer::new();
        seq.advance();
        seq.reset();
        assert_eq!(seq.state(), FrameSequencer::new().state());
    }
}
