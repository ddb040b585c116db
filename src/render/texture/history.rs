//! Double-buffered temporal history

use glam::UVec2;

use super::image::{Texel, Texture2D};

/// Two same-sized textures whose output/history roles alternate each frame.
///
/// The frame being rendered writes into the output buffer while reading the
/// previous frame's result from the history buffer. [`swap`](Self::swap)
/// flips the roles without copying. A freshly created or resized history
/// holds no valid content until one frame has been written.
#[derive(Clone, Debug)]
pub struct PingPong<T> {
    buffers: [Texture2D<T>; 2],
    output: usize,
    valid: bool,
}

impl<T: Texel> PingPong<T> {
    pub fn new(size: UVec2) -> Self {
        Self {
            buffers: [Texture2D::new(size), Texture2D::new(size)],
            output: 0,
            valid: false,
        }
    }

    pub fn size(&self) -> UVec2 {
        self.buffers[0].size()
    }

    /// Output buffer for this frame and the previous frame's result.
    ///
    /// The history is `None` until a frame has been written since the last
    /// reset or reallocation.
    pub fn output_and_history(&mut self) -> (&mut Texture2D<T>, Option<&Texture2D<T>>) {
        let (first, second) = self.buffers.split_at_mut(1);
        let (output, history) = if self.output == 0 {
            (&mut first[0], &second[0])
        } else {
            (&mut second[0], &first[0])
        };
        (output, self.valid.then_some(history))
    }

    /// Most recently completed output
    pub fn latest(&self) -> Option<&Texture2D<T>> {
        self.valid.then(|| &self.buffers[1 - self.output])
    }

    /// Mark the output as complete and make it next frame's history.
    pub fn swap(&mut self) {
        self.output = 1 - self.output;
        self.valid = true;
    }

    /// Invalidate history so the next frame ignores it.
    pub fn reset(&mut self) {
        self.valid = false;
    }

    /// Reallocate both buffers at a new size, discarding all content.
    pub fn resize(&mut self, size: UVec2) {
        *self = Self::new(size);
    }
}
