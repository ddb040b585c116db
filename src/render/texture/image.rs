//! CPU render targets

use std::ops::{Add, Mul, Sub};

use glam::{IVec2, UVec2, Vec2};
use rayon::prelude::*;

/// Value storable in a [`Texture2D`] and interpolated by bilinear sampling.
pub trait Texel:
    Copy + Default + Send + Sync + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self>
{
}

impl<T> Texel for T where
    T: Copy + Default + Send + Sync + Add<Output = T> + Sub<Output = T> + Mul<f32, Output = T>
{
}

/// Row-major 2D image. Texel (0, 0) is the top-left corner.
#[derive(Clone, Debug, PartialEq)]
pub struct Texture2D<T> {
    size: UVec2,
    data: Vec<T>,
}

impl<T: Texel> Texture2D<T> {
    /// Texture filled with `T::default()`
    pub fn new(size: UVec2) -> Self {
        Self::filled(size, T::default())
    }

    /// Texture with every texel set to `value`
    pub fn filled(size: UVec2, value: T) -> Self {
        Self {
            size,
            data: vec![value; (size.x * size.y) as usize],
        }
    }

    /// Evaluate `f(x, y)` for every texel in parallel, one row per task.
    pub fn from_fn<F>(size: UVec2, f: F) -> Self
    where
        F: Fn(u32, u32) -> T + Sync,
    {
        let mut texture = Self::new(size);
        texture.par_fill(f);
        texture
    }

    /// Overwrite every texel with `f(x, y)`, rows in parallel.
    pub fn par_fill<F>(&mut self, f: F)
    where
        F: Fn(u32, u32) -> T + Sync,
    {
        let width = self.size.x as usize;
        if width == 0 {
            return;
        }
        self.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, texel) in row.iter_mut().enumerate() {
                    *texel = f(x as u32, y as u32);
                }
            });
    }

    #[inline]
    pub fn size(&self) -> UVec2 {
        self.size
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.size.x
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.size.y
    }

    /// Size of one texel in UV units
    #[inline]
    pub fn texel_size(&self) -> Vec2 {
        Vec2::ONE / self.size.as_vec2()
    }

    /// UV of a texel center
    #[inline]
    pub fn texel_uv(&self, x: u32, y: u32) -> Vec2 {
        (Vec2::new(x as f32, y as f32) + 0.5) * self.texel_size()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> T {
        self.data[(y * self.size.x + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let index = (y * self.size.x + x) as usize;
        self.data[index] = value;
    }

    /// Fetch with coordinates clamped to the edge
    #[inline]
    pub fn fetch(&self, coord: IVec2) -> T {
        let max = self.size.as_ivec2() - 1;
        let c = coord.clamp(IVec2::ZERO, max);
        self.get(c.x as u32, c.y as u32)
    }

    /// Texels of the 3x3 window centered on `coord`, edge-clamped.
    pub fn neighborhood(&self, coord: IVec2) -> [T; 9] {
        let mut out = [T::default(); 9];
        for dy in -1..=1 {
            for dx in -1..=1 {
                out[((dy + 1) * 3 + dx + 1) as usize] = self.fetch(coord + IVec2::new(dx, dy));
            }
        }
        out
    }

    /// Bilinear sample with clamp-to-edge addressing.
    pub fn sample(&self, uv: Vec2) -> T {
        let p = uv * self.size.as_vec2() - 0.5;
        let base = p.floor();
        let f = p - base;
        let i = base.as_ivec2();

        let t00 = self.fetch(i);
        let t10 = self.fetch(i + IVec2::new(1, 0));
        let t01 = self.fetch(i + IVec2::new(0, 1));
        let t11 = self.fetch(i + IVec2::new(1, 1));

        // Lerp form keeps constant regions exact
        let top = t00 + (t10 - t00) * f.x;
        let bottom = t01 + (t11 - t01) * f.x;
        top + (bottom - top) * f.y
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }
}
