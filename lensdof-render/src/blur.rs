//! Blur pyramid definition: kernel weights, per-level tap spacing and radii.
//!
//! Level 0 is the sharp image. Level `k` is level `k - 1` filtered by the
//! separable binomial kernel `[1 4 6 4 1] / 16` with taps `2^(k-1)` pixels
//! apart, first horizontally then vertically. The kernel has unit variance
//! per tap spacing, so variances add up level by level and the radius
//! (standard deviation, in pixels) of level `k` is `sqrt(sum_{i<k} 4^i)`.

use crate::config::BLUR_LEVELS;
use crate::raster::Image;
use lensdof_gpu_shared::uniforms::{BlurParams, MAX_BLUR_LEVELS};

pub const BINOMIAL_WEIGHTS: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

/// One separable pass writing into `level` (via the shared temp target for
/// the horizontal half).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlurPass {
    pub level: usize,
    pub params: BlurParams,
}

impl BlurPass {
    pub fn is_horizontal(&self) -> bool {
        self.params.direction == [1, 0]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlurPyramid {
    radii: Vec<f32>,
}

impl Default for BlurPyramid {
    fn default() -> Self {
        Self::new(BLUR_LEVELS)
    }
}

impl BlurPyramid {
    /// `levels` is clamped to `2..=MAX_BLUR_LEVELS`.
    pub fn new(levels: usize) -> Self {
        let levels = levels.clamp(2, MAX_BLUR_LEVELS);
        let mut radii = Vec::with_capacity(levels);
        let mut variance = 0.0f64;
        radii.push(0.0);
        for k in 1..levels {
            let stride = Self::stride_for(k) as f64;
            variance += stride * stride;
            radii.push(variance.sqrt() as f32);
        }
        Self { radii }
    }

    pub fn level_count(&self) -> usize {
        self.radii.len()
    }

    pub fn radii(&self) -> &[f32] {
        &self.radii
    }

    pub fn radius(&self, level: usize) -> f32 {
        self.radii[level]
    }

    pub fn max_radius(&self) -> f32 {
        self.radii[self.radii.len() - 1]
    }

    fn stride_for(level: usize) -> i32 {
        1 << (level - 1)
    }

    /// Passes in execution order: for each level, horizontal then vertical.
    pub fn passes(&self) -> Vec<BlurPass> {
        (1..self.level_count())
            .flat_map(|level| {
                let stride = Self::stride_for(level);
                [[1, 0], [0, 1]].into_iter().map(move |direction| BlurPass {
                    level,
                    params: BlurParams {
                        direction,
                        stride,
                        _pad1: 0,
                    },
                })
            })
            .collect()
    }

    /// Build every level on the CPU from the sharp image.
    pub fn build(&self, sharp: &Image) -> Vec<Image> {
        let mut levels = Vec::with_capacity(self.level_count());
        levels.push(sharp.clone());
        let mut temp = None;
        for pass in self.passes() {
            if pass.is_horizontal() {
                temp = Some(blur_pass(&levels[pass.level - 1], &pass.params));
            } else if let Some(h) = temp.take() {
                levels.push(blur_pass(&h, &pass.params));
            }
        }
        levels
    }
}

/// One separable kernel pass with clamp-to-edge addressing.
pub fn blur_pass(source: &Image, params: &BlurParams) -> Image {
    let mut out = Image::new(source.width(), source.height());
    for y in 0..source.height() {
        for x in 0..source.width() {
            let mut sum = [0.0f32; 4];
            for (i, w) in BINOMIAL_WEIGHTS.iter().enumerate() {
                let offset = (i as i32 - 2) * params.stride;
                let px = source.load_clamped(
                    x as i32 + params.direction[0] * offset,
                    y as i32 + params.direction[1] * offset,
                );
                for c in 0..4 {
                    sum[c] += w * px[c];
                }
            }
            out.set(x, y, sum);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radii_follow_accumulated_variance() {
        let pyramid = BlurPyramid::default();
        let expected = [0.0, 1.0, 5f32.sqrt(), 21f32.sqrt(), 85f32.sqrt(), 341f32.sqrt()];
        assert_eq!(pyramid.level_count(), expected.len());
        for (r, e) in pyramid.radii().iter().zip(expected) {
            assert!((r - e).abs() < 1e-5);
        }
        assert!((pyramid.max_radius() - 18.466).abs() < 1e-3);
    }

    #[test]
    fn kernel_is_normalized() {
        let total: f32 = BINOMIAL_WEIGHTS.iter().sum();
        assert_eq!(total, 1.0);
    }

    #[test]
    fn two_passes_per_blurred_level() {
        let passes = BlurPyramid::default().passes();
        assert_eq!(passes.len(), 10);
        assert!(passes[0].is_horizontal());
        assert_eq!(passes[0].level, 1);
        assert_eq!(passes[9].level, 5);
        assert_eq!(passes[9].params.stride, 16);
        assert_eq!(passes[9].params.direction, [0, 1]);
    }

    #[test]
    fn constant_image_is_unchanged_by_blur() {
        let img = Image::filled(9, 7, [0.5, 0.25, 1.0, 1.0]);
        let levels = BlurPyramid::default().build(&img);
        assert_eq!(levels.len(), 6);
        for level in &levels {
            for px in level.pixels() {
                for c in 0..4 {
                    assert!((px[c] - img.get(0, 0)[c]).abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn impulse_spreads_with_binomial_weights() {
        let mut img = Image::new(9, 1);
        img.set(4, 0, [1.0, 1.0, 1.0, 1.0]);
        let params = BlurParams {
            direction: [1, 0],
            stride: 1,
            _pad1: 0,
        };
        let out = blur_pass(&img, &params);
        let row: Vec<f32> = (0..9).map(|x| out.get(x, 0)[0]).collect();
        assert_eq!(row, vec![0.0, 0.0, 0.0625, 0.25, 0.375, 0.25, 0.0625, 0.0, 0.0]);
    }

    #[test]
    fn build_is_deterministic() {
        let mut img = Image::new(16, 8);
        for y in 0..8 {
            for x in 0..16 {
                img.set(x, y, [x as f32 / 16.0, y as f32 / 8.0, 0.5, 1.0]);
            }
        }
        let pyramid = BlurPyramid::default();
        assert_eq!(pyramid.build(&img), pyramid.build(&img));
    }
}
