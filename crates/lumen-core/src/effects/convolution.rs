//! 3×3 convolution kernels.
//!
//! Neighbours outside the image are skipped rather than wrapped or padded.
//! A normalized kernel divides by the weight of the neighbours it actually
//! visited, so border pixels average over fewer samples instead of darkening.

use image::Rgba;

use super::{clamp_channel, PixelEffect, SourceWindow, TargetRows};

/// A 3×3 kernel, indexed `weights[dy + 1][dx + 1]`.
#[derive(Debug, Clone, Copy)]
pub struct Convolution {
    weights: [[f64; 3]; 3],
    normalized: bool,
}

impl Convolution {
    /// Build a kernel from raw weights.
    pub const fn new(weights: [[f64; 3]; 3], normalized: bool) -> Self {
        Self {
            weights,
            normalized,
        }
    }

    pub const fn sharpen() -> Self {
        Self::new([[0.0, -1.0, 0.0], [-1.0, 5.0, -1.0], [0.0, -1.0, 0.0]], false)
    }

    /// Box average of the in-bounds 3×3 neighbourhood.
    pub const fn blur() -> Self {
        Self::new([[1.0; 3]; 3], true)
    }

    pub const fn edge_detect() -> Self {
        Self::new(
            [[-1.0, -1.0, -1.0], [-1.0, 8.0, -1.0], [-1.0, -1.0, -1.0]],
            false,
        )
    }

    fn convolve(&self, source: &SourceWindow<'_>, x: i64, y: i64) -> Option<Rgba<u16>> {
        let centre = source.get(x, y)?;
        let mut acc = [0.0f64; 3];
        let mut weight_sum = 0.0f64;

        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let Some(px) = source.get(x + dx, y + dy) else {
                    continue;
                };
                let w = self.weights[(dy + 1) as usize][(dx + 1) as usize];
                for (c, value) in acc.iter_mut().enumerate() {
                    *value += px.0[c] as f64 * w;
                }
                weight_sum += w;
            }
        }

        if self.normalized && weight_sum != 0.0 {
            for value in &mut acc {
                *value /= weight_sum;
            }
        }

        Some(Rgba([
            clamp_channel(acc[0]),
            clamp_channel(acc[1]),
            clamp_channel(acc[2]),
            centre.0[3],
        ]))
    }
}

impl PixelEffect for Convolution {
    fn radius(&self) -> u32 {
        1
    }

    fn apply(&self, source: &SourceWindow<'_>, target: &mut TargetRows<'_>) {
        for y in target.rows() {
            for x in 0..target.width() {
                if let Some(px) = self.convolve(source, x as i64, y as i64) {
                    target.put(x, y, px);
                }
            }
        }
    }
}
