//! Grayscale: each of R, G, B becomes the rounded mean of the three.

use image::Rgba;

use super::{clamp_channel, PixelEffect, SourceWindow, TargetRows};

/// Channel-averaging grayscale. Alpha is kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grayscale;

impl PixelEffect for Grayscale {
    fn radius(&self) -> u32 {
        0
    }

    fn apply(&self, source: &SourceWindow<'_>, target: &mut TargetRows<'_>) {
        for y in target.rows() {
            for x in 0..target.width() {
                let Some(&Rgba([r, g, b, a])) = source.get(x as i64, y as i64) else {
                    continue;
                };
                let grey = clamp_channel((r as f64 + g as f64 + b as f64) / 3.0);
                target.put(x, y, Rgba([grey, grey, grey, a]));
            }
        }
    }
}
