//! Chunked, barrier-synchronized application of an effect chain.
//!
//! Each pass splits the image rows into contiguous chunks and runs one scoped
//! thread per chunk. A chunk reads the current-input image through a window
//! widened by the effect's radius and writes only its own rows of the
//! current-output image; the output is handed out as disjoint `&mut` slices,
//! so no chunk can see another's writes. The scope joins every chunk before
//! the pass returns, and the output then becomes the next pass's input.

use std::ops::Range;
use std::time::Instant;

use crate::effects::{self, PixelEffect, SourceWindow, TargetRows, CHANNELS};
use crate::types::{Effect, Rgba16Image};

/// Applies effect chains with a fixed number of row chunks per pass.
#[derive(Debug, Clone, Copy)]
pub struct EffectExecutor {
    chunks: usize,
}

impl EffectExecutor {
    /// Executor splitting each pass into `chunks` row ranges (at least one).
    pub fn new(chunks: usize) -> Self {
        Self {
            chunks: chunks.max(1),
        }
    }

    /// Row chunks per pass.
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    /// Apply `effects` in order. An empty chain returns `input` untouched.
    pub fn apply_chain(&self, input: Rgba16Image, chain: &[Effect]) -> Rgba16Image {
        let passes: Vec<&dyn PixelEffect> =
            chain.iter().map(|e| effects::for_effect(*e)).collect();
        self.run_passes(input, &passes)
    }

    /// Apply arbitrary filters in order, swapping buffers between passes.
    pub fn run_passes(&self, input: Rgba16Image, passes: &[&dyn PixelEffect]) -> Rgba16Image {
        let (width, height) = input.dimensions();
        let mut current = input;
        for (i, pass) in passes.iter().enumerate() {
            let start = Instant::now();
            let mut output = Rgba16Image::new(width, height);
            self.run_pass(*pass, &current, &mut output);
            tracing::trace!(
                pass = i,
                chunks = self.chunks,
                elapsed = ?start.elapsed(),
                "Pass complete"
            );
            // output of this pass is the input of the next; the old input is dropped
            current = output;
        }
        current
    }

    /// One pass of `effect` from `input` into `output`.
    ///
    /// Returns once every chunk has finished.
    pub fn run_pass(
        &self,
        effect: &dyn PixelEffect,
        input: &Rgba16Image,
        output: &mut Rgba16Image,
    ) {
        debug_assert_eq!(input.dimensions(), output.dimensions());
        let (width, height) = input.dimensions();
        let row_len = width as usize * CHANNELS;
        let radius = effect.radius();
        let ranges = partition_rows(height, self.chunks);

        if ranges.len() <= 1 {
            let target_pixels: &mut [u16] = output;
            let mut target = TargetRows::new(target_pixels, width, 0..height);
            effect.apply(&SourceWindow::full(input), &mut target);
            return;
        }

        let target_pixels: &mut [u16] = output;
        std::thread::scope(|scope| {
            let mut rest = target_pixels;
            for rows in ranges {
                let len = (rows.end - rows.start) as usize * row_len;
                let (mine, tail) = std::mem::take(&mut rest).split_at_mut(len);
                rest = tail;
                if rows.is_empty() {
                    continue;
                }

                let window = SourceWindow::new(input, halo(&rows, radius, height));
                scope.spawn(move || {
                    let mut target = TargetRows::new(mine, width, rows);
                    effect.apply(&window, &mut target);
                });
            }
        });
    }
}

/// Split `0..height` into `chunks` contiguous ranges whose sizes differ by at most one.
pub fn partition_rows(height: u32, chunks: usize) -> Vec<Range<u32>> {
    let chunks = chunks.max(1) as u64;
    let height64 = height as u64;
    (0..chunks)
        .map(|i| {
            let start = (i * height64 / chunks) as u32;
            let end = ((i + 1) * height64 / chunks) as u32;
            start..end
        })
        .collect()
}

/// Widen `rows` by `radius` on both sides, clipped to the image.
pub fn halo(rows: &Range<u32>, radius: u32, height: u32) -> Range<u32> {
    rows.start.saturating_sub(radius)..rows.end.saturating_add(radius).min(height)
}
