//! Per-pixel filter effects.
//!
//! An effect reads a [`SourceWindow`] (the current-input image restricted to
//! the rows it may touch) and writes a [`TargetRows`] slice covering exactly
//! its assigned row range of the current-output image. Both views are built
//! by the executor, so an effect can neither read the buffer being written nor
//! write outside its own rows.

mod convolution;
mod grayscale;

pub use convolution::Convolution;
pub use grayscale::Grayscale;

use std::ops::Range;

use image::Rgba;

use crate::types::{Effect, Rgba16Image};

/// Channels per pixel in [`Rgba16Image`].
pub const CHANNELS: usize = 4;

/// A filter pass over one row range.
pub trait PixelEffect: Send + Sync {
    /// How many rows above and below an output row the effect reads.
    fn radius(&self) -> u32;

    /// Fill every pixel of `target` from `source`.
    fn apply(&self, source: &SourceWindow<'_>, target: &mut TargetRows<'_>);
}

static GRAYSCALE: Grayscale = Grayscale;
static SHARPEN: Convolution = Convolution::sharpen();
static BLUR: Convolution = Convolution::blur();
static EDGE_DETECT: Convolution = Convolution::edge_detect();

/// The filter implementing `effect`.
pub fn for_effect(effect: Effect) -> &'static dyn PixelEffect {
    match effect {
        Effect::Grayscale => &GRAYSCALE,
        Effect::Sharpen => &SHARPEN,
        Effect::Blur => &BLUR,
        Effect::EdgeDetect => &EDGE_DETECT,
    }
}

/// Round and clamp a computed channel into `0..=65535`.
#[inline]
pub fn clamp_channel(value: f64) -> u16 {
    value.round().clamp(0.0, u16::MAX as f64) as u16
}

/// Read-only view of the rows of the input image a chunk may read.
pub struct SourceWindow<'a> {
    image: &'a Rgba16Image,
    rows: Range<u32>,
}

impl<'a> SourceWindow<'a> {
    /// View `rows` of `image`; the range is clipped to the image height.
    pub fn new(image: &'a Rgba16Image, rows: Range<u32>) -> Self {
        let end = rows.end.min(image.height());
        let start = rows.start.min(end);
        Self {
            image,
            rows: start..end,
        }
    }

    /// The whole image as one window.
    pub fn full(image: &'a Rgba16Image) -> Self {
        Self::new(image, 0..image.height())
    }

    /// Image width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Readable rows.
    pub fn rows(&self) -> Range<u32> {
        self.rows.clone()
    }

    /// Pixel at signed coordinates, `None` outside the window.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> Option<&Rgba<u16>> {
        if x < 0 || y < 0 || x >= self.image.width() as i64 {
            return None;
        }
        let y = y as u32;
        if !self.rows.contains(&y) {
            return None;
        }
        Some(self.image.get_pixel(x as u32, y))
    }
}

/// Mutable view over a contiguous row range of the output image.
pub struct TargetRows<'a> {
    pixels: &'a mut [u16],
    width: u32,
    rows: Range<u32>,
}

impl<'a> TargetRows<'a> {
    /// Wrap `pixels`, which must hold exactly `rows` rows of `width` pixels.
    pub fn new(pixels: &'a mut [u16], width: u32, rows: Range<u32>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            (rows.end - rows.start) as usize * width as usize * CHANNELS
        );
        Self {
            pixels,
            width,
            rows,
        }
    }

    /// Row width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Rows this view may write.
    pub fn rows(&self) -> Range<u32> {
        self.rows.clone()
    }

    /// Write pixel `(x, y)`; `y` is an absolute image row inside [`rows`](Self::rows).
    #[inline]
    pub fn put(&mut self, x: u32, y: u32, pixel: Rgba<u16>) {
        let offset = ((y - self.rows.start) as usize * self.width as usize + x as usize) * CHANNELS;
        self.pixels[offset..offset + CHANNELS].copy_from_slice(&pixel.0);
    }
}
