//! The raster buffer every pipeline stage reads and mutates.
//!
//! A [`PixelBuffer`] is a row-major sequence of interleaved 8-bit RGBA
//! samples. The only structural invariant is
//! `samples.len() == width * height * 4`, checked at construction and
//! on deserialization. Stages take the buffer by value, mutate it in
//! place and hand it back, so ownership moves serially through the
//! pipeline.

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Number of interleaved channels per pixel (R, G, B, A).
pub const CHANNELS: usize = 4;

/// Index of the red channel within a pixel.
pub const RED: usize = 0;

/// Index of the alpha channel within a pixel.
pub const ALPHA: usize = 3;

/// An 8-bit RGBA raster.
///
/// `Clone` performs a deep copy: a cloned buffer shares no storage with
/// the original, which is what snapshots rely on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA samples.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDimensions`] if `samples.len()`
    /// is not `width * height * 4` (or that product overflows `usize`).
    pub fn new(width: u32, height: u32, samples: Vec<u8>) -> Result<Self, PipelineError> {
        match expected_len(width, height) {
            Some(len) if len == samples.len() => Ok(Self {
                width,
                height,
                samples,
            }),
            _ => Err(PipelineError::InvalidDimensions {
                width,
                height,
                len: samples.len(),
            }),
        }
    }

    /// A buffer with every pixel set to `pixel`.
    #[must_use]
    pub fn from_pixel(width: u32, height: u32, pixel: [u8; 4]) -> Self {
        Self::from_fn(width, height, |_, _| pixel)
    }

    /// A buffer whose pixel at `(x, y)` is `f(x, y)`.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 4]) -> Self {
        let mut samples = Vec::with_capacity(pixel_count(width, height) * CHANNELS);
        for y in 0..height {
            for x in 0..width {
                samples.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            samples,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels (`width * height`).
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.samples.len() / CHANNELS
    }

    /// Whether the buffer has zero area.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The raw interleaved samples.
    #[must_use]
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// Mutable access to the raw samples. The length cannot change.
    pub fn samples_mut(&mut self) -> &mut [u8] {
        &mut self.samples
    }

    /// Consume the buffer and return the raw samples.
    #[must_use]
    pub fn into_samples(self) -> Vec<u8> {
        self.samples
    }

    /// Number of bytes in one row.
    #[must_use]
    pub const fn row_stride(&self) -> usize {
        self.width as usize * CHANNELS
    }

    /// Rows of samples, top to bottom. Empty for a zero-width buffer.
    pub fn as_rows(&self) -> impl Iterator<Item = &[u8]> {
        self.samples.chunks_exact(self.row_stride().max(1))
    }

    /// The RGBA value at `(x, y)`, or `None` if out of bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.offset(x as usize, y as usize);
        let mut px = [0; 4];
        px.copy_from_slice(&self.samples[i..i + CHANNELS]);
        Some(px)
    }

    /// Byte offset of the pixel at `(x, y)`. Callers check bounds.
    pub(crate) const fn offset(&self, x: usize, y: usize) -> usize {
        (y * self.width as usize + x) * CHANNELS
    }

    /// The red-channel intensity at `(x, y)`. Callers check bounds.
    pub(crate) fn intensity(&self, x: usize, y: usize) -> u8 {
        self.samples[self.offset(x, y) + RED]
    }
}

/// `width * height` as `usize`, saturating instead of overflowing.
fn pixel_count(width: u32, height: u32) -> usize {
    (width as usize).saturating_mul(height as usize)
}

fn expected_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(CHANNELS)
}

impl From<image::RgbaImage> for PixelBuffer {
    fn from(image: image::RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            samples: image.into_raw(),
        }
    }
}

impl From<PixelBuffer> for image::RgbaImage {
    fn from(buffer: PixelBuffer) -> Self {
        // The length invariant guarantees `from_raw` succeeds; fall back
        // to a blank image rather than panic if it somehow does not.
        let (width, height) = (buffer.width, buffer.height);
        Self::from_raw(width, height, buffer.samples).unwrap_or_else(|| Self::new(width, height))
    }
}

/// Serde-compatible proxy for [`PixelBuffer`].
///
/// Deserialization goes through [`PixelBuffer::new`] so a payload with
/// a mismatched sample count is rejected instead of producing a buffer
/// that violates the length invariant.
#[derive(Serialize, Deserialize)]
struct PixelBufferProxy {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl Serialize for PixelBuffer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PixelBufferProxy {
            width: self.width,
            height: self.height,
            samples: self.samples.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PixelBuffer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PixelBufferProxy::deserialize(deserializer)?;
        Self::new(proxy.width, proxy.height, proxy.samples).map_err(serde::de::Error::custom)
    }
}
