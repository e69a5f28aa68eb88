//! Noise reduction by normalized-kernel convolution.
//!
//! [`Kernel::gaussian`] builds a `k×k` Gaussian with `sigma = k / 6`,
//! normalized to sum to 1. [`convolve`] applies a kernel to the
//! intensity channel of every pixel at least `half = (k - 1) / 2`
//! pixels away from each border and writes the rounded result to R, G
//! and B. Pixels inside that margin keep their pre-filter values; there
//! is no padding or mirroring.
//!
//! The convolution reads only from an untouched copy of the input, so
//! every output row is a pure function of `k` input rows. Rows are
//! computed in parallel.

use rayon::prelude::*;

use crate::buffer::{CHANNELS, PixelBuffer};
use crate::types::{FilterType, PipelineError, ProcessingParams, validate_kernel_size};

/// A square, normalized convolution kernel with odd side length.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    size: usize,
    weights: Vec<f64>,
}

impl Kernel {
    /// Build the normalized Gaussian kernel for side length `size`.
    ///
    /// `sigma = size / 6`; the weight at offset `(x, y)` is
    /// `exp(-(x² + y²) / (2·sigma²))` before normalization.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidKernelSize`] unless `size` is odd
    /// and within `3..=11`.
    pub fn gaussian(size: u32) -> Result<Self, PipelineError> {
        validate_kernel_size(size)?;
        let sigma = f64::from(size) / 6.0;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let half = i32::try_from(size / 2).map_err(|_| PipelineError::InvalidKernelSize(size))?;

        let mut weights = Vec::with_capacity((size * size) as usize);
        for y in -half..=half {
            for x in -half..=half {
                let d2 = f64::from(x * x + y * y);
                weights.push((-d2 / two_sigma_sq).exp());
            }
        }
        let sum: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= sum;
        }

        Ok(Self {
            size: size as usize,
            weights,
        })
    }

    /// Side length.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Distance from the center to an edge, `(size - 1) / 2`.
    #[must_use]
    pub const fn half(&self) -> usize {
        self.size / 2
    }

    /// Weight at row `ky`, column `kx` (both `0..size`).
    #[must_use]
    pub fn weight(&self, ky: usize, kx: usize) -> f64 {
        self.weights[ky * self.size + kx]
    }

    /// Rows of weights, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.weights.chunks_exact(self.size)
    }

    /// Sum of all weights (1.0 within floating-point tolerance).
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Standard deviation used to build a Gaussian of this size.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sigma(&self) -> f64 {
        self.size as f64 / 6.0
    }
}

/// Number of pixels [`convolve`] writes for a kernel with margin `half`.
#[must_use]
pub fn processed_pixel_count(buffer: &PixelBuffer, half: usize) -> usize {
    let w = (buffer.width() as usize).saturating_sub(2 * half);
    let h = (buffer.height() as usize).saturating_sub(2 * half);
    w * h
}

/// Convolve the intensity channel of `buffer` with `kernel`.
///
/// Only pixels with `half ≤ x < width - half` and
/// `half ≤ y < height - half` are written. Buffers too small to contain
/// such a pixel are returned unchanged.
#[must_use = "returns the filtered buffer"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn convolve(mut buffer: PixelBuffer, kernel: &Kernel) -> PixelBuffer {
    let half = kernel.half();
    let (width, height) = (buffer.width() as usize, buffer.height() as usize);
    if width < 2 * half + 1 || height < 2 * half + 1 {
        return buffer;
    }

    let source = buffer.clone();
    let stride = buffer.row_stride();

    buffer
        .samples_mut()
        .par_chunks_exact_mut(stride)
        .enumerate()
        .filter(|(y, _)| *y >= half && *y < height - half)
        .for_each(|(y, row)| {
            for x in half..width - half {
                let mut acc = 0.0;
                for (ky, weights) in kernel.rows().enumerate() {
                    let py = y + ky - half;
                    for (kx, &w) in weights.iter().enumerate() {
                        let px = x + kx - half;
                        acc += f64::from(source.intensity(px, py)) * w;
                    }
                }
                let v = acc.round().clamp(0.0, 255.0) as u8;
                let i = x * CHANNELS;
                row[i] = v;
                row[i + 1] = v;
                row[i + 2] = v;
            }
        });

    buffer
}

/// Run the noise-reduction stage selected by `params`.
///
/// Every [`FilterType`] currently resolves to the Gaussian kernel.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidKernelSize`] for a bad
/// `params.kernel_size`.
pub fn reduce_noise(
    buffer: PixelBuffer,
    params: &ProcessingParams,
) -> Result<PixelBuffer, PipelineError> {
    let kernel = Kernel::gaussian(params.kernel_size)?;
    Ok(apply_filter(buffer, &kernel, params.filter_type))
}

/// Apply a pre-built kernel for the given filter selector.
#[must_use = "returns the filtered buffer"]
pub fn apply_filter(buffer: PixelBuffer, kernel: &Kernel, filter_type: FilterType) -> PixelBuffer {
    if !filter_type.is_implemented() {
        tracing::warn!(?filter_type, "filter type is not implemented, using gaussian");
    }
    convolve(buffer, kernel)
}
