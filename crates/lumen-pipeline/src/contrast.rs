//! Global histogram equalization.
//!
//! Operates on the intensity channel of an already-grayscale buffer
//! (only R is read; R = G = B after the grayscale stage):
//!
//! 1. 256-bin histogram of R.
//! 2. Cumulative distribution `cdf`.
//! 3. `cdf_min` = first nonzero CDF entry, `N` = pixel count.
//! 4. `lut[v] = round((cdf[v] - cdf_min) / (N - cdf_min) * 255)`.
//! 5. `lut` applied to R, G and B.
//!
//! When `N == cdf_min` (every pixel shares one intensity) the division
//! is undefined and the LUT falls back to the identity mapping.

use rayon::prelude::*;

use crate::buffer::{CHANNELS, PixelBuffer, RED};

/// Number of intensity levels.
pub const LEVELS: usize = 256;

/// Count occurrences of each red-channel value.
#[must_use]
pub fn histogram(buffer: &PixelBuffer) -> [u64; LEVELS] {
    let mut hist = [0u64; LEVELS];
    for px in buffer.samples().chunks_exact(CHANNELS) {
        hist[usize::from(px[RED])] += 1;
    }
    hist
}

/// Running sum of a histogram.
#[must_use]
pub fn cumulative(hist: &[u64; LEVELS]) -> [u64; LEVELS] {
    let mut cdf = [0u64; LEVELS];
    let mut total = 0u64;
    for (c, &h) in cdf.iter_mut().zip(hist) {
        total += h;
        *c = total;
    }
    cdf
}

/// Intensity remapping table produced by histogram equalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqualizationLut {
    table: [u8; LEVELS],
    cdf_min: u64,
    distinct_levels: usize,
    identity_fallback: bool,
}

impl EqualizationLut {
    /// Build the LUT for a histogram over `pixel_count` pixels.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn from_histogram(hist: &[u64; LEVELS], pixel_count: u64) -> Self {
        let cdf = cumulative(hist);
        let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
        let distinct_levels = hist.iter().filter(|&&h| h > 0).count();
        let denom = pixel_count.saturating_sub(cdf_min);

        if denom == 0 {
            return Self::identity(cdf_min, distinct_levels);
        }

        let mut table = [0u8; LEVELS];
        for (out, &c) in table.iter_mut().zip(&cdf) {
            let ratio = (c as f64 - cdf_min as f64) / denom as f64;
            *out = (ratio * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        Self {
            table,
            cdf_min,
            distinct_levels,
            identity_fallback: false,
        }
    }

    /// Build the LUT for `buffer`.
    #[must_use]
    pub fn for_buffer(buffer: &PixelBuffer) -> Self {
        Self::from_histogram(&histogram(buffer), buffer.pixel_count() as u64)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn identity(cdf_min: u64, distinct_levels: usize) -> Self {
        Self {
            table: std::array::from_fn(|v| v as u8),
            cdf_min,
            distinct_levels,
            identity_fallback: true,
        }
    }

    /// Mapped value for intensity `v`.
    #[must_use]
    pub const fn map(&self, v: u8) -> u8 {
        self.table[v as usize]
    }

    /// The full table.
    #[must_use]
    pub const fn table(&self) -> &[u8; LEVELS] {
        &self.table
    }

    /// Count of the smallest occurring intensity (0 for an empty image).
    #[must_use]
    pub const fn cdf_min(&self) -> u64 {
        self.cdf_min
    }

    /// Number of occupied histogram bins the table was built from.
    #[must_use]
    pub const fn distinct_levels(&self) -> usize {
        self.distinct_levels
    }

    /// Whether the degenerate-histogram guard produced an identity map.
    #[must_use]
    pub const fn is_identity_fallback(&self) -> bool {
        self.identity_fallback
    }

    /// Apply the table to R, G and B of every pixel. Alpha is untouched.
    pub fn apply(&self, buffer: &mut PixelBuffer) {
        buffer
            .samples_mut()
            .par_chunks_exact_mut(CHANNELS)
            .for_each(|px| {
                let v = self.map(px[RED]);
                px[0] = v;
                px[1] = v;
                px[2] = v;
            });
    }
}

/// Equalize the histogram of `buffer` in place and return it.
#[must_use = "returns the equalized buffer"]
pub fn equalize(buffer: PixelBuffer) -> PixelBuffer {
    equalize_with_lut(buffer).0
}

/// Like [`equalize`], also returning the table that was applied.
#[must_use = "returns the equalized buffer"]
pub fn equalize_with_lut(mut buffer: PixelBuffer) -> (PixelBuffer, EqualizationLut) {
    let lut = EqualizationLut::for_buffer(&buffer);
    if lut.is_identity_fallback() {
        tracing::debug!(
            cdf_min = lut.cdf_min(),
            "degenerate histogram, using identity mapping"
        );
    }
    lut.apply(&mut buffer);
    (buffer, lut)
}

/// Number of distinct intensity levels present in `buffer`.
#[must_use]
pub fn distinct_levels(buffer: &PixelBuffer) -> usize {
    histogram(buffer).iter().filter(|&&h| h > 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, |x, y| {
            let v = f(x, y);
            [v, v, v, 255]
        })
    }

    #[test]
    fn histogram_counts_red_channel() {
        let buffer = PixelBuffer::from_fn(3, 1, |x, _| match x {
            0 => [10, 99, 99, 255],
            _ => [20, 0, 0, 255],
        });
        let hist = histogram(&buffer);
        assert_eq!(hist[10], 1);
        assert_eq!(hist[20], 2);
        assert_eq!(hist[99], 0);
        assert_eq!(hist.iter().sum::<u64>(), 3);
    }

    #[test]
    fn cumulative_is_running_sum() {
        let mut hist = [0u64; LEVELS];
        hist[0] = 2;
        hist[5] = 3;
        hist[255] = 1;
        let cdf = cumulative(&hist);
        assert_eq!(cdf[0], 2);
        assert_eq!(cdf[4], 2);
        assert_eq!(cdf[5], 5);
        assert_eq!(cdf[254], 5);
        assert_eq!(cdf[255], 6);
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn full_ramp_maps_to_identity() {
        let ramp = gray(256, 1, |x, _| x as u8);
        let lut = EqualizationLut::for_buffer(&ramp);
        assert!(!lut.is_identity_fallback());
        for v in 0..=255u8 {
            assert_eq!(lut.map(v), v);
        }
        let once = equalize(ramp.clone());
        assert_eq!(once, ramp);
        assert_eq!(equalize(once.clone()), once);
    }

    #[test]
    fn constant_image_uses_identity_fallback() {
        let flat = gray(5, 5, |_, _| 128);
        let lut = EqualizationLut::for_buffer(&flat);
        assert!(lut.is_identity_fallback());
        assert_eq!(lut.cdf_min(), 25);
        assert_eq!(equalize(flat.clone()), flat);
    }

    #[test]
    fn empty_buffer_is_unchanged() {
        let empty = PixelBuffer::default();
        let lut = EqualizationLut::for_buffer(&empty);
        assert!(lut.is_identity_fallback());
        assert_eq!(equalize(empty.clone()), empty);
    }

    #[test]
    fn two_levels_stretch_to_full_range() {
        // Half 100, half 110: cdf_min = 8, N = 16.
        // lut[100] = 0, lut[110] = round(8/8*255) = 255.
        let buffer = gray(4, 4, |x, _| if x < 2 { 100 } else { 110 });
        let out = equalize(buffer);
        assert_eq!(out.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(out.pixel(3, 3), Some([255, 255, 255, 255]));
    }

    #[test]
    fn three_levels_match_formula() {
        // Counts: 50 -> 1, 60 -> 2, 70 -> 1. N = 4, cdf_min = 1.
        // lut[60] = round((3-1)/(4-1)*255) = round(170.0) = 170.
        let buffer = gray(4, 1, |x, _| match x {
            0 => 50,
            3 => 70,
            _ => 60,
        });
        let lut = EqualizationLut::for_buffer(&buffer);
        assert_eq!(lut.map(50), 0);
        assert_eq!(lut.map(60), 170);
        assert_eq!(lut.map(70), 255);
    }

    #[test]
    fn alpha_is_untouched() {
        let buffer = PixelBuffer::from_fn(4, 1, |x, _| {
            #[allow(clippy::cast_possible_truncation)]
            let v = (x * 60) as u8;
            [v, v, v, 17]
        });
        let out = equalize(buffer);
        for px in out.samples().chunks_exact(CHANNELS) {
            assert_eq!(px[3], 17);
        }
    }

    #[test]
    fn values_below_minimum_clamp_to_zero() {
        let buffer = gray(2, 1, |x, _| if x == 0 { 30 } else { 40 });
        let lut = EqualizationLut::for_buffer(&buffer);
        assert_eq!(lut.map(0), 0);
        assert_eq!(lut.map(29), 0);
    }

    #[test]
    fn equalize_with_lut_reports_the_applied_table() {
        let buffer = gray(4, 1, |x, _| match x {
            0 => 50,
            3 => 70,
            _ => 60,
        });
        let (out, lut) = equalize_with_lut(buffer.clone());
        assert_eq!(out, equalize(buffer));
        assert_eq!(lut.distinct_levels(), 3);
        assert_eq!(lut.cdf_min(), 1);
        assert!(!lut.is_identity_fallback());
        assert_eq!(out.pixel(1, 0), Some([170, 170, 170, 255]));
    }

    #[test]
    fn distinct_levels_counts_occupied_bins() {
        let buffer = gray(4, 1, |x, _| if x < 2 { 1 } else { 2 });
        assert_eq!(distinct_levels(&buffer), 2);
    }
}
