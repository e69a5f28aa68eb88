//! Luminosity grayscale conversion.
//!
//! The first pipeline stage: every pixel's R, G and B channels are
//! replaced with `round(0.299*R + 0.587*G + 0.114*B)`. Alpha is left
//! untouched. There is no spatial dependency, so pixels are converted
//! in parallel.

use rayon::prelude::*;

use crate::buffer::{CHANNELS, PixelBuffer};

/// Luminosity weight of the red channel, in thousandths (0.299).
pub const WEIGHT_R: u32 = 299;
/// Luminosity weight of the green channel, in thousandths (0.587).
pub const WEIGHT_G: u32 = 587;
/// Luminosity weight of the blue channel, in thousandths (0.114).
pub const WEIGHT_B: u32 = 114;

/// Denominator of the fixed-point weights.
const SCALE: u32 = 1000;

/// Weighted luminosity of one RGB triple, rounded to the nearest
/// integer (ties away from zero).
///
/// Evaluated in exact integer arithmetic: a floating-point weighted sum
/// can land just below an exact `.5` and round the wrong way.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_lossless)]
pub const fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let sum = WEIGHT_R * r as u32 + WEIGHT_G * g as u32 + WEIGHT_B * b as u32;
    // At most 255 since the weights sum to SCALE.
    ((sum + SCALE / 2) / SCALE) as u8
}

/// Convert `buffer` to grayscale in place and return it.
///
/// Running this twice is a no-op the second time, since R = G = B
/// already holds. Zero-area buffers are returned unchanged.
#[must_use = "returns the converted buffer"]
pub fn to_grayscale(mut buffer: PixelBuffer) -> PixelBuffer {
    buffer
        .samples_mut()
        .par_chunks_exact_mut(CHANNELS)
        .for_each(|px| {
            let l = luminance(px[0], px[1], px[2]);
            px[0] = l;
            px[1] = l;
            px[2] = l;
        });
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_possible_truncation)]
    fn colorful(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, |x, y| {
            [
                ((x * 37) % 256) as u8,
                ((y * 53) % 256) as u8,
                (((x + y) * 29) % 256) as u8,
                ((x * 11 + y * 7) % 256) as u8,
            ]
        })
    }

    #[test]
    fn weights_sum_to_one() {
        assert_eq!(WEIGHT_R + WEIGHT_G + WEIGHT_B, SCALE);
    }

    #[test]
    fn exact_half_rounds_up() {
        // 0.587*114 + 0.114*163 = 85.5 and 0.299 + 0.587*57 + 0.114*103 = 45.5.
        assert_eq!(luminance(0, 114, 163), 86);
        assert_eq!(luminance(1, 57, 103), 46);
        assert_eq!(luminance(0, 148, 216), 112);
    }

    #[test]
    fn every_rgb_triple_rounds_to_nearest() {
        // |1000*l - s| < 500, or exactly 500 with l rounded up.
        for r in 0..=255u8 {
            for g in 0..=255u8 {
                for b in 0..=255u8 {
                    let s = i64::from(
                        WEIGHT_R * u32::from(r) + WEIGHT_G * u32::from(g) + WEIGHT_B * u32::from(b),
                    );
                    let l = i64::from(luminance(r, g, b)) * i64::from(SCALE);
                    let diff = l - s;
                    assert!((-499..=500).contains(&diff), "({r},{g},{b}) -> {l}/{s}");
                }
            }
        }
    }

    #[test]
    fn primary_luminance_values() {
        assert_eq!(luminance(255, 0, 0), 76);
        assert_eq!(luminance(0, 255, 0), 150);
        assert_eq!(luminance(0, 0, 255), 29);
        assert_eq!(luminance(255, 255, 255), 255);
        assert_eq!(luminance(0, 0, 0), 0);
    }

    #[test]
    fn gray_input_keeps_its_value() {
        for v in 0..=255u8 {
            assert_eq!(luminance(v, v, v), v, "v={v}");
        }
    }

    #[test]
    fn output_channels_are_equal_and_alpha_preserved() {
        let input = colorful(13, 7);
        let output = to_grayscale(input.clone());
        for (before, after) in input
            .samples()
            .chunks_exact(CHANNELS)
            .zip(output.samples().chunks_exact(CHANNELS))
        {
            assert_eq!(after[0], after[1]);
            assert_eq!(after[1], after[2]);
            assert_eq!(after[3], before[3], "alpha must be untouched");
            assert_eq!(after[0], luminance(before[0], before[1], before[2]));
        }
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let once = to_grayscale(colorful(9, 9));
        let twice = to_grayscale(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn zero_area_buffer_is_unchanged() {
        let empty = PixelBuffer::default();
        assert_eq!(to_grayscale(empty.clone()), empty);
    }

    #[test]
    fn green_is_brightest_then_red_then_blue() {
        let r = luminance(255, 0, 0);
        let g = luminance(0, 255, 0);
        let b = luminance(0, 0, 255);
        assert!(g > r && r > b, "expected G > R > B, got R={r} G={g} B={b}");
    }
}
