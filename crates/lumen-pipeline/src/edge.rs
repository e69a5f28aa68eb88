//! Sobel gradient-magnitude edge detection.
//!
//! For every interior pixel (`1 ≤ x < width - 1`, `1 ≤ y < height - 1`)
//! the horizontal and vertical Sobel responses `gx`, `gy` are computed
//! over the 3×3 neighbourhood of the intensity channel, and
//! `round(sqrt(gx² + gy²))` (clamped to 255) is written to R, G and B
//! with alpha forced to 255. The outermost one-pixel ring keeps
//! whatever the previous stage left there.

use rayon::prelude::*;

use crate::buffer::{ALPHA, CHANNELS, PixelBuffer};
use crate::types::{EdgeMethod, ProcessingParams};

/// Horizontal Sobel kernel.
pub const SOBEL_X: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];

/// Vertical Sobel kernel.
pub const SOBEL_Y: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

/// Raw Sobel responses `(gx, gy)` centred on `(x, y)`.
///
/// Returns `None` unless `(x, y)` is an interior pixel.
#[must_use]
pub fn gradient_at(buffer: &PixelBuffer, x: u32, y: u32) -> Option<(i32, i32)> {
    let (width, height) = (buffer.width(), buffer.height());
    if x == 0 || y == 0 || x >= width.saturating_sub(1) || y >= height.saturating_sub(1) {
        return None;
    }
    Some(gradient(buffer, x as usize, y as usize))
}

/// Sobel responses at an interior pixel. Callers check bounds.
fn gradient(buffer: &PixelBuffer, x: usize, y: usize) -> (i32, i32) {
    let mut gx = 0;
    let mut gy = 0;
    for ky in 0..3 {
        for kx in 0..3 {
            let p = i32::from(buffer.intensity(x + kx - 1, y + ky - 1));
            gx += p * SOBEL_X[ky][kx];
            gy += p * SOBEL_Y[ky][kx];
        }
    }
    (gx, gy)
}

/// Gradient magnitude, rounded and clamped to `0..=255`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn magnitude(gx: i32, gy: i32) -> u8 {
    let m = f64::from(gx).hypot(f64::from(gy));
    m.round().min(255.0) as u8
}

/// Replace interior pixels of `buffer` with their Sobel gradient
/// magnitude.
///
/// Buffers narrower or shorter than 3 pixels have no interior and are
/// returned unchanged.
#[must_use = "returns the edge map"]
pub fn sobel(mut buffer: PixelBuffer) -> PixelBuffer {
    let (width, height) = (buffer.width() as usize, buffer.height() as usize);
    if width < 3 || height < 3 {
        return buffer;
    }

    let source = buffer.clone();
    let stride = buffer.row_stride();

    buffer
        .samples_mut()
        .par_chunks_exact_mut(stride)
        .enumerate()
        .filter(|(y, _)| *y >= 1 && *y < height - 1)
        .for_each(|(y, row)| {
            for x in 1..width - 1 {
                let (gx, gy) = gradient(&source, x, y);
                let v = magnitude(gx, gy);
                let i = x * CHANNELS;
                row[i] = v;
                row[i + 1] = v;
                row[i + 2] = v;
                row[i + ALPHA] = u8::MAX;
            }
        });

    buffer
}

/// Run the edge-detection stage selected by `params`.
///
/// Every [`EdgeMethod`] currently resolves to Sobel.
#[must_use = "returns the edge map"]
pub fn detect_edges(buffer: PixelBuffer, params: &ProcessingParams) -> PixelBuffer {
    if params.edge_method != EdgeMethod::Sobel {
        tracing::warn!(
            edge_method = ?params.edge_method,
            "edge method is not implemented, using sobel"
        );
    }
    sobel(buffer)
}

/// Number of pixels [`sobel`] writes.
#[must_use]
pub fn interior_pixel_count(buffer: &PixelBuffer) -> usize {
    let w = (buffer.width() as usize).saturating_sub(2);
    let h = (buffer.height() as usize).saturating_sub(2);
    w * h
}

/// Largest and mean value over the interior of an edge map produced
/// by [`sobel`].
///
/// Returns `(0, 0.0)` when there is no interior.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn magnitude_stats(edges: &PixelBuffer) -> (u8, f64) {
    let (width, height) = (edges.width() as usize, edges.height() as usize);
    let mut max = 0u8;
    let mut sum = 0u64;
    let mut count = 0u64;
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let m = edges.intensity(x, y);
            max = max.max(m);
            sum += u64::from(m);
            count += 1;
        }
    }
    let mean = if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    };
    (max, mean)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, alpha: u8, f: impl Fn(u32, u32) -> u8) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, |x, y| {
            let v = f(x, y);
            [v, v, v, alpha]
        })
    }

    #[test]
    fn uniform_image_has_zero_gradient() {
        let input = gray(6, 6, 128, |_, _| 77);
        let out = sobel(input.clone());
        for y in 0..6 {
            for x in 0..6 {
                let interior = (1..5).contains(&x) && (1..5).contains(&y);
                if interior {
                    assert_eq!(out.pixel(x, y), Some([0, 0, 0, 255]));
                } else {
                    assert_eq!(out.pixel(x, y), input.pixel(x, y));
                }
            }
        }
    }

    #[test]
    fn vertical_step_has_horizontal_gradient() {
        let input = gray(6, 5, 255, |x, _| if x < 3 { 0 } else { 10 });
        assert_eq!(gradient_at(&input, 2, 2), Some((40, 0)));
        assert_eq!(gradient_at(&input, 3, 2), Some((40, 0)));
        assert_eq!(gradient_at(&input, 1, 2), Some((0, 0)));
        let out = sobel(input);
        assert_eq!(out.pixel(2, 2).unwrap()[0], 40);
        assert_eq!(out.pixel(1, 2).unwrap()[0], 0);
    }

    #[test]
    fn horizontal_step_has_vertical_gradient() {
        let input = gray(5, 6, 255, |_, y| if y < 3 { 0 } else { 10 });
        assert_eq!(gradient_at(&input, 2, 2), Some((0, 40)));
    }

    #[test]
    fn strong_edges_clamp_to_255() {
        let input = gray(5, 5, 255, |x, _| if x < 2 { 0 } else { 255 });
        let out = sobel(input);
        assert_eq!(out.pixel(2, 2).unwrap()[0], 255);
    }

    #[test]
    fn magnitude_rounds_half_away_from_zero() {
        assert_eq!(magnitude(3, 4), 5);
        assert_eq!(magnitude(1, 1), 1); // 1.414
        assert_eq!(magnitude(-2, 1), 2); // 2.236
        assert_eq!(magnitude(1000, 0), 255);
    }

    #[test]
    fn border_ring_is_byte_identical() {
        #[allow(clippy::cast_possible_truncation)]
        let input = PixelBuffer::from_fn(7, 5, |x, y| {
            let v = ((x * 41 + y * 13) % 256) as u8;
            [v, v, v, 3]
        });
        let out = sobel(input.clone());
        for y in 0..5 {
            for x in 0..7 {
                if x == 0 || y == 0 || x == 6 || y == 4 {
                    assert_eq!(out.pixel(x, y), input.pixel(x, y), "({x},{y})");
                } else {
                    assert_eq!(out.pixel(x, y).unwrap()[3], 255);
                }
            }
        }
    }

    #[test]
    #[allow(clippy::cast_possible_truncation)]
    fn tiny_images_are_unchanged() {
        for (w, h) in [(2, 2), (1, 9), (9, 2), (0, 0)] {
            let input = gray(w, h, 40, |x, y| ((x + y) * 25) as u8);
            assert_eq!(sobel(input.clone()), input, "{w}x{h}");
            assert_eq!(interior_pixel_count(&input), 0);
        }
    }

    #[test]
    fn gradient_at_rejects_border() {
        let input = gray(4, 4, 255, |_, _| 0);
        assert_eq!(gradient_at(&input, 0, 1), None);
        assert_eq!(gradient_at(&input, 3, 1), None);
        assert_eq!(gradient_at(&input, 1, 3), None);
        assert_eq!(gradient_at(&input, 1, 1), Some((0, 0)));
    }

    #[test]
    fn canny_selector_falls_back_to_sobel() {
        let input = gray(6, 6, 255, |x, _| if x < 3 { 0 } else { 90 });
        let params = ProcessingParams {
            edge_method: EdgeMethod::Canny,
            ..ProcessingParams::default()
        };
        assert_eq!(detect_edges(input.clone(), &params), sobel(input));
    }

    #[test]
    fn magnitude_stats_on_step() {
        let input = gray(6, 5, 255, |x, _| if x < 3 { 0 } else { 10 });
        let (max, mean) = magnitude_stats(&sobel(input));
        assert_eq!(max, 40);
        // Interior is 4x3; columns x=2 and x=3 carry 40, x=1 and x=4 carry 0.
        assert!((mean - 20.0).abs() < 1e-9);
    }
}
