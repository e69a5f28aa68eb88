//! Raster image decoding and PNG encoding.
//!
//! Any format the `image` crate was built with (PNG, JPEG, BMP, WebP)
//! is decoded and converted to 8-bit RGBA. Output is always PNG, since
//! it is lossless and keeps the alpha channel.

use image::ImageEncoder;
use lumen_pipeline::{
    Clock, PipelineConfig, PipelineDiagnostics, PipelineError, PipelineResult, PixelBuffer,
};

/// Errors that can occur while reading or writing raster images.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    /// The input byte slice was empty.
    #[error("empty input: no image data provided")]
    EmptyInput,

    /// The bytes are not a supported image.
    #[error("please upload a valid image file: {0}")]
    Decode(#[from] image::ImageError),

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    Encode(String),

    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The pipeline rejected the decoded image or configuration.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Decode image bytes into an RGBA [`PixelBuffer`].
///
/// # Errors
///
/// Returns [`RasterError::EmptyInput`] if `bytes` is empty.
/// Returns [`RasterError::Decode`] if the format is unrecognized or the
/// data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, RasterError> {
    if bytes.is_empty() {
        return Err(RasterError::EmptyInput);
    }
    let image = image::load_from_memory(bytes)?.to_rgba8();
    tracing::debug!(
        input_bytes = bytes.len(),
        width = image.width(),
        height = image.height(),
        "decoded image"
    );
    Ok(PixelBuffer::from(image))
}

/// Decode image bytes and run the pipeline on them, collecting
/// diagnostics.
///
/// Decoding is not part of the timed stages.
///
/// # Errors
///
/// Returns the errors of [`decode`], or [`RasterError::Pipeline`] if
/// the pipeline rejects the image or `config`.
pub fn process_bytes<C: Clock>(
    bytes: &[u8],
    config: &PipelineConfig,
    clock: &C,
) -> Result<(PipelineResult, PipelineDiagnostics), RasterError> {
    let buffer = decode(bytes)?;
    Ok(lumen_pipeline::process_with_diagnostics(buffer, config, clock)?)
}

/// Encode a [`PixelBuffer`] as PNG bytes.
///
/// # Errors
///
/// Returns [`RasterError::Encode`] if the PNG encoder fails (for
/// example on a zero-area buffer).
pub fn encode_png(buffer: &PixelBuffer) -> Result<Vec<u8>, RasterError> {
    let mut png_bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
    encoder
        .write_image(
            buffer.samples(),
            buffer.width(),
            buffer.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| RasterError::Encode(e.to_string()))?;
    Ok(png_bytes)
}
