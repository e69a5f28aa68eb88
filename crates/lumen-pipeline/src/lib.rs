//! lumen-pipeline: Pure four-stage pixel pipeline (sans-IO).
//!
//! Transforms an 8-bit RGBA raster through:
//! grayscale -> histogram equalization -> Gaussian noise reduction ->
//! Sobel edge detection.
//!
//! Each stage can be switched off in [`StageConfig`]. The stage order is
//! fixed. Copies of the buffer after grayscale, contrast and noise
//! reduction are returned as [`Snapshots`] alongside the final output.
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! [`PixelBuffer`]s; decoding, encoding and file output live in
//! `lumen-io`.

pub mod blur;
pub mod buffer;
pub mod contrast;
pub mod diagnostics;
pub mod edge;
pub mod grayscale;
pub mod pipeline;
pub mod types;

pub use blur::Kernel;
pub use diagnostics::{Clock, PipelineDiagnostics, process_with_diagnostics};
pub use pipeline::{CancelToken, Pipeline};
pub use types::{
    EdgeMethod, FilterType, PipelineConfig, PipelineError, PipelineResult, PixelBuffer,
    ProcessingParams, SnapshotKey, Snapshots, Stage, StageConfig,
};

use pipeline::{Advance, Step};

/// Run the full pipeline.
///
/// # Pipeline steps
///
/// 1. Grayscale conversion (snapshot `grayscale`)
/// 2. Histogram equalization (snapshot `enhanced`)
/// 3. Gaussian noise reduction (snapshot `filtered`)
/// 4. Sobel edge detection
///
/// Disabled steps pass the buffer through unchanged and record no
/// snapshot.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDimensions`] if either dimension is
/// zero, and [`PipelineError::InvalidKernelSize`] if the kernel size is
/// even or outside `3..=11`. Both are checked before any stage runs.
pub fn process(
    buffer: PixelBuffer,
    config: &PipelineConfig,
) -> Result<PipelineResult, PipelineError> {
    Ok(Pipeline::new(buffer, *config)?
        .grayscale()
        .enhance_contrast()
        .reduce_noise()
        .detect_edges()
        .into_result())
}

/// Run the full pipeline, checking `cancel` before each stage.
///
/// # Errors
///
/// Same as [`process`], plus [`PipelineError::Cancelled`] if the token
/// is cancelled before the last stage starts. A cancelled run returns
/// no partial result.
pub fn process_cancellable(
    buffer: PixelBuffer,
    config: &PipelineConfig,
    cancel: &CancelToken,
) -> Result<PipelineResult, PipelineError> {
    let mut step: Step = Pipeline::new(buffer, *config)?.into();
    loop {
        if step.is_complete() {
            return Ok(step.complete());
        }
        cancel.check()?;
        step = match step.advance() {
            Advance::Next(next) | Advance::Complete(next) => next,
        };
    }
}
