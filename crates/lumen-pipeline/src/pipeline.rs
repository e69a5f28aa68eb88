//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate buffer before continuing.
//!
//! Unlike [`crate::process`] which runs every stage in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use lumen_pipeline::{Pipeline, PipelineConfig, PipelineError, PixelBuffer};
//! # fn run(buffer: PixelBuffer) -> Result<(), PipelineError> {
//! let result = Pipeline::new(buffer, PipelineConfig::default())?
//!     .grayscale()
//!     .enhance_contrast()
//!     .reduce_noise()
//!     .detect_edges()
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each step consumes `self` and returns the next state. A step whose
//! stage is disabled in [`StageConfig`](crate::StageConfig) passes the
//! buffer through unchanged and records no snapshot. All validation
//! happens in [`Pipeline::new`], so every step after it is infallible.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::blur::{self, Kernel};
use crate::contrast;
use crate::diagnostics::StageMetrics;
use crate::edge;
use crate::grayscale;
use crate::types::{PipelineConfig, PipelineError, PipelineResult, PixelBuffer, Snapshots, Stage};

// ───────────────────────── Shared run state ──────────────────────────

/// State carried from step to step.
struct Carry {
    config: PipelineConfig,
    kernel: Kernel,
    buffer: PixelBuffer,
    snapshots: Snapshots,
    metrics: Option<StageMetrics>,
}

impl Carry {
    /// Run `stage` if it is enabled, snapshotting afterwards when the
    /// stage has a snapshot key.
    fn run(mut self, stage: Stage) -> Self {
        if !self.config.stages.is_enabled(stage) {
            tracing::debug!(%stage, "stage disabled, passing buffer through");
            self.metrics = None;
            return self;
        }

        let input = std::mem::take(&mut self.buffer);
        let (output, metrics) = match stage {
            Stage::Grayscale => run_grayscale(input),
            Stage::Contrast => run_contrast(input),
            Stage::NoiseReduction => run_noise_reduction(input, &self.kernel, &self.config),
            Stage::EdgeDetection => run_edge_detection(input, &self.config),
        };
        self.buffer = output;

        if let Some(key) = stage.snapshot_key() {
            self.snapshots.record(key, &self.buffer);
        }
        tracing::debug!(%stage, ?metrics, "stage complete");
        self.metrics = Some(metrics);
        self
    }

    fn into_result(self) -> PipelineResult {
        PipelineResult {
            output: self.buffer,
            snapshots: self.snapshots,
        }
    }
}

fn run_grayscale(buffer: PixelBuffer) -> (PixelBuffer, StageMetrics) {
    let metrics = StageMetrics::Grayscale {
        width: buffer.width(),
        height: buffer.height(),
    };
    (grayscale::to_grayscale(buffer), metrics)
}

fn run_contrast(buffer: PixelBuffer) -> (PixelBuffer, StageMetrics) {
    let (buffer, lut) = contrast::equalize_with_lut(buffer);
    let metrics = StageMetrics::Contrast {
        distinct_levels: lut.distinct_levels(),
        cdf_min: lut.cdf_min(),
        identity_fallback: lut.is_identity_fallback(),
    };
    (buffer, metrics)
}

fn run_noise_reduction(
    buffer: PixelBuffer,
    kernel: &Kernel,
    config: &PipelineConfig,
) -> (PixelBuffer, StageMetrics) {
    let metrics = StageMetrics::NoiseReduction {
        kernel_size: kernel.size(),
        sigma: kernel.sigma(),
        processed_pixels: blur::processed_pixel_count(&buffer, kernel.half()),
    };
    (
        blur::apply_filter(buffer, kernel, config.params.filter_type),
        metrics,
    )
}

fn run_edge_detection(buffer: PixelBuffer, config: &PipelineConfig) -> (PixelBuffer, StageMetrics) {
    let processed_pixels = edge::interior_pixel_count(&buffer);
    let edges = edge::detect_edges(buffer, &config.params);
    let (max_magnitude, mean_magnitude) = edge::magnitude_stats(&edges);
    let metrics = StageMetrics::EdgeDetection {
        processed_pixels,
        max_magnitude,
        mean_magnitude,
    };
    (edges, metrics)
}

// ───────────────────────── Entry point ───────────────────────────────

/// Entry point for the typed, step-by-step API.
pub struct Pipeline;

impl Pipeline {
    /// Validate `buffer` and `config` and return the [`Pending`] state.
    ///
    /// No stage runs here.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDimensions`] if either dimension
    /// is zero, and [`PipelineError::InvalidKernelSize`] if the kernel
    /// size is even or outside `3..=11`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer: PixelBuffer, config: PipelineConfig) -> Result<Pending, PipelineError> {
        if buffer.width() == 0 || buffer.height() == 0 {
            return Err(PipelineError::InvalidDimensions {
                width: buffer.width(),
                height: buffer.height(),
                len: buffer.samples().len(),
            });
        }
        config.validate()?;
        let kernel = Kernel::gaussian(config.params.kernel_size)?;
        Ok(Pending {
            carry: Carry {
                config,
                kernel,
                buffer,
                snapshots: Snapshots::default(),
                metrics: None,
            },
        })
    }
}

// ───────────────────────── Step 0: Pending ───────────────────────────

/// Validated input; nothing has run yet.
#[must_use = "pipeline steps are consumed by advancing; call .grayscale() to continue"]
pub struct Pending {
    carry: Carry,
}

impl Pending {
    /// The unmodified input buffer.
    #[must_use]
    pub const fn input(&self) -> &PixelBuffer {
        &self.carry.buffer
    }

    /// The configuration for this run.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.carry.config
    }

    /// Run the grayscale stage (if enabled).
    pub fn grayscale(self) -> Grayscaled {
        Grayscaled {
            carry: self.carry.run(Stage::Grayscale),
        }
    }
}

/// Generate the accessor block shared by every post-stage state.
macro_rules! stage_accessors {
    ($ty:ident, $stage:expr) => {
        impl $ty {
            /// The buffer after this step.
            #[must_use]
            pub const fn buffer(&self) -> &PixelBuffer {
                &self.carry.buffer
            }

            /// Whether this step's stage was enabled and executed.
            #[must_use]
            pub const fn ran(&self) -> bool {
                self.carry.metrics.is_some()
            }

            /// Snapshots recorded so far.
            #[must_use]
            pub const fn snapshots(&self) -> &Snapshots {
                &self.carry.snapshots
            }

            /// The stage this step ran.
            #[must_use]
            pub const fn stage(&self) -> Stage {
                $stage
            }
        }
    };
}

// ───────────────────────── Step 1: Grayscaled ────────────────────────

/// State after the grayscale step.
#[must_use = "pipeline steps are consumed by advancing; call .enhance_contrast() to continue"]
pub struct Grayscaled {
    carry: Carry,
}

stage_accessors!(Grayscaled, Stage::Grayscale);

impl Grayscaled {
    /// Run histogram equalization (if enabled).
    pub fn enhance_contrast(self) -> Enhanced {
        Enhanced {
            carry: self.carry.run(Stage::Contrast),
        }
    }
}

// ───────────────────────── Step 2: Enhanced ──────────────────────────

/// State after the contrast step.
#[must_use = "pipeline steps are consumed by advancing; call .reduce_noise() to continue"]
pub struct Enhanced {
    carry: Carry,
}

stage_accessors!(Enhanced, Stage::Contrast);

impl Enhanced {
    /// Run noise reduction (if enabled).
    pub fn reduce_noise(self) -> Filtered {
        Filtered {
            carry: self.carry.run(Stage::NoiseReduction),
        }
    }
}

// ───────────────────────── Step 3: Filtered ──────────────────────────

/// State after the noise-reduction step.
#[must_use = "pipeline steps are consumed by advancing; call .detect_edges() to continue"]
pub struct Filtered {
    carry: Carry,
}

stage_accessors!(Filtered, Stage::NoiseReduction);

impl Filtered {
    /// The kernel used (or that would have been used) for noise
    /// reduction.
    #[must_use]
    pub const fn kernel(&self) -> &Kernel {
        &self.carry.kernel
    }

    /// Run edge detection (if enabled).
    pub fn detect_edges(self) -> Done {
        Done {
            carry: self.carry.run(Stage::EdgeDetection),
        }
    }
}

// ───────────────────────── Step 4: Done ──────────────────────────────

/// Final state.
#[must_use = "call .into_result() to extract the PipelineResult"]
pub struct Done {
    carry: Carry,
}

stage_accessors!(Done, Stage::EdgeDetection);

impl Done {
    /// Consume the pipeline and return the [`PipelineResult`].
    #[must_use]
    pub fn into_result(self) -> PipelineResult {
        self.carry.into_result()
    }
}

// ──────────────────── PipelineStep trait + Step enum ──────────────────

/// Total number of steps, including [`Pending`].
pub const STEP_COUNT: usize = 5;

/// Trait implemented by every pipeline state, enabling uniform
/// iteration.
pub trait PipelineStep: Sized {
    /// Short name of this step.
    const NAME: &str;

    /// Zero-based index (`0` for [`Pending`] through `4` for [`Done`]).
    const INDEX: usize;

    /// The current buffer.
    fn current(&self) -> &PixelBuffer;

    /// Metrics for the stage that produced this state, or `None` for
    /// [`Pending`] and for disabled stages.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next state. Returns `None` from [`Done`].
    fn next(self) -> Option<Step>;

    /// Run all remaining steps and return the result.
    fn complete(self) -> PipelineResult;
}

impl PipelineStep for Pending {
    const NAME: &str = "pending";
    const INDEX: usize = 0;

    fn current(&self) -> &PixelBuffer {
        self.input()
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Option<Step> {
        Some(Step::Grayscaled(self.grayscale()))
    }

    fn complete(self) -> PipelineResult {
        self.grayscale().complete()
    }
}

impl PipelineStep for Grayscaled {
    const NAME: &str = "grayscale";
    const INDEX: usize = 1;

    fn current(&self) -> &PixelBuffer {
        self.buffer()
    }

    fn metrics(&self) -> Option<StageMetrics> {
        self.carry.metrics.clone()
    }

    fn next(self) -> Option<Step> {
        Some(Step::Enhanced(self.enhance_contrast()))
    }

    fn complete(self) -> PipelineResult {
        self.enhance_contrast().complete()
    }
}

impl PipelineStep for Enhanced {
    const NAME: &str = "contrast";
    const INDEX: usize = 2;

    fn current(&self) -> &PixelBuffer {
        self.buffer()
    }

    fn metrics(&self) -> Option<StageMetrics> {
        self.carry.metrics.clone()
    }

    fn next(self) -> Option<Step> {
        Some(Step::Filtered(self.reduce_noise()))
    }

    fn complete(self) -> PipelineResult {
        self.reduce_noise().complete()
    }
}

impl PipelineStep for Filtered {
    const NAME: &str = "noise_reduction";
    const INDEX: usize = 3;

    fn current(&self) -> &PixelBuffer {
        self.buffer()
    }

    fn metrics(&self) -> Option<StageMetrics> {
        self.carry.metrics.clone()
    }

    fn next(self) -> Option<Step> {
        Some(Step::Done(self.detect_edges()))
    }

    fn complete(self) -> PipelineResult {
        self.detect_edges().complete()
    }
}

impl PipelineStep for Done {
    const NAME: &str = "edge_detection";
    const INDEX: usize = 4;

    fn current(&self) -> &PixelBuffer {
        self.buffer()
    }

    fn metrics(&self) -> Option<StageMetrics> {
        self.carry.metrics.clone()
    }

    fn next(self) -> Option<Step> {
        None
    }

    fn complete(self) -> PipelineResult {
        self.into_result()
    }
}

/// Enum wrapping every pipeline state for loopable access.
///
/// ```rust
/// # use lumen_pipeline::{Pipeline, PipelineConfig, PipelineError, PixelBuffer};
/// # use lumen_pipeline::pipeline::{Advance, Step};
/// # fn run(buffer: PixelBuffer) -> Result<(), PipelineError> {
/// let mut step: Step = Pipeline::new(buffer, PipelineConfig::default())?.into();
/// loop {
///     match step.advance() {
///         Advance::Next(next) => step = next,
///         Advance::Complete(done) => { step = done; break; }
///     }
/// }
/// let result = step.complete();
/// # Ok(())
/// # }
/// ```
#[must_use]
pub enum Step {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Grayscaled`].
    Grayscaled(Grayscaled),
    /// See [`Enhanced`].
    Enhanced(Enhanced),
    /// See [`Filtered`].
    Filtered(Filtered),
    /// See [`Done`].
    Done(Done),
}

/// Result of [`Step::advance`].
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this next step.
    Next(Step),
    /// Already at the final step, returned unchanged.
    Complete(Step),
}

/// Delegate a method call to whichever `Step` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Grayscaled(s) => s.$method($($arg),*),
            Self::Enhanced(s) => s.$method($($arg),*),
            Self::Filtered(s) => s.$method($($arg),*),
            Self::Done(s) => s.$method($($arg),*),
        }
    };
}

// `PipelineStep`'s associated constants aren't callable through `self`;
// this helper trait exposes them for the `delegate!` macro.
trait StepMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStep> StepMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

impl Step {
    /// Short name of the current step.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current step.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The current buffer.
    #[must_use]
    pub fn current(&self) -> &PixelBuffer {
        delegate!(self, current)
    }

    /// Metrics for the stage that produced the current state.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final step.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// Advance to the next step, or hand back the final step unchanged.
    pub fn advance(self) -> Advance {
        match self {
            Self::Pending(s) => Advance::Next(Step::Grayscaled(s.grayscale())),
            Self::Grayscaled(s) => Advance::Next(Step::Enhanced(s.enhance_contrast())),
            Self::Enhanced(s) => Advance::Next(Step::Filtered(s.reduce_noise())),
            Self::Filtered(s) => Advance::Next(Step::Done(s.detect_edges())),
            done @ Self::Done(_) => Advance::Complete(done),
        }
    }

    /// Run all remaining steps and return the result.
    pub fn complete(self) -> PipelineResult {
        delegate!(self, complete)
    }
}

impl From<Pending> for Step {
    fn from(s: Pending) -> Self {
        Self::Pending(s)
    }
}

impl From<Grayscaled> for Step {
    fn from(s: Grayscaled) -> Self {
        Self::Grayscaled(s)
    }
}

impl From<Enhanced> for Step {
    fn from(s: Enhanced) -> Self {
        Self::Enhanced(s)
    }
}

impl From<Filtered> for Step {
    fn from(s: Filtered) -> Self {
        Self::Filtered(s)
    }
}

impl From<Done> for Step {
    fn from(s: Done) -> Self {
        Self::Done(s)
    }
}

// ───────────────────────── Cancellation ──────────────────────────────

/// Shared flag for aborting a run between stages.
///
/// Clones share the same flag. A stage that has already started always
/// runs to completion; the token is only checked before the next one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cancelled`] once [`cancel`](Self::cancel)
    /// has been called on any clone.
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}
