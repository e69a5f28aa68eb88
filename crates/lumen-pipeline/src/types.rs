//! Shared types for the lumen pixel pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use crate::buffer::PixelBuffer;

// ───────────────────────────── Stages ─────────────────────────────────

/// One of the four pipeline stages.
///
/// The execution order is fixed ([`Stage::ALL`]); configuration can
/// only switch stages on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Luminosity-weighted RGB to gray reduction.
    Grayscale,
    /// Global histogram equalization.
    Contrast,
    /// Gaussian convolution.
    NoiseReduction,
    /// Sobel gradient magnitude.
    EdgeDetection,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Self; 4] = [
        Self::Grayscale,
        Self::Contrast,
        Self::NoiseReduction,
        Self::EdgeDetection,
    ];

    /// Canonical configuration name (`grayscale`, `contrast`,
    /// `noise_reduction`, `edge_detection`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Grayscale => "grayscale",
            Self::Contrast => "contrast",
            Self::NoiseReduction => "noise_reduction",
            Self::EdgeDetection => "edge_detection",
        }
    }

    /// Display label for reports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Grayscale => "Grayscale",
            Self::Contrast => "Contrast",
            Self::NoiseReduction => "Noise Reduction",
            Self::EdgeDetection => "Edge Detection",
        }
    }

    /// The snapshot recorded after this stage, if any.
    ///
    /// Edge detection has none: its output is the final result.
    #[must_use]
    pub const fn snapshot_key(self) -> Option<SnapshotKey> {
        match self {
            Self::Grayscale => Some(SnapshotKey::Grayscale),
            Self::Contrast => Some(SnapshotKey::Enhanced),
            Self::NoiseReduction => Some(SnapshotKey::Filtered),
            Self::EdgeDetection => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage name: {0:?}")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// Which stages are enabled.
///
/// Serialized as an object keyed by [`Stage::name`], so the JSON form is
/// exactly the stage-name → flag mapping. Missing keys default to
/// enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct StageConfig {
    /// Run the grayscale stage.
    pub grayscale: bool,
    /// Run histogram equalization.
    pub contrast: bool,
    /// Run Gaussian noise reduction.
    pub noise_reduction: bool,
    /// Run Sobel edge detection.
    pub edge_detection: bool,
}

impl StageConfig {
    /// Every stage enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            grayscale: true,
            contrast: true,
            noise_reduction: true,
            edge_detection: true,
        }
    }

    /// Every stage disabled.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            grayscale: false,
            contrast: false,
            noise_reduction: false,
            edge_detection: false,
        }
    }

    /// Whether `stage` is enabled.
    #[must_use]
    pub const fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::Grayscale => self.grayscale,
            Stage::Contrast => self.contrast,
            Stage::NoiseReduction => self.noise_reduction,
            Stage::EdgeDetection => self.edge_detection,
        }
    }

    /// Enable or disable `stage`.
    pub const fn set(&mut self, stage: Stage, enabled: bool) {
        match stage {
            Stage::Grayscale => self.grayscale = enabled,
            Stage::Contrast => self.contrast = enabled,
            Stage::NoiseReduction => self.noise_reduction = enabled,
            Stage::EdgeDetection => self.edge_detection = enabled,
        }
    }

    /// Builder-style variant of [`set`](Self::set).
    #[must_use]
    pub const fn with(mut self, stage: Stage, enabled: bool) -> Self {
        self.set(stage, enabled);
        self
    }

    /// Enabled stages in execution order.
    pub fn enabled(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL.into_iter().filter(|&s| self.is_enabled(s))
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        Self::all()
    }
}

// ─────────────────────────── Parameters ───────────────────────────────

/// Noise-reduction filter selector.
///
/// Only [`Gaussian`](Self::Gaussian) is implemented. The other values
/// are accepted so existing configurations still parse, and run the
/// Gaussian filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    /// Normalized Gaussian kernel with `sigma = kernel_size / 6`.
    #[default]
    Gaussian,
    /// Reserved.
    Mean,
    /// Reserved.
    Median,
}

impl FilterType {
    /// Whether this selector has its own implementation.
    #[must_use]
    pub const fn is_implemented(self) -> bool {
        matches!(self, Self::Gaussian)
    }
}

/// Edge detector selector.
///
/// Only [`Sobel`](Self::Sobel) is implemented; [`Canny`](Self::Canny)
/// runs Sobel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMethod {
    /// 3×3 Sobel gradient magnitude.
    #[default]
    Sobel,
    /// Reserved. Uses `canny_low` / `canny_high` once implemented.
    Canny,
}

impl EdgeMethod {
    /// Whether this selector has its own implementation.
    #[must_use]
    pub const fn is_implemented(self) -> bool {
        matches!(self, Self::Sobel)
    }
}

/// Numeric and algorithm parameters for the pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingParams {
    /// Side length of the noise-reduction kernel. Odd, in `3..=11`.
    pub kernel_size: u32,
    /// Noise-reduction filter selector.
    pub filter_type: FilterType,
    /// Edge detector selector.
    pub edge_method: EdgeMethod,
    /// Canny low threshold (reserved).
    pub canny_low: f32,
    /// Canny high threshold (reserved).
    pub canny_high: f32,
}

impl ProcessingParams {
    /// Smallest supported kernel size.
    pub const MIN_KERNEL_SIZE: u32 = 3;
    /// Largest supported kernel size.
    pub const MAX_KERNEL_SIZE: u32 = 11;
    /// Default kernel size.
    pub const DEFAULT_KERNEL_SIZE: u32 = 5;
    /// Default noise-reduction filter.
    pub const DEFAULT_FILTER_TYPE: FilterType = FilterType::Gaussian;
    /// Default edge detector.
    pub const DEFAULT_EDGE_METHOD: EdgeMethod = EdgeMethod::Sobel;
    /// Default Canny low threshold.
    pub const DEFAULT_CANNY_LOW: f32 = 50.0;
    /// Default Canny high threshold.
    pub const DEFAULT_CANNY_HIGH: f32 = 150.0;

    /// Check the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidKernelSize`] if `kernel_size` is
    /// even or outside `3..=11`.
    pub const fn validate(&self) -> Result<(), PipelineError> {
        validate_kernel_size(self.kernel_size)
    }
}

impl Default for ProcessingParams {
    fn default() -> Self {
        Self {
            kernel_size: Self::DEFAULT_KERNEL_SIZE,
            filter_type: Self::DEFAULT_FILTER_TYPE,
            edge_method: Self::DEFAULT_EDGE_METHOD,
            canny_low: Self::DEFAULT_CANNY_LOW,
            canny_high: Self::DEFAULT_CANNY_HIGH,
        }
    }
}

/// Reject even kernel sizes and sizes outside `3..=11`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidKernelSize`] on failure.
pub const fn validate_kernel_size(kernel_size: u32) -> Result<(), PipelineError> {
    if kernel_size % 2 == 0
        || kernel_size < ProcessingParams::MIN_KERNEL_SIZE
        || kernel_size > ProcessingParams::MAX_KERNEL_SIZE
    {
        return Err(PipelineError::InvalidKernelSize(kernel_size));
    }
    Ok(())
}

/// Full configuration for one pipeline run.
///
/// Passed by value at call time; the pipeline holds no global state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Which stages run.
    pub stages: StageConfig,
    /// Stage parameters.
    pub params: ProcessingParams,
}

impl PipelineConfig {
    /// Default noise-reduction kernel size.
    pub const DEFAULT_KERNEL_SIZE: u32 = ProcessingParams::DEFAULT_KERNEL_SIZE;
    /// Default noise-reduction filter.
    pub const DEFAULT_FILTER_TYPE: FilterType = ProcessingParams::DEFAULT_FILTER_TYPE;
    /// Default edge detector.
    pub const DEFAULT_EDGE_METHOD: EdgeMethod = ProcessingParams::DEFAULT_EDGE_METHOD;
    /// Default Canny low threshold.
    pub const DEFAULT_CANNY_LOW: f32 = ProcessingParams::DEFAULT_CANNY_LOW;
    /// Default Canny high threshold.
    pub const DEFAULT_CANNY_HIGH: f32 = ProcessingParams::DEFAULT_CANNY_HIGH;

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidKernelSize`] for a bad kernel
    /// size.
    pub const fn validate(&self) -> Result<(), PipelineError> {
        self.params.validate()
    }
}

// ─────────────────────────── Results ──────────────────────────────────

/// Name under which an intermediate buffer is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKey {
    /// After grayscale conversion.
    Grayscale,
    /// After histogram equalization.
    Enhanced,
    /// After noise reduction.
    Filtered,
}

impl SnapshotKey {
    /// All keys in pipeline order.
    pub const ALL: [Self; 3] = [Self::Grayscale, Self::Enhanced, Self::Filtered];

    /// The key as a string (`grayscale`, `enhanced`, `filtered`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Grayscale => "grayscale",
            Self::Enhanced => "enhanced",
            Self::Filtered => "filtered",
        }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Intermediate buffers captured during a run.
///
/// A field is `Some` only if its stage was enabled and executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshots {
    /// Copy taken after grayscale conversion.
    pub grayscale: Option<PixelBuffer>,
    /// Copy taken after histogram equalization.
    pub enhanced: Option<PixelBuffer>,
    /// Copy taken after noise reduction.
    pub filtered: Option<PixelBuffer>,
}

impl Snapshots {
    /// The snapshot stored under `key`.
    #[must_use]
    pub const fn get(&self, key: SnapshotKey) -> Option<&PixelBuffer> {
        match key {
            SnapshotKey::Grayscale => self.grayscale.as_ref(),
            SnapshotKey::Enhanced => self.enhanced.as_ref(),
            SnapshotKey::Filtered => self.filtered.as_ref(),
        }
    }

    /// Record a deep copy of `buffer` under `key`.
    pub(crate) fn record(&mut self, key: SnapshotKey, buffer: &PixelBuffer) {
        let slot = match key {
            SnapshotKey::Grayscale => &mut self.grayscale,
            SnapshotKey::Enhanced => &mut self.enhanced,
            SnapshotKey::Filtered => &mut self.filtered,
        };
        *slot = Some(buffer.clone());
    }

    /// Recorded snapshots in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (SnapshotKey, &PixelBuffer)> {
        SnapshotKey::ALL
            .into_iter()
            .filter_map(|key| self.get(key).map(|b| (key, b)))
    }

    /// Number of recorded snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether no snapshot was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// The buffer after the last enabled stage (the input itself if no
    /// stage ran).
    pub output: PixelBuffer,
    /// Intermediate copies keyed by [`SnapshotKey`].
    pub snapshots: Snapshots,
}

// ──────────────────────────── Errors ──────────────────────────────────

/// Errors that can occur during pipeline processing.
///
/// All validation happens before the first stage mutates the buffer,
/// so an error never leaves a partially processed result behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// The sample count does not match the dimensions, or a dimension
    /// is zero.
    #[error("invalid dimensions: {width}x{height} with {len} samples")]
    InvalidDimensions {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
        /// Actual number of samples.
        len: usize,
    },

    /// Kernel size is even or outside `3..=11`.
    #[error("invalid kernel size {0}: must be odd and between 3 and 11")]
    InvalidKernelSize(u32),

    /// The run was cancelled between stages.
    #[error("pipeline run was cancelled")]
    Cancelled,
}
