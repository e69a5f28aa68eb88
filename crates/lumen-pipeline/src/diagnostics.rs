//! Pipeline diagnostics: timing and per-stage metrics.
//!
//! [`process_with_diagnostics`] runs the same steps as
//! [`process`](crate::process) and additionally records how long each
//! enabled stage took and a few numbers describing what it did.
//!
//! The crate does not read the system clock itself. Callers supply a
//! [`Clock`], so the pipeline stays deterministic and usable on targets
//! without `std::time::Instant`.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{Advance, Pipeline, Step};
use crate::types::{PipelineConfig, PipelineError, PipelineResult, PixelBuffer, Stage};

/// Time source used to measure stage durations.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
///
/// A stage field is `None` when that stage was disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Grayscale conversion.
    pub grayscale: Option<StageDiagnostics>,
    /// Histogram equalization.
    pub contrast: Option<StageDiagnostics>,
    /// Gaussian noise reduction.
    pub noise_reduction: Option<StageDiagnostics>,
    /// Sobel edge detection.
    pub edge_detection: Option<StageDiagnostics>,
    /// Wall-clock duration of the whole run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Grayscale conversion metrics.
    Grayscale {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },
    /// Histogram equalization metrics.
    Contrast {
        /// Number of occupied histogram bins before equalization.
        distinct_levels: usize,
        /// Count of the smallest occurring intensity.
        cdf_min: u64,
        /// Whether the degenerate-histogram guard kept the image as is.
        identity_fallback: bool,
    },
    /// Noise-reduction metrics.
    NoiseReduction {
        /// Kernel side length.
        kernel_size: usize,
        /// Gaussian standard deviation.
        sigma: f64,
        /// Pixels outside the untouched margin.
        processed_pixels: usize,
    },
    /// Edge-detection metrics.
    EdgeDetection {
        /// Interior pixels written.
        processed_pixels: usize,
        /// Largest gradient magnitude (after clamping).
        max_magnitude: u8,
        /// Mean gradient magnitude over the interior.
        mean_magnitude: f64,
    },
}

/// High-level summary for the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Image width in pixels.
    pub image_width: u32,
    /// Image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Number of stages that ran.
    pub stages_run: usize,
    /// Number of snapshots recorded.
    pub snapshot_count: usize,
}

impl PipelineDiagnostics {
    /// Diagnostics for `stage`, if it ran.
    #[must_use]
    pub const fn stage(&self, stage: Stage) -> Option<&StageDiagnostics> {
        match stage {
            Stage::Grayscale => self.grayscale.as_ref(),
            Stage::Contrast => self.contrast.as_ref(),
            Stage::NoiseReduction => self.noise_reduction.as_ref(),
            Stage::EdgeDetection => self.edge_detection.as_ref(),
        }
    }

    const fn slot(&mut self, stage: Stage) -> &mut Option<StageDiagnostics> {
        match stage {
            Stage::Grayscale => &mut self.grayscale,
            Stage::Contrast => &mut self.contrast,
            Stage::NoiseReduction => &mut self.noise_reduction,
            Stage::EdgeDetection => &mut self.edge_detection,
        }
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for stage in Stage::ALL {
            let name = stage.label();
            let Some(diag) = self.stage(stage) else {
                lines.push(format!("{name:<24} {:>10} {:>10}  disabled", "-", "-"));
                continue;
            };
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Stages run: {}  |  Snapshots: {}",
            self.summary.stages_run, self.summary.snapshot_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Grayscale { width, height } => format!("{width}x{height}"),
        StageMetrics::Contrast {
            distinct_levels,
            cdf_min,
            identity_fallback,
        } => {
            let mode = if *identity_fallback {
                " (identity)"
            } else {
                ""
            };
            format!("levels={distinct_levels} cdf_min={cdf_min}{mode}")
        }
        StageMetrics::NoiseReduction {
            kernel_size,
            sigma,
            processed_pixels,
        } => format!("k={kernel_size} sigma={sigma:.3} px={processed_pixels}"),
        StageMetrics::EdgeDetection {
            processed_pixels,
            max_magnitude,
            mean_magnitude,
        } => format!("px={processed_pixels} max={max_magnitude} mean={mean_magnitude:.1}"),
    }
}

/// Run the full pipeline, timing each enabled stage with `clock`.
///
/// Produces exactly the same [`PipelineResult`] as
/// [`process`](crate::process).
///
/// # Errors
///
/// Same as [`Pipeline::new`].
pub fn process_with_diagnostics<C: Clock>(
    buffer: PixelBuffer,
    config: &PipelineConfig,
    clock: &C,
) -> Result<(PipelineResult, PipelineDiagnostics), PipelineError> {
    let (width, height) = (buffer.width(), buffer.height());
    let start = clock.now();

    let mut step: Step = Pipeline::new(buffer, *config)?.into();
    let mut diagnostics = PipelineDiagnostics {
        grayscale: None,
        contrast: None,
        noise_reduction: None,
        edge_detection: None,
        total_duration: Duration::ZERO,
        summary: PipelineSummary {
            image_width: width,
            image_height: height,
            pixel_count: u64::from(width) * u64::from(height),
            stages_run: 0,
            snapshot_count: 0,
        },
    };

    for stage in Stage::ALL {
        let stage_start = clock.now();
        step = match step.advance() {
            Advance::Next(next) | Advance::Complete(next) => next,
        };
        let duration = clock.elapsed(&stage_start);
        if let Some(metrics) = step.metrics() {
            tracing::debug!(%stage, ?duration, "stage timed");
            *diagnostics.slot(stage) = Some(StageDiagnostics { duration, metrics });
            diagnostics.summary.stages_run += 1;
        }
    }

    let result = step.complete();
    diagnostics.summary.snapshot_count = result.snapshots.len();
    diagnostics.total_duration = clock.elapsed(&start);
    Ok((result, diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::types::StageConfig;

    /// Clock that advances by one millisecond every time it is read.
    #[derive(Default)]
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn test_image() -> PixelBuffer {
        PixelBuffer::from_fn(12, 10, |x, y| {
            let v = ((x * 19 + y * 7) % 256) as u8;
            [v, v / 2, 255 - v, 255]
        })
    }

    #[test]
    fn duration_ms_converts_correctly() {
        assert!((duration_ms(Duration::from_micros(1500)) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn result_matches_plain_process() {
        let config = PipelineConfig::default();
        let (result, _) = process_with_diagnostics(test_image(), &config, &TickClock::default())
            .unwrap();
        assert_eq!(result, crate::process(test_image(), &config).unwrap());
    }

    #[test]
    fn every_enabled_stage_is_timed() {
        let (_, diag) =
            process_with_diagnostics(test_image(), &PipelineConfig::default(), &TickClock::default())
                .unwrap();
        for stage in Stage::ALL {
            let d = diag.stage(stage).unwrap();
            assert!(d.duration > Duration::ZERO, "{stage}");
        }
        assert_eq!(diag.summary.stages_run, 4);
        assert_eq!(diag.summary.snapshot_count, 3);
        assert_eq!(diag.summary.pixel_count, 120);
        assert!(diag.total_duration >= Duration::from_millis(4));
    }

    #[test]
    fn disabled_stages_have_no_diagnostics() {
        let config = PipelineConfig {
            stages: StageConfig::all()
                .with(Stage::Contrast, false)
                .with(Stage::EdgeDetection, false),
            ..PipelineConfig::default()
        };
        let (_, diag) =
            process_with_diagnostics(test_image(), &config, &TickClock::default()).unwrap();
        assert!(diag.contrast.is_none());
        assert!(diag.edge_detection.is_none());
        assert_eq!(diag.summary.stages_run, 2);
        assert_eq!(diag.summary.snapshot_count, 2);
        assert!(diag.report().contains("disabled"));
    }

    #[test]
    fn stage_metrics_describe_the_run() {
        let (_, diag) =
            process_with_diagnostics(test_image(), &PipelineConfig::default(), &TickClock::default())
                .unwrap();
        assert_eq!(
            diag.grayscale.unwrap().metrics,
            StageMetrics::Grayscale {
                width: 12,
                height: 10
            }
        );
        let StageMetrics::NoiseReduction {
            kernel_size,
            processed_pixels,
            ..
        } = diag.noise_reduction.unwrap().metrics
        else {
            unreachable!()
        };
        assert_eq!(kernel_size, 5);
        assert_eq!(processed_pixels, 8 * 6);
        let StageMetrics::EdgeDetection {
            processed_pixels, ..
        } = diag.edge_detection.unwrap().metrics
        else {
            unreachable!()
        };
        assert_eq!(processed_pixels, 10 * 8);
    }

    #[test]
    fn constant_image_reports_identity_fallback() {
        let flat = PixelBuffer::from_pixel(5, 5, [128, 128, 128, 255]);
        let (_, diag) =
            process_with_diagnostics(flat, &PipelineConfig::default(), &TickClock::default())
                .unwrap();
        assert_eq!(
            diag.contrast.unwrap().metrics,
            StageMetrics::Contrast {
                distinct_levels: 1,
                cdf_min: 25,
                identity_fallback: true
            }
        );
    }

    #[test]
    fn invalid_config_fails_before_timing() {
        let mut config = PipelineConfig::default();
        config.params.kernel_size = 2;
        let result = process_with_diagnostics(test_image(), &config, &TickClock::default());
        assert_eq!(result.err(), Some(PipelineError::InvalidKernelSize(2)));
    }

    #[test]
    fn report_lists_every_stage() {
        let (_, diag) =
            process_with_diagnostics(test_image(), &PipelineConfig::default(), &TickClock::default())
                .unwrap();
        let report = diag.report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        assert!(report.contains("Image: 12x10 (120 pixels)"));
        for stage in Stage::ALL {
            assert!(report.contains(stage.label()), "{stage}");
        }
    }

    #[test]
    fn diagnostics_json_round_trip() {
        let (_, diag) =
            process_with_diagnostics(test_image(), &PipelineConfig::default(), &TickClock::default())
                .unwrap();
        let json = serde_json::to_string(&diag).unwrap();
        let back: PipelineDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary, diag.summary);
        assert_eq!(
            back.grayscale.unwrap().metrics,
            diag.grayscale.unwrap().metrics
        );
        assert!(back.contrast.is_some());
    }
}
