//! lumen-bench: CLI tool for running the lumen pipeline and collecting diagnostics.
//!
//! Runs the four-stage pipeline on a given image file with configurable
//! parameters, printing per-stage timing and metrics. Useful for:
//!
//! - Comparing kernel sizes and their effect on edge magnitudes
//! - Measuring per-stage durations to identify bottlenecks
//! - Saving every intermediate stage image for inspection
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin lumen-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use lumen_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use lumen_pipeline::{EdgeMethod, FilterType, PipelineConfig, Stage};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "lumen_bench=info,lumen_pipeline=warn,lumen_io=info";

/// Grayscale, contrast, noise reduction and edge detection for still images.
///
/// Runs the pipeline on a given image with configurable parameters and
/// prints per-stage timing and metric diagnostics.
#[derive(Parser)]
#[command(name = "lumen-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Noise-reduction kernel size (odd, 3-11).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_KERNEL_SIZE)]
    kernel_size: u32,

    /// Noise-reduction filter.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_FILTER)]
    filter_type: Filter,

    /// Edge detection method.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_EDGE)]
    edge_method: Edge,

    /// Canny low threshold (reserved).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CANNY_LOW)]
    canny_low: f32,

    /// Canny high threshold (reserved).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CANNY_HIGH)]
    canny_high: f32,

    /// Disable a stage (grayscale, contrast, noise_reduction,
    /// edge_detection). May be repeated.
    #[arg(long = "skip", value_name = "STAGE")]
    skip: Vec<Stage>,

    /// Write every stage image and the final result into this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Noise-reduction filter selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Filter {
    /// Normalized Gaussian kernel.
    Gaussian,
    /// Reserved; runs Gaussian.
    Mean,
    /// Reserved; runs Gaussian.
    Median,
}

/// Edge detection method selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Edge {
    /// 3x3 Sobel gradient magnitude.
    Sobel,
    /// Reserved; runs Sobel.
    Canny,
}

const fn filter_from_pipeline(f: FilterType) -> Filter {
    match f {
        FilterType::Gaussian => Filter::Gaussian,
        FilterType::Mean => Filter::Mean,
        FilterType::Median => Filter::Median,
    }
}

const fn edge_from_pipeline(e: EdgeMethod) -> Edge {
    match e {
        EdgeMethod::Sobel => Edge::Sobel,
        EdgeMethod::Canny => Edge::Canny,
    }
}

/// CLI defaults derived from the pipeline's own defaults so the two
/// cannot silently diverge.
const CLI_DEFAULT_FILTER: Filter = filter_from_pipeline(PipelineConfig::DEFAULT_FILTER_TYPE);
const CLI_DEFAULT_EDGE: Edge = edge_from_pipeline(PipelineConfig::DEFAULT_EDGE_METHOD);

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags. The result is validated either
/// way.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        let mut config = PipelineConfig::default();
        for &stage in &cli.skip {
            config.stages.set(stage, false);
        }
        config.params.kernel_size = cli.kernel_size;
        config.params.filter_type = match cli.filter_type {
            Filter::Gaussian => FilterType::Gaussian,
            Filter::Mean => FilterType::Mean,
            Filter::Median => FilterType::Median,
        };
        config.params.edge_method = match cli.edge_method {
            Edge::Sobel => EdgeMethod::Sobel,
            Edge::Canny => EdgeMethod::Canny,
        };
        config.params.canny_low = cli.canny_low;
        config.params.canny_high = cli.canny_high;
        config
    };
    config.validate().map_err(|e| format!("Invalid config: {e}"))?;
    Ok(config)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match lumen_io::process_bytes(&image_bytes, &config, &StdClock) {
            Ok((result, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write stage images on the first run only.
                if run == 0
                    && let Some(ref dir) = cli.output_dir
                {
                    match lumen_io::write_result(dir, &result) {
                        Ok(paths) => {
                            for path in &paths {
                                eprintln!("Wrote {}", path.display());
                            }
                        }
                        Err(e) => {
                            eprintln!("Error writing images to {}: {e}", dir.display());
                            return ExitCode::FAILURE;
                        }
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Error processing {}: {e}", cli.image_path.display());
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    for stage in Stage::ALL {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(|d| d.stage(stage))
            .map(|s| s.duration.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{:<24} {stage_mean:>10.3}ms", stage.label());
    }
}
