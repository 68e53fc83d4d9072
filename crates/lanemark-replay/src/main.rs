//! lanemark-replay: run the annotation pipeline on recorded model outputs.
//!
//! Decodes an image, loads the detector, classifier, segmenter and OCR
//! outputs previously recorded for it, and runs the full annotator with
//! those outputs standing in for live inference. Prints the annotation
//! summary and per-task diagnostics. Useful for:
//!
//! - Reproducing an annotation without the inference engines
//! - Tuning crop margins, thresholds and path sampling
//! - Measuring per-task durations and completion order
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin lanemark-replay -- --recorded outputs.json <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use lanemark_pipeline::{
    AnnotationContainer, Annotator, AnnotatorConfig, RecordedOutputs, RunDiagnostics,
    StandardPreprocessor, Task,
};
use serde::Serialize;

/// Replay recorded model outputs through the lanemark annotator.
///
/// Runs every extraction stage on the given image, answering model
/// queries from the recorded JSON, and prints the annotations together
/// with per-task timing diagnostics.
#[derive(Parser)]
#[command(name = "lanemark-replay", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// JSON file with the recorded model outputs for this image.
    ///
    /// Without it, only the direction stage runs.
    #[arg(long)]
    recorded: Option<PathBuf>,

    /// Full annotator config as a JSON string.
    ///
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Hand the detector and segmenter the raw crop instead of the
    /// enhanced one.
    #[arg(long)]
    no_preprocess: bool,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output annotations and diagnostics as JSON instead of a report.
    #[arg(long)]
    json: bool,
}

/// JSON document printed per run with `--json`.
#[derive(Serialize)]
struct RunOutput<'a> {
    annotations: lanemark_pipeline::AnnotationSummary<'a>,
    diagnostics: &'a RunDiagnostics,
}

fn config_from_cli(cli: &Cli) -> Result<AnnotatorConfig, String> {
    cli.config_json.as_ref().map_or_else(
        || Ok(AnnotatorConfig::default()),
        |json| serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}")),
    )
}

fn load_recorded(path: &Path) -> Result<RecordedOutputs, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("Error parsing {}: {e}", path.display()))
}

fn build_annotator(cli: &Cli, config: AnnotatorConfig) -> Result<Annotator, String> {
    let mut builder = Annotator::builder(config.clone());
    if !cli.no_preprocess {
        builder = builder.preprocessor(StandardPreprocessor::new(config.preprocessing));
    }
    if let Some(path) = &cli.recorded {
        let recorded = Arc::new(load_recorded(path)?);
        builder = builder
            .detector(Arc::clone(&recorded))
            .classifier(Arc::clone(&recorded))
            .segmenter(Arc::clone(&recorded))
            .text_reader(recorded);
    }
    builder.build().map_err(|e| format!("Error building annotator: {e}"))
}

fn print_run(container: &AnnotationContainer, diagnostics: &RunDiagnostics, json: bool) -> Result<(), String> {
    if json {
        let output = RunOutput {
            annotations: container.summary(),
            diagnostics,
        };
        let text = serde_json::to_string_pretty(&output)
            .map_err(|e| format!("Error serializing output: {e}"))?;
        println!("{text}");
    } else {
        let summary = serde_json::to_string_pretty(&container.summary())
            .map_err(|e| format!("Error serializing annotations: {e}"))?;
        println!("{summary}");
        println!("{}", diagnostics.report());
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image = match image::open(&cli.image_path) {
        Ok(img) => img.to_rgb8(),
        Err(e) => {
            eprintln!("Error decoding {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    let annotator = match build_annotator(&cli, config) {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({}x{})",
        cli.image_path.display(),
        image.width(),
        image.height(),
    );
    eprintln!("Annotator: {annotator:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match annotator.process_with_diagnostics(image.clone()) {
            Ok((container, diagnostics)) => {
                if let Err(msg) = print_run(&container, &diagnostics, cli.json) {
                    eprintln!("{msg}");
                    return ExitCode::FAILURE;
                }
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
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

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[RunDiagnostics]) {
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
    println!("{:<12} {:>12} {:>8}", "Task", "Mean (ms)", "Runs");
    println!("{}", "-".repeat(40));

    for task in Task::ALL {
        let task_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(|d| d.task(task))
            .filter(|t| t.outcome != lanemark_pipeline::StageOutcome::Skipped)
            .map(|t| t.duration.as_secs_f64() * 1000.0)
            .collect();

        if task_durations.is_empty() {
            continue;
        }

        let task_mean = task_durations.iter().sum::<f64>() / task_durations.len() as f64;
        println!(
            "{:<12} {task_mean:>10.3}ms {:>8}",
            task.to_string(),
            task_durations.len()
        );
    }
}
