//! Dataset Preparation Tool
//!
//! Configuration-driven tool that turns a newline-delimited JSON event dump
//! into a chunked training dataset.
//!
//! # Steps
//!
//! 1. Load the feature scaler, or fit and persist it from the input
//! 2. Window the input batch by batch, one chunk file per batch
//! 3. Split chunks into training and validation
//! 4. Load or fit the target scalers on the training chunks
//!
//! ## Output Format
//!
//! - **Chunks**: `chunk_{id:05}.npz` - `X` `[N, L, 4]` plus five target arrays
//! - **Metadata**: `chunk_{id:05}.json` - Sequence counts, time span, class counts
//! - **Scalers**: JSON files at the configured scaler paths
//!
//! # Usage
//!
//! ```bash
//! # Prepare from config and event dump
//! cargo run --release --bin prepare_dataset -- --config dataset.toml --input events.jsonl
//!
//! # Rebuild from scratch
//! cargo run --release --bin prepare_dataset -- --config dataset.toml --input events.jsonl --overwrite
//!
//! # Generate sample config
//! cargo run --release --bin prepare_dataset -- --generate-config dataset.toml
//! ```

use seismic_dataset::prelude::*;
use std::path::PathBuf;

struct RunArgs {
    config: PathBuf,
    input: PathBuf,
    overwrite: bool,
}

/// Main entry point for the preparation tool
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    match args[1].as_str() {
        "--generate-config" => {
            if args.len() < 3 {
                eprintln!("Error: --generate-config requires a path argument");
                std::process::exit(1);
            }
            generate_sample_config(&args[2]);
        }
        "--help" | "-h" => print_usage(&args[0]),
        _ => match parse_run_args(&args[1..]) {
            Ok(run) => {
                if let Err(e) = run_from_config(&run) {
                    eprintln!("❌ Preparation failed: {e}");
                    std::process::exit(1);
                }
            }
            Err(msg) => {
                eprintln!("Error: {msg}");
                print_usage(&args[0]);
                std::process::exit(1);
            }
        },
    }
}

fn print_usage(program: &str) {
    eprintln!(
        r#"
Seismic Dataset Preparation Tool

Usage:
    {program} --config <path.toml> --input <events.jsonl> [--overwrite]
    {program} --generate-config <path>   Generate sample config file
    {program} --help                     Show this help

Options:
    --overwrite   Delete existing chunks in the output directory first

For configuration options, see the generated sample config.
"#
    );
}

fn parse_run_args(args: &[String]) -> std::result::Result<RunArgs, String> {
    let mut config = None;
    let mut input = None;
    let mut overwrite = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                config = Some(
                    iter.next()
                        .ok_or("--config requires a path argument")?
                        .into(),
                )
            }
            "--input" => {
                input = Some(
                    iter.next()
                        .ok_or("--input requires a path argument")?
                        .into(),
                )
            }
            "--overwrite" => overwrite = true,
            other => return Err(format!("Unknown argument: {other}")),
        }
    }

    Ok(RunArgs {
        config: config.ok_or("--config is required")?,
        input: input.ok_or("--input is required")?,
        overwrite,
    })
}

/// Generate a sample configuration file
fn generate_sample_config(path: &str) {
    let sample = PipelineConfig::default().with_metadata(ExperimentMetadata {
        name: "Seismic Sequences".to_string(),
        description: Some("30-event windows with occurrence and next-event targets".to_string()),
        created_at: Some(chrono::Utc::now().to_rfc3339()),
        version: Some("1.0.0".to_string()),
        tags: Some(vec!["seismic".to_string(), "sequence-30".to_string()]),
    });

    match sample.save_toml(path) {
        Ok(()) => {
            println!("✅ Generated sample config: {path}");
            println!("\nEdit the following fields before running:");
            println!("  - chunks.output_dir: Directory for chunk files");
            println!("  - scalers.*_path: Where scalers are loaded from or saved to");
            println!("  - window.sequence_length: Events per input sequence");
        }
        Err(e) => {
            eprintln!("Error generating config: {e}");
            std::process::exit(1);
        }
    }
}

/// Run preparation from a configuration file
fn run_from_config(run: &RunArgs) -> Result<()> {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Seismic Dataset Preparation Tool               ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let config = PipelineConfig::load_toml(&run.config)?;
    println!("✅ Loaded configuration: {}", run.config.display());
    print_config_summary(&config);

    let pipeline = Pipeline::new(config)?;
    if run.overwrite {
        let removed = pipeline.store().clear()?;
        println!("🧹 Removed {removed} existing chunks");
    }

    let fit_cursor = JsonLinesCursor::open(&run.input)?;
    let build_cursor = JsonLinesCursor::open(&run.input)?;

    let start = std::time::Instant::now();
    let prepared = pipeline.prepare(fit_cursor, build_cursor, None)?;
    let elapsed = start.elapsed();

    print_summary(&prepared, elapsed);
    Ok(())
}

fn print_config_summary(config: &PipelineConfig) {
    println!();
    println!("Configuration:");
    println!("  Sequence length:   {}", config.window.sequence_length);
    println!("  Records per batch: {}", config.chunks.records_per_batch);
    println!("  Carry overlap:     {}", config.chunks.carry_overlap);
    println!("  Output dir:        {}", config.chunks.output_dir.display());
    println!(
        "  Feature scaler:    {}",
        config.scalers.feature_scaler_path.display()
    );
    if let Some(path) = &config.scalers.target_scaler_path {
        println!("  Target scalers:    {}", path.display());
    }
    println!(
        "  Validation split:  {:.0}%",
        config.split.validation_fraction * 100.0
    );
    println!();
}

fn print_summary(prepared: &PreparedDataset, elapsed: std::time::Duration) {
    let report = &prepared.report;
    let scaler = match prepared.scaler_origin {
        ScalerOrigin::Loaded => "loaded",
        ScalerOrigin::Fitted => "fitted",
    };

    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("Summary");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  Feature scaler:     {scaler}");
    println!("  Batches read:       {}", report.batches_read);
    println!("  Chunks written:     {}", report.chunks_written());
    println!("  Batches skipped:    {}", report.batches_skipped);
    println!("  Sequences written:  {}", report.sequences_written);
    println!("  Windows skipped:    {}", report.skipped_windows);
    println!("  Records dropped:    {}", report.records_dropped());
    println!(
        "  Occurrence rate:    {:.2}% ({} / {})",
        report.occurrence.occurrence_rate() * 100.0,
        report.occurrence.occurred,
        report.occurrence.total
    );
    println!(
        "  Split:              {} train / {} validation chunks",
        prepared.split.train.len(),
        prepared.split.validation.len()
    );
    println!(
        "  Target scalers:     {}",
        if prepared.target_scalers.is_some() {
            "ready"
        } else {
            "not configured"
        }
    );
    println!("  Elapsed:            {:.2}s", elapsed.as_secs_f64());
}
