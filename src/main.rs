// src/main.rs
mod utils;
mod source;
mod extractors;
mod storage;
mod runner;

use std::path::PathBuf;

use clap::Parser;
use rust_decimal::Decimal;

use extractors::layout::{builtin_layout, load_layout_file, BUILTIN_LAYOUTS, DEFAULT_LAYOUT};
use extractors::{MismatchPolicy, StatementLayout, ValidatorConfig};
use runner::{OutputMode, RunConfig, RunSummary};
use utils::AppError;

/// Extracts bank statement transactions from PDFs into CSV
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Statement file (PDF or JSON token dump) or a directory of statements
    input: PathBuf,

    /// Output mode (default: single for a file, combined for a directory)
    #[arg(short, long, value_enum)]
    mode: Option<OutputMode>,

    /// Debug mode - verbose logs, coordinate columns and a metadata file
    #[arg(short, long)]
    debug: bool,

    /// Built-in statement layout
    #[arg(short, long, default_value = DEFAULT_LAYOUT)]
    layout: String,

    /// JSON layout description (overrides --layout)
    #[arg(long)]
    layout_file: Option<PathBuf>,

    /// Vertical distance in points within which tokens share a line
    #[arg(long)]
    row_tolerance: Option<f64>,

    /// Largest accepted difference between printed and computed balances
    #[arg(long)]
    balance_tolerance: Option<Decimal>,

    /// Drop rows whose printed balance does not add up instead of keeping them
    #[arg(long)]
    reject_mismatches: bool,

    /// Exit with an error if any document produced warnings
    #[arg(long)]
    strict: bool,

    /// Documents extracted concurrently (default: available parallelism)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Directory for output files (default: next to the inputs)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

fn resolve_layout(args: &Args) -> Result<StatementLayout, AppError> {
    let mut layout = match &args.layout_file {
        Some(path) => load_layout_file(path)?,
        None => builtin_layout(&args.layout).ok_or_else(|| {
            AppError::Config(format!(
                "unknown layout '{}' (available: {})",
                args.layout,
                BUILTIN_LAYOUTS.join(", ")
            ))
        })?,
    };
    if let Some(tolerance) = args.row_tolerance {
        layout.row_tolerance = tolerance;
    }
    layout.validate()?;
    Ok(layout)
}

fn resolve_validator(args: &Args) -> Result<ValidatorConfig, AppError> {
    let mut config = ValidatorConfig::default();
    if let Some(tolerance) = args.balance_tolerance {
        if tolerance.is_sign_negative() {
            return Err(AppError::Config(format!("balance tolerance must not be negative, got {}", tolerance)));
        }
        config.tolerance = tolerance;
    }
    if args.reject_mismatches {
        config.policy = MismatchPolicy::Reject;
    }
    Ok(config)
}

/// `--strict` turns leftover warnings and skipped documents into a failed run.
fn check_strict(strict: bool, summary: &RunSummary) -> Result<(), AppError> {
    if strict && (summary.warnings > 0 || summary.skipped > 0) {
        return Err(AppError::Processing(format!(
            "strict mode: {} warnings, {} skipped documents",
            summary.warnings, summary.skipped
        )));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Parse CLI Arguments
    let args = Args::parse();

    // 2. Setup Logging (RUST_LOG wins over --debug)
    utils::logging::setup_logging(args.debug);
    tracing::info!("Starting processing for args: {:?}", args);

    // 3. Resolve layout and validation settings
    let layout = resolve_layout(&args)?;
    let validator = resolve_validator(&args)?;
    let jobs = args
        .jobs
        .filter(|&n| n > 0)
        .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
    tracing::debug!("Layout '{}', {:?}, {} jobs", layout.name, validator, jobs);

    // 4. Extract and write
    let config = RunConfig {
        input: args.input.clone(),
        mode: args.mode,
        debug: args.debug,
        layout,
        validator,
        jobs,
        output_dir: args.output_dir.clone(),
    };
    let summary = runner::run(config).await?;

    tracing::info!(
        "Processing finished. Documents: {}, Skipped: {}, Transactions: {}, Warnings: {}",
        summary.documents,
        summary.skipped,
        summary.transactions,
        summary.warnings
    );
    for output in &summary.outputs {
        tracing::info!("Output: {}", output.display());
    }

    check_strict(args.strict, &summary)
}
