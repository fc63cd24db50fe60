//! STL compaction CLI.
//!
//! Single entry point for both compaction algorithms:
//! 1. **A0:** single-instruction removals in random order.
//! 2. **A1xx:** block-wise removals with a configurable intra-block order.
//!
//! The binary parses arguments, installs logging, loads the TOML
//! configuration, and drives pre-run → optional preprocessing → compaction →
//! cleanup. Exit code 0 on completion, 1 on configuration errors,
//! unrecoverable tool errors, or invariant violations.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use stlpress_core::compact::{A1xx, A0};
use stlpress_core::Config;

/// Selection of the compaction algorithm.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompactionMode {
    /// Single-instruction removals in random order.
    #[value(name = "A0")]
    A0,
    /// Block-wise removals, reverse source order.
    #[value(name = "A1xx")]
    A1xx,
}

/// An STL compaction toolkit driven by logic and fault simulation.
#[derive(Debug, Parser)]
#[command(name = "stlpress", author, version, about)]
struct Cli {
    /// Selection of the compaction algorithm.
    #[arg(short = 'm', long = "compaction_mode", value_enum)]
    compaction_mode: CompactionMode,

    /// TOML configuration file.
    #[arg(short = 'c', long = "configuration")]
    configuration: PathBuf,

    /// Increase verbosity: -v for DEBUG, -vv for TRACE (default INFO).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write all messages to this log file.
    #[arg(short = 'l', long = "logfile")]
    logfile: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.logfile.as_deref()) {
        eprintln!("failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Installs the stdout subscriber and the optional file layer.
fn init_logging(verbosity: u8, logfile: Option<&std::path::Path>) -> anyhow::Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stdout);

    let file_layer = logfile
        .map(|path| {
            File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))
        })
        .transpose()?
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file))
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.configuration)
        .with_context(|| format!("loading {}", cli.configuration.display()))?;

    match cli.compaction_mode {
        CompactionMode::A0 => execute_a0(config),
        CompactionMode::A1xx => execute_a1xx(config),
    }
}

fn execute_a0(config: Config) -> anyhow::Result<()> {
    let mut driver = A0::new(config)?;

    let anchor = driver.pre_run().context("baseline run failed")?;
    info!(
        "initial STL stats: TaT = {}, coverage = {}",
        anchor.tat, anchor.coverage
    );

    report_preprocessing(driver.preprocess()?);

    let started = Instant::now();
    let result = driver.run(anchor);
    driver.post_run();
    result?;

    info!("execution time: {}", format_duration(started.elapsed()));
    Ok(())
}

fn execute_a1xx(config: Config) -> anyhow::Result<()> {
    let mut driver = A1xx::new(config)?;

    let anchor = driver.pre_run().context("baseline run failed")?;
    info!(
        "initial STL stats: TaT = {}, coverage = {}",
        anchor.tat, anchor.coverage
    );

    report_preprocessing(driver.preprocess()?);

    let started = Instant::now();
    let result = driver.run(anchor);
    driver.post_run();
    result?;

    info!("execution time: {}", format_duration(started.elapsed()));
    Ok(())
}

/// Logs the search-space reduction of the preprocessor phase.
fn report_preprocessing(outcome: Option<(usize, usize)>) {
    match outcome {
        Some((before, after)) if before > 0 => {
            let percentage = ((before - after) as f64 / before as f64) * 100.0;
            info!(
                "preprocessor finished, from {before} to {after} lines; search space reduced by {percentage:.4}%"
            );
        }
        Some(_) => info!("preprocessor finished on an empty candidate list"),
        None => info!("preprocessor phase skipped"),
    }
}

/// Renders a duration as `0d 0h 2m 13.042s`.
fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs_f64();
    let days = (total / 86_400.0).floor();
    let hours = ((total % 86_400.0) / 3_600.0).floor();
    let minutes = ((total % 3_600.0) / 60.0).floor();
    let seconds = total % 60.0;
    format!("{days:.0}d {hours:.0}h {minutes:.0}m {seconds:.3}s")
}
