//! LeakWatch - water distribution leak detection
//!
//! # Usage
//!
//! ```bash
//! # Generate a synthetic network history
//! cargo run --bin simulation -- --hours 24 > history.csv
//!
//! # Train the expected-flow model on confirmed-normal rows
//! leakwatch train history.csv --model leakwatch-model.json
//!
//! # Replay readings through the detector
//! leakwatch replay history.csv --model leakwatch-model.json --summary
//!
//! # Validate a configuration file
//! leakwatch check-config leakwatch.toml
//! ```
//!
//! # Environment Variables
//!
//! - `LEAKWATCH_CONFIG`: Path to the configuration file
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use leakwatch::config::defaults::DEFAULT_MODEL_PATH;
use leakwatch::estimator::{load_model, partition_normal, save_model, train};
use leakwatch::{dataset, report, LeakConfig, LeakPipeline, NetworkTopology, ReadingOutcome};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "leakwatch")]
#[command(about = "LeakWatch water network leak detection")]
#[command(version)]
struct CliArgs {
    /// Configuration file (overrides LEAKWATCH_CONFIG and ./leakwatch.toml)
    #[arg(long, global = true, env = "LEAKWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the expected-flow model on the normal rows of a history file
    Train {
        /// History file (.csv or .jsonl)
        data: PathBuf,
        /// Where to write the trained model
        #[arg(long, default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,
    },

    /// Replay readings through the detector, in file order
    Replay {
        /// Readings file (.csv or .jsonl)
        data: PathBuf,
        /// Trained model file
        #[arg(long, default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,
        /// Output format for per-reading decisions
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Print only SUSPECT, LEAK and undetermined readings
        #[arg(long)]
        anomalies_only: bool,
        /// Print evaluation statistics and calibration state at the end
        #[arg(long)]
        summary: bool,
    },

    /// Validate a configuration file and print the effective configuration
    CheckConfig {
        /// File to check (defaults to the standard search order)
        path: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One line per reading
    Text,
    /// Status line plus every reason and the ranked candidates
    Detail,
    /// One JSON object per reading
    Json,
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = CliArgs::parse();

    match args.command {
        Command::Train { data, model } => {
            let config = load_config(args.config.as_deref())?;
            run_train(&config, &data, &model)
        }
        Command::Replay {
            data,
            model,
            format,
            anomalies_only,
            summary,
        } => {
            let config = load_config(args.config.as_deref())?;
            run_replay(&config, &data, &model, format, anomalies_only, summary)
        }
        Command::CheckConfig { path } => run_check_config(path.or(args.config).as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<LeakConfig> {
    match path {
        Some(p) => {
            let config = LeakConfig::load_from_file(p)
                .with_context(|| format!("Failed to load config {}", p.display()))?;
            info!(path = %p.display(), network = %config.network.name, "Configuration loaded");
            Ok(config)
        }
        None => Ok(LeakConfig::load()),
    }
}

// ============================================================================
// Subcommands
// ============================================================================

fn run_train(config: &LeakConfig, data: &Path, model_path: &Path) -> Result<()> {
    let dataset = dataset::load(data).with_context(|| format!("Failed to load {}", data.display()))?;
    let (normal, excluded) = partition_normal(&dataset.readings);
    info!(
        normal = normal.len(),
        excluded = excluded.len(),
        "Partitioned history into confirmed-normal rows"
    );
    if normal.is_empty() && !excluded.is_empty() {
        warn!("No rows carry a normal label; training needs a Leakage_Flag column");
    }

    let trained = train(&normal, &config.estimator).context("Training failed")?;
    save_model(&trained.model, Some(&trained.report), model_path)
        .with_context(|| format!("Failed to save model to {}", model_path.display()))?;

    print!("{}", report::training_summary(&trained.report));
    println!("Model written to {}", model_path.display());
    Ok(())
}

fn run_replay(
    config: &LeakConfig,
    data: &Path,
    model_path: &Path,
    format: OutputFormat,
    anomalies_only: bool,
    summary: bool,
) -> Result<()> {
    let checkpoint = load_model(model_path)
        .with_context(|| format!("Failed to load model {}", model_path.display()))?;
    let dataset = dataset::load(data).with_context(|| format!("Failed to load {}", data.display()))?;
    let mut topology = NetworkTopology::from_readings(&dataset.readings);
    topology.apply_config(&config.segments);
    info!(
        readings = dataset.readings.len(),
        segments = dataset.info.segments,
        topology_edges = topology.len(),
        "Replay starting"
    );
    let unmapped: HashSet<&str> = dataset
        .readings
        .iter()
        .filter(|r| !topology.contains(&r.segment_id))
        .map(|r| r.segment_id.as_str())
        .collect();
    if !unmapped.is_empty() {
        warn!(
            segments = unmapped.len(),
            "Segments without zone/block or [[segments]] junctions; localization limited to the segment itself"
        );
    }

    let mut pipeline = LeakPipeline::new(checkpoint.model, config, topology);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for (index, reading) in dataset.readings.iter().enumerate() {
        let outcome = pipeline.process(index, reading);
        if anomalies_only && outcome.result().is_some_and(|r| !r.is_anomalous()) {
            continue;
        }
        write_outcome(&mut out, &outcome, format)?;
    }

    if summary {
        writeln!(out)?;
        write!(out, "{}", report::stats_summary(pipeline.stats()))?;
        writeln!(out)?;
        write!(out, "{}", report::calibration_table(&pipeline.store().status()))?;
    }
    out.flush()?;
    info!(stats = %pipeline.stats(), "Replay complete");
    Ok(())
}

fn write_outcome(out: &mut impl Write, outcome: &ReadingOutcome, format: OutputFormat) -> Result<()> {
    match (format, outcome) {
        (OutputFormat::Text, _) => writeln!(out, "{}", report::outcome_line(outcome))?,
        (
            OutputFormat::Detail,
            ReadingOutcome::Decided {
                result,
                localization,
                ..
            },
        ) => write!(out, "{}", report::decision_detail(result, localization.as_ref()))?,
        (OutputFormat::Detail, ReadingOutcome::Undetermined { .. }) => {
            writeln!(out, "{}", report::outcome_line(outcome))?;
        }
        (
            OutputFormat::Json,
            ReadingOutcome::Decided {
                index,
                result,
                localization,
            },
        ) => {
            let line = serde_json::json!({
                "index": index,
                "result": result,
                "localization": localization,
            });
            writeln!(out, "{line}")?;
        }
        (OutputFormat::Json, ReadingOutcome::Undetermined { index, segment, error }) => {
            let line = serde_json::json!({
                "index": index,
                "segment_id": segment,
                "status": "UNDETERMINED",
                "error": error.to_string(),
            });
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}

fn run_check_config(path: Option<&Path>) -> Result<()> {
    // Unknown keys and range warnings are logged by the loader
    let config = match path {
        Some(p) => LeakConfig::load_from_file(p)
            .with_context(|| format!("Configuration {} is invalid", p.display()))?,
        None => LeakConfig::load(),
    };

    println!("Configuration OK: {} ({} segments)", config.network.name, config.segments.len());
    print!("{}", config.to_toml().context("Failed to render configuration")?);
    Ok(())
}
