//! exptrack - experiment/run registry CLI
//!
//! ## Commands
//!
//! - `experiment create`: Register a new experiment under a unique name
//! - `run create`: Record a versioned run with its parameters, metrics, artifacts
//! - `run get`: Print a run with everything recorded for it
//!
//! Results are printed as pretty JSON on stdout; logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use exptrack_core::{
    Experiment, ExperimentId, ExperimentService, NewArtifact, NewExperiment, NewMetric,
    NewParameter, NewRun, Run, RunId, RunStatus,
};
use exptrack_state::{ExperimentRepository, SurrealExperimentRepository, SurrealHandle};
use serde::Serialize;
use tracing::debug;

#[derive(Parser)]
#[command(name = "exptrack")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Experiment and run registry", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage experiments
    Experiment {
        #[command(subcommand)]
        action: ExperimentAction,
    },

    /// Manage runs
    Run {
        #[command(subcommand)]
        action: RunAction,
    },
}

#[derive(Subcommand)]
enum ExperimentAction {
    /// Create an experiment
    Create {
        /// Unique, case-sensitive name
        name: String,

        /// Free-form description
        #[arg(short, long)]
        description: Option<String>,
    },
}

#[derive(Subcommand)]
enum RunAction {
    /// Create a run together with its parameters, metrics, and artifacts
    Create {
        /// Experiment id
        #[arg(short, long)]
        experiment: i64,

        /// Run version, unique within the experiment
        #[arg(long)]
        version: i64,

        /// Initial status: running, completed, or failed
        #[arg(short, long, value_parser = parse_status, default_value = "running")]
        status: RunStatus,

        /// Parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<NewParameter>,

        /// Metric as key=number (repeatable)
        #[arg(short, long = "metric", value_parser = parse_metric)]
        metrics: Vec<NewMetric>,

        /// Artifact as path or path:type (repeatable)
        #[arg(short, long = "artifact", value_parser = parse_artifact)]
        artifacts: Vec<NewArtifact>,
    },

    /// Show a run
    Get {
        /// Run id
        run_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    exptrack_core::init_tracing(cli.json, exptrack_core::level_for(cli.verbose));

    let handle = SurrealHandle::setup_from_env()
        .await
        .context("Failed to connect to exptrack database")?;
    let repo: Arc<dyn ExperimentRepository> = Arc::new(SurrealExperimentRepository::new(handle));
    let service = ExperimentService::new(repo);

    match cli.command {
        Commands::Experiment { action } => match action {
            ExperimentAction::Create { name, description } => {
                let experiment =
                    cmd_experiment_create(&service, &name, description.as_deref()).await?;
                print_json(&experiment)
            }
        },
        Commands::Run { action } => match action {
            RunAction::Create {
                experiment,
                version,
                status,
                params,
                metrics,
                artifacts,
            } => {
                let input = NewRun {
                    experiment_id: ExperimentId(experiment),
                    version,
                    status,
                    parameters: params,
                    metrics,
                    artifacts,
                };
                let run = cmd_run_create(&service, input).await?;
                print_json(&run)
            }
            RunAction::Get { run_id } => {
                let run = cmd_run_get(&service, run_id).await?;
                print_json(&run)
            }
        },
    }
}

async fn cmd_experiment_create(
    service: &ExperimentService,
    name: &str,
    description: Option<&str>,
) -> Result<Experiment> {
    let mut input = NewExperiment::new(name);
    if let Some(description) = description {
        input = input.with_description(description);
    }
    service
        .create_experiment(input)
        .await
        .with_context(|| format!("failed to create experiment '{name}'"))
}

async fn cmd_run_create(service: &ExperimentService, input: NewRun) -> Result<Run> {
    let (experiment_id, version) = (input.experiment_id, input.version);
    debug!(%experiment_id, version, "creating run");
    service.create_run(input).await.with_context(|| {
        format!("failed to create run version {version} for experiment {experiment_id}")
    })
}

async fn cmd_run_get(service: &ExperimentService, run_id: i64) -> Result<Run> {
    service
        .get_run(RunId(run_id))
        .await
        .with_context(|| format!("failed to load run {run_id}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Argument parsers
// ---------------------------------------------------------------------------

fn parse_status(raw: &str) -> std::result::Result<RunStatus, String> {
    raw.parse::<RunStatus>().map_err(|e| e.to_string())
}

fn split_key_value(raw: &str) -> std::result::Result<(&str, &str), String> {
    raw.split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn parse_param(raw: &str) -> std::result::Result<NewParameter, String> {
    let (key, value) = split_key_value(raw)?;
    Ok(NewParameter::new(key, value))
}

fn parse_metric(raw: &str) -> std::result::Result<NewMetric, String> {
    let (key, value) = split_key_value(raw)?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("metric '{key}' value is not a number: '{value}'"))?;
    Ok(NewMetric::new(key, value))
}

/// `path` or `path:type`. The type is taken from the last colon only when it
/// looks like a tag, so `C:\out\model.pt` and `s3://bucket/x` stay whole.
fn parse_artifact(raw: &str) -> std::result::Result<NewArtifact, String> {
    match raw.rsplit_once(':') {
        Some((path, tag))
            if !path.is_empty() && !tag.is_empty() && !tag.contains(|c: char| c == '/' || c == '\\') =>
        {
            Ok(NewArtifact::new(path).with_type(tag))
        }
        _ => Ok(NewArtifact::new(raw)),
    }
}
