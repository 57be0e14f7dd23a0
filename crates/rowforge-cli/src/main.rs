mod config;
mod logging;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use config::{ConfigError, Overrides, RunConfig};
use logging::init_logging;
use rowforge_generate::{Coordinator, GenerationError};
use schemars::schema_for;
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(String),
}

#[derive(Parser, Debug)]
#[command(name = "rowforge", version, about = "Deterministic synthetic row generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate rows as described by a run file and print the aggregate results.
    Generate(GenerateArgs),
    /// Print the JSON Schema of run files.
    Schema,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Run file (TOML).
    #[arg(long, short)]
    config: PathBuf,
    /// Run seed; overrides the run file.
    #[arg(long, conflicts_with = "unseeded")]
    seed: Option<i64>,
    /// Draw every row from entropy instead of a seed.
    #[arg(long, default_value_t = false)]
    unseeded: bool,
    /// Number of worker threads.
    #[arg(long)]
    workers: Option<usize>,
    /// Number of rows to generate.
    #[arg(long)]
    rows: Option<u64>,
    /// Rows per dispatched batch.
    #[arg(long)]
    batch_size: Option<usize>,
    /// Log progress at info level.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
    /// Log JSON lines instead of text.
    #[arg(long, default_value_t = false)]
    log_json: bool,
    /// Also append JSON log lines to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Write the summary here as well as to stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Generate(args) => run_generate(args).await,
        Command::Schema => print_schema(),
    }
}

async fn run_generate(args: GenerateArgs) -> Result<(), CliError> {
    init_logging(args.log_json, args.log_file.as_deref())?;

    let mut config = RunConfig::load(&args.config)?;
    config.apply(&Overrides {
        seed: args.seed,
        unseeded: args.unseeded,
        workers: args.workers,
        rows: args.rows,
        batch_size: args.batch_size,
        verbose: args.verbose,
    });

    let run_id = Uuid::new_v4().to_string();
    let started_at = chrono::Utc::now();
    tracing::info!(
        event = "run_started",
        run_id = %run_id,
        config = %args.config.display(),
        fields = config.fields.len(),
        aggregators = config.aggregators.len()
    );

    let timer = Instant::now();
    let distributions = config.distributions()?;
    let mut coordinator = Coordinator::new(config.options(), distributions)?;
    let results = match coordinator.start_async().await {
        Ok(results) => results,
        Err(err) => {
            tracing::error!(event = "run_failed", run_id = %run_id, error = %err);
            return Err(err.into());
        }
    };
    let duration_ms = timer.elapsed().as_millis() as u64;

    let mut summaries = Vec::with_capacity(config.aggregators.len());
    for (index, spec) in config.aggregators.iter().enumerate() {
        summaries.push(json!({
            "name": results.names()[index],
            "result": spec.summarize(&results, index)?,
        }));
    }
    let summary: Value = json!({
        "run_id": run_id,
        "started_at": started_at.to_rfc3339(),
        "duration_ms": duration_ms,
        "settings": config.generation,
        "results": summaries,
    });

    let rendered = serde_json::to_string_pretty(&summary)?;
    if let Some(path) = &args.out {
        std::fs::write(path, &rendered)?;
        tracing::info!(event = "summary_written", path = %path.display());
    }
    println!("{rendered}");
    tracing::info!(event = "run_finished", run_id = %run_id, duration_ms);
    Ok(())
}

fn print_schema() -> Result<(), CliError> {
    let schema = schema_for!(RunConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
