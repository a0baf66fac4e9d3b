#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI for running regional site forecasts.
//!
//! ```text
//! site_forecast run --region GA --snapshot data/GA.json [--config site_forecast.toml]
//!                   [--offline] [--output report.json]
//! site_forecast config
//! ```
//!
//! The reasoning provider is picked from `AI_PROVIDER`,
//! `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `AI_BASE_URL` and `AI_MODEL`.
//! Without one (or with `--offline`) runs end on the rule-based
//! opportunity ranking.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use site_forecast_ai::reasoning::{LlmReasoningStage, OfflineReasoningStage, ReasoningStage};
use site_forecast_collector::JsonFileCollector;
use site_forecast_orchestrator::{Config, Orchestrator};
use site_forecast_run_models::{AnalysisRun, RunStatus};

#[derive(Parser)]
#[command(name = "site_forecast", about = "Predict where a chain opens its next stores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one region and print its report as JSON
    Run {
        /// Region to analyze (usually a state code)
        #[arg(long)]
        region: String,
        /// Snapshot file, or a directory holding `<region>.json`
        #[arg(long)]
        snapshot: PathBuf,
        /// Configuration file (defaults to `$SITE_FORECAST_CONFIG`)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Skip the reasoning stage and use the rule-based ranking
        #[arg(long)]
        offline: bool,
        /// Write the report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the default configuration as TOML
    Config,
}

fn reasoning_stage(offline: bool, max_predictions: usize) -> Arc<dyn ReasoningStage> {
    if offline {
        log::info!("Offline mode; predictions come from the opportunity ranking");
        return Arc::new(OfflineReasoningStage);
    }
    match LlmReasoningStage::from_env(max_predictions) {
        Ok(stage) => Arc::new(stage),
        Err(e) => {
            log::warn!("No reasoning provider available ({e}); running offline");
            Arc::new(OfflineReasoningStage)
        }
    }
}

fn print_summary(run: &AnalysisRun) {
    eprintln!("Run {} for {}: {}", run.id, run.region, run.status);
    for error in &run.stage_errors {
        eprintln!("  ! {error}");
    }
    if run.predictions.is_empty() {
        eprintln!("  No predictions.");
        return;
    }
    eprintln!("  {:<28} {:<6} {:<10} SOURCE", "CITY", "STATE", "CONFIDENCE");
    for prediction in &run.predictions {
        eprintln!(
            "  {:<28} {:<6} {:<10.3} {}",
            prediction.city, prediction.state, prediction.confidence_score, prediction.source
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Config => {
            print!("{}", Config::default().to_toml_string()?);
        }
        Commands::Run {
            region,
            snapshot,
            config,
            offline,
            output,
        } => {
            let config = Config::resolve(config.as_deref())?;
            let reasoning = reasoning_stage(offline, config.run.fallback_limit);
            let collector = Arc::new(JsonFileCollector::new(snapshot));
            let orchestrator = Orchestrator::new(config, collector, reasoning)?;

            let run = orchestrator.run(&region).await;
            print_summary(&run);

            let json = serde_json::to_string_pretty(&run.report)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, json).await?;
                    log::info!("Wrote report to {}", path.display());
                }
                None => println!("{json}"),
            }

            if run.status == RunStatus::Failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
