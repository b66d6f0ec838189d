// Command-line interface
//
// `run` executes an experiment against the configured provider;
// `validate` resolves the run plan without calling any oracle.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::{load_config, ExperimentConfig};
use crate::graph::VersionGraph;
use crate::oracle::LlmOracle;
use crate::protocol::{ProtocolOutcome, ProtocolRunner, RunKind, RunPlan, TracingObserver};
use crate::providers::create_provider;

#[derive(Parser, Debug)]
#[command(name = "draftbench", version, about = "Run generation/evaluation experiments and measure their consistency")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute an experiment
    Run {
        /// Experiment definition (TOML)
        #[arg(long, short = 'e')]
        experiment: PathBuf,
        /// Provider configuration; defaults to ~/.draftbench/config.toml
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the consistency report here instead of stdout
        #[arg(long = "report-out")]
        report_out: Option<PathBuf>,
    },
    /// Parse an experiment and print its run plan
    Validate {
        #[arg(long, short = 'e')]
        experiment: PathBuf,
    },
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            experiment,
            config,
            report_out,
        } => run_experiment(&experiment, config.as_deref(), report_out.as_deref()).await,
        Command::Validate { experiment } => validate_experiment(&experiment),
    }
}

async fn run_experiment(
    experiment_path: &Path,
    config_path: Option<&Path>,
    report_out: Option<&Path>,
) -> Result<()> {
    let mut experiment = ExperimentConfig::load(experiment_path)?;
    let config = load_config(config_path)?;
    let entry = config
        .active_provider()
        .context("No provider configured")?;

    let provider = create_provider(entry, &config.oracle)?;
    experiment.apply_default_model(provider.default_model());
    tracing::info!(
        "Using {} ({}), generator model {}",
        entry.display_name(),
        provider.name(),
        experiment.models.generator
    );

    let oracle = Arc::new(LlmOracle::new(provider, config.oracle.clone()));
    let runner = ProtocolRunner::new(oracle, VersionGraph::shared(), Arc::new(TracingObserver));

    let outcome = runner.execute(&experiment).await?;
    print_outcome(&outcome);

    if let Some(report) = &outcome.report {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        match report_out {
            Some(path) => {
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                println!("Report written to {}", path.display());
            }
            None => println!("{json}"),
        }
    }

    Ok(())
}

fn print_outcome(outcome: &ProtocolOutcome) {
    for run in &outcome.runs {
        println!("{:<20} {:<10} {} node(s)", run.label, run.status, run.node_ids.len());
    }
    println!(
        "Tokens: {} prompt, {} output, {} total",
        outcome.usage.prompt_tokens, outcome.usage.output_tokens, outcome.usage.total_tokens
    );
    if let Some(report) = &outcome.report {
        println!("{}", report.summary);
        if let Some(commentary) = &report.commentary {
            println!("{commentary}");
        }
    }
}

fn validate_experiment(path: &Path) -> Result<()> {
    let experiment = ExperimentConfig::load(path)?;
    let plan = RunPlan::for_experiment(&experiment);

    println!("{} ({:?})", experiment.name, experiment.protocol);
    for note in &plan.notes {
        println!("note: {note}");
    }
    for run in &plan.runs {
        let detail = match run.kind {
            RunKind::Chain { steps, resources, method_override } => format!(
                "{steps} step(s), resources {resources:?}{}",
                method_override
                    .map(|m| format!(", seed method {}", m.as_str()))
                    .unwrap_or_default()
            ),
            RunKind::BaseDocument => "base document, generation only".to_string(),
            RunKind::Reevaluation => "re-evaluation of the base document".to_string(),
        };
        println!("  {:<20} {detail}", run.label);
    }
    println!(
        "Up to {} oracle call(s), {} ms pacing after each",
        plan.oracle_call_estimate(&experiment),
        experiment.pacing_ms
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "draftbench",
            "run",
            "--experiment",
            "exp.toml",
            "--report-out",
            "report.json",
        ])
        .unwrap();
        match cli.command {
            Command::Run { experiment, config, report_out } => {
                assert_eq!(experiment, PathBuf::from("exp.toml"));
                assert!(config.is_none());
                assert_eq!(report_out, Some(PathBuf::from("report.json")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_validate_experiment_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "name = \"v\"\nprotocol = \"ablation\"\niterations = 2\n[prompts]\ntask = \"t\"\n",
        )
        .unwrap();
        assert!(validate_experiment(file.path()).is_ok());
    }
}
