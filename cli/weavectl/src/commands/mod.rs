//! CLI commands.

mod score;
mod simulate;

use std::path::Path;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use weave_assign::AssignmentEngine;
use weave_scheduler::config::load_engine_config;
use weave_scheduler::scenario::ScenarioFile;

use crate::output::OutputFormat;

/// weavectl - replay worker-pool scenarios through the assignment engine.
#[derive(Debug, Parser)]
#[command(name = "weavectl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, alias = "output", global = true, default_value = "table")]
    format: String,

    /// Log to stderr (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a scenario for a number of cycles.
    Simulate(simulate::SimulateCommand),

    /// Score the demand of a single scan without allocating.
    Score(score::ScoreCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        init_tracing(self.verbose);

        let ctx = CommandContext {
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::Simulate(cmd) => cmd.run(ctx).await,
            Commands::Score(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("weavectl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub format: OutputFormat,
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    // A subscriber may already be installed when commands run under test.
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

/// Load a scenario and build the engine that will replay it.
fn load_scenario(
    scenario: &Path,
    engine_config: Option<&Path>,
) -> Result<(ScenarioFile, AssignmentEngine)> {
    let scenario = ScenarioFile::load(scenario)?;
    let base = engine_config.map(load_engine_config).transpose()?;
    let engine = AssignmentEngine::new(scenario.engine_config(base))
        .context("failed to build assignment engine")?;
    Ok((scenario, engine))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_simulate_with_global_flags() {
        let cli = Cli::try_parse_from([
            "weavectl",
            "simulate",
            "colony.toml",
            "--cycles",
            "5",
            "--format",
            "json",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.format, "json");
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Simulate(cmd) => assert_eq!(cmd.cycles, 5),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_score_requires_scenario() {
        assert!(Cli::try_parse_from(["weavectl", "score"]).is_err());
    }
}
