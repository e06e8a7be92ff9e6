#![deny(unsafe_code)]

//! threadline CLI: run token propagation workloads and inspect configuration.

mod scenario;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use threadline_config::AppConfig;
use threadline_core::Agent;
use threadline_core::build_info::{self, BuildInfo};

use crate::scenario::Scenario;

/// threadline: carry tracing tokens across async task boundaries.
#[derive(Parser)]
#[command(name = "threadline", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "threadline.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workload under a traced transaction and report token counters.
    Run {
        /// Workload to run.
        #[arg(value_enum)]
        scenario: Scenario,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,

        /// Override `agent.token_timeout_secs` (0 = 250 ms).
        #[arg(long)]
        token_timeout_secs: Option<u64>,
    },

    /// List available workloads.
    Scenarios,

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },

    /// Print version and build information.
    Version {
        /// Print the build record as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, found) = load_config(&cli.config).await?;

    let filter = match cli.verbose {
        0 => config.logging.level.to_ascii_lowercase(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    if !found {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Run {
            scenario,
            json,
            token_timeout_secs,
        } => cmd_run(config, scenario, json, token_timeout_secs).await?,
        Commands::Scenarios => cmd_scenarios(),
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
        Commands::Version { json } => cmd_version(json)?,
    }

    Ok(())
}

async fn cmd_run(
    mut config: AppConfig,
    scenario: Scenario,
    json: bool,
    token_timeout_secs: Option<u64>,
) -> Result<()> {
    if let Some(secs) = token_timeout_secs {
        config.agent.token_timeout_secs = secs;
        config.validate()?;
    }

    let agent = Arc::new(Agent::new(config.agent));
    let report = scenario::run(agent, scenario).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

fn cmd_version(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&BuildInfo::current())?);
    } else {
        println!("threadline {}", build_info::version_string());
    }
    Ok(())
}

fn cmd_scenarios() {
    for scenario in Scenario::value_variants() {
        println!("{:<18} {}", scenario.name(), scenario.description());
    }
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist.
async fn load_config(path: &Path) -> Result<(AppConfig, bool)> {
    if tokio::fs::try_exists(path).await? {
        let config = AppConfig::load(path).await?;
        Ok((config, true))
    } else {
        Ok((AppConfig::default(), false))
    }
}
