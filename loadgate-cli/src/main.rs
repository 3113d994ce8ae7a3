use anyhow::{Context, Result};
use clap::Parser;
use loadgate_config::{ConfigLoader, LoadgateConfig};
use loadgate_engine::{prepare_thresholds, LoadRunner, ShutdownSignal};
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

mod cli;
mod summary;

use cli::{Cli, Commands, ConfigCommands};

/// Exit code of a completed run whose thresholds failed
const THRESHOLDS_FAILED_EXIT_CODE: i32 = 99;

fn load_config(config_path: Option<&PathBuf>) -> Result<LoadgateConfig> {
    ConfigLoader::new()
        .load(config_path)
        .with_context(|| match config_path {
            Some(path) => format!("Failed to load configuration from {:?}", path),
            None => "Failed to load configuration from environment".to_string(),
        })
}

/// Forward Ctrl-C as a graceful shutdown, a second Ctrl-C as forced
fn spawn_interrupt_handler() -> broadcast::Receiver<ShutdownSignal> {
    let (tx, rx) = broadcast::channel(4);

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_err() {
            warn!("Failed to install Ctrl+C handler");
            return;
        }
        warn!("Interrupted, draining in-flight iterations (Ctrl+C again to abort)");
        let _ = tx.send(ShutdownSignal::Graceful);

        if signal::ctrl_c().await.is_ok() {
            let _ = tx.send(ShutdownSignal::Forced);
        }
    });

    rx
}

async fn run(
    mut config: LoadgateConfig,
    base_url: Option<&String>,
    summary_export: Option<&Path>,
    seed: Option<u64>,
) -> Result<bool> {
    if let Some(url) = base_url {
        config.target.base_url = url.clone();
    }
    if seed.is_some() {
        config.run.seed = seed;
    }

    info!("Load target: {}", config.target.base_url);
    let runner = LoadRunner::new(config).context("Failed to create load runner")?;
    let report = runner
        .run(Some(spawn_interrupt_handler()))
        .await
        .context("Load run aborted")?;

    println!("{}", summary::render(&report));

    if let Some(path) = summary_export {
        let json = report
            .summary_export_pretty()
            .context("Failed to serialize summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write summary to {:?}", path))?;
        info!("Summary exported to {:?}", path);
    }

    Ok(report.passed())
}

fn validate(config: &LoadgateConfig) -> Result<()> {
    config
        .validate_all()
        .context("Configuration validation failed")?;
    let thresholds = prepare_thresholds(config).context("Threshold validation failed")?;

    println!("Configuration is valid");
    println!("  Target:     {}", config.target.base_url);
    println!(
        "  Timeline:   {} stages, {:?}",
        config.run.stages.len(),
        config.run.total_duration()
    );
    println!("  Thresholds: {}", thresholds.len());
    for threshold in &thresholds {
        println!("    {}", threshold);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first
    let config = load_config(cli.config.as_ref())?;

    loadgate_logging::init_logging(&config.logging, cli.log_level.as_deref())?;

    match &cli.command {
        Commands::Run {
            base_url,
            summary_export,
            seed,
        } => {
            info!("Loadgate starting");
            let passed = run(config, base_url.as_ref(), summary_export.as_deref(), *seed).await?;
            if !passed {
                std::process::exit(THRESHOLDS_FAILED_EXIT_CODE);
            }
        }
        Commands::Validate => validate(&config)?,
        Commands::Config { config_cmd } => match config_cmd {
            ConfigCommands::Sample => print!("{}", LoadgateConfig::generate_sample()),
        },
    }

    Ok(())
}
