//! CLI argument parsing definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate load against the decision service and verdict the run
    Run {
        /// Override the base URL of the service under test
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,

        /// Write the metrics summary as JSON to this file
        #[arg(long, value_name = "PATH")]
        summary_export: Option<PathBuf>,

        /// Seed the random source for reproducible target and payload selection
        #[arg(long, value_name = "N")]
        seed: Option<u64>,
    },

    /// Validate the configuration and thresholds without generating load
    Validate,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        config_cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print a sample configuration file
    Sample,
}
