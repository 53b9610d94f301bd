//! Command line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use husky_core::LogFormat;

use crate::config::Config;
use crate::error::ConfigError;

#[derive(Parser, Debug)]
#[command(version, about = "Provision, bulk-load and reconcile warehouse tables")]
pub struct CliArgs {
    /// Log output format (text or json)
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Provision the catalog, load every table and report row counts
    Load {
        /// Path to configuration file (embedded default when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload dataset files into the bucket
    Stage {
        /// Path to configuration file (embedded default when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Local dataset directory (overrides dataset.path)
        #[arg(long)]
        from: Option<PathBuf>,

        /// Keep objects already under the prefix
        #[arg(long)]
        keep_existing: bool,
    },

    /// Validate configuration and print the statements a load would issue
    Check {
        /// Path to configuration file (embedded default when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

impl Command {
    /// Load the configuration named by the command, or the embedded default.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let path = match self {
            Command::Load { config, .. }
            | Command::Stage { config, .. }
            | Command::Check { config } => config.as_ref(),
        };
        match path {
            Some(path) => Config::from_file(path),
            None => Config::embedded_default(),
        }
    }
}
