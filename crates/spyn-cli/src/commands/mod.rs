//! CLI command implementations for spyn

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CliConfig;
use crate::error::CliResult;

pub mod check;
pub mod compare;
pub mod convert;
pub mod run;

/// spyn - synfire integration harness for spiking simulations
#[derive(Parser, Debug)]
#[command(
    name = "spyn",
    version,
    about = "Synfire integration harness for spiking simulations",
    long_about = "Run synfire chain scenarios described in TOML, check recorded spikes \
                  for round-robin order, compare recordings and convert them to the \
                  legacy text dumps."
)]
pub struct SpynCli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a synfire scenario
    Run(run::RunCommand),

    /// Check spike order in a recording
    Check(check::CheckCommand),

    /// Compare two recorded blocks
    Compare(compare::CompareCommand),

    /// Convert a recorded block to a legacy text dump
    Convert(convert::ConvertCommand),
}

impl SpynCli {
    /// Log filter for this invocation
    pub fn log_level(&self, config: &CliConfig) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            config.log_level.clone().unwrap_or_else(|| "info".to_string())
        }
    }

    /// Execute the CLI command
    pub fn execute(self, config: &CliConfig) -> CliResult<()> {
        match self.command {
            Commands::Run(cmd) => cmd.execute(config),
            Commands::Check(cmd) => cmd.execute(),
            Commands::Compare(cmd) => cmd.execute(),
            Commands::Convert(cmd) => cmd.execute(),
        }
    }
}
