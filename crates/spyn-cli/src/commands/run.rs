//! Synfire scenario runner

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use spyn_record::block_file::write_block;
use spyn_runtime::{run_synfire, skip_on_transient, Outcome, SynfireConfig, SynfireRunner};

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Run a synfire scenario described in TOML
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Scenario file (.toml)
    pub scenario: PathBuf,

    /// Write the recorded ring block here
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Retry transient failures and report a skip if they persist
    #[arg(long)]
    pub retry: bool,

    /// Write a JSON summary here instead of printing it
    #[arg(long)]
    pub summary: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    scenario: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    spike_counts: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    block: Option<PathBuf>,
}

/// Load a scenario file
pub fn load_scenario(path: &Path) -> CliResult<SynfireConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::missing_resource(format!("{}: {}", path.display(), e)))?;
    toml::from_str(&text).map_err(|e| CliError::config(format!("Invalid scenario {}: {}", path.display(), e)))
}

impl RunCommand {
    pub fn execute(self, config: &CliConfig) -> CliResult<()> {
        let scenario = load_scenario(&self.scenario)?;
        info!(
            "Scenario {}: {} neurons, {} run(s)",
            self.scenario.display(),
            scenario.n_neurons,
            scenario.runs()
        );

        let outcome = if self.retry {
            let policy = config.retry_policy();
            info!("Retrying transient failures up to {} time(s)", policy.max_tries);
            skip_on_transient(policy.run_safe(&self.label(), || run_synfire(&scenario)))?
        } else {
            Outcome::Completed(run_synfire(&scenario)?)
        };

        let summary = match outcome {
            Outcome::Completed(runner) => self.completed(config, &scenario, &runner)?,
            Outcome::Skipped { reason } => {
                warn!("Scenario skipped: {}", reason);
                RunSummary {
                    scenario: self.label(),
                    status: "skipped",
                    reason: Some(reason),
                    spike_counts: Vec::new(),
                    block: None,
                }
            }
        };

        let json = serde_json::to_string_pretty(&summary)?;
        match &self.summary {
            Some(path) => {
                std::fs::write(path, json)
                    .with_context(|| format!("writing summary to {}", path.display()))?;
                info!("Summary written to {}", path.display());
            }
            None => println!("{}", json),
        }
        Ok(())
    }

    fn label(&self) -> String {
        self.scenario
            .file_stem()
            .map_or_else(|| "synfire".to_string(), |s| s.to_string_lossy().into_owned())
    }

    fn completed(&self, config: &CliConfig, scenario: &SynfireConfig, runner: &SynfireRunner) -> CliResult<RunSummary> {
        let spike_counts: Vec<usize> = (0..runner.runs_extracted())
            .filter_map(|run| runner.spikes(run).ok().map(|s| s.nrows()))
            .collect();
        for (run, count) in spike_counts.iter().enumerate() {
            info!("Run {}: {} spikes", run, count);
        }

        let target = self
            .out
            .clone()
            .or_else(|| config.output_dir.as_ref().map(|dir| dir.join(format!("{}.nblk", self.label()))));
        let block = match (target, runner.output_block()) {
            (Some(path), Some(block)) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating output directory {}", parent.display()))?;
                }
                write_block(&path, block)?;
                info!("Block written to {}", path.display());
                Some(path)
            }
            (Some(path), None) => {
                return Err(CliError::invalid_args(format!(
                    "scenario records nothing from its {} neurons, cannot write {}",
                    scenario.n_neurons,
                    path.display()
                )))
            }
            (None, _) => None,
        };

        Ok(RunSummary {
            scenario: self.label(),
            status: "completed",
            reason: None,
            spike_counts,
            block,
        })
    }
}
