//! Recording comparison

use clap::Args;
use std::path::PathBuf;
use tracing::info;

use spyn_record::block_file::read_block;
use spyn_record::compare::compare_blocks;
use spyn_record::ComparePolicy;

use crate::error::{CliError, CliResult};

/// Compare two block files
#[derive(Args, Debug)]
pub struct CompareCommand {
    /// Reference block
    pub left: PathBuf,

    /// Block to compare against the reference
    pub right: PathBuf,

    /// Allow spike trains to differ in length while their common prefix matches
    #[arg(long)]
    pub allow_partial: bool,

    /// Allow signals missing from one side
    #[arg(long)]
    pub allow_missing_data: bool,

    /// Allow blocks with different numbers of runs
    #[arg(long)]
    pub allow_fewer_runs: bool,
}

impl CompareCommand {
    fn policy(&self) -> ComparePolicy {
        let mut policy = ComparePolicy::default();
        if self.allow_partial {
            policy = policy.allow_partial();
        }
        if self.allow_missing_data {
            policy = policy.allow_missing_data();
        }
        if self.allow_fewer_runs {
            policy = policy.allow_fewer_runs();
        }
        policy
    }

    pub fn execute(self) -> CliResult<()> {
        for path in [&self.left, &self.right] {
            if !path.exists() {
                return Err(CliError::missing_resource(path.display().to_string()));
            }
        }
        let left = read_block(&self.left)?;
        let right = read_block(&self.right)?;
        info!(
            "Comparing {} ({} segments) with {} ({} segments)",
            self.left.display(),
            left.segments.len(),
            self.right.display(),
            right.segments.len()
        );

        compare_blocks(&left, &right, self.policy())?;
        println!("ok: recordings match");
        Ok(())
    }
}
