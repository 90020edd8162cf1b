//! Spike order checks over recorded files

use clap::Args;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use tracing::info;

use spyn_record::block_file::{is_block_file, read_block};
use spyn_record::convert::convert_spikes;
use spyn_record::legacy::read_spikes;
use spyn_record::SpikeChecker;

use crate::error::{CliError, CliResult};

/// Check that recorded spikes travel the ring in order
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Legacy spike dump or block file
    pub file: PathBuf,

    /// Number of neurons in the ring
    #[arg(short, long)]
    pub neurons: usize,

    /// Number of interleaved wavefronts
    #[arg(short, long, default_value = "1")]
    pub lines: usize,

    /// The ring does not wrap around
    #[arg(long)]
    pub no_wrap: bool,

    /// Segment to check when reading a block file
    #[arg(short, long, default_value = "0")]
    pub run: usize,

    /// Write the time-sorted spikes here if the check fails
    #[arg(long)]
    pub dump: Option<PathBuf>,
}

/// Flattened `(id, time)` spikes from a block file or a legacy dump
pub fn load_spikes(path: &Path, run: usize) -> CliResult<Array2<f64>> {
    if !path.exists() {
        return Err(CliError::missing_resource(path.display().to_string()));
    }
    if is_block_file(path)? {
        let block = read_block(path)?;
        Ok(convert_spikes(&block, run)?)
    } else {
        Ok(read_spikes(path)?)
    }
}

impl CheckCommand {
    pub fn execute(self) -> CliResult<()> {
        if self.neurons == 0 || self.lines == 0 {
            return Err(CliError::invalid_args("--neurons and --lines must be at least 1"));
        }
        let spikes = load_spikes(&self.file, self.run)?;
        info!("Checking {} spikes from {}", spikes.nrows(), self.file.display());

        let mut checker = SpikeChecker::new();
        if let Some(path) = &self.dump {
            checker = checker.with_dump(path);
        }
        if self.lines == 1 && !self.no_wrap {
            checker.check_single_line(&spikes, self.neurons)?;
        } else {
            checker.check_multiple_lines(&spikes, self.neurons, self.lines, !self.no_wrap)?;
        }

        println!(
            "ok: {} spikes in order over {} neurons ({} line(s))",
            spikes.nrows(),
            self.neurons,
            self.lines
        );
        Ok(())
    }
}
