//! Block to legacy dump conversion

use clap::Args;
use std::path::PathBuf;
use tracing::info;

use spyn_record::block_file::read_block;
use spyn_record::convert::{convert_data, convert_gsyn};
use spyn_record::{legacy, Block, SignalKind};

use crate::error::{CliError, CliResult};

/// Write one signal of one run as a legacy text dump
#[derive(Args, Debug)]
pub struct ConvertCommand {
    /// Block file to read
    pub block: PathBuf,

    /// Signal to write: spikes, v, gsyn_exc or gsyn_inh (gsyn writes both currents)
    #[arg(short, long, default_value = "spikes")]
    pub signal: SignalKind,

    /// Segment to convert
    #[arg(short, long, default_value = "0")]
    pub run: usize,

    /// Output file
    #[arg(short, long)]
    pub out: PathBuf,
}

/// Neurons and timestep recorded in a block
fn block_shape(block: &Block, run: usize) -> CliResult<(usize, f64)> {
    let segment = block.segment(run)?;
    let n_neurons = segment
        .analogsignals
        .first()
        .map(|s| s.channels().len())
        .unwrap_or(segment.spiketrains.len());
    let dt = block
        .annotations
        .get("timestep_ms")
        .and_then(|dt| dt.parse().ok())
        .or_else(|| segment.analogsignals.first().map(|s| s.sampling_period()))
        .unwrap_or(1.0);
    Ok((n_neurons, dt))
}

impl ConvertCommand {
    pub fn execute(self) -> CliResult<()> {
        if !self.block.exists() {
            return Err(CliError::missing_resource(self.block.display().to_string()));
        }
        let block = read_block(&self.block)?;
        let (n_neurons, dt) = block_shape(&block, self.run)?;

        let rows = match self.signal {
            SignalKind::Spikes => {
                let spikes = convert_data(&block, SignalKind::Spikes, self.run)?;
                legacy::write_spikes(&self.out, &spikes, n_neurons, dt)?;
                spikes.nrows()
            }
            SignalKind::V => {
                let v = convert_data(&block, SignalKind::V, self.run)?;
                legacy::write_v(&self.out, &v, n_neurons, dt)?;
                v.nrows()
            }
            SignalKind::GsynExc | SignalKind::GsynInh => {
                let exc = convert_data(&block, SignalKind::GsynExc, self.run)?;
                let inh = convert_data(&block, SignalKind::GsynInh, self.run)?;
                let gsyn = convert_gsyn(&exc, &inh)?;
                legacy::write_gsyn(&self.out, &gsyn, n_neurons, dt)?;
                gsyn.nrows()
            }
            SignalKind::All => {
                return Err(CliError::invalid_args(
                    "convert writes one signal at a time; pick spikes, v, gsyn_exc or gsyn_inh",
                ))
            }
        };

        info!(
            "Wrote {} {} rows of run {} to {}",
            rows,
            self.signal,
            self.run,
            self.out.display()
        );
        Ok(())
    }
}
