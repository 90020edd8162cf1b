//! Reference simulator and synfire orchestration
//!
//! A small fixed-step simulator for current-based integrate-and-fire cells
//! behind an explicit [`Simulator`] context, plus the [`SynfireRunner`] that
//! drives it through multi-run integration scenarios. Recordings come back
//! as [`spyn_record::Block`]s.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub use spyn_record::{Block, NeuronId, RecordError, SignalKind};

pub mod error;
pub mod network;
pub mod neuron;
pub mod retry;
pub mod simulation;
pub mod source;
pub mod synfire;

pub use error::{Result, RuntimeError, TransientFailure};
pub use network::{Connector, PopulationId, ProjectionId, SynapseSpec};
pub use neuron::{CellParams, NeuronParameter, Receptor};
pub use retry::{skip_on_transient, Outcome, RetryPolicy};
pub use simulation::{SetupParams, Simulator, SimulatorState};
pub use source::SpikeSource;
pub use synfire::{run_synfire, InputSource, ParameterChange, Recording, SynfireConfig, SynfireRunner};

/// Default simulation timestep (ms)
pub const DEFAULT_TIMESTEP_MS: f64 = 1.0;

/// Seed used when neither the caller nor the environment provides one
pub const DEFAULT_SEED: u64 = 42;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_integration() {
        let params = CellParams::default();
        assert!(params.tau_m > 0.0);

        let config = SynfireConfig::default();
        assert_eq!(config.n_neurons, 200);
        assert_eq!(config.timestep_ms, DEFAULT_TIMESTEP_MS);
    }
}
