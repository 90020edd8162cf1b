//! Synfire chain orchestrator
//!
//! Builds a ring of integrate-and-fire cells driven by one spike source,
//! runs it one or more times and collects whatever was asked for. Every
//! option is a named field of [`SynfireConfig`], checked by
//! [`SynfireConfig::validate`] before anything is simulated.
//!
//! With the default configuration (200 cells, 17 ms ring delay, weight 2 nA,
//! one input spike at 0 ms) a wavefront takes 19 ms per hop, so a 1000 ms run
//! records 53 spikes and a 5000 ms run wraps around the ring for 263.

use crate::{
    error::*,
    network::{Connector, PopulationId, ProjectionId, SynapseSpec},
    neuron::{CellParams, NeuronParameter},
    simulation::{SetupParams, Simulator},
    source::SpikeSource,
    DEFAULT_SEED,
};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use spyn_record::{
    convert::{convert_data, convert_gsyn, convert_spikes},
    legacy, Block, RecordError, SignalKind,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Label of the ring population
pub const RING_LABEL: &str = "synfire";

/// Label of the population added before the second run
pub const SECOND_RING_LABEL: &str = "synfire_2";

/// Label of the input source
pub const INPUT_LABEL: &str = "input";

/// What to do with one recordable signal
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recording {
    /// Not recorded
    #[default]
    Off,
    /// Recorded into the output block only
    Record,
    /// Recorded and flattened after each extraction
    Extract,
    /// Extracted and also written as a legacy text dump
    Dump {
        /// Dump file; a run index is appended when there are several extractions
        path: PathBuf,
    },
}

impl Recording {
    /// True unless `Off`
    pub fn is_recorded(&self) -> bool {
        !matches!(self, Recording::Off)
    }

    /// True for `Extract` and `Dump`
    pub fn is_extracted(&self) -> bool {
        matches!(self, Recording::Extract | Recording::Dump { .. })
    }

    /// Dump path, if any
    pub fn dump_path(&self) -> Option<&Path> {
        match self {
            Recording::Dump { path } => Some(path),
            _ => None,
        }
    }
}

/// Spikes fed into the first cell of the ring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputSource {
    /// The same spike times for every run
    Array {
        /// Spike times (ms)
        spike_times: Vec<f64>,
    },
    /// One list of spike times per run
    ArrayPerRun {
        /// Spike times (ms), indexed by run
        spike_times_list: Vec<Vec<f64>>,
    },
    /// Poisson input
    Poisson {
        /// Rate (Hz)
        rate: f64,
        /// Start (ms)
        start: f64,
        /// Duration (ms)
        duration: Option<f64>,
        /// Seed of the generator
        seed: Option<u64>,
    },
}

impl Default for InputSource {
    fn default() -> Self {
        InputSource::Array {
            spike_times: vec![0.0],
        }
    }
}

impl InputSource {
    fn for_run(&self, run: usize) -> SpikeSource {
        match self {
            InputSource::Array { spike_times } => SpikeSource::Array {
                times: spike_times.clone(),
            },
            InputSource::ArrayPerRun { spike_times_list } => SpikeSource::Array {
                times: spike_times_list.get(run).cloned().unwrap_or_default(),
            },
            InputSource::Poisson {
                rate,
                start,
                duration,
                ..
            } => SpikeSource::Poisson {
                rate_hz: *rate,
                start: *start,
                duration: *duration,
            },
        }
    }
}

/// A cell parameter change applied before a given run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterChange {
    /// Run before which the change applies; must be at least 1
    pub run: usize,
    /// Parameter to change
    pub parameter: NeuronParameter,
    /// New value
    pub value: f64,
}

/// Everything a synfire run can be asked to do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynfireConfig {
    /// Cells in the ring
    pub n_neurons: usize,
    /// Simulation timestep (ms)
    pub timestep_ms: f64,
    /// Cell parameters
    pub cell: CellParams,
    /// Input spikes
    pub input: InputSource,
    /// Weight of ring and input synapses (nA)
    pub weight_to_spike: f64,
    /// Ring delay (ms)
    pub delay: f64,
    /// Input delay (ms)
    pub input_delay: f64,
    /// Duration of each run (ms)
    pub run_times: Vec<f64>,
    /// Reset between runs
    pub reset: bool,
    /// Extract after every run rather than once at the end
    pub extract_between_runs: bool,
    /// Parameter changes applied between runs
    pub set_between_runs: Vec<ParameterChange>,
    /// Add a second ring before the second run
    pub new_pop: bool,
    /// Connect the ring
    pub use_spike_connections: bool,
    /// Close the ring from the last cell to the first
    pub use_wrap_around_connections: bool,
    /// Start cells at random potentials between reset and threshold
    pub randomise_v_init: bool,
    /// Seed for random initial potentials and sources
    pub seed: Option<u64>,
    /// Collect ring weights at every extraction
    pub get_weights: bool,
    /// Collect ring delays at every extraction
    pub get_delays: bool,
    /// Record and extract the input spikes
    pub record_input_spikes: bool,
    /// Ring spikes
    pub spikes: Recording,
    /// Ring membrane potential
    pub v: Recording,
    /// Ring excitatory input
    pub gsyn_exc: Recording,
    /// Ring inhibitory input
    pub gsyn_inh: Recording,
    /// Steps between analog samples
    pub v_sampling_interval: Option<u64>,
    /// Wall-clock budget of each run (ms)
    pub run_timeout_ms: Option<u64>,
}

impl Default for SynfireConfig {
    fn default() -> Self {
        Self {
            n_neurons: 200,
            timestep_ms: 1.0,
            cell: CellParams::default(),
            input: InputSource::default(),
            weight_to_spike: 2.0,
            delay: 17.0,
            input_delay: 1.0,
            run_times: vec![1000.0],
            reset: false,
            extract_between_runs: true,
            set_between_runs: Vec::new(),
            new_pop: false,
            use_spike_connections: true,
            use_wrap_around_connections: true,
            randomise_v_init: false,
            seed: None,
            get_weights: false,
            get_delays: false,
            record_input_spikes: false,
            spikes: Recording::Extract,
            v: Recording::Off,
            gsyn_exc: Recording::Off,
            gsyn_inh: Recording::Off,
            v_sampling_interval: None,
            run_timeout_ms: None,
        }
    }
}

impl SynfireConfig {
    /// Default configuration with the given run durations
    pub fn with_run_times(run_times: Vec<f64>) -> Self {
        Self {
            run_times,
            ..Default::default()
        }
    }

    /// Number of runs
    pub fn runs(&self) -> usize {
        self.run_times.len()
    }

    /// Reject combinations of options this runner does not support
    pub fn validate(&self) -> Result<()> {
        let runs = self.runs();
        if runs == 0 {
            return Err(RuntimeError::not_implemented("at least one run time is needed"));
        }
        if self.n_neurons == 0 {
            return Err(RuntimeError::not_implemented("a ring needs at least one neuron"));
        }
        if let Some(t) = self.run_times.iter().find(|t| !(**t >= 0.0) || !t.is_finite()) {
            return Err(RuntimeError::invalid_parameter("run_times", t.to_string(), ">= 0.0"));
        }
        if runs == 1 && self.reset {
            return Err(RuntimeError::not_implemented("reset needs more than one run"));
        }
        if self.new_pop {
            if runs == 1 {
                return Err(RuntimeError::not_implemented("new_pop needs more than one run"));
            }
            if !self.reset {
                return Err(RuntimeError::not_implemented("new_pop needs reset between runs"));
            }
        }
        if let InputSource::ArrayPerRun { spike_times_list } = &self.input {
            if spike_times_list.len() != runs {
                return Err(RuntimeError::not_implemented(format!(
                    "{} spike time lists for {} runs",
                    spike_times_list.len(),
                    runs
                )));
            }
        }
        if let Some(change) = self.set_between_runs.iter().find(|c| c.run == 0 || c.run >= runs) {
            return Err(RuntimeError::not_implemented(format!(
                "cannot change {} before run {} of {}",
                change.parameter, change.run, runs
            )));
        }
        if self.v_sampling_interval.is_some() && !self.v.is_recorded() {
            return Err(RuntimeError::not_implemented("v_sampling_interval without recording v"));
        }
        if self.v_sampling_interval == Some(0) {
            return Err(RuntimeError::invalid_parameter("v_sampling_interval", "0", "> 0"));
        }
        let gsyn_dumped = self.gsyn_exc.dump_path().is_some() || self.gsyn_inh.dump_path().is_some();
        if gsyn_dumped && !(self.gsyn_exc.is_extracted() && self.gsyn_inh.is_extracted()) {
            return Err(RuntimeError::not_implemented(
                "a gsyn dump needs both gsyn_exc and gsyn_inh extracted",
            ));
        }
        if (self.get_weights || self.get_delays) && !self.use_spike_connections {
            return Err(RuntimeError::not_implemented(
                "weights and delays need the ring connections",
            ));
        }
        Ok(())
    }

    fn ring_signals(&self) -> Vec<SignalKind> {
        [
            (SignalKind::Spikes, &self.spikes),
            (SignalKind::V, &self.v),
            (SignalKind::GsynExc, &self.gsyn_exc),
            (SignalKind::GsynInh, &self.gsyn_inh),
        ]
        .into_iter()
        .filter(|(_, recording)| recording.is_recorded())
        .map(|(kind, _)| kind)
        .collect()
    }

    fn simulator_seed(&self) -> Option<u64> {
        match &self.input {
            InputSource::Poisson { seed: Some(seed), .. } => Some(*seed),
            _ => self.seed,
        }
    }

    /// Number of extractions `do_run` will make
    fn extractions(&self) -> usize {
        if self.extract_between_runs || self.reset {
            self.runs()
        } else {
            1
        }
    }
}

/// Handles of one ring inside the simulator
#[derive(Debug, Clone, Copy)]
struct Ring {
    cells: PopulationId,
    ring: Option<ProjectionId>,
}

/// Runs a [`SynfireConfig`] and holds what it collected
#[derive(Debug, Default)]
pub struct SynfireRunner {
    spikes: Vec<Array2<f64>>,
    v: Vec<Array2<f64>>,
    gsyn_exc: Vec<Array2<f64>>,
    gsyn_inh: Vec<Array2<f64>>,
    input_spikes: Vec<Array2<f64>>,
    weights: Vec<Vec<(u32, u32, f64)>>,
    delays: Vec<Vec<(u32, u32, f64)>>,
    output_block: Option<Block>,
    input_block: Option<Block>,
    second_block: Option<Block>,
    runs_extracted: usize,
}

impl SynfireRunner {
    /// Create a runner with nothing collected
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `config`, build the network and execute every run
    ///
    /// Anything collected by a previous call is discarded.
    pub fn do_run(&mut self, config: &SynfireConfig) -> Result<()> {
        config.validate()?;
        *self = Self::default();

        let mut setup = SetupParams::new(config.timestep_ms);
        setup.seed = config.simulator_seed();
        setup.wall_clock_timeout = config.run_timeout_ms.map(Duration::from_millis);
        let mut sim = Simulator::setup(setup)?;

        let input = sim.create_source(INPUT_LABEL, 1, config.input.for_run(0))?;
        let ring = build_ring(&mut sim, config, RING_LABEL, input)?;
        let signals = config.ring_signals();
        let interval = config.v_sampling_interval.unwrap_or(1);
        if !signals.is_empty() {
            sim.record(ring.cells, &signals, interval)?;
        }
        if config.record_input_spikes {
            sim.record(input, &[SignalKind::Spikes], 1)?;
        }

        let mut second = None;
        let runs = config.runs();
        for (run, &duration) in config.run_times.iter().enumerate() {
            if run > 0 {
                if config.reset {
                    sim.reset()?;
                }
                if config.new_pop && run == 1 {
                    let added = build_ring(&mut sim, config, SECOND_RING_LABEL, input)?;
                    sim.record(added.cells, &[SignalKind::Spikes], 1)?;
                    second = Some(added);
                }
                for change in config.set_between_runs.iter().filter(|c| c.run == run) {
                    sim.set_parameter(ring.cells, change.parameter, change.value)?;
                }
                if matches!(config.input, InputSource::ArrayPerRun { .. }) {
                    sim.set_source(input, config.input.for_run(run))?;
                }
            }

            log::info!("Synfire run {} of {}: {}ms", run + 1, runs, duration);
            sim.run(duration)?;

            if config.extract_between_runs {
                self.extract(&sim, config, ring, input, true)?;
            }
        }
        if !config.extract_between_runs {
            self.extract(&sim, config, ring, input, false)?;
        }

        if !signals.is_empty() {
            self.output_block = Some(sim.get_data(ring.cells)?);
        }
        if config.record_input_spikes {
            self.input_block = Some(sim.get_data(input)?);
        }
        if let Some(second) = second {
            self.second_block = Some(sim.get_data(second.cells)?);
        }
        sim.end()?;

        log::info!(
            "Synfire finished: {} extraction(s), {} spikes in the last",
            self.runs_extracted,
            self.spikes.last().map_or(0, |s| s.nrows())
        );
        Ok(())
    }

    fn extract(
        &mut self,
        sim: &Simulator,
        config: &SynfireConfig,
        ring: Ring,
        input: PopulationId,
        latest_only: bool,
    ) -> Result<()> {
        let extracted = [&config.spikes, &config.v, &config.gsyn_exc, &config.gsyn_inh]
            .iter()
            .any(|r| r.is_extracted());
        let block = if extracted { Some(sim.get_data(ring.cells)?) } else { None };
        let input_block = if config.record_input_spikes {
            Some(sim.get_data(input)?)
        } else {
            None
        };

        let segments = block
            .as_ref()
            .or(input_block.as_ref())
            .map_or(1, |b| b.segments.len().max(1));
        let range = if latest_only { segments - 1..segments } else { 0..segments };

        for segment in range {
            let index = self.runs_extracted;
            if let Some(block) = &block {
                self.extract_ring(block, config, segment, index)?;
            }
            if let Some(input_block) = &input_block {
                self.input_spikes.push(convert_spikes(input_block, segment)?);
            }
            if let Some(projection) = ring.ring {
                if config.get_weights {
                    self.weights.push(sim.get_weights(projection)?);
                }
                if config.get_delays {
                    self.delays.push(sim.get_delays(projection)?);
                }
            }
            self.runs_extracted += 1;
        }
        Ok(())
    }

    fn extract_ring(&mut self, block: &Block, config: &SynfireConfig, segment: usize, index: usize) -> Result<()> {
        let total = config.extractions();
        let n = config.n_neurons;
        let dt = config.timestep_ms;

        if config.spikes.is_extracted() {
            let spikes = convert_spikes(block, segment)?;
            if let Some(path) = config.spikes.dump_path() {
                legacy::write_spikes(numbered(path, index, total), &spikes, n, dt)?;
            }
            self.spikes.push(spikes);
        }
        if config.v.is_extracted() {
            let v = convert_data(block, SignalKind::V, segment)?;
            if let Some(path) = config.v.dump_path() {
                legacy::write_v(numbered(path, index, total), &v, n, dt)?;
            }
            self.v.push(v);
        }
        if config.gsyn_exc.is_extracted() {
            self.gsyn_exc.push(convert_data(block, SignalKind::GsynExc, segment)?);
        }
        if config.gsyn_inh.is_extracted() {
            self.gsyn_inh.push(convert_data(block, SignalKind::GsynInh, segment)?);
        }

        let mut gsyn_paths: Vec<&Path> = [config.gsyn_exc.dump_path(), config.gsyn_inh.dump_path()]
            .into_iter()
            .flatten()
            .collect();
        gsyn_paths.dedup();
        if let (Some(exc), Some(inh)) = (self.gsyn_exc.last(), self.gsyn_inh.last()) {
            if !gsyn_paths.is_empty() {
                let merged = convert_gsyn(exc, inh)?;
                for path in gsyn_paths {
                    legacy::write_gsyn(numbered(path, index, total), &merged, n, dt)?;
                }
            }
        }
        Ok(())
    }

    /// Flattened `(id, time)` ring spikes of an extraction
    pub fn spikes(&self, run: usize) -> Result<&Array2<f64>> {
        pick(&self.spikes, run, "spikes")
    }

    /// Flattened `(id, time, v)` rows of an extraction
    pub fn v(&self, run: usize) -> Result<&Array2<f64>> {
        pick(&self.v, run, "v")
    }

    /// Flattened `(id, time, gsyn_exc)` rows of an extraction
    pub fn gsyn_exc(&self, run: usize) -> Result<&Array2<f64>> {
        pick(&self.gsyn_exc, run, "gsyn_exc")
    }

    /// Flattened `(id, time, gsyn_inh)` rows of an extraction
    pub fn gsyn_inh(&self, run: usize) -> Result<&Array2<f64>> {
        pick(&self.gsyn_inh, run, "gsyn_inh")
    }

    /// Flattened `(id, time)` input spikes of an extraction
    pub fn input_spikes(&self, run: usize) -> Result<&Array2<f64>> {
        pick(&self.input_spikes, run, "input spikes")
    }

    /// Ring weights of an extraction
    pub fn weights(&self, run: usize) -> Result<&[(u32, u32, f64)]> {
        pick(&self.weights, run, "weights").map(Vec::as_slice)
    }

    /// Ring delays of an extraction
    pub fn delays(&self, run: usize) -> Result<&[(u32, u32, f64)]> {
        pick(&self.delays, run, "delays").map(Vec::as_slice)
    }

    /// Everything recorded from the ring
    pub fn output_block(&self) -> Option<&Block> {
        self.output_block.as_ref()
    }

    /// Everything recorded from the input
    pub fn input_block(&self) -> Option<&Block> {
        self.input_block.as_ref()
    }

    /// Spikes of the ring added for `new_pop`
    pub fn second_block(&self) -> Option<&Block> {
        self.second_block.as_ref()
    }

    /// Number of extractions made
    pub fn runs_extracted(&self) -> usize {
        self.runs_extracted
    }
}

/// Run `config` and return the runner holding its results
pub fn run_synfire(config: &SynfireConfig) -> Result<SynfireRunner> {
    let mut runner = SynfireRunner::new();
    runner.do_run(config)?;
    Ok(runner)
}

fn build_ring(sim: &mut Simulator, config: &SynfireConfig, label: &str, input: PopulationId) -> Result<Ring> {
    let cells = sim.create_population(label, config.n_neurons, config.cell.clone())?;
    if config.randomise_v_init {
        let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or(DEFAULT_SEED));
        let initial = (0..config.n_neurons)
            .map(|_| rng.gen_range(config.cell.v_reset..config.cell.v_thresh))
            .collect();
        sim.set_initial_v(cells, initial)?;
    }
    sim.connect(
        input,
        cells,
        Connector::FromList { pairs: vec![(0, 0)] },
        SynapseSpec::excitatory(config.weight_to_spike, config.input_delay),
    )?;
    let ring = if config.use_spike_connections {
        Some(sim.connect(
            cells,
            cells,
            Connector::Ring {
                wrap_around: config.use_wrap_around_connections,
            },
            SynapseSpec::excitatory(config.weight_to_spike, config.delay),
        )?)
    } else {
        None
    };
    Ok(Ring { cells, ring })
}

fn pick<'a, T>(list: &'a [T], run: usize, what: &str) -> Result<&'a T> {
    if list.is_empty() {
        return Err(RuntimeError::invalid_state(format!("{} were not extracted", what)));
    }
    list.get(run).ok_or_else(|| {
        RecordError::RunOutOfRange {
            run,
            available: list.len(),
        }
        .into()
    })
}

/// `path` itself for a single extraction, else `stem_index.ext`
fn numbered(path: &Path, index: usize, total: usize) -> PathBuf {
    if total <= 1 {
        return path.to_path_buf();
    }
    let stem = path.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}_{}", stem, index),
    };
    path.with_file_name(name)
}
