//! Simulator context: setup, run, reset and data extraction

use crate::{
    error::*,
    network::{Connector, Network, PopulationId, ProjectionId, SynapseSpec},
    neuron::{CellParams, NeuronParameter},
    retry::integration_seed,
    source::SpikeSource,
    DEFAULT_SEED, DEFAULT_TIMESTEP_MS,
};
use ndarray::Array2;
use spyn_record::{AnalogSignal, Block, NeuronId, Segment, SignalKind, SpikeTrain};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Parameters passed to [`Simulator::setup`]
#[derive(Debug, Clone)]
pub struct SetupParams {
    /// Timestep (ms)
    pub timestep_ms: f64,
    /// Seed for random sources; falls back to `P8_INTEGRATION_SEED`
    pub seed: Option<u64>,
    /// Abort a `run` that takes longer than this
    pub wall_clock_timeout: Option<Duration>,
}

impl Default for SetupParams {
    fn default() -> Self {
        Self {
            timestep_ms: DEFAULT_TIMESTEP_MS,
            seed: None,
            wall_clock_timeout: None,
        }
    }
}

impl SetupParams {
    /// Parameters with the given timestep
    pub fn new(timestep_ms: f64) -> Self {
        Self {
            timestep_ms,
            ..Default::default()
        }
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the wall-clock budget of each run
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.wall_clock_timeout = Some(timeout);
        self
    }
}

/// Lifecycle of a [`Simulator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    /// Built but never run
    Configuring,
    /// At least one run since setup or the last reset
    Ran,
    /// Reset since the last run
    Reset,
    /// Ended; no further calls allowed
    Ended,
}

/// Analog samples of one signal within one segment
#[derive(Debug, Clone)]
struct Trace {
    kind: SignalKind,
    first_step: u64,
    samples: usize,
    /// Row-major `samples x neurons`
    values: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
struct SegmentRecord {
    spikes: Vec<Vec<f64>>,
    traces: Vec<Trace>,
    t_stop: f64,
}

#[derive(Debug, Clone)]
struct Recorder {
    size: usize,
    spikes: bool,
    analog: Vec<SignalKind>,
    interval: u64,
    segments: Vec<SegmentRecord>,
}

impl Recorder {
    fn new(size: usize) -> Self {
        Self {
            size,
            spikes: false,
            analog: Vec::new(),
            interval: 1,
            segments: Vec::new(),
        }
    }

    fn has_samples(&self) -> bool {
        self.segments.iter().any(|s| s.traces.iter().any(|t| t.samples > 0))
    }

    fn segment_mut(&mut self, index: usize) -> &mut SegmentRecord {
        while self.segments.len() <= index {
            self.segments.push(SegmentRecord {
                spikes: vec![Vec::new(); self.size],
                ..Default::default()
            });
        }
        &mut self.segments[index]
    }
}

/// Explicit simulator context
///
/// Owns the network and every recording made from it. Time restarts at zero
/// after each [`reset`](Simulator::reset) and the following run is recorded
/// into a new segment.
#[derive(Debug)]
pub struct Simulator {
    network: Network,
    state: SimulatorState,
    step: u64,
    segment: usize,
    seed: u64,
    timeout: Option<Duration>,
    recorders: BTreeMap<PopulationId, Recorder>,
}

impl Simulator {
    /// Create a simulator
    pub fn setup(params: SetupParams) -> Result<Self> {
        let network = Network::new(params.timestep_ms)?;
        let seed = params
            .seed
            .or_else(|| integration_seed(|key| std::env::var(key).ok()))
            .unwrap_or(DEFAULT_SEED);
        log::debug!(
            "Simulator setup: timestep {}ms, seed {}",
            params.timestep_ms,
            seed
        );
        Ok(Self {
            network,
            state: SimulatorState::Configuring,
            step: 0,
            segment: 0,
            seed,
            timeout: params.wall_clock_timeout,
            recorders: BTreeMap::new(),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> SimulatorState {
        self.state
    }

    /// Timestep (ms)
    pub fn timestep_ms(&self) -> f64 {
        self.network.dt_ms()
    }

    /// Seed used for random sources
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Time reached since setup or the last reset (ms)
    pub fn current_time_ms(&self) -> f64 {
        self.step as f64 * self.network.dt_ms()
    }

    /// The simulated network
    pub fn network(&self) -> &Network {
        &self.network
    }

    fn ensure_active(&self, operation: &str) -> Result<()> {
        if self.state == SimulatorState::Ended {
            return Err(RuntimeError::invalid_state(format!(
                "{} called after end",
                operation
            )));
        }
        Ok(())
    }

    fn ensure_buildable(&self, operation: &str) -> Result<()> {
        self.ensure_active(operation)?;
        if self.state == SimulatorState::Ran {
            return Err(RuntimeError::invalid_state(format!(
                "{} after run requires a reset first",
                operation
            )));
        }
        Ok(())
    }

    /// Add a population of cells
    pub fn create_population(
        &mut self,
        label: impl Into<String>,
        size: usize,
        params: CellParams,
    ) -> Result<PopulationId> {
        self.ensure_buildable("create_population")?;
        self.network.add_cells(label, size, params)
    }

    /// Add a population of spike sources
    pub fn create_source(
        &mut self,
        label: impl Into<String>,
        size: usize,
        source: SpikeSource,
    ) -> Result<PopulationId> {
        self.ensure_buildable("create_source")?;
        let seed = self.source_seed(self.network.population_count());
        self.network.add_source(label, size, source, seed)
    }

    fn source_seed(&self, population: usize) -> u64 {
        self.seed.wrapping_add(population as u64)
    }

    /// Connect two populations
    pub fn connect(
        &mut self,
        pre: PopulationId,
        post: PopulationId,
        connector: Connector,
        synapse: SynapseSpec,
    ) -> Result<ProjectionId> {
        self.ensure_buildable("connect")?;
        self.network.connect(pre, post, &connector, synapse)
    }

    /// Record signals of a population, sampling analog signals every
    /// `sampling_interval` steps
    pub fn record(
        &mut self,
        population: PopulationId,
        signals: &[SignalKind],
        sampling_interval: u64,
    ) -> Result<()> {
        self.ensure_active("record")?;
        if sampling_interval == 0 {
            return Err(RuntimeError::invalid_parameter("sampling_interval", "0", "> 0"));
        }
        let pop = self.network.population(population)?;
        let is_source = pop.is_source();
        let size = pop.size;

        let mut spikes = false;
        let mut analog = Vec::new();
        for &signal in signals {
            match signal {
                SignalKind::Spikes => spikes = true,
                SignalKind::All => {
                    spikes = true;
                    if !is_source {
                        analog.extend(SignalKind::ANALOG);
                    }
                }
                kind if is_source => {
                    return Err(RuntimeError::invalid_config(format!(
                        "spike source {:?} cannot record {}",
                        pop.label, kind
                    )))
                }
                kind => analog.push(kind),
            }
        }

        let segment = self.segment;
        let recorder = self
            .recorders
            .entry(population)
            .or_insert_with(|| Recorder::new(size));
        if !analog.is_empty() && recorder.interval != sampling_interval && recorder.has_samples() {
            return Err(RuntimeError::invalid_state(
                "sampling interval cannot change once samples are recorded",
            ));
        }
        recorder.spikes |= spikes;
        if !analog.is_empty() {
            recorder.interval = sampling_interval;
        }
        for kind in analog {
            if !recorder.analog.contains(&kind) {
                recorder.analog.push(kind);
            }
        }
        recorder.segment_mut(segment);
        Ok(())
    }

    /// Advance the simulation by `duration_ms`
    pub fn run(&mut self, duration_ms: f64) -> Result<()> {
        self.ensure_active("run")?;
        if !(duration_ms >= 0.0) || !duration_ms.is_finite() {
            return Err(RuntimeError::invalid_parameter("duration", duration_ms.to_string(), ">= 0.0"));
        }
        let dt_ms = self.network.dt_ms();
        let steps = (duration_ms / dt_ms).round() as u64;
        log::info!(
            "Running {}ms ({} steps) from t={}ms, segment {}",
            duration_ms,
            steps,
            self.current_time_ms(),
            self.segment
        );
        self.state = SimulatorState::Ran;

        let started = Instant::now();
        let end = self.step + steps;
        let mut total_spikes = 0usize;
        while self.step < end {
            let step = self.step;
            let fired = self.network.step(step);
            total_spikes += fired.iter().map(|(_, n)| n.len()).sum::<usize>();
            self.record_step(step, &fired);
            self.step += 1;

            if let Some(budget) = self.timeout {
                let elapsed = started.elapsed();
                if elapsed > budget && self.step < end {
                    self.close_segment();
                    log::warn!("Run aborted at t={}ms after {:?}", self.current_time_ms(), elapsed);
                    return Err(TransientFailure::Timeout {
                        elapsed_ms: elapsed.as_millis() as u64,
                        budget_ms: budget.as_millis() as u64,
                    }
                    .into());
                }
            }

            if steps >= 10 && (step + steps - end) % (steps / 10) == 0 {
                log::debug!(
                    "Simulation progress: {:.1}%",
                    (step + steps - end) as f64 / steps as f64 * 100.0
                );
            }
        }
        self.close_segment();

        log::info!(
            "Run completed: {} spikes, t={}ms",
            total_spikes,
            self.current_time_ms()
        );
        Ok(())
    }

    fn record_step(&mut self, step: u64, fired: &[(PopulationId, Vec<usize>)]) {
        let time = step as f64 * self.network.dt_ms();
        let segment = self.segment;
        for (&population, recorder) in self.recorders.iter_mut() {
            recorder.segment_mut(segment);
            let record = &mut recorder.segments[segment];
            if recorder.spikes {
                if let Some((_, neurons)) = fired.iter().find(|(p, _)| *p == population) {
                    for &neuron in neurons {
                        record.spikes[neuron].push(time);
                    }
                }
            }

            if recorder.analog.is_empty() || step % recorder.interval != 0 {
                continue;
            }
            let Ok(pop) = self.network.population(population) else {
                continue;
            };
            for &kind in &recorder.analog {
                let trace = match record.traces.iter().position(|t| t.kind == kind) {
                    Some(index) => &mut record.traces[index],
                    None => {
                        record.traces.push(Trace {
                            kind,
                            first_step: step,
                            samples: 0,
                            values: Vec::new(),
                        });
                        let last = record.traces.len() - 1;
                        &mut record.traces[last]
                    }
                };
                trace.values.extend(pop.states().iter().map(|s| match kind {
                    SignalKind::GsynExc => s.i_exc,
                    SignalKind::GsynInh => s.i_inh,
                    _ => s.v,
                }));
                trace.samples += 1;
            }
        }
    }

    fn close_segment(&mut self) {
        let t_stop = self.current_time_ms();
        let segment = self.segment;
        for recorder in self.recorders.values_mut() {
            recorder.segment_mut(segment).t_stop = t_stop;
        }
    }

    /// Return to time zero; the next run records into a new segment
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_active("reset")?;
        if self.state == SimulatorState::Ran {
            self.segment += 1;
            self.state = SimulatorState::Reset;
        }
        self.network.reset();
        self.step = 0;
        log::debug!("Reset, next segment {}", self.segment);
        Ok(())
    }

    /// Change a cell parameter of every neuron in a population
    pub fn set_parameter(&mut self, population: PopulationId, parameter: NeuronParameter, value: f64) -> Result<()> {
        self.ensure_active("set_parameter")?;
        log::debug!("Setting {}={} on population {}", parameter, value, population.0);
        self.network.set_parameter(population, parameter, value)
    }

    /// Replace the spikes emitted by a source population
    pub fn set_source(&mut self, population: PopulationId, source: SpikeSource) -> Result<()> {
        self.ensure_active("set_source")?;
        let seed = self.source_seed(population.0);
        self.network.set_source(population, source, seed)
    }

    /// Set the initial membrane potential of each neuron
    pub fn set_initial_v(&mut self, population: PopulationId, initial: Vec<f64>) -> Result<()> {
        self.ensure_active("set_initial_v")?;
        self.network.set_initial_v(population, initial)
    }

    /// Everything recorded from a population, one segment per run span
    pub fn get_data(&self, population: PopulationId) -> Result<Block> {
        self.ensure_active("get_data")?;
        let pop = self.network.population(population)?;
        let recorder = self.recorders.get(&population).ok_or_else(|| {
            RuntimeError::invalid_config(format!("population {:?} is not recorded", pop.label))
        })?;
        let dt_ms = self.network.dt_ms();

        let mut block = Block::new(pop.label.clone());
        block.annotate("timestep_ms", dt_ms.to_string());
        block.annotate("seed", self.seed.to_string());
        for (index, record) in recorder.segments.iter().enumerate() {
            let mut segment = Segment::new(index);
            if recorder.spikes {
                for (neuron, times) in record.spikes.iter().enumerate() {
                    segment.spiketrains.push(SpikeTrain::new(
                        NeuronId::new(neuron as u32),
                        times.clone(),
                        0.0,
                        record.t_stop,
                    )?);
                }
            }
            for trace in &record.traces {
                let data = Array2::from_shape_vec((trace.samples, recorder.size), trace.values.clone())
                    .map_err(|e| RuntimeError::invalid_config(e.to_string()))?;
                segment.analogsignals.push(AnalogSignal::new(
                    trace.kind.name(),
                    trace.kind.units(),
                    recorder.interval as f64 * dt_ms,
                    trace.first_step as f64 * dt_ms,
                    (0..recorder.size as u32).map(NeuronId::new).collect(),
                    data,
                )?);
            }
            block.segments.push(segment);
        }
        Ok(block)
    }

    /// `(pre, post, weight)` rows of a projection
    pub fn get_weights(&self, projection: ProjectionId) -> Result<Vec<(u32, u32, f64)>> {
        self.ensure_active("get_weights")?;
        Ok(self
            .network
            .projection(projection)?
            .synapses()
            .iter()
            .map(|s| (s.pre, s.post, s.weight))
            .collect())
    }

    /// `(pre, post, delay_ms)` rows of a projection
    pub fn get_delays(&self, projection: ProjectionId) -> Result<Vec<(u32, u32, f64)>> {
        self.ensure_active("get_delays")?;
        let dt_ms = self.network.dt_ms();
        Ok(self
            .network
            .projection(projection)?
            .synapses()
            .iter()
            .map(|s| (s.pre, s.post, s.delay_steps as f64 * dt_ms))
            .collect())
    }

    /// Finish the simulation
    pub fn end(&mut self) -> Result<()> {
        self.ensure_active("end")?;
        self.state = SimulatorState::Ended;
        log::debug!("Simulator ended at t={}ms", self.current_time_ms());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_cell() -> (Simulator, PopulationId) {
        let mut sim = Simulator::setup(SetupParams::new(1.0).with_seed(1)).unwrap();
        let input = sim
            .create_source("input", 1, SpikeSource::Array { times: vec![0.0] })
            .unwrap();
        let cell = sim.create_population("cell", 1, CellParams::default()).unwrap();
        sim.connect(input, cell, Connector::OneToOne, SynapseSpec::excitatory(2.0, 1.0))
            .unwrap();
        (sim, cell)
    }

    #[test]
    fn test_setup_defaults() {
        let sim = Simulator::setup(SetupParams::default().with_seed(5)).unwrap();
        assert_eq!(sim.state(), SimulatorState::Configuring);
        assert_eq!(sim.timestep_ms(), DEFAULT_TIMESTEP_MS);
        assert_eq!(sim.seed(), 5);
        assert!(Simulator::setup(SetupParams::new(0.0)).is_err());
    }

    #[test]
    fn test_single_spike_recorded() {
        let (mut sim, cell) = single_cell();
        sim.record(cell, &[SignalKind::Spikes], 1).unwrap();
        sim.run(10.0).unwrap();
        assert_eq!(sim.current_time_ms(), 10.0);

        let block = sim.get_data(cell).unwrap();
        assert_eq!(block.segments.len(), 1);
        assert_eq!(block.segments[0].spiketrains[0].times(), &[3.0]);
        assert_eq!(block.segments[0].spiketrains[0].t_stop(), 10.0);
    }

    #[test]
    fn test_runs_append_to_segment() {
        let (mut sim, cell) = single_cell();
        sim.record(cell, &[SignalKind::Spikes], 1).unwrap();
        sim.run(2.0).unwrap();
        sim.run(8.0).unwrap();
        let block = sim.get_data(cell).unwrap();
        assert_eq!(block.segments.len(), 1);
        assert_eq!(block.segments[0].spike_count(), 1);
    }

    #[test]
    fn test_reset_starts_new_segment() {
        let (mut sim, cell) = single_cell();
        sim.record(cell, &[SignalKind::Spikes, SignalKind::V], 1).unwrap();
        sim.run(10.0).unwrap();
        sim.reset().unwrap();
        assert_eq!(sim.state(), SimulatorState::Reset);
        assert_eq!(sim.current_time_ms(), 0.0);
        sim.run(5.0).unwrap();

        let block = sim.get_data(cell).unwrap();
        assert_eq!(block.segments.len(), 2);
        assert_eq!(block.segments[1].spiketrains[0].times(), &[3.0]);
        let v = block.segments[1].filter_signal("v").unwrap();
        assert_eq!(v.num_samples(), 5);
        assert_eq!(v.data()[[3, 0]], CellParams::default().v_reset);
    }

    #[test]
    fn test_sampling_interval() {
        let (mut sim, cell) = single_cell();
        sim.record(cell, &[SignalKind::GsynExc], 4).unwrap();
        sim.run(10.0).unwrap();
        let block = sim.get_data(cell).unwrap();
        let gsyn = block.segments[0].filter_signal("gsyn_exc").unwrap();
        assert_eq!(gsyn.num_samples(), 3);
        assert_eq!(gsyn.sampling_period(), 4.0);
        assert!(block.segments[0].spiketrains.is_empty());
    }

    #[test]
    fn test_lifecycle_errors() {
        let (mut sim, cell) = single_cell();
        sim.run(1.0).unwrap();
        assert!(matches!(
            sim.create_population("late", 1, CellParams::default()),
            Err(RuntimeError::InvalidState { .. })
        ));
        sim.reset().unwrap();
        assert!(sim.create_population("late", 1, CellParams::default()).is_ok());

        sim.end().unwrap();
        assert!(matches!(sim.run(1.0), Err(RuntimeError::InvalidState { .. })));
        assert!(matches!(sim.get_data(cell), Err(RuntimeError::InvalidState { .. })));
        assert!(matches!(sim.end(), Err(RuntimeError::InvalidState { .. })));
    }

    #[test]
    fn test_source_cannot_record_voltage() {
        let mut sim = Simulator::setup(SetupParams::default().with_seed(1)).unwrap();
        let input = sim
            .create_source("input", 2, SpikeSource::Array { times: vec![1.0] })
            .unwrap();
        assert!(sim.record(input, &[SignalKind::V], 1).is_err());
        assert!(sim.record(input, &[SignalKind::All], 1).is_ok());
        sim.run(3.0).unwrap();
        let block = sim.get_data(input).unwrap();
        assert_eq!(block.segments[0].spike_count(), 2);
        assert!(block.segments[0].analogsignals.is_empty());
    }

    #[test]
    fn test_weights_and_delays() {
        let mut sim = Simulator::setup(SetupParams::default().with_seed(1)).unwrap();
        let ring = sim.create_population("ring", 4, CellParams::default()).unwrap();
        let proj = sim
            .connect(ring, ring, Connector::Ring { wrap_around: true }, SynapseSpec::excitatory(2.0, 17.0))
            .unwrap();
        let weights = sim.get_weights(proj).unwrap();
        assert_eq!(weights.len(), 4);
        assert_eq!(weights[3], (3, 0, 2.0));
        assert!(sim.get_delays(proj).unwrap().iter().all(|&(_, _, d)| d == 17.0));
    }

    #[test]
    fn test_timeout_is_transient() {
        let mut sim = Simulator::setup(
            SetupParams::new(1.0).with_seed(1).with_timeout(Duration::from_nanos(1)),
        )
        .unwrap();
        sim.create_population("cells", 64, CellParams::default()).unwrap();
        let err = sim.run(100_000.0).unwrap_err();
        assert!(matches!(
            err.transient(),
            Some(TransientFailure::Timeout { .. })
        ));
    }
}
