//! Populations, projections and delayed spike delivery

use crate::{
    error::*,
    neuron::{step_neuron, CellParams, NeuronParameter, NeuronState, Propagators, Receptor},
    source::{SourceState, SpikeSource},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Minimum population size before neuron updates are spread over threads
#[cfg(feature = "parallel")]
const MIN_PARALLEL_NEURONS: usize = 1024;

/// Handle to a population inside a simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PopulationId(pub usize);

/// Handle to a projection inside a simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectionId(pub usize);

/// Which pre/post pairs a projection connects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Connector {
    /// `i -> i`; both sides must have the same size
    OneToOne,
    /// Every pre to every post
    AllToAll {
        /// Keep `i -> i` pairs when pre and post are the same population
        allow_self_connections: bool,
    },
    /// Explicit `(pre, post)` pairs
    FromList {
        /// Connected pairs
        pairs: Vec<(u32, u32)>,
    },
    /// `i -> i + 1` within a population, optionally closing `n - 1 -> 0`
    Ring {
        /// Close the ring
        wrap_around: bool,
    },
}

/// Weight, delay and target current shared by all synapses of a projection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynapseSpec {
    /// Synaptic weight (nA)
    pub weight: f64,
    /// Transmission delay (ms)
    pub delay_ms: f64,
    /// Target current
    pub receptor: Receptor,
}

impl SynapseSpec {
    /// Excitatory synapse
    pub fn excitatory(weight: f64, delay_ms: f64) -> Self {
        Self {
            weight,
            delay_ms,
            receptor: Receptor::Excitatory,
        }
    }

    /// Inhibitory synapse
    pub fn inhibitory(weight: f64, delay_ms: f64) -> Self {
        Self {
            weight,
            delay_ms,
            receptor: Receptor::Inhibitory,
        }
    }
}

/// One concrete synapse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Synapse {
    /// Pre-synaptic neuron index
    pub pre: u32,
    /// Post-synaptic neuron index
    pub post: u32,
    /// Synaptic weight (nA)
    pub weight: f64,
    /// Delay in whole timesteps
    pub delay_steps: u64,
}

/// Connections between two populations
#[derive(Debug, Clone)]
pub struct Projection {
    /// Source population
    pub pre: PopulationId,
    /// Target population
    pub post: PopulationId,
    /// Target current
    pub receptor: Receptor,
    synapses: Vec<Synapse>,
    /// Synapse indices grouped by pre-synaptic neuron
    by_pre: Vec<Vec<usize>>,
}

impl Projection {
    /// All synapses
    pub fn synapses(&self) -> &[Synapse] {
        &self.synapses
    }
}

/// What a population simulates
#[derive(Debug, Clone)]
pub(crate) enum PopulationKind {
    Cells {
        params: CellParams,
        prop: Propagators,
        states: Vec<NeuronState>,
        initial_v: Vec<f64>,
    },
    Source(SourceState),
}

/// A group of identical neurons or spike sources
#[derive(Debug, Clone)]
pub struct Population {
    /// Label used when naming recordings
    pub label: String,
    /// Number of neurons
    pub size: usize,
    pub(crate) kind: PopulationKind,
}

impl Population {
    /// True for spike-source populations
    pub fn is_source(&self) -> bool {
        matches!(self.kind, PopulationKind::Source(_))
    }

    /// Cell parameters, if this population simulates cells
    pub fn cell_params(&self) -> Option<&CellParams> {
        match &self.kind {
            PopulationKind::Cells { params, .. } => Some(params),
            PopulationKind::Source(_) => None,
        }
    }

    /// Current state of the cells
    pub fn states(&self) -> &[NeuronState] {
        match &self.kind {
            PopulationKind::Cells { states, .. } => states,
            PopulationKind::Source(_) => &[],
        }
    }
}

/// Input scheduled for a future step
#[derive(Debug, Clone, Copy)]
struct Delivery {
    population: usize,
    neuron: u32,
    receptor: Receptor,
    weight: f64,
}

/// Spikes produced by one population during one step
pub(crate) type StepSpikes = Vec<(PopulationId, Vec<usize>)>;

/// Network of populations and projections advanced in fixed timesteps
#[derive(Debug, Clone)]
pub struct Network {
    dt_ms: f64,
    populations: Vec<Population>,
    projections: Vec<Projection>,
    /// Pending input keyed by delivery step
    pending: BTreeMap<u64, Vec<Delivery>>,
}

impl Network {
    /// Create an empty network with the given timestep
    pub fn new(dt_ms: f64) -> Result<Self> {
        if !(dt_ms > 0.0) || !dt_ms.is_finite() {
            return Err(RuntimeError::invalid_parameter("timestep", dt_ms.to_string(), "> 0.0"));
        }
        Ok(Self {
            dt_ms,
            populations: Vec::new(),
            projections: Vec::new(),
            pending: BTreeMap::new(),
        })
    }

    /// Simulation timestep (ms)
    pub fn dt_ms(&self) -> f64 {
        self.dt_ms
    }

    /// Add a population of cells
    pub fn add_cells(&mut self, label: impl Into<String>, size: usize, params: CellParams) -> Result<PopulationId> {
        params.validate()?;
        if size == 0 {
            return Err(RuntimeError::invalid_parameter("size", "0", "> 0"));
        }
        let prop = Propagators::new(&params, self.dt_ms);
        let initial_v = vec![params.v_rest; size];
        let states = initial_v.iter().map(|&v| NeuronState::new(v)).collect();
        self.populations.push(Population {
            label: label.into(),
            size,
            kind: PopulationKind::Cells {
                params,
                prop,
                states,
                initial_v,
            },
        });
        Ok(PopulationId(self.populations.len() - 1))
    }

    /// Add a population of spike sources
    pub fn add_source(
        &mut self,
        label: impl Into<String>,
        size: usize,
        source: SpikeSource,
        seed: u64,
    ) -> Result<PopulationId> {
        if size == 0 {
            return Err(RuntimeError::invalid_parameter("size", "0", "> 0"));
        }
        source.validate(size)?;
        let state = SourceState::new(source, size, self.dt_ms, seed);
        self.populations.push(Population {
            label: label.into(),
            size,
            kind: PopulationKind::Source(state),
        });
        Ok(PopulationId(self.populations.len() - 1))
    }

    /// Connect two populations
    pub fn connect(
        &mut self,
        pre: PopulationId,
        post: PopulationId,
        connector: &Connector,
        spec: SynapseSpec,
    ) -> Result<ProjectionId> {
        let pre_size = self.population(pre)?.size;
        let post_pop = self.population(post)?;
        if post_pop.is_source() {
            return Err(RuntimeError::invalid_config(format!(
                "cannot project onto spike source {:?}",
                post_pop.label
            )));
        }
        let post_size = post_pop.size;

        if !spec.weight.is_finite() {
            return Err(RuntimeError::invalid_parameter("weight", spec.weight.to_string(), "finite"));
        }
        let delay_steps = (spec.delay_ms / self.dt_ms).round();
        if !(delay_steps >= 1.0) {
            return Err(RuntimeError::invalid_parameter(
                "delay",
                spec.delay_ms.to_string(),
                format!(">= one timestep ({}ms)", self.dt_ms),
            ));
        }
        let delay_steps = delay_steps as u64;

        let pairs = connector_pairs(connector, pre, post, pre_size, post_size)?;
        let synapses: Vec<Synapse> = pairs
            .into_iter()
            .map(|(pre, post)| Synapse {
                pre,
                post,
                weight: spec.weight,
                delay_steps,
            })
            .collect();
        let mut by_pre = vec![Vec::new(); pre_size];
        for (index, synapse) in synapses.iter().enumerate() {
            by_pre[synapse.pre as usize].push(index);
        }

        self.projections.push(Projection {
            pre,
            post,
            receptor: spec.receptor,
            synapses,
            by_pre,
        });
        log::debug!(
            "Projection {} -> {}: {} synapses, delay {} steps",
            pre.0,
            post.0,
            self.projections.last().map_or(0, |p| p.synapses.len()),
            delay_steps
        );
        Ok(ProjectionId(self.projections.len() - 1))
    }

    /// Look up a population
    pub fn population(&self, id: PopulationId) -> Result<&Population> {
        self.populations.get(id.0).ok_or(RuntimeError::UnknownHandle {
            kind: "population",
            id: id.0,
        })
    }

    fn population_mut(&mut self, id: PopulationId) -> Result<&mut Population> {
        self.populations.get_mut(id.0).ok_or(RuntimeError::UnknownHandle {
            kind: "population",
            id: id.0,
        })
    }

    /// Look up a projection
    pub fn projection(&self, id: ProjectionId) -> Result<&Projection> {
        self.projections.get(id.0).ok_or(RuntimeError::UnknownHandle {
            kind: "projection",
            id: id.0,
        })
    }

    /// Number of populations
    pub fn population_count(&self) -> usize {
        self.populations.len()
    }

    /// Change a cell parameter for every neuron of a population
    pub fn set_parameter(&mut self, id: PopulationId, parameter: NeuronParameter, value: f64) -> Result<()> {
        let dt_ms = self.dt_ms;
        match &mut self.population_mut(id)?.kind {
            PopulationKind::Cells { params, prop, .. } => {
                params.set(parameter, value)?;
                *prop = Propagators::new(params, dt_ms);
                Ok(())
            }
            PopulationKind::Source(_) => Err(RuntimeError::invalid_config(format!(
                "spike sources have no parameter {}",
                parameter
            ))),
        }
    }

    /// Replace what a source population emits
    pub fn set_source(&mut self, id: PopulationId, source: SpikeSource, seed: u64) -> Result<()> {
        let dt_ms = self.dt_ms;
        let population = self.population_mut(id)?;
        source.validate(population.size)?;
        let size = population.size;
        match &mut population.kind {
            PopulationKind::Source(state) => {
                *state = SourceState::new(source, size, dt_ms, seed);
                Ok(())
            }
            PopulationKind::Cells { .. } => Err(RuntimeError::invalid_config(format!(
                "population {:?} is not a spike source",
                population.label
            ))),
        }
    }

    /// Set the membrane potential used at start and after every reset
    pub fn set_initial_v(&mut self, id: PopulationId, initial: Vec<f64>) -> Result<()> {
        let population = self.population_mut(id)?;
        if initial.len() != population.size {
            return Err(RuntimeError::invalid_parameter(
                "initial_v",
                format!("{} values", initial.len()),
                format!("{} values", population.size),
            ));
        }
        match &mut population.kind {
            PopulationKind::Cells { states, initial_v, .. } => {
                for (state, &v) in states.iter_mut().zip(&initial) {
                    state.v = v;
                }
                *initial_v = initial;
                Ok(())
            }
            PopulationKind::Source(_) => Err(RuntimeError::invalid_config("spike sources have no membrane")),
        }
    }

    /// Put every population back to its initial state and drop pending input
    pub fn reset(&mut self) {
        self.pending.clear();
        for population in &mut self.populations {
            match &mut population.kind {
                PopulationKind::Cells { states, initial_v, .. } => {
                    for (state, &v) in states.iter_mut().zip(initial_v.iter()) {
                        *state = NeuronState::new(v);
                    }
                }
                PopulationKind::Source(state) => state.replay(),
            }
        }
    }

    /// Number of deliveries still in flight
    pub fn pending_deliveries(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Advance every population by one step and schedule the resulting spikes
    pub(crate) fn step(&mut self, step: u64) -> StepSpikes {
        if let Some(deliveries) = self.pending.remove(&step) {
            for delivery in deliveries {
                if let PopulationKind::Cells { states, .. } = &mut self.populations[delivery.population].kind {
                    let state = &mut states[delivery.neuron as usize];
                    match delivery.receptor {
                        Receptor::Excitatory => state.i_exc += delivery.weight,
                        Receptor::Inhibitory => state.i_inh += delivery.weight,
                    }
                }
            }
        }

        let dt_ms = self.dt_ms;
        let mut fired: StepSpikes = Vec::with_capacity(self.populations.len());
        for (index, population) in self.populations.iter_mut().enumerate() {
            let size = population.size;
            let spikes = match &mut population.kind {
                PopulationKind::Cells { params, prop, states, .. } => update_cells(states, params, prop),
                PopulationKind::Source(state) => state.fire(step, dt_ms, size),
            };
            if !spikes.is_empty() {
                fired.push((PopulationId(index), spikes));
            }
        }

        for (population, neurons) in &fired {
            for projection in self.projections.iter().filter(|p| p.pre == *population) {
                for &neuron in neurons {
                    for &index in &projection.by_pre[neuron] {
                        let synapse = &projection.synapses[index];
                        self.pending
                            .entry(step + synapse.delay_steps)
                            .or_default()
                            .push(Delivery {
                                population: projection.post.0,
                                neuron: synapse.post,
                                receptor: projection.receptor,
                                weight: synapse.weight,
                            });
                    }
                }
            }
        }

        fired
    }
}

fn update_cells(states: &mut [NeuronState], params: &CellParams, prop: &Propagators) -> Vec<usize> {
    #[cfg(feature = "parallel")]
    let fired = if states.len() >= MIN_PARALLEL_NEURONS {
        states
            .par_iter_mut()
            .enumerate()
            .filter_map(|(i, state)| step_neuron(state, params, prop).then_some(i))
            .collect()
    } else {
        update_serial(states, params, prop)
    };

    #[cfg(not(feature = "parallel"))]
    let fired = update_serial(states, params, prop);

    fired
}

fn update_serial(states: &mut [NeuronState], params: &CellParams, prop: &Propagators) -> Vec<usize> {
    states
        .iter_mut()
        .enumerate()
        .filter_map(|(i, state)| step_neuron(state, params, prop).then_some(i))
        .collect()
}

fn connector_pairs(
    connector: &Connector,
    pre: PopulationId,
    post: PopulationId,
    pre_size: usize,
    post_size: usize,
) -> Result<Vec<(u32, u32)>> {
    let pairs = match connector {
        Connector::OneToOne => {
            if pre_size != post_size {
                return Err(RuntimeError::invalid_config(format!(
                    "one-to-one needs equal sizes, got {} and {}",
                    pre_size, post_size
                )));
            }
            (0..pre_size as u32).map(|i| (i, i)).collect()
        }
        Connector::AllToAll {
            allow_self_connections,
        } => {
            let skip_self = pre == post && !allow_self_connections;
            let mut pairs = Vec::with_capacity(pre_size * post_size);
            for i in 0..pre_size as u32 {
                for j in 0..post_size as u32 {
                    if !(skip_self && i == j) {
                        pairs.push((i, j));
                    }
                }
            }
            pairs
        }
        Connector::FromList { pairs } => {
            if let Some(&(i, j)) = pairs
                .iter()
                .find(|(i, j)| *i as usize >= pre_size || *j as usize >= post_size)
            {
                return Err(RuntimeError::invalid_config(format!(
                    "connection ({}, {}) outside populations of size {} and {}",
                    i, j, pre_size, post_size
                )));
            }
            pairs.clone()
        }
        Connector::Ring { wrap_around } => {
            if pre != post {
                return Err(RuntimeError::invalid_config("ring connector must stay within one population"));
            }
            let n = pre_size as u32;
            let mut pairs: Vec<(u32, u32)> = (0..n.saturating_sub(1)).map(|i| (i, i + 1)).collect();
            if *wrap_around && n > 1 {
                pairs.push((n - 1, 0));
            }
            pairs
        }
    };
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize, delay: f64) -> (Network, PopulationId, PopulationId) {
        let mut network = Network::new(1.0).unwrap();
        let source = network
            .add_source("input", 1, SpikeSource::Array { times: vec![0.0] }, 1)
            .unwrap();
        let cells = network.add_cells("ring", n, CellParams::default()).unwrap();
        network
            .connect(
                source,
                cells,
                &Connector::FromList { pairs: vec![(0, 0)] },
                SynapseSpec::excitatory(2.0, 1.0),
            )
            .unwrap();
        network
            .connect(
                cells,
                cells,
                &Connector::Ring { wrap_around: false },
                SynapseSpec::excitatory(2.0, delay),
            )
            .unwrap();
        (network, source, cells)
    }

    #[test]
    fn test_connector_sizes() {
        let (network, _, cells) = chain(5, 17.0);
        assert_eq!(network.population(cells).unwrap().size, 5);
        assert_eq!(network.projection(ProjectionId(1)).unwrap().synapses().len(), 4);
    }

    #[test]
    fn test_invalid_connections() {
        let mut network = Network::new(1.0).unwrap();
        let a = network.add_cells("a", 2, CellParams::default()).unwrap();
        let b = network.add_cells("b", 3, CellParams::default()).unwrap();
        assert!(network
            .connect(a, b, &Connector::OneToOne, SynapseSpec::excitatory(1.0, 1.0))
            .is_err());
        assert!(network
            .connect(a, b, &Connector::AllToAll { allow_self_connections: true }, SynapseSpec::excitatory(1.0, 0.2))
            .is_err());
        assert!(network
            .connect(a, b, &Connector::FromList { pairs: vec![(2, 0)] }, SynapseSpec::excitatory(1.0, 1.0))
            .is_err());
        assert!(matches!(
            network.population(PopulationId(9)),
            Err(RuntimeError::UnknownHandle { kind: "population", id: 9 })
        ));
    }

    #[test]
    fn test_all_to_all_skips_self() {
        let mut network = Network::new(1.0).unwrap();
        let a = network.add_cells("a", 3, CellParams::default()).unwrap();
        let id = network
            .connect(a, a, &Connector::AllToAll { allow_self_connections: false }, SynapseSpec::inhibitory(1.0, 1.0))
            .unwrap();
        assert_eq!(network.projection(id).unwrap().synapses().len(), 6);
    }

    #[test]
    fn test_chain_timing() {
        let (mut network, source, cells) = chain(3, 17.0);
        let mut spikes = Vec::new();
        for step in 0..80 {
            for (population, neurons) in network.step(step) {
                if population == cells {
                    spikes.extend(neurons.into_iter().map(|n| (n, step)));
                }
                if population == source {
                    assert_eq!(step, 0);
                }
            }
        }
        assert_eq!(spikes, vec![(0, 3), (1, 22), (2, 41)]);
    }

    #[test]
    fn test_reset_clears_pending() {
        let (mut network, _, cells) = chain(3, 17.0);
        for step in 0..5 {
            network.step(step);
        }
        assert_eq!(network.pending_deliveries(), 1);
        network.reset();
        assert_eq!(network.pending_deliveries(), 0);
        let rest = CellParams::default().v_rest;
        assert!(network.population(cells).unwrap().states().iter().all(|s| s.v == rest));
    }
}
