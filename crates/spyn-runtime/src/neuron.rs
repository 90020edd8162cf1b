//! Current-based leaky integrate-and-fire cell with exponential synapses

use crate::error::*;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Parameters of an integrate-and-fire cell with exponentially decaying input currents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellParams {
    /// Membrane capacitance (nF)
    pub cm: f64,
    /// Membrane time constant (ms)
    pub tau_m: f64,
    /// Refractory period (ms)
    pub tau_refrac: f64,
    /// Excitatory synaptic time constant (ms)
    pub tau_syn_e: f64,
    /// Inhibitory synaptic time constant (ms)
    pub tau_syn_i: f64,
    /// Reset potential (mV)
    pub v_reset: f64,
    /// Resting potential (mV)
    pub v_rest: f64,
    /// Threshold potential (mV)
    pub v_thresh: f64,
    /// Constant injected current (nA)
    pub i_offset: f64,
}

impl Default for CellParams {
    fn default() -> Self {
        Self {
            cm: 0.25,
            tau_m: 20.0,
            tau_refrac: 2.0,
            tau_syn_e: 5.0,
            tau_syn_i: 5.0,
            v_reset: -70.0,
            v_rest: -65.0,
            v_thresh: -50.0,
            i_offset: 0.0,
        }
    }
}

impl CellParams {
    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("cm", self.cm),
            ("tau_m", self.tau_m),
            ("tau_syn_e", self.tau_syn_e),
            ("tau_syn_i", self.tau_syn_i),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(RuntimeError::invalid_parameter(name, value.to_string(), "> 0.0"));
            }
        }
        if !(self.tau_refrac >= 0.0) {
            return Err(RuntimeError::invalid_parameter(
                "tau_refrac",
                self.tau_refrac.to_string(),
                ">= 0.0",
            ));
        }
        if !(self.v_thresh > self.v_reset) {
            return Err(RuntimeError::invalid_parameter(
                "v_thresh",
                format!("{} (with v_reset={})", self.v_thresh, self.v_reset),
                "> v_reset",
            ));
        }
        if !self.i_offset.is_finite() {
            return Err(RuntimeError::invalid_parameter(
                "i_offset",
                self.i_offset.to_string(),
                "finite",
            ));
        }
        Ok(())
    }

    /// Set one named parameter, validating the result
    pub fn set(&mut self, parameter: NeuronParameter, value: f64) -> Result<()> {
        let mut updated = self.clone();
        *updated.field_mut(parameter) = value;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Read one named parameter
    pub fn get(&self, parameter: NeuronParameter) -> f64 {
        match parameter {
            NeuronParameter::Cm => self.cm,
            NeuronParameter::TauM => self.tau_m,
            NeuronParameter::TauRefrac => self.tau_refrac,
            NeuronParameter::TauSynE => self.tau_syn_e,
            NeuronParameter::TauSynI => self.tau_syn_i,
            NeuronParameter::VReset => self.v_reset,
            NeuronParameter::VRest => self.v_rest,
            NeuronParameter::VThresh => self.v_thresh,
            NeuronParameter::IOffset => self.i_offset,
        }
    }

    fn field_mut(&mut self, parameter: NeuronParameter) -> &mut f64 {
        match parameter {
            NeuronParameter::Cm => &mut self.cm,
            NeuronParameter::TauM => &mut self.tau_m,
            NeuronParameter::TauRefrac => &mut self.tau_refrac,
            NeuronParameter::TauSynE => &mut self.tau_syn_e,
            NeuronParameter::TauSynI => &mut self.tau_syn_i,
            NeuronParameter::VReset => &mut self.v_reset,
            NeuronParameter::VRest => &mut self.v_rest,
            NeuronParameter::VThresh => &mut self.v_thresh,
            NeuronParameter::IOffset => &mut self.i_offset,
        }
    }
}

/// Settable cell parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeuronParameter {
    /// Membrane capacitance
    Cm,
    /// Membrane time constant
    TauM,
    /// Refractory period
    TauRefrac,
    /// Excitatory synaptic time constant
    TauSynE,
    /// Inhibitory synaptic time constant
    TauSynI,
    /// Reset potential
    VReset,
    /// Resting potential
    VRest,
    /// Threshold potential
    VThresh,
    /// Constant injected current
    IOffset,
}

impl NeuronParameter {
    /// Parameter name as used in configuration files
    pub const fn name(&self) -> &'static str {
        match self {
            NeuronParameter::Cm => "cm",
            NeuronParameter::TauM => "tau_m",
            NeuronParameter::TauRefrac => "tau_refrac",
            NeuronParameter::TauSynE => "tau_syn_e",
            NeuronParameter::TauSynI => "tau_syn_i",
            NeuronParameter::VReset => "v_reset",
            NeuronParameter::VRest => "v_rest",
            NeuronParameter::VThresh => "v_thresh",
            NeuronParameter::IOffset => "i_offset",
        }
    }
}

impl fmt::Display for NeuronParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NeuronParameter {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self> {
        let all = [
            NeuronParameter::Cm,
            NeuronParameter::TauM,
            NeuronParameter::TauRefrac,
            NeuronParameter::TauSynE,
            NeuronParameter::TauSynI,
            NeuronParameter::VReset,
            NeuronParameter::VRest,
            NeuronParameter::VThresh,
            NeuronParameter::IOffset,
        ];
        all.into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| RuntimeError::invalid_parameter("parameter", s, "a cell parameter name"))
    }
}

/// Which input current a synapse feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Receptor {
    /// Excitatory current
    #[default]
    Excitatory,
    /// Inhibitory current
    Inhibitory,
}

/// Runtime state of one cell
#[derive(Debug, Clone, PartialEq)]
pub struct NeuronState {
    /// Membrane potential (mV)
    pub v: f64,
    /// Excitatory input current (nA)
    pub i_exc: f64,
    /// Inhibitory input current (nA)
    pub i_inh: f64,
    /// Steps left in the refractory period
    pub refractory_steps: u32,
}

impl NeuronState {
    /// Fresh state at the given membrane potential
    pub fn new(v: f64) -> Self {
        Self {
            v,
            i_exc: 0.0,
            i_inh: 0.0,
            refractory_steps: 0,
        }
    }
}

/// Per-timestep propagators derived from the parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Propagators {
    decay_m: f64,
    decay_e: f64,
    decay_i: f64,
    resistance: f64,
    refractory_steps: u32,
}

impl Propagators {
    /// Precompute exact-integration factors for a timestep
    pub fn new(params: &CellParams, dt_ms: f64) -> Self {
        Self {
            decay_m: (-dt_ms / params.tau_m).exp(),
            decay_e: (-dt_ms / params.tau_syn_e).exp(),
            decay_i: (-dt_ms / params.tau_syn_i).exp(),
            resistance: params.tau_m / params.cm,
            refractory_steps: (params.tau_refrac / dt_ms).round() as u32,
        }
    }
}

/// Advance one cell by one timestep; returns true if it fired
///
/// Input arriving this step must already be added to the currents. While
/// refractory the membrane is held and only the currents decay.
pub fn step_neuron(state: &mut NeuronState, params: &CellParams, prop: &Propagators) -> bool {
    let refractory = state.refractory_steps > 0;
    if refractory {
        state.refractory_steps -= 1;
    } else {
        let v_inf = params.v_rest + prop.resistance * (state.i_exc - state.i_inh + params.i_offset);
        state.v = v_inf + (state.v - v_inf) * prop.decay_m;
    }

    state.i_exc *= prop.decay_e;
    state.i_inh *= prop.decay_i;

    if !refractory && state.v >= params.v_thresh {
        state.v = params.v_reset;
        state.refractory_steps = prop.refractory_steps;
        true
    } else {
        false
    }
}
