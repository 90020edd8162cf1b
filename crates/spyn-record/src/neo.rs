//! Hierarchical recording model: blocks of segments of spike trains and analog signals
//!
//! A [`Block`] holds one [`Segment`] per simulation span (a new segment starts
//! after every reset). Times are in milliseconds.

use crate::{error::*, NeuronId};
use core::fmt;
use core::str::FromStr;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of a recordable signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Spike times
    Spikes,
    /// Membrane voltage
    V,
    /// Excitatory synaptic input
    GsynExc,
    /// Inhibitory synaptic input
    GsynInh,
    /// Every signal at once
    All,
}

impl SignalKind {
    /// Canonical signal name as stored in recordings
    pub const fn name(&self) -> &'static str {
        match self {
            SignalKind::Spikes => "spikes",
            SignalKind::V => "v",
            SignalKind::GsynExc => "gsyn_exc",
            SignalKind::GsynInh => "gsyn_inh",
            SignalKind::All => "all",
        }
    }

    /// Units used for this signal
    pub const fn units(&self) -> &'static str {
        match self {
            SignalKind::Spikes => "ms",
            SignalKind::V => "mV",
            SignalKind::GsynExc | SignalKind::GsynInh => "nA",
            SignalKind::All => "",
        }
    }

    /// The analog signals, in recording order
    pub const ANALOG: [SignalKind; 3] = [SignalKind::V, SignalKind::GsynExc, SignalKind::GsynInh];
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignalKind {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "spikes" => Ok(SignalKind::Spikes),
            "v" => Ok(SignalKind::V),
            "gsyn_exc" => Ok(SignalKind::GsynExc),
            "gsyn_inh" => Ok(SignalKind::GsynInh),
            "all" => Ok(SignalKind::All),
            other => Err(RecordError::UnknownSignal(other.to_string())),
        }
    }
}

/// Ordered spike times of one neuron
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSpikeTrain")]
pub struct SpikeTrain {
    source: NeuronId,
    times: Vec<f64>,
    t_start: f64,
    t_stop: f64,
}

impl SpikeTrain {
    /// Create a spike train, checking that times are non-decreasing and inside `[t_start, t_stop]`
    pub fn new(source: NeuronId, times: Vec<f64>, t_start: f64, t_stop: f64) -> Result<Self> {
        if !t_start.is_finite() || !t_stop.is_finite() {
            return Err(RecordError::invalid_spike_times(
                source.raw(),
                format!("window [{}, {}] is not finite", t_start, t_stop),
            ));
        }
        if let Some(&t) = times.iter().find(|t| !t.is_finite()) {
            return Err(RecordError::invalid_spike_times(source.raw(), format!("{} is not finite", t)));
        }
        if t_stop < t_start {
            return Err(RecordError::invalid_spike_times(
                source.raw(),
                format!("t_stop {} before t_start {}", t_stop, t_start),
            ));
        }
        if let Some(pair) = times.windows(2).find(|w| !(w[0] <= w[1])) {
            return Err(RecordError::invalid_spike_times(
                source.raw(),
                format!("{} followed by {}", pair[0], pair[1]),
            ));
        }
        if let Some(&t) = times.iter().find(|&&t| t < t_start || t > t_stop) {
            return Err(RecordError::invalid_spike_times(
                source.raw(),
                format!("{} outside [{}, {}]", t, t_start, t_stop),
            ));
        }
        Ok(Self {
            source,
            times,
            t_start,
            t_stop,
        })
    }

    /// Neuron that produced the spikes
    pub fn source(&self) -> NeuronId {
        self.source
    }

    /// Spike times (ms)
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Start of the recording window
    pub fn t_start(&self) -> f64 {
        self.t_start
    }

    /// End of the recording window
    pub fn t_stop(&self) -> f64 {
        self.t_stop
    }

    /// Number of spikes
    pub fn len(&self) -> usize {
        self.times.len()
    }

    /// True when the neuron never fired
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Regularly sampled time-by-channel signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAnalogSignal")]
pub struct AnalogSignal {
    name: String,
    units: String,
    sampling_period: f64,
    t_start: f64,
    channels: Vec<NeuronId>,
    data: Array2<f64>,
}

impl AnalogSignal {
    /// Create a signal; `data` has one row per sample and one column per channel
    pub fn new(
        name: impl Into<String>,
        units: impl Into<String>,
        sampling_period: f64,
        t_start: f64,
        channels: Vec<NeuronId>,
        data: Array2<f64>,
    ) -> Result<Self> {
        if !(sampling_period > 0.0) {
            return Err(RecordError::shape_mismatch(format!(
                "sampling period must be > 0, got {}",
                sampling_period
            )));
        }
        if data.ncols() != channels.len() {
            return Err(RecordError::shape_mismatch(format!(
                "{} data columns for {} channels",
                data.ncols(),
                channels.len()
            )));
        }
        Ok(Self {
            name: name.into(),
            units: units.into(),
            sampling_period,
            t_start,
            channels,
            data,
        })
    }

    /// Signal name, e.g. `"v"`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Units of the values
    pub fn units(&self) -> &str {
        &self.units
    }

    /// Time between samples (ms)
    pub fn sampling_period(&self) -> f64 {
        self.sampling_period
    }

    /// Time of the first sample (ms)
    pub fn t_start(&self) -> f64 {
        self.t_start
    }

    /// Channel identities, one per column
    pub fn channels(&self) -> &[NeuronId] {
        &self.channels
    }

    /// Raw samples
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Number of samples per channel
    pub fn num_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Time of sample `i`
    pub fn time_of(&self, i: usize) -> f64 {
        self.t_start + i as f64 * self.sampling_period
    }

    /// Sample times
    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.num_samples()).map(move |i| self.time_of(i))
    }
}

/// Wire form of [`SpikeTrain`]; decoded trains go through [`SpikeTrain::new`]
#[derive(Deserialize)]
struct RawSpikeTrain {
    source: NeuronId,
    times: Vec<f64>,
    t_start: f64,
    t_stop: f64,
}

impl TryFrom<RawSpikeTrain> for SpikeTrain {
    type Error = RecordError;

    fn try_from(raw: RawSpikeTrain) -> Result<Self> {
        SpikeTrain::new(raw.source, raw.times, raw.t_start, raw.t_stop)
    }
}

/// Wire form of [`AnalogSignal`]; decoded signals go through [`AnalogSignal::new`]
#[derive(Deserialize)]
struct RawAnalogSignal {
    name: String,
    units: String,
    sampling_period: f64,
    t_start: f64,
    channels: Vec<NeuronId>,
    data: Array2<f64>,
}

impl TryFrom<RawAnalogSignal> for AnalogSignal {
    type Error = RecordError;

    fn try_from(raw: RawAnalogSignal) -> Result<Self> {
        AnalogSignal::new(
            raw.name,
            raw.units,
            raw.sampling_period,
            raw.t_start,
            raw.channels,
            raw.data,
        )
    }
}

/// Data recorded between two resets
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Segment {
    /// Position of this segment in its block
    pub index: usize,
    /// One train per recorded neuron
    pub spiketrains: Vec<SpikeTrain>,
    /// Recorded analog signals
    pub analogsignals: Vec<AnalogSignal>,
}

impl Segment {
    /// Create an empty segment
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// Find an analog signal by name
    pub fn filter_signal(&self, name: &str) -> Option<&AnalogSignal> {
        self.analogsignals.iter().find(|s| s.name() == name)
    }

    /// Total number of spikes in the segment
    pub fn spike_count(&self) -> usize {
        self.spiketrains.iter().map(SpikeTrain::len).sum()
    }
}

/// Top-level container for one population's recording
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    /// Label of the recorded population
    pub name: String,
    /// One segment per run span
    pub segments: Vec<Segment>,
    /// Free-form metadata
    pub annotations: BTreeMap<String, String>,
}

impl Block {
    /// Create an empty block
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Segment for a run, or `RunOutOfRange`
    pub fn segment(&self, run: usize) -> Result<&Segment> {
        self.segments.get(run).ok_or(RecordError::RunOutOfRange {
            run,
            available: self.segments.len(),
        })
    }

    /// Add an annotation
    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.annotations.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_signal_kind_names() {
        for kind in [
            SignalKind::Spikes,
            SignalKind::V,
            SignalKind::GsynExc,
            SignalKind::GsynInh,
            SignalKind::All,
        ] {
            assert_eq!(kind.name().parse::<SignalKind>().unwrap(), kind);
        }
        assert!(matches!(
            "voltage".parse::<SignalKind>(),
            Err(RecordError::UnknownSignal(_))
        ));
    }

    #[test]
    fn test_spike_train_validation() {
        let train = SpikeTrain::new(NeuronId::new(3), vec![1.0, 1.0, 4.0], 0.0, 10.0).unwrap();
        assert_eq!(train.len(), 3);
        assert_eq!(train.source(), NeuronId::new(3));

        let unsorted = SpikeTrain::new(NeuronId::new(0), vec![2.0, 1.0], 0.0, 10.0);
        assert!(matches!(unsorted, Err(RecordError::InvalidSpikeTimes { .. })));

        let outside = SpikeTrain::new(NeuronId::new(0), vec![11.0], 0.0, 10.0);
        assert!(outside.is_err());

        for t in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let train = SpikeTrain::new(NeuronId::new(0), vec![t], 0.0, 10.0);
            assert!(matches!(train, Err(RecordError::InvalidSpikeTimes { .. })), "accepted {}", t);
        }
        assert!(SpikeTrain::new(NeuronId::new(0), vec![], 0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_analog_signal_shape() {
        let channels = vec![NeuronId::new(0), NeuronId::new(1)];
        let data = array![[-65.0, -65.0], [-64.0, -63.0], [-60.0, -61.0]];
        let signal = AnalogSignal::new("v", "mV", 1.0, 0.0, channels.clone(), data).unwrap();
        assert_eq!(signal.num_samples(), 3);
        assert_eq!(signal.times().collect::<Vec<_>>(), vec![0.0, 1.0, 2.0]);

        let bad = AnalogSignal::new("v", "mV", 1.0, 0.0, channels, array![[1.0]]);
        assert!(matches!(bad, Err(RecordError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_block_segment_lookup() {
        let mut block = Block::new("pop_1");
        block.segments.push(Segment::new(0));
        assert!(block.segment(0).is_ok());
        assert!(matches!(
            block.segment(1),
            Err(RecordError::RunOutOfRange { run: 1, available: 1 })
        ));
    }
}
