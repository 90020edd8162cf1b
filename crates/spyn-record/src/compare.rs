//! Structural and numeric comparison of two recordings
//!
//! Used to check that two extraction paths (or a live run and a golden file)
//! agree. Every comparison stops at the first divergence and reports it.

use crate::neo::{AnalogSignal, Block, Segment, SpikeTrain};
use thiserror::Error;

/// First divergence found between two recordings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Mismatch {
    /// Trains recorded for different neurons
    #[error("Different source_index found {left} and {right}")]
    SourceIndex {
        /// Left neuron id
        left: u32,
        /// Right neuron id
        right: u32,
    },

    /// Trains of different lengths
    #[error("spiketrain1 has {left} spikes while spiketrain2 has {right} for ID {neuron}")]
    SpikeCount {
        /// Neuron id
        neuron: u32,
        /// Left length
        left: usize,
        /// Right length
        right: usize,
    },

    /// A spike time differs
    #[error("spike1 is {left} while spike2 is {right} for ID {neuron}")]
    SpikeTime {
        /// Neuron id
        neuron: u32,
        /// Left time
        left: f64,
        /// Right time
        right: f64,
    },

    /// Different numbers of spike trains
    #[error("spiketrains1 has {left} spiketrains while spiketrains2 has {right}")]
    TrainCount {
        /// Left count
        left: usize,
        /// Right count
        right: usize,
    },

    /// Signals with different names
    #[error("Analog signal names differ: {left:?} and {right:?}")]
    SignalName {
        /// Left name
        left: String,
        /// Right name
        right: String,
    },

    /// Signals with different channel layouts
    #[error("Signal {name:?} channel ids differ: {left:?} and {right:?}")]
    Channels {
        /// Signal name
        name: String,
        /// Left channel ids
        left: Vec<u32>,
        /// Right channel ids
        right: Vec<u32>,
    },

    /// Signals sampled at different rates
    #[error("Signal {name:?} sampling period {left} differs from {right}")]
    SamplingPeriod {
        /// Signal name
        name: String,
        /// Left period
        left: f64,
        /// Right period
        right: f64,
    },

    /// Signals of different lengths
    #[error("Signal {name:?} has {left} samples while the other has {right}")]
    SampleCount {
        /// Signal name
        name: String,
        /// Left samples
        left: usize,
        /// Right samples
        right: usize,
    },

    /// A sample value differs
    #[error("Signal {name:?} for ID {neuron} at time {time}: {left} != {right}")]
    SampleValue {
        /// Signal name
        name: String,
        /// Channel id
        neuron: u32,
        /// Sample time
        time: f64,
        /// Left value
        left: f64,
        /// Right value
        right: f64,
    },

    /// A signal present on the left is absent on the right
    #[error("Segment has no signal {name:?} to compare with")]
    MissingSignal {
        /// Signal name
        name: String,
    },

    /// Blocks with different numbers of runs
    #[error("Block1 has {left} segments while block2 has {right}")]
    SegmentCount {
        /// Left segments
        left: usize,
        /// Right segments
        right: usize,
    },

    /// A mismatch inside a given segment
    #[error("Segment {index}: {inner}")]
    InSegment {
        /// Segment index
        index: usize,
        /// Underlying mismatch
        inner: Box<Mismatch>,
    },
}

/// How strict a comparison is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparePolicy {
    /// Sequences must have equal length; otherwise the common prefix is compared
    pub same_length: bool,
    /// Both sides must carry the same kinds of data
    pub same_data: bool,
    /// Blocks must have the same number of segments
    pub same_runs: bool,
}

impl Default for ComparePolicy {
    fn default() -> Self {
        Self {
            same_length: true,
            same_data: true,
            same_runs: true,
        }
    }
}

impl ComparePolicy {
    /// Compare only the common prefix of trains and signals
    pub fn allow_partial(mut self) -> Self {
        self.same_length = false;
        self
    }

    /// Tolerate signals recorded on only one side
    pub fn allow_missing_data(mut self) -> Self {
        self.same_data = false;
        self
    }

    /// Compare only the common prefix of segments
    pub fn allow_fewer_runs(mut self) -> Self {
        self.same_runs = false;
        self
    }
}

/// Compare two spike trains
pub fn compare_spiketrain(
    left: &SpikeTrain,
    right: &SpikeTrain,
    same_length: bool,
) -> Result<(), Mismatch> {
    let neuron = left.source().raw();
    if neuron != right.source().raw() {
        return Err(Mismatch::SourceIndex {
            left: neuron,
            right: right.source().raw(),
        });
    }
    if same_length && left.len() != right.len() {
        return Err(Mismatch::SpikeCount {
            neuron,
            left: left.len(),
            right: right.len(),
        });
    }
    for (&l, &r) in left.times().iter().zip(right.times()) {
        if !same_value(l, r) {
            return Err(Mismatch::SpikeTime {
                neuron,
                left: l,
                right: r,
            });
        }
    }
    Ok(())
}

/// Compare two lists of spike trains pairwise
pub fn compare_spiketrains(
    left: &[SpikeTrain],
    right: &[SpikeTrain],
    same_data: bool,
    same_length: bool,
) -> Result<(), Mismatch> {
    if same_data && left.len() != right.len() {
        return Err(Mismatch::TrainCount {
            left: left.len(),
            right: right.len(),
        });
    }
    left.iter()
        .zip(right)
        .try_for_each(|(l, r)| compare_spiketrain(l, r, same_length))
}

fn same_value(left: f64, right: f64) -> bool {
    left == right || (left.is_nan() && right.is_nan())
}

/// Compare two analog signals
pub fn compare_analogsignal(
    left: &AnalogSignal,
    right: &AnalogSignal,
    same_length: bool,
) -> Result<(), Mismatch> {
    if left.name() != right.name() {
        return Err(Mismatch::SignalName {
            left: left.name().to_string(),
            right: right.name().to_string(),
        });
    }
    let name = left.name().to_string();
    if left.channels() != right.channels() {
        return Err(Mismatch::Channels {
            name,
            left: left.channels().iter().map(|id| id.raw()).collect(),
            right: right.channels().iter().map(|id| id.raw()).collect(),
        });
    }
    if left.sampling_period() != right.sampling_period() {
        return Err(Mismatch::SamplingPeriod {
            name,
            left: left.sampling_period(),
            right: right.sampling_period(),
        });
    }
    if same_length && left.num_samples() != right.num_samples() {
        return Err(Mismatch::SampleCount {
            name,
            left: left.num_samples(),
            right: right.num_samples(),
        });
    }
    let rows = left.num_samples().min(right.num_samples());
    for row in 0..rows {
        for (column, id) in left.channels().iter().enumerate() {
            let l = left.data()[[row, column]];
            let r = right.data()[[row, column]];
            if !same_value(l, r) {
                return Err(Mismatch::SampleValue {
                    name,
                    neuron: id.raw(),
                    time: left.time_of(row),
                    left: l,
                    right: r,
                });
            }
        }
    }
    Ok(())
}

/// Compare the spike trains and every analog signal of two segments
pub fn compare_segments(
    left: &Segment,
    right: &Segment,
    policy: ComparePolicy,
) -> Result<(), Mismatch> {
    compare_spiketrains(
        &left.spiketrains,
        &right.spiketrains,
        policy.same_data,
        policy.same_length,
    )?;
    for signal in &left.analogsignals {
        match right.filter_signal(signal.name()) {
            Some(other) => compare_analogsignal(signal, other, policy.same_length)?,
            None if policy.same_data => {
                return Err(Mismatch::MissingSignal {
                    name: signal.name().to_string(),
                })
            }
            None => {}
        }
    }
    Ok(())
}

/// Compare two blocks segment by segment
pub fn compare_blocks(left: &Block, right: &Block, policy: ComparePolicy) -> Result<(), Mismatch> {
    if policy.same_runs && left.segments.len() != right.segments.len() {
        return Err(Mismatch::SegmentCount {
            left: left.segments.len(),
            right: right.segments.len(),
        });
    }
    for (index, (l, r)) in left.segments.iter().zip(&right.segments).enumerate() {
        compare_segments(l, r, policy).map_err(|inner| Mismatch::InSegment {
            index,
            inner: Box::new(inner),
        })?;
    }
    Ok(())
}
