//! Spike sources: replayed spike-time arrays and Poisson generators

use crate::error::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// How a source population produces spikes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpikeSource {
    /// Every neuron of the source fires at the same times (ms)
    Array {
        /// Spike times
        times: Vec<f64>,
    },
    /// Each neuron has its own list of spike times (ms)
    ArrayPerNeuron {
        /// One list per neuron
        times: Vec<Vec<f64>>,
    },
    /// Independent Poisson processes
    Poisson {
        /// Mean rate (Hz)
        rate_hz: f64,
        /// Start of activity (ms)
        start: f64,
        /// Length of activity (ms); unbounded when `None`
        duration: Option<f64>,
    },
}

impl SpikeSource {
    /// Validate against a source of `n` neurons
    pub fn validate(&self, n: usize) -> Result<()> {
        match self {
            SpikeSource::Array { times } => check_times(times),
            SpikeSource::ArrayPerNeuron { times } => {
                if times.len() != n {
                    return Err(RuntimeError::invalid_parameter(
                        "spike_times",
                        format!("{} lists", times.len()),
                        format!("one list per neuron ({})", n),
                    ));
                }
                times.iter().try_for_each(|t| check_times(t))
            }
            SpikeSource::Poisson {
                rate_hz,
                start,
                duration,
            } => {
                if !(*rate_hz >= 0.0) || !rate_hz.is_finite() {
                    return Err(RuntimeError::invalid_parameter("rate", rate_hz.to_string(), ">= 0.0"));
                }
                if !(*start >= 0.0) {
                    return Err(RuntimeError::invalid_parameter("start", start.to_string(), ">= 0.0"));
                }
                if let Some(duration) = duration {
                    if !(*duration >= 0.0) {
                        return Err(RuntimeError::invalid_parameter(
                            "duration",
                            duration.to_string(),
                            ">= 0.0",
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

fn check_times(times: &[f64]) -> Result<()> {
    match times.iter().find(|t| !(**t >= 0.0) || !t.is_finite()) {
        Some(t) => Err(RuntimeError::invalid_parameter(
            "spike_times",
            t.to_string(),
            "finite and >= 0.0",
        )),
        None => Ok(()),
    }
}

/// Source state inside a running simulation
#[derive(Debug, Clone)]
pub(crate) struct SourceState {
    source: SpikeSource,
    /// Spike steps per neuron for array sources, sorted
    steps: Vec<Vec<u64>>,
    rng: StdRng,
    seed: u64,
}

impl SourceState {
    pub(crate) fn new(source: SpikeSource, n: usize, dt_ms: f64, seed: u64) -> Self {
        let to_steps = |times: &[f64]| {
            let mut steps: Vec<u64> = times.iter().map(|t| (t / dt_ms).round() as u64).collect();
            steps.sort_unstable();
            steps
        };
        let steps = match &source {
            SpikeSource::Array { times } => vec![to_steps(times); n],
            SpikeSource::ArrayPerNeuron { times } => times.iter().map(|t| to_steps(t)).collect(),
            SpikeSource::Poisson { .. } => Vec::new(),
        };
        Self {
            source,
            steps,
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Restart the source from time zero
    pub(crate) fn replay(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    /// Neurons of this source firing at `step`
    pub(crate) fn fire(&mut self, step: u64, dt_ms: f64, n: usize) -> Vec<usize> {
        match &self.source {
            SpikeSource::Array { .. } | SpikeSource::ArrayPerNeuron { .. } => self
                .steps
                .iter()
                .enumerate()
                .filter(|(_, steps)| steps.binary_search(&step).is_ok())
                .map(|(i, _)| i)
                .collect(),
            SpikeSource::Poisson {
                rate_hz,
                start,
                duration,
            } => {
                let t = step as f64 * dt_ms;
                let active = t >= *start && duration.map_or(true, |d| t < start + d);
                // Draw for every neuron regardless, so replays stay aligned.
                let p = rate_hz * dt_ms / 1000.0;
                (0..n)
                    .filter(|_| self.rng.gen::<f64>() < p && active)
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_source_fires_on_rounded_steps() {
        let mut state = SourceState::new(SpikeSource::Array { times: vec![0.0, 2.4, 2.6] }, 2, 1.0, 1);
        assert_eq!(state.fire(0, 1.0, 2), vec![0, 1]);
        assert!(state.fire(1, 1.0, 2).is_empty());
        assert_eq!(state.fire(2, 1.0, 2), vec![0, 1]);
        assert_eq!(state.fire(3, 1.0, 2), vec![0, 1]);
    }

    #[test]
    fn test_per_neuron_validation() {
        let source = SpikeSource::ArrayPerNeuron {
            times: vec![vec![1.0], vec![2.0]],
        };
        assert!(source.validate(2).is_ok());
        assert!(source.validate(3).is_err());
        assert!(SpikeSource::Array { times: vec![-1.0] }.validate(1).is_err());
    }

    #[test]
    fn test_poisson_replay_is_identical() {
        let source = SpikeSource::Poisson {
            rate_hz: 200.0,
            start: 0.0,
            duration: None,
        };
        let mut state = SourceState::new(source, 10, 1.0, 42);
        let first: Vec<Vec<usize>> = (0..100).map(|s| state.fire(s, 1.0, 10)).collect();
        state.replay();
        let second: Vec<Vec<usize>> = (0..100).map(|s| state.fire(s, 1.0, 10)).collect();
        assert_eq!(first, second);
        assert!(first.iter().map(Vec::len).sum::<usize>() > 0);
    }

    #[test]
    fn test_poisson_window() {
        let source = SpikeSource::Poisson {
            rate_hz: 1000.0,
            start: 10.0,
            duration: Some(5.0),
        };
        let mut state = SourceState::new(source, 4, 1.0, 7);
        for step in 0..10 {
            assert!(state.fire(step, 1.0, 4).is_empty());
        }
        let active: usize = (10..15).map(|s| state.fire(s, 1.0, 4).len()).sum();
        assert_eq!(active, 20);
        assert!(state.fire(15, 1.0, 4).is_empty());
    }
}
