//! Synfire-chain ordering checks
//!
//! In a synfire ring neuron `i` drives neuron `i + 1`, so once sorted by
//! time the recorded spikes must visit neurons `0, 1, .., n - 1, 0, ..` in
//! order. With several independent wavefronts ("lines") each one keeps its
//! own position in the ring.

use ndarray::Array2;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Ordering violations found by the checker
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpikeOrderError {
    /// The array holds no spikes at all
    #[error("No spikes produced")]
    NoSpikes,

    /// Rows must be `(neuron_id, time)`
    #[error("Spike array must have 2 columns, found {0}")]
    BadShape(usize),

    /// A neuron id that is negative, fractional or not a number
    #[error("Invalid neuron id {value} in row {row}")]
    InvalidNeuronId {
        /// Row of the input array
        row: usize,
        /// Value found in the id column
        value: f64,
    },

    /// A spike from a neuron no line was waiting for
    #[error("Unexpected spike at time {time} from neuron {neuron} (expected {expected:?})")]
    UnexpectedSpike {
        /// Time of the offending spike
        time: f64,
        /// Neuron that fired
        neuron: u32,
        /// Neurons that would have been accepted
        expected: Vec<u32>,
    },

    /// Some lines never fired
    #[error("Expected {expected} spike lines")]
    MissingLines {
        /// Number of lines requested
        expected: usize,
    },
}

/// Spike-order checker with an optional CSV dump of the sorted data on failure
#[derive(Debug, Clone, Default)]
pub struct SpikeChecker {
    dump_path: Option<PathBuf>,
}

impl SpikeChecker {
    /// Checker that never writes a dump
    pub fn new() -> Self {
        Self { dump_path: None }
    }

    /// Write the sorted spikes to `path` before reporting an ordering error
    pub fn with_dump(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_path = Some(path.into());
        self
    }

    /// Where failures are dumped, if anywhere
    pub fn dump_path(&self) -> Option<&Path> {
        self.dump_path.as_deref()
    }

    /// Check a single wavefront travelling around `n_neurons`
    pub fn check_single_line(&self, spikes: &Array2<f64>, n_neurons: usize) -> Result<(), SpikeOrderError> {
        let sorted = sorted_rows(spikes)?;
        let mut num = 0usize;
        for &(neuron, time) in &sorted {
            if neuron != num as u32 {
                self.dump(&sorted);
                return Err(SpikeOrderError::UnexpectedSpike {
                    time,
                    neuron,
                    expected: vec![num as u32],
                });
            }
            num += 1;
            if num >= n_neurons {
                num = 0;
            }
        }
        Ok(())
    }

    /// Check `lines` interleaved wavefronts, each starting at neuron 0
    pub fn check_multiple_lines(
        &self,
        spikes: &Array2<f64>,
        n_neurons: usize,
        lines: usize,
        wrap_around: bool,
    ) -> Result<(), SpikeOrderError> {
        let sorted = sorted_rows(spikes)?;
        let mut nums = vec![0usize; lines];
        let mut used = vec![false; lines];
        for &(neuron, time) in &sorted {
            match nums.iter().position(|&num| num as u32 == neuron) {
                Some(line) => {
                    nums[line] += 1;
                    if wrap_around && nums[line] >= n_neurons {
                        nums[line] = 0;
                    }
                    used[line] = true;
                }
                None => {
                    self.dump(&sorted);
                    return Err(SpikeOrderError::UnexpectedSpike {
                        time,
                        neuron,
                        expected: nums.iter().map(|&n| n as u32).collect(),
                    });
                }
            }
        }
        if used.contains(&false) {
            return Err(SpikeOrderError::MissingLines { expected: lines });
        }
        Ok(())
    }

    fn dump(&self, sorted: &[(u32, f64)]) {
        let Some(path) = &self.dump_path else {
            return;
        };
        // Times are written as whole milliseconds, truncated
        let written = csv::Writer::from_path(path).and_then(|mut out| {
            for (neuron, time) in sorted {
                out.write_record([neuron.to_string(), (time.trunc() as i64).to_string()])?;
            }
            out.flush().map_err(csv::Error::from)
        });
        match written {
            Ok(()) => log::warn!("Sorted spikes written to {}", path.display()),
            Err(e) => log::warn!("Could not write spike dump {}: {}", path.display(), e),
        }
    }
}

/// Sort `(neuron_id, time)` rows by time, then neuron id
fn sorted_rows(spikes: &Array2<f64>) -> Result<Vec<(u32, f64)>, SpikeOrderError> {
    if spikes.nrows() == 0 {
        return Err(SpikeOrderError::NoSpikes);
    }
    if spikes.ncols() != 2 {
        return Err(SpikeOrderError::BadShape(spikes.ncols()));
    }
    let mut rows: Vec<(u32, f64)> = spikes
        .outer_iter()
        .enumerate()
        .map(|(index, row)| {
            let id = row[0];
            if id.is_finite() && id >= 0.0 && id.fract() == 0.0 && id <= u32::MAX as f64 {
                Ok((id as u32, row[1]))
            } else {
                Err(SpikeOrderError::InvalidNeuronId { row: index, value: id })
            }
        })
        .collect::<Result<_, _>>()?;
    rows.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    Ok(rows)
}

/// Check a single synfire wavefront, dumping to `spikes.csv` in the temp dir on failure
pub fn synfire_spike_checker(spikes: &Array2<f64>, n_neurons: usize) -> Result<(), SpikeOrderError> {
    SpikeChecker::new()
        .with_dump(std::env::temp_dir().join("spikes.csv"))
        .check_single_line(spikes, n_neurons)
}

/// Check interleaved synfire wavefronts, dumping to `sorted_spikes.csv` in the temp dir on failure
pub fn synfire_multiple_lines_spike_checker(
    spikes: &Array2<f64>,
    n_neurons: usize,
    lines: usize,
    wrap_around: bool,
) -> Result<(), SpikeOrderError> {
    SpikeChecker::new()
        .with_dump(std::env::temp_dir().join("sorted_spikes.csv"))
        .check_multiple_lines(spikes, n_neurons, lines, wrap_around)
}
