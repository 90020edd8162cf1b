//! Flattening recordings into fixed-column numeric arrays
//!
//! Spikes flatten to `(neuron_id, time)` rows. Analog signals flatten to
//! `(neuron_id, time, value)` rows ordered by channel, then time.

use crate::{
    error::*,
    neo::{AnalogSignal, Block, SignalKind, SpikeTrain},
    NeuronId,
};
use ndarray::Array2;

/// Total number of spikes across a list of trains
pub fn count_spiketrains(spiketrains: &[SpikeTrain]) -> usize {
    spiketrains.iter().map(SpikeTrain::len).sum()
}

/// Total number of spikes across every segment of a block
pub fn count_spikes(block: &Block) -> usize {
    block
        .segments
        .iter()
        .map(|segment| count_spiketrains(&segment.spiketrains))
        .sum()
}

/// Flatten spike trains into `(neuron_id, time)` rows, train by train
pub fn convert_spiketrains(spiketrains: &[SpikeTrain]) -> Array2<f64> {
    let rows = count_spiketrains(spiketrains);
    let mut flat = Vec::with_capacity(rows * 2);
    for train in spiketrains {
        let id = train.source().raw() as f64;
        for &time in train.times() {
            flat.push(id);
            flat.push(time);
        }
    }
    Array2::from_shape_vec((rows, 2), flat).unwrap_or_else(|_| Array2::zeros((0, 2)))
}

/// Flatten the spikes of one run
pub fn convert_spikes(block: &Block, run: usize) -> Result<Array2<f64>> {
    Ok(convert_spiketrains(&block.segment(run)?.spiketrains))
}

/// Flatten an analog signal into `(neuron_id, time, value)` rows
pub fn convert_analog_signal(signal: &AnalogSignal) -> Array2<f64> {
    let samples = signal.num_samples();
    let channels = signal.channels();
    let mut flat = Vec::with_capacity(samples * channels.len() * 3);
    for (column, id) in channels.iter().enumerate() {
        for row in 0..samples {
            flat.push(id.raw() as f64);
            flat.push(signal.time_of(row));
            flat.push(signal.data()[[row, column]]);
        }
    }
    Array2::from_shape_vec((samples * channels.len(), 3), flat)
        .unwrap_or_else(|_| Array2::zeros((0, 3)))
}

/// Flatten one named signal of one run
///
/// `SignalKind::All` is refused: spikes and analog signals have different
/// column layouts and cannot share one array.
pub fn convert_data(block: &Block, kind: SignalKind, run: usize) -> Result<Array2<f64>> {
    if kind == SignalKind::All {
        return Err(RecordError::AmbiguousSignal);
    }
    let segment = block.segment(run)?;
    match kind {
        SignalKind::Spikes => Ok(convert_spiketrains(&segment.spiketrains)),
        _ => segment
            .filter_signal(kind.name())
            .map(convert_analog_signal)
            .ok_or_else(|| RecordError::MissingSignal {
                segment: run,
                name: kind.name().to_string(),
            }),
    }
}

/// Flatten one named signal for several runs (every run when `runs` is `None`)
pub fn convert_data_list(
    block: &Block,
    kind: SignalKind,
    runs: Option<&[usize]>,
) -> Result<Vec<Array2<f64>>> {
    match runs {
        Some(runs) => runs.iter().map(|&run| convert_data(block, kind, run)).collect(),
        None => (0..block.segments.len())
            .map(|run| convert_data(block, kind, run))
            .collect(),
    }
}

/// Membrane voltage of every run
pub fn convert_v_list(block: &Block) -> Result<Vec<Array2<f64>>> {
    convert_data_list(block, SignalKind::V, None)
}

/// Excitatory input of every run
pub fn convert_gsyn_exc_list(block: &Block) -> Result<Vec<Array2<f64>>> {
    convert_data_list(block, SignalKind::GsynExc, None)
}

/// Inhibitory input of every run
pub fn convert_gsyn_inh_list(block: &Block) -> Result<Vec<Array2<f64>>> {
    convert_data_list(block, SignalKind::GsynInh, None)
}

/// Merge flattened excitatory and inhibitory rows into `(neuron_id, time, exc, inh)`
pub fn convert_gsyn(exc: &Array2<f64>, inh: &Array2<f64>) -> Result<Array2<f64>> {
    if exc.dim() != inh.dim() || exc.ncols() != 3 {
        return Err(RecordError::shape_mismatch(format!(
            "gsyn_exc has shape {:?} while gsyn_inh has shape {:?}",
            exc.dim(),
            inh.dim()
        )));
    }
    let mut merged = Array2::zeros((exc.nrows(), 4));
    for (i, (e, h)) in exc.outer_iter().zip(inh.outer_iter()).enumerate() {
        if e[0] != h[0] || e[1] != h[1] {
            return Err(RecordError::shape_mismatch(format!(
                "row {}: exc is for id {} at {} but inh is for id {} at {}",
                i, e[0], e[1], h[0], h[1]
            )));
        }
        merged[[i, 0]] = e[0];
        merged[[i, 1]] = e[1];
        merged[[i, 2]] = e[2];
        merged[[i, 3]] = h[2];
    }
    Ok(merged)
}

/// Rebuild spike trains from `(neuron_id, time)` rows
///
/// Trains are returned in neuron id order, each sorted by time. Ids that
/// never appear get no train.
pub fn spikes_from_rows(rows: &Array2<f64>, t_stop: f64) -> Result<Vec<SpikeTrain>> {
    if rows.ncols() != 2 && rows.nrows() > 0 {
        return Err(RecordError::shape_mismatch(format!(
            "spike rows need 2 columns, got {}",
            rows.ncols()
        )));
    }
    let mut by_neuron: std::collections::BTreeMap<u32, Vec<f64>> = Default::default();
    for row in rows.outer_iter() {
        if row[0] < 0.0 || row[0].fract() != 0.0 {
            return Err(RecordError::invalid_format(format!("invalid neuron id {}", row[0])));
        }
        by_neuron.entry(row[0] as u32).or_default().push(row[1]);
    }
    by_neuron
        .into_iter()
        .map(|(id, mut times)| {
            times.sort_by(f64::total_cmp);
            SpikeTrain::new(NeuronId::new(id), times, 0.0, t_stop)
        })
        .collect()
}
