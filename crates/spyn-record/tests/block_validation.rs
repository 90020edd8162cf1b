//! Blocks read from disk must satisfy the same invariants as blocks built in memory

use ndarray::{array, Array2};
use serde::Serialize;
use spyn_record::block_file::{calculate_checksum, decode_block, encode_block, BLOCK_FILE_VERSION};
use spyn_record::{magic, AnalogSignal, Block, NeuronId, RecordError, Segment, SpikeTrain};
use std::collections::BTreeMap;

// Field-for-field copies of the stored layout, without the constructor checks.

#[derive(Serialize)]
struct StoredTrain {
    source: NeuronId,
    times: Vec<f64>,
    t_start: f64,
    t_stop: f64,
}

#[derive(Serialize)]
struct StoredSignal {
    name: String,
    units: String,
    sampling_period: f64,
    t_start: f64,
    channels: Vec<NeuronId>,
    data: Array2<f64>,
}

#[derive(Serialize)]
struct StoredSegment {
    index: usize,
    spiketrains: Vec<StoredTrain>,
    analogsignals: Vec<StoredSignal>,
}

#[derive(Serialize)]
struct StoredBlock {
    name: String,
    segments: Vec<StoredSegment>,
    annotations: BTreeMap<String, String>,
}

fn frame(block: &StoredBlock) -> Vec<u8> {
    let payload = bincode::serialize(block).unwrap();
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&magic::NBLK);
    bytes.extend_from_slice(&BLOCK_FILE_VERSION.to_le_bytes());
    bytes.extend_from_slice(&calculate_checksum(&payload).to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&payload);
    bytes
}

fn stored(spiketrains: Vec<StoredTrain>, analogsignals: Vec<StoredSignal>) -> StoredBlock {
    StoredBlock {
        name: "synfire".to_string(),
        segments: vec![StoredSegment {
            index: 0,
            spiketrains,
            analogsignals,
        }],
        annotations: BTreeMap::new(),
    }
}

fn voltage(channels: Vec<NeuronId>, data: Array2<f64>) -> StoredSignal {
    StoredSignal {
        name: "v".to_string(),
        units: "mV".to_string(),
        sampling_period: 1.0,
        t_start: 0.0,
        channels,
        data,
    }
}

#[test]
fn stored_layout_matches_block_encoding() {
    let mut block = Block::new("synfire");
    let mut segment = Segment::new(0);
    segment
        .spiketrains
        .push(SpikeTrain::new(NeuronId::new(0), vec![3.0], 0.0, 10.0).unwrap());
    segment.analogsignals.push(
        AnalogSignal::new("v", "mV", 1.0, 0.0, vec![NeuronId::new(0)], array![[-65.0], [-60.0]]).unwrap(),
    );
    block.segments.push(segment);

    let copy = stored(
        vec![StoredTrain {
            source: NeuronId::new(0),
            times: vec![3.0],
            t_start: 0.0,
            t_stop: 10.0,
        }],
        vec![voltage(vec![NeuronId::new(0)], array![[-65.0], [-60.0]])],
    );
    assert_eq!(frame(&copy), encode_block(&block).unwrap());
    assert_eq!(decode_block(&frame(&copy)).unwrap(), block);
}

#[test]
fn channel_count_mismatch_is_rejected() {
    let bytes = frame(&stored(
        Vec::new(),
        vec![voltage(
            vec![NeuronId::new(0), NeuronId::new(1)],
            array![[-65.0], [-60.0]],
        )],
    ));
    let err = decode_block(&bytes).unwrap_err();
    assert!(matches!(err, RecordError::Codec { .. }), "got {:?}", err);
    assert!(err.to_string().contains("1 data columns for 2 channels"));
}

#[test]
fn non_finite_spike_time_is_rejected() {
    let bytes = frame(&stored(
        vec![StoredTrain {
            source: NeuronId::new(4),
            times: vec![f64::NAN],
            t_start: 0.0,
            t_stop: 10.0,
        }],
        Vec::new(),
    ));
    let err = decode_block(&bytes).unwrap_err();
    assert!(err.to_string().contains("Invalid spike times for neuron 4"), "got {}", err);
}

#[test]
fn unsorted_spike_times_are_rejected() {
    let bytes = frame(&stored(
        vec![StoredTrain {
            source: NeuronId::new(1),
            times: vec![5.0, 2.0],
            t_start: 0.0,
            t_stop: 10.0,
        }],
        Vec::new(),
    ));
    assert!(decode_block(&bytes).is_err());
}
