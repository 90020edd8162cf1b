use ndarray::Array2;
use proptest::prelude::*;
use spyn_record::compare::compare_spiketrain;
use spyn_record::convert::{convert_spiketrains, count_spiketrains};
use spyn_record::spike_checker::{SpikeChecker, SpikeOrderError};
use spyn_record::{NeuronId, SpikeTrain};

/// One synfire wavefront: neuron `k % n` fires at `offset + k * period`
fn line(n: usize, spikes: usize, offset: f64, period: f64) -> Vec<(f64, f64)> {
    (0..spikes)
        .map(|k| ((k % n) as f64, offset + k as f64 * period))
        .collect()
}

fn to_array(rows: &[(f64, f64)]) -> Array2<f64> {
    let flat: Vec<f64> = rows.iter().flat_map(|&(id, t)| [id, t]).collect();
    Array2::from_shape_vec((rows.len(), 2), flat).unwrap()
}

fn spike_train_strategy() -> impl Strategy<Value = SpikeTrain> {
    (0u32..500, prop::collection::vec(0.0f64..1000.0, 0..40)).prop_map(|(id, mut times)| {
        times.sort_by(f64::total_cmp);
        SpikeTrain::new(NeuronId::new(id), times, 0.0, 1000.0).unwrap()
    })
}

proptest! {
    #[test]
    fn round_robin_order_passes(n in 1usize..50, laps in 1usize..5, offset in 0.0f64..10.0) {
        let spikes = to_array(&line(n, n * laps, offset, 19.0));
        prop_assert!(SpikeChecker::new().check_single_line(&spikes, n).is_ok());
    }

    #[test]
    fn foreign_neuron_fails(n in 3usize..50, at in 0usize..100) {
        let mut rows = line(n, n * 2, 3.0, 19.0);
        let at = at % rows.len();
        let expected = rows[at].0 as usize;
        rows[at].0 = ((expected + 1) % n) as f64;
        let spikes = to_array(&rows);
        let result = SpikeChecker::new().check_single_line(&spikes, n);
        prop_assert!(
            matches!(result, Err(SpikeOrderError::UnexpectedSpike { .. })),
            "expected an ordering error"
        );
    }

    #[test]
    fn interleaved_lines_pass_and_dropping_one_fails(
        n in 2usize..30,
        k in 2usize..5,
        length in 1usize..60,
    ) {
        // Lines are phase-shifted so that no two spikes share a time.
        let period = (k + 1) as f64;
        let lines: Vec<Vec<(f64, f64)>> = (0..k)
            .map(|i| line(n, length, i as f64 * 0.5, period))
            .collect();

        let all: Vec<(f64, f64)> = lines.iter().flatten().copied().collect();
        let checker = SpikeChecker::new();
        prop_assert!(checker.check_multiple_lines(&to_array(&all), n, k, true).is_ok());

        let without_last: Vec<(f64, f64)> = lines[..k - 1].iter().flatten().copied().collect();
        let result = checker.check_multiple_lines(&to_array(&without_last), n, k, true);
        prop_assert_eq!(result, Err(SpikeOrderError::MissingLines { expected: k }));
    }

    #[test]
    fn flattened_rows_match_spike_count(trains in prop::collection::vec(spike_train_strategy(), 0..20)) {
        let flat = convert_spiketrains(&trains);
        prop_assert_eq!(flat.nrows(), count_spiketrains(&trains));
        prop_assert_eq!(flat.ncols(), 2);
    }

    #[test]
    fn spiketrain_equals_itself(train in spike_train_strategy()) {
        prop_assert!(compare_spiketrain(&train, &train, true).is_ok());
    }

    #[test]
    fn any_accepted_time_compares_equal_to_itself(t in prop_oneof![
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        -10.0f64..1010.0,
    ]) {
        match SpikeTrain::new(NeuronId::new(0), vec![t], 0.0, 1000.0) {
            Ok(train) => {
                prop_assert!(t.is_finite());
                prop_assert!(compare_spiketrain(&train, &train, true).is_ok());
            }
            Err(_) => prop_assert!(!t.is_finite() || !(0.0..=1000.0).contains(&t)),
        }
    }

    #[test]
    fn malformed_neuron_ids_are_rejected(id in prop_oneof![
        Just(f64::NAN),
        Just(f64::INFINITY),
        -100.0f64..-0.5,
        (0u32..50).prop_map(|i| i as f64 + 0.25),
    ]) {
        let spikes = to_array(&[(0.0, 3.0), (id, 22.0)]);
        let result = SpikeChecker::new().check_single_line(&spikes, 50);
        prop_assert!(
            matches!(result, Err(SpikeOrderError::InvalidNeuronId { row: 1, .. })),
            "accepted id {}", id
        );
    }

    #[test]
    fn perturbed_spiketrain_differs(train in spike_train_strategy(), at in 0usize..40, delta in 0.001f64..5.0) {
        prop_assume!(!train.is_empty());
        let at = at % train.len();
        let mut times = train.times().to_vec();
        times[at] += delta;
        times.sort_by(f64::total_cmp);
        let perturbed = SpikeTrain::new(train.source(), times, 0.0, 1005.0).unwrap();
        prop_assert!(compare_spiketrain(&train, &perturbed, true).is_err());
    }
}

#[test]
fn empty_list_converts_to_zero_rows() {
    assert_eq!(convert_spiketrains(&[]).dim(), (0, 2));
}
