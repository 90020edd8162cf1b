use proptest::prelude::*;
use spyn_record::legacy;
use spyn_record::spike_checker::{synfire_spike_checker, SpikeChecker};
use spyn_runtime::{
    run_synfire, skip_on_transient, InputSource, NeuronParameter, Outcome, ParameterChange,
    Recording, RetryPolicy, RuntimeError, SynfireConfig,
};

fn runs(run_times: &[f64]) -> SynfireConfig {
    SynfireConfig::with_run_times(run_times.to_vec())
}

#[test]
fn five_seconds_wraps_to_263_spikes() {
    let runner = run_synfire(&runs(&[5000.0])).unwrap();
    let spikes = runner.spikes(0).unwrap();
    assert_eq!(spikes.nrows(), 263);
    synfire_spike_checker(spikes, 200).unwrap();
}

#[test]
fn one_second_gives_53_spikes() {
    let runner = run_synfire(&SynfireConfig::default()).unwrap();
    assert_eq!(runner.spikes(0).unwrap().nrows(), 53);
    assert_eq!(runner.runs_extracted(), 1);
    let block = runner.output_block().unwrap();
    assert_eq!(block.name, "synfire");
    assert_eq!(block.segments.len(), 1);
}

// The first spike lands at 3 ms and each hop takes 19 ms, so a span of
// `d` ms holds (d + 15) / 19 spikes. Time restarts after a reset, so the
// second segment repeats the first 53 rather than growing.
#[test]
fn reset_starts_a_second_segment() {
    let config = SynfireConfig {
        reset: true,
        ..runs(&[1000.0, 1000.0])
    };
    let runner = run_synfire(&config).unwrap();
    assert_eq!(runner.runs_extracted(), 2);
    assert_eq!(runner.spikes(0).unwrap().nrows(), 53);
    assert_eq!(runner.spikes(1).unwrap().nrows(), 53);
    assert_eq!(runner.spikes(0).unwrap(), runner.spikes(1).unwrap());

    let block = runner.output_block().unwrap();
    assert_eq!(block.segments.len(), 2);
    assert_eq!(block.segments[1].spike_count(), 53);
}

// Without a reset the wavefront keeps going: 2000 ms holds (2000 + 15) / 19 = 106.
#[test]
fn continued_runs_extract_cumulative_spikes() {
    let runner = run_synfire(&runs(&[1000.0, 1000.0])).unwrap();
    assert_eq!(runner.spikes(0).unwrap().nrows(), 53);
    assert_eq!(runner.spikes(1).unwrap().nrows(), 106);
    synfire_spike_checker(runner.spikes(1).unwrap(), 200).unwrap();
}

#[test]
fn extracting_at_the_end_yields_one_entry_per_segment() {
    let config = SynfireConfig {
        reset: true,
        extract_between_runs: false,
        ..runs(&[1000.0, 500.0])
    };
    let runner = run_synfire(&config).unwrap();
    assert_eq!(runner.runs_extracted(), 2);
    assert_eq!(runner.spikes(0).unwrap().nrows(), 53);
    assert_eq!(runner.spikes(1).unwrap().nrows(), 27);

    let config = SynfireConfig {
        extract_between_runs: false,
        ..runs(&[1000.0, 500.0])
    };
    let runner = run_synfire(&config).unwrap();
    assert_eq!(runner.runs_extracted(), 1);
    assert_eq!(runner.spikes(0).unwrap().nrows(), 79);
}

#[test]
fn without_wrap_around_each_neuron_fires_once() {
    let config = SynfireConfig {
        use_wrap_around_connections: false,
        ..runs(&[5000.0])
    };
    let runner = run_synfire(&config).unwrap();
    let spikes = runner.spikes(0).unwrap();
    assert_eq!(spikes.nrows(), 200);
    SpikeChecker::new()
        .check_multiple_lines(spikes, 200, 1, false)
        .unwrap();
}

#[test]
fn without_ring_connections_only_the_first_neuron_fires() {
    let config = SynfireConfig {
        use_spike_connections: false,
        ..Default::default()
    };
    let runner = run_synfire(&config).unwrap();
    let spikes = runner.spikes(0).unwrap();
    assert_eq!(spikes.nrows(), 1);
    assert_eq!((spikes[[0, 0]], spikes[[0, 1]]), (0.0, 3.0));
}

#[test]
fn new_population_is_recorded_from_the_second_run() {
    let config = SynfireConfig {
        reset: true,
        new_pop: true,
        ..runs(&[1000.0, 1000.0])
    };
    let runner = run_synfire(&config).unwrap();
    let second = runner.second_block().unwrap();
    assert_eq!(second.name, "synfire_2");
    assert_eq!(second.segments.len(), 2);
    assert_eq!(second.segments[0].spike_count(), 0);
    assert_eq!(second.segments[1].spike_count(), 53);
    assert_eq!(runner.spikes(1).unwrap().nrows(), 53);
}

#[test]
fn per_run_input_times() {
    let config = SynfireConfig {
        reset: true,
        input: InputSource::ArrayPerRun {
            spike_times_list: vec![vec![0.0], vec![50.0]],
        },
        record_input_spikes: true,
        ..runs(&[100.0, 100.0])
    };
    let runner = run_synfire(&config).unwrap();
    let first: Vec<f64> = runner.spikes(0).unwrap().column(1).to_vec();
    let second: Vec<f64> = runner.spikes(1).unwrap().column(1).to_vec();
    assert_eq!(first, vec![3.0, 22.0, 41.0, 60.0, 79.0, 98.0]);
    assert_eq!(second, vec![53.0, 72.0, 91.0]);
    assert_eq!(runner.input_spikes(1).unwrap()[[0, 1]], 50.0);
    assert_eq!(runner.input_block().unwrap().segments.len(), 2);
}

#[test]
fn parameters_change_between_runs() {
    let config = SynfireConfig {
        reset: true,
        set_between_runs: vec![ParameterChange {
            run: 1,
            parameter: NeuronParameter::IOffset,
            value: 1.0,
        }],
        ..runs(&[1000.0, 1000.0])
    };
    let runner = run_synfire(&config).unwrap();
    assert_eq!(runner.spikes(0).unwrap().nrows(), 53);
    assert!(runner.spikes(1).unwrap().nrows() > 10 * 53);
}

#[test]
fn voltage_is_sampled_at_the_requested_interval() {
    let config = SynfireConfig {
        v: Recording::Extract,
        gsyn_exc: Recording::Record,
        v_sampling_interval: Some(10),
        ..runs(&[100.0])
    };
    let runner = run_synfire(&config).unwrap();
    let v = runner.v(0).unwrap();
    assert_eq!(v.dim(), (200 * 10, 3));
    assert!(matches!(runner.gsyn_exc(0), Err(RuntimeError::InvalidState { .. })));

    let segment = &runner.output_block().unwrap().segments[0];
    assert_eq!(segment.filter_signal("v").unwrap().sampling_period(), 10.0);
    assert!(segment.filter_signal("gsyn_exc").is_some());
}

#[test]
fn dumps_are_written_per_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let config = SynfireConfig {
        reset: true,
        spikes: Recording::Dump {
            path: dir.path().join("spikes.txt"),
        },
        ..runs(&[1000.0, 1000.0])
    };
    run_synfire(&config).unwrap();

    for name in ["spikes_0.txt", "spikes_1.txt"] {
        let spikes = legacy::read_spikes(dir.path().join(name)).unwrap();
        assert_eq!(spikes.nrows(), 53);
        synfire_spike_checker(&spikes, 200).unwrap();
    }
}

#[test]
fn gsyn_dump_merges_both_currents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gsyn.txt");
    let config = SynfireConfig {
        n_neurons: 20,
        gsyn_exc: Recording::Dump { path: path.clone() },
        gsyn_inh: Recording::Dump { path: path.clone() },
        ..runs(&[50.0])
    };
    let runner = run_synfire(&config).unwrap();
    assert_eq!(runner.gsyn_exc(0).unwrap().nrows(), 20 * 50);

    let rows = legacy::read_rows(&path).unwrap();
    assert_eq!(rows.dim(), (20 * 50, 3));
    assert!(rows.column(1).iter().all(|&inh| inh == 0.0));
}

#[test]
fn invalid_configuration_fails_before_simulating() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("spikes.txt");
    let config = SynfireConfig {
        reset: true,
        spikes: Recording::Dump { path: path.clone() },
        ..Default::default()
    };
    assert!(matches!(
        run_synfire(&config),
        Err(RuntimeError::NotImplemented { .. })
    ));
    assert!(!path.exists());
}

#[test]
fn random_initial_potentials_are_reproducible() {
    let config = SynfireConfig {
        randomise_v_init: true,
        seed: Some(11),
        ..Default::default()
    };
    let first = run_synfire(&config).unwrap();
    let second = run_synfire(&config).unwrap();
    assert_eq!(first.spikes(0).unwrap(), second.spikes(0).unwrap());
    assert!(first.spikes(0).unwrap().nrows() > 0);
}

#[test]
fn weights_and_delays_follow_the_ring() {
    let config = SynfireConfig {
        get_weights: true,
        get_delays: true,
        ..runs(&[10.0])
    };
    let runner = run_synfire(&config).unwrap();
    let weights = runner.weights(0).unwrap();
    assert_eq!(weights.len(), 200);
    assert!(weights.contains(&(199, 0, 2.0)));
    assert!(runner.delays(0).unwrap().iter().all(|&(_, _, d)| d == 17.0));
}

#[test]
fn timeout_becomes_a_skip() {
    let config = SynfireConfig {
        run_timeout_ms: Some(0),
        ..runs(&[5000.0])
    };
    let policy = RetryPolicy::default().with_max_tries(2);
    let outcome = skip_on_transient(policy.run_safe("synfire", || run_synfire(&config))).unwrap();
    assert!(matches!(outcome, Outcome::Skipped { .. }));
}

#[test]
fn config_loads_from_toml() {
    let text = r#"
        n_neurons = 100
        run_times = [1000.0, 1000.0]
        reset = true
        get_weights = true
        v = { dump = { path = "v.txt" } }
        v_sampling_interval = 5

        [input]
        type = "array"
        spike_times = [0.0]

        [[set_between_runs]]
        run = 1
        parameter = "tau_refrac"
        value = 3.0
    "#;
    let config: SynfireConfig = toml::from_str(text).unwrap();
    assert_eq!(config.n_neurons, 100);
    assert_eq!(config.delay, 17.0);
    assert!(config.reset);
    assert_eq!(config.v.dump_path().unwrap().to_str(), Some("v.txt"));
    assert_eq!(config.set_between_runs[0].parameter, NeuronParameter::TauRefrac);
    assert!(config.validate().is_ok());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_ring_hops_every_19ms(n in 2usize..40, duration in 4u32..400) {
        let config = SynfireConfig {
            n_neurons: n,
            ..runs(&[duration as f64])
        };
        let runner = run_synfire(&config).unwrap();
        let spikes = runner.spikes(0).unwrap();
        let expected = (duration as usize - 3 + 18) / 19;
        prop_assert_eq!(spikes.nrows(), expected);
        prop_assert!(synfire_spike_checker(spikes, n).is_ok());
    }
}
