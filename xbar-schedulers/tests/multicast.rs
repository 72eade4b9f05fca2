// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use xbar_engine::admission::AdmissionMatrix;
use xbar_engine::cell::{Destination, OutputSet};
use xbar_engine::switch::SwitchConfig;
use xbar_engine::traits::Schedule;
use xbar_schedulers::multicast::residue::Residue;
use xbar_schedulers::multicast::tatra::Tatra;
use xbar_schedulers::registry::split_options;
use xbar_schedulers::test_helpers::TestSwitch;

fn multicast(num_outputs: usize, outputs: &[usize]) -> Destination {
    Destination::Multicast(OutputSet::from_outputs(num_outputs, outputs.iter().copied()))
}

#[test]
fn tatra_rows_hold_each_input_once_and_drain_in_time() {
    for lines_per_output in [1, 2] {
        let config = SwitchConfig::new(4, 4, 2, lines_per_output).unwrap();
        let mut test = TestSwitch::new(file!(), config);
        let mut tatra = Tatra::new(&test.top, "tatra", &config, &split_options("-d 4")).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(21);
        let depth = tatra.depth();
        let num_lines = config.num_lines();

        let mut scheduled_since = vec![None; config.num_inputs];
        for tick in 0..500 {
            test.fill_multicast(&mut rng, 0.4);
            test.step(&mut tatra).unwrap();

            let mut has_blocks = vec![false; config.num_inputs];
            for row in 0..depth {
                for output in 0..config.num_outputs {
                    let lines = output * lines_per_output..(output + 1) * lines_per_output;
                    let mut seen = Vec::new();
                    for line in lines {
                        if let Some(input) = tatra.scheduled(line, row) {
                            assert!(
                                !seen.contains(&input),
                                "input {input} twice in row {row} of output {output}"
                            );
                            seen.push(input);
                            has_blocks[input] = true;
                        }
                    }
                }
            }
            for line in 0..num_lines {
                assert!(tatra.height(line) <= depth);
            }

            for (input, blocks) in has_blocks.iter().enumerate() {
                if !blocks {
                    scheduled_since[input] = None;
                    continue;
                }
                let since = *scheduled_since[input].get_or_insert(tick);
                assert!(
                    tick - since < depth,
                    "input {input} waiting since {since} at {tick}"
                );
            }
        }
        assert!(test.stats.transfers > 0);
    }
}

#[test]
fn tatra_drops_cells_on_top_of_stacks() {
    let config = SwitchConfig::new(3, 3, 1, 1).unwrap();
    let mut test = TestSwitch::new(file!(), config);
    test.push(0, multicast(3, &[0, 1]), 0);
    test.push(1, multicast(3, &[1, 2]), 0);
    test.push(2, multicast(3, &[0, 2]), 0);

    let mut tatra = Tatra::new(&test.top, "tatra", &config, &[]).unwrap();
    let mut admission = AdmissionMatrix::new(&config);
    tatra.exec(test.queues(), &mut admission);

    // Input 0 lands on the floor of columns 0 and 1, input 1 on top of it in
    // column 1 and on the floor of column 2, input 2 on top in 0 and 2.
    assert_eq!(tatra.scheduled(0, 0), Some(2));
    assert_eq!(tatra.scheduled(1, 0), Some(1));
    assert_eq!(tatra.scheduled(2, 0), Some(2));
    assert_eq!(tatra.height(0), 1);
    assert_eq!(tatra.height(1), 1);
    assert_eq!(tatra.height(2), 1);
    let mut pairs = admission.pairs();
    pairs.sort_unstable();
    assert_eq!(pairs, vec![(0, 0), (0, 1), (1, 2)]);
}

#[test]
fn residue_allocates_widest_cover_first() {
    let config = SwitchConfig::new(3, 4, 1, 1).unwrap();
    let mut test = TestSwitch::new(file!(), config);
    test.push(0, multicast(4, &[0]), 0);
    test.push(1, multicast(4, &[0, 1, 2]), 0);
    test.push(2, multicast(4, &[2, 3]), 0);

    let mut residue = Residue::new(&test.top, "residue", &config, &[], 0).unwrap();
    let mut admission = AdmissionMatrix::new(&config);
    residue.exec(test.queues(), &mut admission);

    // Input 1 covers three outputs, then input 2 covers output 3 only and
    // input 0 covers nothing.
    let mut pairs = admission.pairs();
    pairs.sort_unstable();
    assert_eq!(pairs, vec![(1, 0), (1, 1), (1, 2), (2, 3)]);
    admission.validate().unwrap();
}

#[test]
fn fanout_split_cells_finish_later() {
    let config = SwitchConfig::new(2, 4, 1, 1).unwrap();
    let mut test = TestSwitch::new(file!(), config);
    test.push(0, multicast(4, &[0, 1, 2]), 0);
    test.push(1, multicast(4, &[2, 3]), 0);

    let mut residue = Residue::new(&test.top, "residue", &config, &[], 0).unwrap();
    assert_eq!(test.step(&mut residue).unwrap(), 4);
    // Input 1 only got output 3 and still has output 2 pending
    assert_eq!(test.queues().multicast(0, 0).len(), 0);
    let head = test.queues().multicast(1, 0).head().unwrap();
    assert_eq!(head.destination, multicast(4, &[2]));

    assert_eq!(test.step(&mut residue).unwrap(), 1);
    assert_eq!(test.queues().total_input_cells(), 0);
}
