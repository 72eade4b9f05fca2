// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use xbar_engine::admission::AdmissionMatrix;
use xbar_engine::cell::{Cell, Destination};
use xbar_engine::engine::EngineConfig;
use xbar_engine::switch::{Queues, SwitchConfig};
use xbar_engine::test_helpers::{
    DrainOne, IdleScheduler, Saturate, ScriptedGenerator, start_test,
};
use xbar_engine::traits::{Egress, Schedule};
use xbar_models::egress::LineRate;
use xbar_models::overflow::{BufferScope, DropTail};
use xbar_track::Id;
use xbar_track::entity::toplevel;
use xbar_track::test_helpers::create_tracker;

fn config(run_ticks: u64) -> EngineConfig {
    EngineConfig {
        run_ticks,
        ..EngineConfig::default()
    }
}

/// Admits every input with a cell for output 0 while lines remain.
struct AllToZero;

impl Schedule for AllToZero {
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix) {
        for input in 0..queues.config().num_inputs {
            if let Some(priority) = queues.highest_unicast_priority(input, 0) {
                admission.admit_unicast(input, 0, priority);
            }
        }
    }
}

#[test]
fn drop_tail_limits_input_buffer() {
    let switch_config = SwitchConfig::new(2, 2, 1, 1).unwrap();
    let mut engine = start_test(file!(), config(10), switch_config);
    let top = engine.top().clone();
    engine.add_generator(Box::new(Saturate { output: 0 }));
    engine.add_generator(Box::new(Saturate { output: 1 }));
    engine.set_scheduler(Box::new(IdleScheduler));
    engine.set_egress(Box::new(DrainOne));
    engine.set_admission(Box::new(DropTail::new(&top, "drop", 3, BufferScope::Input)));

    let summary = engine.run().unwrap();
    assert_eq!(summary.stats.arrivals, 20);
    assert_eq!(summary.stats.drops, 14);
    assert_eq!(engine.switch().queues().input_occupancy(0), 3);
    assert_eq!(engine.switch().queues().input_occupancy(1), 3);
}

#[test]
fn drop_tail_per_queue() {
    let switch_config = SwitchConfig::new(1, 2, 1, 1).unwrap();
    let mut engine = start_test(file!(), config(10), switch_config);
    let top = engine.top().clone();
    engine.add_generator(Box::new(ScriptedGenerator::new(&[
        (0, 0),
        (1, 0),
        (2, 0),
        (3, 1),
        (4, 1),
        (5, 1),
    ])));
    engine.set_scheduler(Box::new(IdleScheduler));
    engine.set_egress(Box::new(DrainOne));
    engine.set_admission(Box::new(DropTail::new(&top, "drop", 2, BufferScope::Queue)));

    let summary = engine.run().unwrap();
    assert_eq!(summary.stats.drops, 2);
    let queues = engine.switch().queues();
    assert_eq!(queues.voq_len(0, 0), 2);
    assert_eq!(queues.voq_len(0, 1), 2);
}

#[test]
fn line_rate_paces_departures() {
    for cells_per_tick in [1, 3] {
        let switch_config = SwitchConfig::new(4, 1, 1, 4).unwrap();
        let mut engine = start_test(file!(), config(10), switch_config);
        let top = engine.top().clone();
        for _ in 0..4 {
            engine.add_generator(Box::new(Saturate { output: 0 }));
        }
        engine.set_scheduler(Box::new(AllToZero));
        engine.set_egress(Box::new(LineRate::new(&top, "egress", cells_per_tick)));

        let summary = engine.run().unwrap();
        assert_eq!(summary.stats.transfers, 40);
        assert_eq!(summary.stats.departures, 10 * cells_per_tick as u64);
        assert_eq!(
            engine.switch().queues().output_occupancy(0),
            40 - 10 * cells_per_tick
        );
    }
}

#[test]
fn line_rate_sends_high_priority_first() {
    let switch_config = SwitchConfig::new(1, 1, 2, 1).unwrap();
    let top = toplevel(&create_tracker(file!()), "top");
    let mut queues = Queues::new(&switch_config);
    let low = Cell::new(Id(1), 0, Destination::Unicast(0), 1, 0);
    let high = Cell::new(Id(2), 0, Destination::Unicast(0), 0, 0);
    queues.output_mut(0, 1).push(low, 0);
    queues.output_mut(0, 0).push(high, 0);

    let mut egress = LineRate::new(&top, "egress", 1);
    let sent = egress.egress(&mut queues, 0);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].id, Id(2));

    let sent = egress.egress(&mut queues, 0);
    assert_eq!(sent[0].id, Id(1));
    assert!(egress.egress(&mut queues, 0).is_empty());
}
