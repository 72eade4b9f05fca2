// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

use std::cell::Cell as StdCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use xbar_engine::admission::AdmissionMatrix;
use xbar_engine::cell::Cell;
use xbar_engine::engine::{ConvergenceConfig, EngineConfig, StopReason};
use xbar_engine::switch::{Queues, SwitchConfig};
use xbar_engine::test_helpers::{
    DrainOne, GreedyScheduler, IdleScheduler, Saturate, ScriptedGenerator, start_test,
};
use xbar_engine::traits::{Admit, Schedule};
use xbar_engine::types::SimResult;
use xbar_engine::sim_error;

fn config(run_ticks: u64) -> EngineConfig {
    EngineConfig {
        run_ticks,
        ..EngineConfig::default()
    }
}

#[test]
fn single_cell_crosses_in_one_tick() {
    let mut engine = start_test(file!(), config(5), SwitchConfig::new(2, 2, 1, 1).unwrap());
    engine.add_generator(Box::new(ScriptedGenerator::new(&[(0, 1)])));
    engine.set_scheduler(Box::new(GreedyScheduler));
    engine.set_egress(Box::new(DrainOne));

    let summary = engine.run().unwrap();
    assert_eq!(summary.ticks, 5);
    assert_eq!(summary.stats.arrivals, 1);
    assert_eq!(summary.stats.transfers, 1);
    assert_eq!(summary.stats.departures, 1);
    assert_relative_eq!(summary.stats.latency.mean(), 0.0);
    assert_eq!(engine.switch().queues().total_cells(), 0);
}

#[test]
fn output_contention_queues_cells() {
    let mut engine = start_test(file!(), config(2), SwitchConfig::new(2, 2, 1, 1).unwrap());
    engine.add_generator(Box::new(ScriptedGenerator::new(&[(0, 0)])));
    engine.add_generator(Box::new(ScriptedGenerator::new(&[(0, 0)])));
    engine.set_scheduler(Box::new(GreedyScheduler));
    engine.set_egress(Box::new(DrainOne));

    let summary = engine.run().unwrap();
    assert_eq!(summary.stats.departures, 2);
    // The second cell waits one tick
    assert_eq!(summary.stats.latency.max(), Some(1));
    assert_eq!(summary.stats.queueing_latency.max(), Some(1));
}

#[test]
fn traffic_period_limits_arrivals() {
    let config = EngineConfig {
        run_ticks: 10,
        traffic_period: 2,
        ..EngineConfig::default()
    };
    let mut engine = start_test(file!(), config, SwitchConfig::new(1, 1, 1, 1).unwrap());
    engine.add_generator(Box::new(Saturate { output: 0 }));
    engine.set_scheduler(Box::new(GreedyScheduler));
    engine.set_egress(Box::new(DrainOne));

    let summary = engine.run().unwrap();
    assert_eq!(summary.stats.arrivals, 5);
    assert_eq!(summary.stats.departures, 5);
}

#[test]
fn fabric_period_limits_transfers() {
    let config = EngineConfig {
        run_ticks: 10,
        fabric_period: 2,
        ..EngineConfig::default()
    };
    let mut engine = start_test(file!(), config, SwitchConfig::new(1, 1, 1, 1).unwrap());
    engine.add_generator(Box::new(Saturate { output: 0 }));
    engine.set_scheduler(Box::new(GreedyScheduler));
    engine.set_egress(Box::new(DrainOne));

    let summary = engine.run().unwrap();
    assert_eq!(summary.stats.arrivals, 10);
    assert_eq!(summary.stats.transfers, 5);
    assert_eq!(engine.switch().queues().total_input_cells(), 5);
}

#[test]
fn memory_ceiling_is_fatal() {
    let config = EngineConfig {
        run_ticks: 100,
        max_cells: Some(5),
        ..EngineConfig::default()
    };
    let mut engine = start_test(file!(), config, SwitchConfig::new(1, 1, 1, 1).unwrap());
    engine.add_generator(Box::new(Saturate { output: 0 }));
    engine.set_scheduler(Box::new(IdleScheduler));
    engine.set_egress(Box::new(DrainOne));

    let err = engine.run().unwrap_err();
    assert!(err.0.contains("Memory ceiling exceeded"), "{err}");
    assert_eq!(engine.tick(), 5);
}

#[test]
fn warmup_resets_stats() {
    let config = EngineConfig {
        run_ticks: 10,
        warmup_ticks: 4,
        ..EngineConfig::default()
    };
    let mut engine = start_test(file!(), config, SwitchConfig::new(1, 1, 1, 1).unwrap());
    engine.add_generator(Box::new(Saturate { output: 0 }));
    engine.set_scheduler(Box::new(GreedyScheduler));
    engine.set_egress(Box::new(DrainOne));

    let summary = engine.run().unwrap();
    assert_eq!(summary.stats.start_tick, 4);
    assert_eq!(summary.stats.arrivals, 6);
    assert_relative_eq!(summary.stats.throughput(summary.ticks), 1.0);
}

#[test]
fn convergence_stops_early() {
    let config = EngineConfig {
        run_ticks: 1000,
        convergence: Some(ConvergenceConfig {
            period: 10,
            threshold: 0.01,
            required: 3,
        }),
        ..EngineConfig::default()
    };
    let mut engine = start_test(file!(), config, SwitchConfig::new(1, 1, 1, 1).unwrap());
    engine.add_generator(Box::new(Saturate { output: 0 }));
    engine.set_scheduler(Box::new(GreedyScheduler));
    engine.set_egress(Box::new(DrainOne));

    let summary = engine.run().unwrap();
    assert_eq!(summary.stop_reason, StopReason::Converged);
    assert_eq!(summary.ticks, 40);
}

#[test]
fn missing_parts_are_reported() {
    let mut engine = start_test(file!(), config(5), SwitchConfig::new(1, 1, 1, 1).unwrap());
    assert!(engine.run().is_err());
    engine.set_scheduler(Box::new(IdleScheduler));
    assert!(engine.run().is_err());
    engine.set_egress(Box::new(DrainOne));
    engine.add_generator(Box::new(Saturate { output: 0 }));
    engine.add_generator(Box::new(Saturate { output: 0 }));
    assert!(engine.run().is_err());
}

#[test]
fn zero_period_is_rejected() {
    let config = EngineConfig {
        output_period: 0,
        ..EngineConfig::default()
    };
    assert!(config.validate().is_err());
}

struct RejectAll;

impl Admit for RejectAll {
    fn admit(&mut self, _queues: &Queues, _cell: &Cell) -> bool {
        false
    }
}

#[test]
fn rejected_cells_are_dropped() {
    let mut engine = start_test(file!(), config(10), SwitchConfig::new(1, 1, 1, 1).unwrap());
    engine.add_generator(Box::new(Saturate { output: 0 }));
    engine.set_scheduler(Box::new(GreedyScheduler));
    engine.set_admission(Box::new(RejectAll));
    engine.set_egress(Box::new(DrainOne));

    let summary = engine.run().unwrap();
    assert_eq!(summary.stats.arrivals, 10);
    assert_eq!(summary.stats.drops, 10);
    assert_relative_eq!(summary.stats.drop_rate(), 1.0);
}

/// Admits output 0 for input 0 whether or not there is a cell.
struct Reckless;

impl Schedule for Reckless {
    fn exec(&mut self, _queues: &Queues, admission: &mut AdmissionMatrix) {
        admission.admit_unicast(0, 0, 0);
    }
}

#[test]
fn admitting_empty_queue_is_an_error() {
    let mut engine = start_test(file!(), config(10), SwitchConfig::new(1, 1, 1, 1).unwrap());
    engine.set_scheduler(Box::new(Reckless));
    engine.set_egress(Box::new(DrainOne));
    let err = engine.run().unwrap_err();
    assert!(err.0.starts_with("tick 0: "), "{err}");
}

struct Broken;

impl Schedule for Broken {
    fn exec(&mut self, _queues: &Queues, _admission: &mut AdmissionMatrix) {}

    fn check_state(&self, _queues: &Queues) -> SimResult {
        sim_error!("state corrupted")
    }
}

#[test]
fn check_state_errors_stop_the_run() {
    let config = EngineConfig {
        run_ticks: 100,
        check_state_period: Some(7),
        ..EngineConfig::default()
    };
    let mut engine = start_test(file!(), config, SwitchConfig::new(1, 1, 1, 1).unwrap());
    engine.set_scheduler(Box::new(Broken));
    engine.set_egress(Box::new(DrainOne));

    let err = engine.run().unwrap_err();
    assert_eq!(format!("{err}"), "Error: state corrupted");
    assert_eq!(engine.tick(), 7);
}

#[test]
fn progress_callback_is_periodic() {
    let mut engine = start_test(file!(), config(100), SwitchConfig::new(1, 1, 1, 1).unwrap());
    engine.set_scheduler(Box::new(IdleScheduler));
    engine.set_egress(Box::new(DrainOne));

    let calls = Rc::new(StdCell::new(0));
    let seen = calls.clone();
    engine.on_progress(10, move |_| seen.set(seen.get() + 1));
    engine.run().unwrap();
    assert_eq!(calls.get(), 10);
}
