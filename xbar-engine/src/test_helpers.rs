// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Simple engine parts for tests.

use std::collections::VecDeque;

use xbar_track::test_helpers::create_tracker;

use crate::admission::AdmissionMatrix;
use crate::cell::{Cell, Destination};
use crate::engine::{Engine, EngineConfig};
use crate::switch::{Queues, SwitchConfig};
use crate::traits::{Arrival, Egress, Generate, Schedule};
use crate::types::Tick;

/// Create an engine whose tracker writes to `traces/<test file stem>.log`.
#[must_use]
pub fn start_test(full_filepath: &str, config: EngineConfig, switch_config: SwitchConfig) -> Engine {
    Engine::new(&create_tracker(full_filepath), config, switch_config).unwrap()
}

/// A scheduler that never admits anything.
pub struct IdleScheduler;

impl Schedule for IdleScheduler {
    fn exec(&mut self, _queues: &Queues, _admission: &mut AdmissionMatrix) {}
}

/// A scheduler that admits the first unicast head-of-line cell found for
/// each output, scanning inputs in order.
pub struct GreedyScheduler;

impl Schedule for GreedyScheduler {
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix) {
        let config = queues.config();
        for output in 0..config.num_outputs {
            for input in 0..config.num_inputs {
                if admission.is_input_matched(input) {
                    continue;
                }
                if let Some(priority) = queues.highest_unicast_priority(input, output) {
                    admission.admit_unicast(input, output, priority);
                    break;
                }
            }
        }
    }
}

/// Remove the first cell, highest priority first, from each output.
pub struct DrainOne;

impl Egress for DrainOne {
    fn egress(&mut self, queues: &mut Queues, output: usize) -> Vec<Cell> {
        let now = queues.now();
        (0..queues.config().num_priorities)
            .find_map(|p| queues.output_mut(output, p).pop(now))
            .into_iter()
            .collect()
    }
}

/// A generator replaying a fixed list of (tick, output) unicast arrivals.
pub struct ScriptedGenerator {
    script: VecDeque<(Tick, usize)>,
}

impl ScriptedGenerator {
    #[must_use]
    pub fn new(script: &[(Tick, usize)]) -> Self {
        Self {
            script: script.iter().copied().collect(),
        }
    }
}

impl Generate for ScriptedGenerator {
    fn generate(&mut self, tick: Tick) -> Option<Arrival> {
        match self.script.front() {
            Some((at, output)) if *at == tick => {
                let output = *output;
                self.script.pop_front();
                Some(Arrival {
                    destination: Destination::Unicast(output),
                    priority: 0,
                })
            }
            _ => None,
        }
    }
}

/// A generator that sends a cell to the same output every traffic tick.
pub struct Saturate {
    pub output: usize,
}

impl Generate for Saturate {
    fn generate(&mut self, _tick: Tick) -> Option<Arrival> {
        Some(Arrival {
            destination: Destination::Unicast(self.output),
            priority: 0,
        })
    }
}
