// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Helpers to drive schedulers directly, without an engine.

use std::rc::Rc;

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use xbar_engine::admission::{AdmissionMatrix, QueueKind};
use xbar_engine::cell::{Cell, Destination, OutputSet};
use xbar_engine::sim_error;
use xbar_engine::stats::SwitchStats;
use xbar_engine::switch::{Queues, Switch, SwitchConfig};
use xbar_engine::traits::Schedule;
use xbar_engine::types::{SimError, SimResult, Tick};
use xbar_track::Id;
use xbar_track::entity::{Entity, toplevel};
use xbar_track::test_helpers::create_tracker;

/// A switch with the statistics needed to move cells through it.
pub struct TestSwitch {
    pub top: Rc<Entity>,
    pub switch: Switch,
    pub stats: SwitchStats,
    next_id: u64,
}

impl TestSwitch {
    /// Create a switch whose tracker writes to `traces/<test file stem>.log`.
    #[must_use]
    pub fn new(full_filepath: &str, config: SwitchConfig) -> Self {
        let tracker = create_tracker(full_filepath);
        Self::with_top(toplevel(&tracker, "top"), config)
    }

    /// Create a switch below an existing top-level entity.
    #[must_use]
    pub fn with_top(top: Rc<Entity>, config: SwitchConfig) -> Self {
        let switch = Switch::new(&top, "switch", config);
        Self {
            top,
            stats: SwitchStats::new(&config),
            switch,
            next_id: 1,
        }
    }

    #[must_use]
    pub fn config(&self) -> SwitchConfig {
        *self.switch.config()
    }

    #[must_use]
    pub fn queues(&self) -> &Queues {
        self.switch.queues()
    }

    #[must_use]
    pub fn now(&self) -> Tick {
        self.switch.queues().now()
    }

    /// Queue a cell at `input`.
    pub fn push(&mut self, input: usize, destination: Destination, priority: usize) {
        let id = Id(self.next_id);
        self.next_id += 1;
        let cell = Cell::new(id, input, destination, priority, self.now());
        self.switch.enqueue(cell).unwrap();
    }

    /// Queue `count` unicast cells from `input` to `output`.
    pub fn push_unicast(&mut self, input: usize, output: usize, priority: usize, count: usize) {
        for _ in 0..count {
            self.push(input, Destination::Unicast(output), priority);
        }
    }

    /// Give every virtual output queue a cell with probability `density`, at
    /// a random priority.
    pub fn fill_unicast(&mut self, rng: &mut Xoshiro256PlusPlus, density: f64) {
        let config = self.config();
        for input in 0..config.num_inputs {
            for output in 0..config.num_outputs {
                if rng.random_bool(density) {
                    let priority = rng.random_range(0..config.num_priorities);
                    self.push(input, Destination::Unicast(output), priority);
                }
            }
        }
    }

    /// Give every input a multicast cell with probability `density`. Each
    /// output is a destination with probability one half, and there is at
    /// least one.
    pub fn fill_multicast(&mut self, rng: &mut Xoshiro256PlusPlus, density: f64) {
        let config = self.config();
        for input in 0..config.num_inputs {
            if !rng.random_bool(density) {
                continue;
            }
            let mut outputs = OutputSet::new(config.num_outputs);
            for output in 0..config.num_outputs {
                if rng.random_bool(0.5) {
                    outputs.insert(output);
                }
            }
            if outputs.is_empty() {
                outputs.insert(rng.random_range(0..config.num_outputs));
            }
            let priority = rng.random_range(0..config.num_priorities);
            self.push(input, Destination::Multicast(outputs), priority);
        }
    }

    /// Run one scheduling tick: schedule, check the admission, transfer and
    /// empty the output queues. Returns the number of cells transferred.
    pub fn step(&mut self, scheduler: &mut dyn Schedule) -> Result<usize, SimError> {
        self.switch.schedule(scheduler);
        check_admission(self.switch.queues(), self.switch.admission())?;
        let moved = self.switch.transfer(&mut self.stats)?;
        scheduler.check_state(self.switch.queues())?;

        let config = self.config();
        let now = self.now();
        let queues = self.switch.queues_mut();
        for output in 0..config.num_outputs {
            for priority in 0..config.num_priorities {
                while queues.output_mut(output, priority).pop(now).is_some() {}
            }
        }
        self.switch.set_now(now + 1);
        Ok(moved)
    }
}

/// Check that an admission is well formed and only admits cells that are
/// waiting.
pub fn check_admission(queues: &Queues, admission: &AdmissionMatrix) -> SimResult {
    admission.validate()?;
    for (line, grant) in admission.grants() {
        let output = admission.output_of_line(line);
        let waiting = match grant.kind {
            QueueKind::Unicast => !queues
                .unicast(grant.input, output, grant.priority)
                .is_empty(),
            QueueKind::Multicast => queues
                .multicast(grant.input, grant.priority)
                .head()
                .is_some_and(|cell| cell.destination.includes(output)),
        };
        if !waiting {
            return sim_error!(format!("line {line}: nothing waiting for grant {grant}"));
        }
    }
    Ok(())
}
