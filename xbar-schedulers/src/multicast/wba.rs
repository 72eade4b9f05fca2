// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Weight based multicast arbitration.
//!
//! Each input weighs its head multicast cell by how long it has been at the
//! head of line, less a penalty per pending destination, so that old cells
//! win and cells with a small residual fan-out finish quickly. Each free
//! output line grants to the heaviest requesting input. Equal weights go to
//! the first input met scanning from the output's round-robin pointer, and
//! the pointer then moves to one past that input.

use std::rc::Rc;

use clap::Parser;
use xbar_engine::admission::AdmissionMatrix;
use xbar_engine::sim_error;
use xbar_engine::switch::{Queues, SwitchConfig};
use xbar_engine::traits::Schedule;
use xbar_engine::types::{SimError, SimResult};
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::trace;

use super::presented;
use crate::options;
use crate::stats::MatchStats;

#[derive(Parser, Debug)]
#[command(about = "Weight based multicast arbitration")]
pub struct WbaOptions {
    /// Weight of each tick a cell has been at the head of line.
    #[arg(short, long, default_value_t = 1)]
    pub age_factor: i64,

    /// Penalty of each pending destination.
    #[arg(short, long, default_value_t = 1)]
    pub fanout_factor: i64,
}

#[derive(EntityGet, EntityDisplay)]
pub struct Wba {
    pub entity: Rc<Entity>,
    config: SwitchConfig,
    age_factor: i64,
    fanout_factor: i64,
    pointer: Vec<usize>,

    /// Per input, the priority and weight of the head cell this tick.
    weights: Vec<Option<(usize, i64)>>,
    stats: MatchStats,
}

impl Wba {
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        args: &[String],
    ) -> Result<Self, SimError> {
        let options: WbaOptions = options::parse(name, args)?;
        if options.age_factor < 0 || options.fanout_factor < 0 {
            return Err(SimError(format!(
                "{name}: weight factors must not be negative\n{}",
                options::usage::<WbaOptions>(name)
            )));
        }
        Ok(Self {
            entity: Rc::new(Entity::new(parent, name)),
            config: *config,
            age_factor: options.age_factor,
            fanout_factor: options.fanout_factor,
            pointer: vec![0; config.num_outputs],
            weights: vec![None; config.num_inputs],
            stats: MatchStats::default(),
        })
    }

    #[must_use]
    pub fn pointer(&self, output: usize) -> usize {
        self.pointer[output]
    }
}

impl Schedule for Wba {
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix) {
        let num_inputs = self.config.num_inputs;
        let now = queues.now();
        for (input, weight) in self.weights.iter_mut().enumerate() {
            *weight = presented(queues, input).map(|(priority, cell)| {
                let age = now.saturating_sub(cell.stamps.hol_arrival) as i64;
                let fanout = cell.destination.fanout() as i64;
                (priority, self.age_factor * age - self.fanout_factor * fanout)
            });
        }

        let mut admitted = 0;
        for output in 0..self.config.num_outputs {
            // Each line grants independently; an input is only granted once
            // per output.
            while admission.free_lines(output) > 0 {
                let start = self.pointer[output];
                let mut best: Option<(usize, usize, i64)> = None;
                let mut tied = 0;
                for offset in 0..num_inputs {
                    let input = (start + offset) % num_inputs;
                    let Some((priority, weight)) = self.weights[input] else {
                        continue;
                    };
                    let requesting = presented(queues, input)
                        .is_some_and(|(_, cell)| cell.destination.includes(output));
                    let granted = admission
                        .grants()
                        .any(|(l, g)| g.input == input && admission.output_of_line(l) == output);
                    if !requesting || granted {
                        continue;
                    }
                    match best {
                        Some((_, _, w)) if weight < w => {}
                        Some((_, _, w)) if weight == w => tied += 1,
                        _ => {
                            best = Some((input, priority, weight));
                            tied = 1;
                        }
                    }
                }

                let Some((input, priority, weight)) = best else {
                    break;
                };
                if !admission.admit_multicast(input, output, priority) {
                    break;
                }
                trace!(self.entity ; "{input} -> {output} weight {weight}");
                admitted += 1;
                if tied > 1 {
                    self.pointer[output] = (input + 1) % num_inputs;
                }
            }
        }
        self.stats.record(admitted, 1);
    }

    fn init_stats(&mut self) {
        self.stats.reset();
    }

    fn report_stats(&self) -> Vec<(String, f64)> {
        self.stats.report()
    }

    fn report_state(&self) -> String {
        format!("pointers {:?}", self.pointer)
    }

    fn check_state(&self, _queues: &Queues) -> SimResult {
        match self.pointer.iter().find(|p| **p >= self.config.num_inputs) {
            Some(p) => sim_error!(format!("{self}: pointer {p} out of range")),
            None => Ok(()),
        }
    }
}
