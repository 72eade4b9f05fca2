// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Maximum-weight matching schedulers.
//!
//! Every non-empty virtual output queue gets a weight and the
//! [`AssignmentSolver`] finds the admission with the largest total weight.
//! Fabric lines are the columns so an output with several lines can take
//! several inputs.

use std::rc::Rc;

use clap::Parser;
use xbar_engine::admission::{AdmissionMatrix, Grant, QueueKind};
use xbar_engine::switch::{Queues, SwitchConfig};
use xbar_engine::traits::Schedule;
use xbar_engine::types::SimError;
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::trace;

use crate::assignment::AssignmentSolver;
use crate::options::{self, NoOptions};
use crate::requests::RequestMatrix;
use crate::stats::MatchStats;

/// How the weight of a virtual output queue is computed.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WeightPolicy {
    /// Longest queue first: the number of cells queued.
    #[default]
    Lqf,

    /// Oldest cell first: the age of the oldest head-of-line cell.
    Ocf,

    /// Longest port first: input occupancy plus output demand.
    Lpf,

    /// A weighted sum of age, length and priority.
    Mixed,
}

#[derive(Parser, Debug)]
#[command(about = "Maximum-weight matching")]
pub struct MaxWeightOptions {
    /// How queues are weighted.
    #[arg(short, long, value_enum, default_value_t)]
    pub weight: WeightPolicy,

    /// Multiplier of the head-of-line age in the `mixed` weight.
    #[arg(long, default_value_t = 1)]
    pub age_factor: i64,

    /// Multiplier of the queue length in the `mixed` weight.
    #[arg(long, default_value_t = 1)]
    pub length_factor: i64,

    /// Multiplier of the priority bonus in the `mixed` weight.
    #[arg(long, default_value_t = 0)]
    pub priority_factor: i64,
}

/// The parameters of a weight computation.
#[derive(Clone, Copy, Debug)]
pub struct Weighting {
    pub policy: WeightPolicy,
    pub age_factor: i64,
    pub length_factor: i64,
    pub priority_factor: i64,
}

impl Weighting {
    #[must_use]
    pub fn simple(policy: WeightPolicy) -> Self {
        Self {
            policy,
            age_factor: 1,
            length_factor: 1,
            priority_factor: 0,
        }
    }

    /// Weight of the cells queued at `input` for `output` at the given
    /// priority level (or all levels). Empty queues have no weight and
    /// non-empty queues always weigh at least 1.
    #[must_use]
    pub fn weight(
        &self,
        queues: &Queues,
        input: usize,
        output: usize,
        level: Option<usize>,
    ) -> Option<i64> {
        let (length, priority, age) = match level {
            Some(p) => {
                let queue = queues.unicast(input, output, p);
                let head = queue.head()?;
                (queue.len(), p, head.age(queues.now()))
            }
            None => {
                let priority = queues.highest_unicast_priority(input, output)?;
                let age = queues.unicast_hol_age(input, output).unwrap_or(0);
                (queues.voq_len(input, output), priority, age)
            }
        };
        let num_priorities = queues.config().num_priorities;
        let weight = match self.policy {
            WeightPolicy::Lqf => length as i64,
            WeightPolicy::Ocf => age as i64 + 1,
            WeightPolicy::Lpf => (queues.input_occupancy(input) + queues.output_demand(output)) as i64,
            WeightPolicy::Mixed => {
                self.age_factor * age as i64
                    + self.length_factor * length as i64
                    + self.priority_factor * (num_priorities - priority) as i64
            }
        };
        Some(weight.max(1))
    }
}

#[derive(EntityGet, EntityDisplay)]
pub struct MaxWeight {
    pub entity: Rc<Entity>,
    config: SwitchConfig,
    weighting: Weighting,
    per_priority: bool,
    requests: RequestMatrix,
    solver: AssignmentSolver,
    stats: MatchStats,
    total_weight: i64,
}

impl MaxWeight {
    /// A scheduler with a fixed weight policy and no options.
    pub fn preset(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        args: &[String],
        policy: WeightPolicy,
    ) -> Result<Self, SimError> {
        let _: NoOptions = options::parse(name, args)?;
        Ok(Self::build(parent, name, config, Weighting::simple(policy), false))
    }

    /// A scheduler configured by [`MaxWeightOptions`]. With `per_priority`
    /// each priority level is matched in turn, highest first.
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        args: &[String],
        per_priority: bool,
    ) -> Result<Self, SimError> {
        let options: MaxWeightOptions = options::parse(name, args)?;
        if options.age_factor < 0 || options.length_factor < 0 || options.priority_factor < 0 {
            return Err(SimError(format!(
                "{name}: weight factors must not be negative\n{}",
                options::usage::<MaxWeightOptions>(name)
            )));
        }
        let weighting = Weighting {
            policy: options.weight,
            age_factor: options.age_factor,
            length_factor: options.length_factor,
            priority_factor: options.priority_factor,
        };
        Ok(Self::build(parent, name, config, weighting, per_priority))
    }

    fn build(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        weighting: Weighting,
        per_priority: bool,
    ) -> Self {
        let num_lines = config.num_lines();
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            config: *config,
            weighting,
            per_priority,
            requests: RequestMatrix::new(config.num_inputs, num_lines),
            solver: AssignmentSolver::new(config.num_inputs.max(num_lines)),
            stats: MatchStats::default(),
            total_weight: 0,
        }
    }

    /// Total weight admitted since the last statistics reset.
    #[must_use]
    pub fn total_weight(&self) -> i64 {
        self.total_weight
    }

    fn match_level(
        &mut self,
        queues: &Queues,
        admission: &mut AdmissionMatrix,
        level: Option<usize>,
    ) -> usize {
        let lines_per_output = self.config.lines_per_output;
        let weighting = self.weighting;
        self.requests.fill(|input, line| {
            if admission.line(line).is_some() || admission.is_input_matched(input) {
                return None;
            }
            weighting.weight(queues, input, line / lines_per_output, level)
        });

        let requests = &self.requests;
        let matching = self.solver.solve(requests.rows(), requests.cols(), |r, c| {
            requests.weight(r, c)
        });

        let mut admitted = 0;
        for (input, line) in matching.iter().enumerate() {
            let Some(line) = *line else {
                continue;
            };
            // Zero weight padding edges are not requests
            if !requests.has(input, line) {
                continue;
            }
            let output = line / lines_per_output;
            let priority = match level {
                Some(p) => Some(p),
                None => queues.highest_unicast_priority(input, output),
            };
            let Some(priority) = priority else {
                continue;
            };
            let grant = Grant {
                input,
                kind: QueueKind::Unicast,
                priority,
            };
            if admission.admit_on_line(line, grant) {
                trace!(self.entity ; "{input} -> {output} weight {}", requests.weight(input, line));
                self.total_weight += requests.weight(input, line);
                admitted += 1;
            }
        }
        admitted
    }
}

impl Schedule for MaxWeight {
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix) {
        let admitted = if self.per_priority {
            (0..self.config.num_priorities)
                .map(|p| self.match_level(queues, admission, Some(p)))
                .sum()
        } else {
            self.match_level(queues, admission, None)
        };
        let levels = if self.per_priority {
            self.config.num_priorities
        } else {
            1
        };
        self.stats.record(admitted, levels);
    }

    fn init_stats(&mut self) {
        self.stats.reset();
        self.total_weight = 0;
    }

    fn report_stats(&self) -> Vec<(String, f64)> {
        let mut stats = self.stats.report();
        let execs = self.stats.execs().max(1) as f64;
        stats.push(("mean weight".to_string(), self.total_weight as f64 / execs));
        stats
    }
}
