// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Iterative grant/accept matching.
//!
//! Each iteration has two steps:
//!  - grant: every output with a free line picks one of the unmatched inputs
//!    requesting it.
//!  - accept: every input that received grants picks one of them and the pair
//!    is admitted.
//!
//! The pick is made by a [`SelectPolicy`]. Round-robin pointers only move
//! for pairs accepted in the first iteration, to one past the accepted
//! port, which desynchronises the outputs under heavy load. The iterations
//! stop early when one adds no new pair.
//!
//! The priority-stratified variant runs the whole process once per priority
//! level, highest first, and a port matched at one level is not available
//! at the lower ones.

use std::fmt::Write;
use std::rc::Rc;

use clap::Parser;
use rand::seq::IndexedRandom;
use rand_xoshiro::Xoshiro256PlusPlus;
use xbar_engine::admission::AdmissionMatrix;
use xbar_engine::rng::component_rng;
use xbar_engine::sim_error;
use xbar_engine::switch::{Queues, SwitchConfig};
use xbar_engine::traits::Schedule;
use xbar_engine::types::{SimError, SimResult};
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::trace;

use crate::options;
use crate::stats::MatchStats;

/// How a port picks among its candidates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectPolicy {
    /// First candidate at or after the pointer, scanning cyclically.
    RoundRobin,

    /// Candidate with the longest queue, ties broken at random.
    LongestQueue,

    /// Uniformly random candidate.
    Random,
}

#[derive(Parser, Debug)]
#[command(about = "Iterative grant/accept matching")]
pub struct IterativeOptions {
    /// Maximum number of grant/accept iterations per tick.
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..=1024))]
    pub iterations: u64,
}

/// Pick one of the `candidates` (in increasing index order).
pub(crate) fn select(
    policy: SelectPolicy,
    candidates: &[usize],
    pointer: usize,
    num_ports: usize,
    queue_len: impl Fn(usize) -> usize,
    rng: &mut Xoshiro256PlusPlus,
    ties: &mut Vec<usize>,
) -> Option<usize> {
    match policy {
        SelectPolicy::RoundRobin => candidates
            .iter()
            .copied()
            .min_by_key(|c| (c + num_ports - pointer) % num_ports),
        SelectPolicy::Random => candidates.choose(rng).copied(),
        SelectPolicy::LongestQueue => {
            let longest = candidates.iter().map(|c| queue_len(*c)).max()?;
            ties.clear();
            ties.extend(candidates.iter().filter(|c| queue_len(**c) == longest));
            ties.choose(rng).copied()
        }
    }
}

#[derive(EntityGet, EntityDisplay)]
pub struct Iterative {
    pub entity: Rc<Entity>,
    config: SwitchConfig,
    grant_policy: SelectPolicy,
    accept_policy: SelectPolicy,
    stratified: bool,
    iterations: usize,
    rng: Xoshiro256PlusPlus,

    /// Per level, per output.
    grant_pointer: Vec<usize>,

    /// Per level, per input.
    accept_pointer: Vec<usize>,

    input_matched: Vec<bool>,
    grants_to_input: Vec<Vec<usize>>,
    candidates: Vec<usize>,
    ties: Vec<usize>,
    stats: MatchStats,
}

impl Iterative {
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        args: &[String],
        seed: u64,
        grant_policy: SelectPolicy,
        accept_policy: SelectPolicy,
        stratified: bool,
    ) -> Result<Self, SimError> {
        let options: IterativeOptions = options::parse(name, args)?;
        let entity = Rc::new(Entity::new(parent, name));
        let rng = component_rng(seed, &entity);
        let levels = if stratified {
            config.num_priorities
        } else {
            1
        };
        Ok(Self {
            entity,
            config: *config,
            grant_policy,
            accept_policy,
            stratified,
            iterations: options.iterations as usize,
            rng,
            grant_pointer: vec![0; levels * config.num_outputs],
            accept_pointer: vec![0; levels * config.num_inputs],
            input_matched: vec![false; config.num_inputs],
            grants_to_input: vec![Vec::with_capacity(config.num_outputs); config.num_inputs],
            candidates: Vec::with_capacity(config.num_inputs),
            ties: Vec::with_capacity(config.num_inputs.max(config.num_outputs)),
            stats: MatchStats::default(),
        })
    }

    #[must_use]
    pub fn grant_pointer(&self, output: usize) -> usize {
        self.grant_pointer[output]
    }

    #[must_use]
    pub fn accept_pointer(&self, input: usize) -> usize {
        self.accept_pointer[input]
    }

    /// Run the iterations for one priority level (or all of them when
    /// `level` is `None`). Returns the number of iterations used.
    fn match_level(
        &mut self,
        queues: &Queues,
        admission: &mut AdmissionMatrix,
        level: Option<usize>,
    ) -> usize {
        let num_inputs = self.config.num_inputs;
        let num_outputs = self.config.num_outputs;
        let level_index = level.unwrap_or(0);
        let queue_len = |input: usize, output: usize| match level {
            Some(p) => queues.unicast(input, output, p).len(),
            None => queues.voq_len(input, output),
        };

        let mut used = 0;
        for iteration in 0..self.iterations {
            used += 1;
            for grants in &mut self.grants_to_input {
                grants.clear();
            }

            // Grant
            for output in 0..num_outputs {
                if admission.free_lines(output) == 0 {
                    continue;
                }
                self.candidates.clear();
                self.candidates.extend(
                    (0..num_inputs)
                        .filter(|i| !self.input_matched[*i] && queue_len(*i, output) > 0),
                );
                let pointer = self.grant_pointer[level_index * num_outputs + output];
                if let Some(input) = select(
                    self.grant_policy,
                    &self.candidates,
                    pointer,
                    num_inputs,
                    |i| queue_len(i, output),
                    &mut self.rng,
                    &mut self.ties,
                ) {
                    self.grants_to_input[input].push(output);
                }
            }

            // Accept
            let mut added = 0;
            for input in 0..num_inputs {
                if self.grants_to_input[input].is_empty() {
                    continue;
                }
                let pointer = self.accept_pointer[level_index * num_inputs + input];
                let Some(output) = select(
                    self.accept_policy,
                    &self.grants_to_input[input],
                    pointer,
                    num_outputs,
                    |o| queue_len(input, o),
                    &mut self.rng,
                    &mut self.ties,
                ) else {
                    continue;
                };
                let priority = match level {
                    Some(p) => Some(p),
                    None => queues.highest_unicast_priority(input, output),
                };
                let Some(priority) = priority else {
                    continue;
                };
                if !admission.admit_unicast(input, output, priority) {
                    continue;
                }
                trace!(self.entity ; "iteration {iteration}: {input} -> {output} p{priority}");
                self.input_matched[input] = true;
                added += 1;

                if iteration == 0 {
                    self.grant_pointer[level_index * num_outputs + output] =
                        (input + 1) % num_inputs;
                    self.accept_pointer[level_index * num_inputs + input] =
                        (output + 1) % num_outputs;
                }
            }

            if added == 0 {
                break;
            }
        }
        used
    }
}

impl Schedule for Iterative {
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix) {
        self.input_matched.fill(false);
        let mut iterations = 0;
        if self.stratified {
            for priority in 0..self.config.num_priorities {
                iterations += self.match_level(queues, admission, Some(priority));
            }
        } else {
            iterations = self.match_level(queues, admission, None);
        }
        self.stats.record(admission.num_admitted(), iterations);
    }

    fn init_stats(&mut self) {
        self.stats.reset();
    }

    fn report_stats(&self) -> Vec<(String, f64)> {
        self.stats.report()
    }

    fn report_state(&self) -> String {
        let mut s = String::new();
        let _ = write!(s, "grant pointers {:?}", self.grant_pointer);
        let _ = write!(s, ", accept pointers {:?}", self.accept_pointer);
        s
    }

    fn check_state(&self, _queues: &Queues) -> SimResult {
        if let Some(p) = self
            .grant_pointer
            .iter()
            .find(|p| **p >= self.config.num_inputs)
        {
            return sim_error!(format!("{self}: grant pointer {p} out of range"));
        }
        if let Some(p) = self
            .accept_pointer
            .iter()
            .find(|p| **p >= self.config.num_outputs)
        {
            return sim_error!(format!("{self}: accept pointer {p} out of range"));
        }
        Ok(())
    }
}
