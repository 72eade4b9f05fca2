// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Stable matching by deferred acceptance.
//!
//! Inputs rank the outputs they request, and outputs rank the inputs
//! requesting them, by the weight of the virtual output queue (ties go to the
//! lower index). In each round every free input proposes to the next output
//! on its list; each output keeps its best proposals (one per fabric line)
//! and rejects the rest. The result is stable but not necessarily of maximum
//! size. Limiting the number of rounds trades stability for speed.

use std::rc::Rc;

use clap::Parser;
use xbar_engine::admission::AdmissionMatrix;
use xbar_engine::switch::{Queues, SwitchConfig};
use xbar_engine::traits::Schedule;
use xbar_engine::types::SimError;
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::trace;

use crate::options;
use crate::requests::RequestMatrix;
use crate::stats::MatchStats;

/// What the preference lists are ranked by.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StableWeight {
    /// Number of cells queued.
    #[default]
    Length,

    /// Age of the oldest head-of-line cell.
    Age,
}

#[derive(Parser, Debug)]
#[command(about = "Stable matching by deferred acceptance")]
pub struct StableOptions {
    /// What the preference lists are ranked by.
    #[arg(short, long, value_enum, default_value_t)]
    pub weight: StableWeight,

    /// Maximum number of proposal rounds (default: enough to always finish).
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub rounds: Option<u64>,
}

#[derive(EntityGet, EntityDisplay)]
pub struct Stable {
    pub entity: Rc<Entity>,
    config: SwitchConfig,
    weight: StableWeight,
    rounds: usize,
    requests: RequestMatrix,

    /// Per input, the requested outputs best first.
    preferences: Vec<Vec<usize>>,
    next_choice: Vec<usize>,
    held_by: Vec<Option<usize>>,

    /// Per output, the inputs currently held.
    held: Vec<Vec<usize>>,
    proposals: Vec<Vec<usize>>,
    stats: MatchStats,
}

impl Stable {
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        args: &[String],
    ) -> Result<Self, SimError> {
        let options: StableOptions = options::parse(name, args)?;
        // Every round makes at least one new proposal
        let rounds = options
            .rounds
            .map_or(config.num_inputs * config.num_outputs, |r| r as usize);
        Ok(Self {
            entity: Rc::new(Entity::new(parent, name)),
            config: *config,
            weight: options.weight,
            rounds,
            requests: RequestMatrix::new(config.num_inputs, config.num_outputs),
            preferences: vec![Vec::with_capacity(config.num_outputs); config.num_inputs],
            next_choice: vec![0; config.num_inputs],
            held_by: vec![None; config.num_inputs],
            held: vec![Vec::with_capacity(config.num_inputs); config.num_outputs],
            proposals: vec![Vec::with_capacity(config.num_inputs); config.num_outputs],
            stats: MatchStats::default(),
        })
    }

    /// Whether output `output` prefers input `a` to input `b`.
    fn output_prefers(&self, output: usize, a: usize, b: usize) -> bool {
        let (wa, wb) = (
            self.requests.weight(a, output),
            self.requests.weight(b, output),
        );
        wa > wb || (wa == wb && a < b)
    }

    /// Run deferred acceptance. Returns the number of rounds used.
    fn propose(&mut self) -> usize {
        let num_inputs = self.config.num_inputs;
        let num_outputs = self.config.num_outputs;
        let capacity = self.config.lines_per_output;
        let mut rounds = 0;

        for _ in 0..self.rounds {
            let mut any = false;
            for input in 0..num_inputs {
                if self.held_by[input].is_some() {
                    continue;
                }
                let Some(output) = self.preferences[input].get(self.next_choice[input]).copied()
                else {
                    continue;
                };
                self.next_choice[input] += 1;
                self.proposals[output].push(input);
                any = true;
            }
            if !any {
                break;
            }
            rounds += 1;

            for output in 0..num_outputs {
                if self.proposals[output].is_empty() {
                    continue;
                }
                let mut candidates = std::mem::take(&mut self.held[output]);
                candidates.append(&mut self.proposals[output]);
                // Insertion sort, best first
                for i in 1..candidates.len() {
                    let mut j = i;
                    while j > 0 && self.output_prefers(output, candidates[j], candidates[j - 1]) {
                        candidates.swap(j, j - 1);
                        j -= 1;
                    }
                }
                for rejected in candidates.drain(capacity.min(candidates.len())..) {
                    self.held_by[rejected] = None;
                }
                for kept in &candidates {
                    self.held_by[*kept] = Some(output);
                }
                self.held[output] = candidates;
            }
        }
        rounds
    }
}

impl Schedule for Stable {
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix) {
        let weight = self.weight;
        self.requests.fill(|input, output| match weight {
            StableWeight::Length => {
                let len = queues.voq_len(input, output);
                (len > 0).then_some(len as i64)
            }
            StableWeight::Age => queues.unicast_hol_age(input, output).map(|a| a as i64),
        });

        for input in 0..self.config.num_inputs {
            let mut prefs = std::mem::take(&mut self.preferences[input]);
            prefs.clear();
            prefs.extend((0..self.config.num_outputs).filter(|o| self.requests.has(input, *o)));
            // Stable sort keeps lower indices first among equal weights
            prefs.sort_by_key(|o| std::cmp::Reverse(self.requests.weight(input, *o)));
            self.preferences[input] = prefs;
        }
        self.next_choice.fill(0);
        self.held_by.fill(None);
        for held in &mut self.held {
            held.clear();
        }
        for proposals in &mut self.proposals {
            proposals.clear();
        }

        let rounds = self.propose();

        let mut admitted = 0;
        for (input, output) in self.held_by.iter().enumerate() {
            let Some(output) = *output else {
                continue;
            };
            let Some(priority) = queues.highest_unicast_priority(input, output) else {
                continue;
            };
            if admission.admit_unicast(input, output, priority) {
                trace!(self.entity ; "{input} -> {output}");
                admitted += 1;
            }
        }
        self.stats.record(admitted, rounds);
    }

    fn init_stats(&mut self) {
        self.stats.reset();
    }

    fn report_stats(&self) -> Vec<(String, f64)> {
        self.stats.report()
    }
}
