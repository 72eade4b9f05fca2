// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Residue based multicast allocation.
//!
//! The residue of an output is the number of its fabric lines not yet
//! allocated. The input whose pending destinations cover the most residue is
//! allocated every such destination, then the next best input, until no
//! input covers any residue.

use std::rc::Rc;

use clap::Parser;
use rand::seq::IndexedRandom;
use rand_xoshiro::Xoshiro256PlusPlus;
use xbar_engine::admission::AdmissionMatrix;
use xbar_engine::rng::component_rng;
use xbar_engine::switch::{Queues, SwitchConfig};
use xbar_engine::traits::Schedule;
use xbar_engine::types::{SimError, Tick};
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::trace;

use super::{pending, presented};
use crate::options;
use crate::stats::MatchStats;

/// How inputs with equal coverage are ordered.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TieBreak {
    /// The input whose head cell has waited longest, then the lowest index.
    #[default]
    Oldest,

    /// A uniformly random input.
    Random,
}

#[derive(Parser, Debug)]
#[command(about = "Residue based multicast allocation")]
pub struct ResidueOptions {
    /// How inputs with equal coverage are ordered.
    #[arg(short, long, value_enum, default_value_t)]
    pub tie_break: TieBreak,
}

#[derive(EntityGet, EntityDisplay)]
pub struct Residue {
    pub entity: Rc<Entity>,
    config: SwitchConfig,
    tie_break: TieBreak,
    rng: Xoshiro256PlusPlus,
    residue: Vec<usize>,
    allocated: Vec<bool>,
    ties: Vec<usize>,
    stats: MatchStats,
}

impl Residue {
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        args: &[String],
        seed: u64,
    ) -> Result<Self, SimError> {
        let options: ResidueOptions = options::parse(name, args)?;
        let entity = Rc::new(Entity::new(parent, name));
        let rng = component_rng(seed, &entity);
        Ok(Self {
            entity,
            config: *config,
            tie_break: options.tie_break,
            rng,
            residue: vec![0; config.num_outputs],
            allocated: vec![false; config.num_inputs],
            ties: Vec::with_capacity(config.num_inputs),
            stats: MatchStats::default(),
        })
    }

    fn coverage(&self, queues: &Queues, input: usize) -> usize {
        presented(queues, input).map_or(0, |(_, cell)| {
            pending(cell, self.config.num_outputs)
                .filter(|o| self.residue[*o] > 0)
                .count()
        })
    }

    /// The next input to allocate, if any covers some residue.
    fn pick(&mut self, queues: &Queues) -> Option<usize> {
        let mut best = 0;
        self.ties.clear();
        for input in 0..self.config.num_inputs {
            if self.allocated[input] {
                continue;
            }
            let coverage = self.coverage(queues, input);
            if coverage == 0 || coverage < best {
                continue;
            }
            if coverage > best {
                best = coverage;
                self.ties.clear();
            }
            self.ties.push(input);
        }

        match self.tie_break {
            TieBreak::Random => self.ties.choose(&mut self.rng).copied(),
            TieBreak::Oldest => {
                let hol = |input: usize| -> Tick {
                    presented(queues, input).map_or(Tick::MAX, |(_, c)| c.stamps.hol_arrival)
                };
                self.ties.iter().copied().min_by_key(|i| (hol(*i), *i))
            }
        }
    }
}

impl Schedule for Residue {
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix) {
        for (output, residue) in self.residue.iter_mut().enumerate() {
            *residue = admission.free_lines(output);
        }
        self.allocated.fill(false);

        let mut admitted = 0;
        let mut rounds = 0;
        while let Some(input) = self.pick(queues) {
            rounds += 1;
            self.allocated[input] = true;
            let Some((priority, cell)) = presented(queues, input) else {
                continue;
            };
            for output in pending(cell, self.config.num_outputs) {
                if self.residue[output] == 0 {
                    continue;
                }
                if admission.admit_multicast(input, output, priority) {
                    self.residue[output] -= 1;
                    admitted += 1;
                }
            }
            trace!(self.entity ; "allocated {cell}");
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
