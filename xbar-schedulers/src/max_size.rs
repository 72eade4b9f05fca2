// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Maximum-size bipartite matching.
//!
//! Inputs are rows and fabric lines are columns of a 0/1 request matrix.
//! Every unmatched input looks for an augmenting path with a depth-first
//! search: follow a request edge to a line, take it if it is free, otherwise
//! try to move the input currently holding it elsewhere. Passes over the
//! unmatched inputs repeat until one finds nothing new.
//!
//! The randomised variant relabels inputs and lines with fresh random
//! permutations every tick so that low indices are not favoured.

use std::rc::Rc;

use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256PlusPlus;
use xbar_engine::admission::{AdmissionMatrix, Grant, QueueKind};
use xbar_engine::rng::component_rng;
use xbar_engine::switch::{Queues, SwitchConfig};
use xbar_engine::traits::Schedule;
use xbar_engine::types::SimError;
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::trace;

use crate::options::{self, NoOptions};
use crate::requests::RequestMatrix;
use crate::stats::MatchStats;

/// Reusable augmenting path matcher on a [`RequestMatrix`].
pub struct BipartiteMatcher {
    row_match: Vec<Option<usize>>,
    col_match: Vec<Option<usize>>,
    visited: Vec<bool>,
}

impl BipartiteMatcher {
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            row_match: vec![None; rows],
            col_match: vec![None; cols],
            visited: vec![false; cols],
        }
    }

    /// Compute a maximum matching. Returns the column matched to each row.
    pub fn solve(&mut self, requests: &RequestMatrix) -> &[Option<usize>] {
        self.row_match.fill(None);
        self.col_match.fill(None);

        loop {
            let mut found = false;
            for row in 0..requests.rows() {
                if self.row_match[row].is_some() {
                    continue;
                }
                self.visited.fill(false);
                if self.augment(requests, row) {
                    found = true;
                }
            }
            if !found {
                break;
            }
        }
        &self.row_match
    }

    fn augment(&mut self, requests: &RequestMatrix, row: usize) -> bool {
        for col in 0..requests.cols() {
            if !requests.has(row, col) || self.visited[col] {
                continue;
            }
            self.visited[col] = true;
            let free = match self.col_match[col] {
                None => true,
                Some(holder) => self.augment(requests, holder),
            };
            if free {
                self.row_match[row] = Some(col);
                self.col_match[col] = Some(row);
                return true;
            }
        }
        false
    }
}

#[derive(EntityGet, EntityDisplay)]
pub struct MaxSize {
    pub entity: Rc<Entity>,
    config: SwitchConfig,
    randomised: bool,
    rng: Xoshiro256PlusPlus,
    input_perm: Vec<usize>,
    line_perm: Vec<usize>,
    requests: RequestMatrix,
    matcher: BipartiteMatcher,
    stats: MatchStats,
}

impl MaxSize {
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        args: &[String],
        seed: u64,
        randomised: bool,
    ) -> Result<Self, SimError> {
        let _: NoOptions = options::parse(name, args)?;
        let entity = Rc::new(Entity::new(parent, name));
        let rng = component_rng(seed, &entity);
        let num_lines = config.num_lines();
        Ok(Self {
            entity,
            config: *config,
            randomised,
            rng,
            input_perm: (0..config.num_inputs).collect(),
            line_perm: (0..num_lines).collect(),
            requests: RequestMatrix::new(config.num_inputs, num_lines),
            matcher: BipartiteMatcher::new(config.num_inputs, num_lines),
            stats: MatchStats::default(),
        })
    }
}

impl Schedule for MaxSize {
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix) {
        if self.randomised {
            self.input_perm.shuffle(&mut self.rng);
            self.line_perm.shuffle(&mut self.rng);
        }

        // Row r stands for input input_perm[r] and column c for line
        // line_perm[c].
        let lines_per_output = self.config.lines_per_output;
        let (input_perm, line_perm) = (&self.input_perm, &self.line_perm);
        self.requests.fill(|r, c| {
            let output = line_perm[c] / lines_per_output;
            queues.has_unicast(input_perm[r], output).then_some(1)
        });

        let matching = self.matcher.solve(&self.requests);
        let mut admitted = 0;
        for (row, col) in matching.iter().enumerate() {
            let Some(col) = col else {
                continue;
            };
            let input = self.input_perm[row];
            let line = self.line_perm[*col];
            let output = line / lines_per_output;
            let Some(priority) = queues.highest_unicast_priority(input, output) else {
                continue;
            };
            let grant = Grant {
                input,
                kind: QueueKind::Unicast,
                priority,
            };
            if admission.admit_on_line(line, grant) {
                trace!(self.entity ; "{input} -> {output} on line {line}");
                admitted += 1;
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
}
