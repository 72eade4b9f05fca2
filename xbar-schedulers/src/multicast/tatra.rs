// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! TATRA multicast scheduler.
//!
//! The scheduler keeps a schedule of the next `depth` ticks with one column
//! per fabric line. A multicast cell reaching the head of its input, when
//! the input has nothing else scheduled, is dropped into one column of each
//! of its destination outputs, landing on top of what that column already
//! holds (like a block in a game of Tetris). It is only dropped if every
//! destination has room. Each tick the bottom row is sent across the fabric
//! and the schedule moves down by one row.
//!
//! A block always lands below `depth`, so every cell accepted into the
//! schedule is fully served within `depth` ticks.

use std::fmt::Write;
use std::rc::Rc;

use clap::Parser;
use xbar_engine::admission::{AdmissionMatrix, Grant, QueueKind};
use xbar_engine::sim_error;
use xbar_engine::switch::{Queues, SwitchConfig};
use xbar_engine::traits::Schedule;
use xbar_engine::types::{SimError, SimResult};
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::{debug, trace};

use super::{pending, presented};
use crate::options;
use crate::stats::MatchStats;

#[derive(Parser, Debug)]
#[command(about = "TATRA multicast scheduler")]
pub struct TatraOptions {
    /// Number of future ticks held in the schedule (default: the number of
    /// inputs).
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=65536))]
    pub depth: Option<u64>,
}

#[derive(EntityGet, EntityDisplay)]
pub struct Tatra {
    pub entity: Rc<Entity>,
    config: SwitchConfig,
    depth: usize,

    /// `slots[column * depth + row]` is the input scheduled there. Rows are
    /// stored circularly starting at `head`.
    slots: Vec<Option<usize>>,
    head: usize,
    heights: Vec<usize>,

    /// Per input, the number of scheduled blocks and the priority of the
    /// cell they belong to.
    blocks: Vec<usize>,
    priority: Vec<usize>,
    chosen: Vec<usize>,
    next_input: usize,
    stats: MatchStats,
}

impl Tatra {
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        args: &[String],
    ) -> Result<Self, SimError> {
        let options: TatraOptions = options::parse(name, args)?;
        let depth = options.depth.map_or(config.num_inputs, |d| d as usize);
        let num_lines = config.num_lines();
        Ok(Self {
            entity: Rc::new(Entity::new(parent, name)),
            config: *config,
            depth,
            slots: vec![None; num_lines * depth],
            head: 0,
            heights: vec![0; num_lines],
            blocks: vec![0; config.num_inputs],
            priority: vec![0; config.num_inputs],
            chosen: Vec::with_capacity(config.num_outputs),
            next_input: 0,
            stats: MatchStats::default(),
        })
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The input scheduled on `line` `row` ticks from now.
    #[must_use]
    pub fn scheduled(&self, line: usize, row: usize) -> Option<usize> {
        self.slots[self.slot_index(line, row)]
    }

    /// Number of blocks stacked on a line.
    #[must_use]
    pub fn height(&self, line: usize) -> usize {
        self.heights[line]
    }

    fn slot_index(&self, line: usize, row: usize) -> usize {
        line * self.depth + (self.head + row) % self.depth
    }

    /// The least loaded line of an output that still has room.
    fn lowest_line(&self, output: usize) -> Option<usize> {
        let first = output * self.config.lines_per_output;
        (first..first + self.config.lines_per_output)
            .filter(|l| self.heights[*l] < self.depth)
            .min_by_key(|l| (self.heights[*l], *l))
    }

    /// Drop the head cell of `input` into the schedule if it fits.
    fn place(&mut self, queues: &Queues, input: usize) -> bool {
        let Some((priority, cell)) = presented(queues, input) else {
            return false;
        };
        self.chosen.clear();
        for output in pending(cell, self.config.num_outputs) {
            match self.lowest_line(output) {
                Some(line) => self.chosen.push(line),
                None => return false,
            }
        }
        if self.chosen.is_empty() {
            return false;
        }

        for i in 0..self.chosen.len() {
            let line = self.chosen[i];
            let index = self.slot_index(line, self.heights[line]);
            self.slots[index] = Some(input);
            self.heights[line] += 1;
        }
        self.blocks[input] = self.chosen.len();
        self.priority[input] = priority;
        trace!(self.entity ; "placed {cell} on lines {:?}", self.chosen);
        true
    }
}

impl Schedule for Tatra {
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix) {
        let num_inputs = self.config.num_inputs;
        let start = self.next_input;
        let mut placed = 0;
        for offset in 0..num_inputs {
            let input = (start + offset) % num_inputs;
            if self.blocks[input] == 0 && self.place(queues, input) {
                placed += 1;
            }
        }
        self.next_input = (start + 1) % num_inputs;

        let mut admitted = 0;
        for line in 0..self.heights.len() {
            if self.heights[line] == 0 {
                continue;
            }
            let index = self.slot_index(line, 0);
            let Some(input) = self.slots[index].take() else {
                continue;
            };
            self.heights[line] -= 1;
            self.blocks[input] -= 1;
            let grant = Grant {
                input,
                kind: QueueKind::Multicast,
                priority: self.priority[input],
            };
            if admission.admit_on_line(line, grant) {
                trace!(self.entity ; "{input} on line {line}");
                admitted += 1;
            }
        }
        self.head = (self.head + 1) % self.depth;
        debug!(self.entity ; "placed {placed}, admitted {admitted}");
        self.stats.record(admitted, 1);
    }

    fn init_stats(&mut self) {
        self.stats.reset();
    }

    fn report_stats(&self) -> Vec<(String, f64)> {
        self.stats.report()
    }

    fn report_state(&self) -> String {
        let mut s = format!("head {}, heights {:?}", self.head, self.heights);
        for row in (0..self.depth).rev() {
            let _ = write!(s, "\n{row:>4}:");
            for line in 0..self.heights.len() {
                match self.scheduled(line, row) {
                    Some(input) => {
                        let _ = write!(s, " {input:>3}");
                    }
                    None => s.push_str("   ."),
                }
            }
        }
        s
    }

    fn check_state(&self, queues: &Queues) -> SimResult {
        let mut counted = vec![0; self.config.num_inputs];
        for line in 0..self.heights.len() {
            let output = line / self.config.lines_per_output;
            for row in 0..self.depth {
                let slot = self.scheduled(line, row);
                if (row < self.heights[line]) != slot.is_some() {
                    return sim_error!(format!(
                        "{self}: line {line} row {row} does not match height {}",
                        self.heights[line]
                    ));
                }
                let Some(input) = slot else {
                    continue;
                };
                counted[input] += 1;
                let priority = self.priority[input];
                let pending = queues
                    .multicast(input, priority)
                    .head()
                    .is_some_and(|cell| cell.destination.includes(output));
                if !pending {
                    return sim_error!(format!(
                        "{self}: input {input} scheduled on line {line} without a pending cell"
                    ));
                }
            }
        }
        if counted != self.blocks {
            return sim_error!(format!(
                "{self}: block counts {:?} do not match the schedule {counted:?}",
                self.blocks
            ));
        }
        Ok(())
    }
}
