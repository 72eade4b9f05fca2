// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Wavefront arbiter.
//!
//! The N x N request matrix (N = max(inputs, fabric lines)) is swept one
//! wrapped diagonal at a time. Cell (i, c) lies on diagonal `(i + c) mod N`
//! and is granted when its row and column are both still free; they become
//! busy immediately. Cells of one diagonal never share a row or a column so
//! they can all be decided together. The first diagonal of the sweep rotates
//! by one every tick.

use std::rc::Rc;

use xbar_engine::admission::{AdmissionMatrix, Grant, QueueKind};
use xbar_engine::switch::{Queues, SwitchConfig};
use xbar_engine::traits::Schedule;
use xbar_engine::types::SimError;
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::trace;

use crate::options::{self, NoOptions};
use crate::requests::RequestMatrix;
use crate::stats::MatchStats;

/// Sweep the wrapped diagonals of `requests` starting at `offset`, filling
/// `row_grant` with the column granted to each row. `col_busy` is scratch
/// space with one entry per column.
pub fn wavefront(
    requests: &RequestMatrix,
    offset: usize,
    row_grant: &mut [Option<usize>],
    col_busy: &mut [bool],
) {
    let n = requests.rows().max(requests.cols());
    col_busy.fill(false);
    row_grant.fill(None);
    for d in 0..n {
        let diagonal = (offset + d) % n;
        for row in 0..requests.rows() {
            let col = (diagonal + n - row) % n;
            if col >= requests.cols() || row_grant[row].is_some() || col_busy[col] {
                continue;
            }
            if requests.has(row, col) {
                row_grant[row] = Some(col);
                col_busy[col] = true;
            }
        }
    }
}

#[derive(EntityGet, EntityDisplay)]
pub struct Wavefront {
    pub entity: Rc<Entity>,
    config: SwitchConfig,
    offset: usize,
    size: usize,
    requests: RequestMatrix,
    row_grant: Vec<Option<usize>>,
    col_busy: Vec<bool>,
    stats: MatchStats,
}

impl Wavefront {
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        args: &[String],
    ) -> Result<Self, SimError> {
        let _: NoOptions = options::parse(name, args)?;
        let num_lines = config.num_lines();
        Ok(Self {
            entity: Rc::new(Entity::new(parent, name)),
            config: *config,
            offset: 0,
            size: config.num_inputs.max(num_lines),
            requests: RequestMatrix::new(config.num_inputs, num_lines),
            row_grant: vec![None; config.num_inputs],
            col_busy: vec![false; num_lines],
            stats: MatchStats::default(),
        })
    }

    /// The first diagonal of the next sweep.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Schedule for Wavefront {
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix) {
        let lines_per_output = self.config.lines_per_output;
        self.requests
            .fill(|input, line| queues.has_unicast(input, line / lines_per_output).then_some(1));
        wavefront(
            &self.requests,
            self.offset,
            &mut self.row_grant,
            &mut self.col_busy,
        );
        self.offset = (self.offset + 1) % self.size;

        let mut admitted = 0;
        for (input, line) in self.row_grant.iter().enumerate() {
            let Some(line) = *line else {
                continue;
            };
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
                trace!(self.entity ; "{input} -> {output}");
                admitted += 1;
            }
        }
        self.stats.record(admitted, 0);
    }

    fn init_stats(&mut self) {
        self.stats.reset();
    }

    fn report_stats(&self) -> Vec<(String, f64)> {
        self.stats.report()
    }

    fn report_state(&self) -> String {
        format!("offset {}", self.offset)
    }
}
