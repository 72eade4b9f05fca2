// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! First-in first-out baseline.
//!
//! Each input only presents its oldest waiting unicast cell, as if it had a
//! single FIFO queue, so a blocked cell holds up everything behind it. Each
//! output serves the inputs presenting to it in round-robin order.

use std::rc::Rc;

use xbar_engine::admission::AdmissionMatrix;
use xbar_engine::sim_error;
use xbar_engine::switch::{Queues, SwitchConfig};
use xbar_engine::traits::Schedule;
use xbar_engine::types::{SimError, SimResult};
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::trace;

use crate::options::{self, NoOptions};
use crate::stats::MatchStats;

/// The (output, priority) of the cell an input presents: the highest
/// priority first, then the earliest queue arrival, then the lowest output.
#[must_use]
pub fn presented(queues: &Queues, input: usize) -> Option<(usize, usize)> {
    let config = queues.config();
    (0..config.num_priorities).find_map(|priority| {
        (0..config.num_outputs)
            .filter_map(|output| {
                queues
                    .unicast(input, output, priority)
                    .head()
                    .map(|cell| (cell.stamps.queue_arrival, output))
            })
            .min()
            .map(|(_, output)| (output, priority))
    })
}

#[derive(EntityGet, EntityDisplay)]
pub struct Fifo {
    pub entity: Rc<Entity>,
    config: SwitchConfig,
    pointer: Vec<usize>,

    /// Per input, the (output, priority) presented this tick.
    presenting: Vec<Option<(usize, usize)>>,
    stats: MatchStats,
}

impl Fifo {
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        args: &[String],
    ) -> Result<Self, SimError> {
        let _: NoOptions = options::parse(name, args)?;
        Ok(Self {
            entity: Rc::new(Entity::new(parent, name)),
            config: *config,
            pointer: vec![0; config.num_outputs],
            presenting: vec![None; config.num_inputs],
            stats: MatchStats::default(),
        })
    }

    #[must_use]
    pub fn pointer(&self, output: usize) -> usize {
        self.pointer[output]
    }
}

impl Schedule for Fifo {
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix) {
        let num_inputs = self.config.num_inputs;
        for (input, presenting) in self.presenting.iter_mut().enumerate() {
            *presenting = presented(queues, input);
        }

        let mut admitted = 0;
        for output in 0..self.config.num_outputs {
            let start = self.pointer[output];
            for offset in 0..num_inputs {
                if admission.free_lines(output) == 0 {
                    break;
                }
                let input = (start + offset) % num_inputs;
                let Some((wanted, priority)) = self.presenting[input] else {
                    continue;
                };
                if wanted != output {
                    continue;
                }
                if admission.admit_unicast(input, output, priority) {
                    trace!(self.entity ; "{input} -> {output}");
                    self.pointer[output] = (input + 1) % num_inputs;
                    admitted += 1;
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

#[cfg(test)]
mod tests {
    use xbar_engine::cell::{Cell, Destination};
    use xbar_engine::switch::Switch;
    use xbar_track::Id;
    use xbar_track::entity::toplevel;
    use xbar_track::tracker::dev_null_tracker;

    use super::*;

    #[test]
    fn head_of_line_blocking() {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "top");
        let config = SwitchConfig::new(2, 2, 1, 1).unwrap();
        let mut switch = Switch::new(&top, "switch", config);

        // Input 0 has an old cell for output 0 and a newer one for output 1.
        // Input 1 wants output 0 too, so input 0 is blocked when it loses.
        let cells = [(0, 0, 0), (1, 0, 0), (0, 1, 1)];
        for (input, output, now) in cells {
            switch.set_now(now);
            switch
                .enqueue(Cell::new(Id(1), input, Destination::Unicast(output), 0, now))
                .unwrap();
        }
        switch.set_now(2);
        assert_eq!(presented(switch.queues(), 0), Some((0, 0)));

        let mut fifo = Fifo::new(&top, "fifo", &config, &[]).unwrap();
        let mut admission = AdmissionMatrix::new(&config);
        fifo.exec(switch.queues(), &mut admission);
        assert_eq!(admission.pairs(), vec![(0, 0)]);
        assert_eq!(fifo.pointer(0), 1);

        admission.clear();
        fifo.exec(switch.queues(), &mut admission);
        assert_eq!(admission.pairs(), vec![(1, 0)]);
        assert_eq!(fifo.pointer(0), 0);
    }
}
