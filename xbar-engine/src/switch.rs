// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The switch: topology, queues and the fabric transfer.
//!
//! Cells wait in the input queues until a scheduler admits them in the
//! [`AdmissionMatrix`]. The fabric transfer then moves every admitted cell
//! into its output queue.
//!
//! The input side holds one virtual output queue per (input, output,
//! priority) plus one multicast queue per (input, priority). The output side
//! holds one queue per (output, priority).

use std::rc::Rc;

use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::{enter, trace};

use crate::admission::{AdmissionMatrix, QueueKind};
use crate::cell::{Cell, Destination};
use crate::queue::CellQueue;
use crate::sim_error;
use crate::stats::SwitchStats;
use crate::traits::Schedule;
use crate::types::{SimError, Tick};

/// The fixed topology of a switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchConfig {
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub num_priorities: usize,

    /// Number of parallel fabric lines feeding each output.
    pub lines_per_output: usize,
}

impl SwitchConfig {
    pub fn new(
        num_inputs: usize,
        num_outputs: usize,
        num_priorities: usize,
        lines_per_output: usize,
    ) -> Result<Self, SimError> {
        if num_inputs == 0 || num_outputs == 0 {
            return sim_error!(format!(
                "A switch needs at least one input and one output (got {num_inputs}x{num_outputs})"
            ));
        }
        if num_priorities == 0 {
            return sim_error!("A switch needs at least one priority level");
        }
        if lines_per_output == 0 {
            return sim_error!("Each output needs at least one fabric line");
        }
        Ok(Self {
            num_inputs,
            num_outputs,
            num_priorities,
            lines_per_output,
        })
    }

    /// Total number of fabric output lines.
    #[must_use]
    pub fn num_lines(&self) -> usize {
        self.num_outputs * self.lines_per_output
    }
}

/// All the queues of a switch, indexed by input/output/priority.
///
/// This is the view of the switch a scheduler gets during its `exec`.
pub struct Queues {
    config: SwitchConfig,
    unicast: Vec<CellQueue>,
    multicast: Vec<CellQueue>,
    output: Vec<CellQueue>,
    now: Tick,
}

impl Queues {
    #[must_use]
    pub fn new(config: &SwitchConfig) -> Self {
        let new_queues = |n: usize| (0..n).map(|_| CellQueue::new()).collect::<Vec<_>>();
        Self {
            config: *config,
            unicast: new_queues(config.num_inputs * config.num_outputs * config.num_priorities),
            multicast: new_queues(config.num_inputs * config.num_priorities),
            output: new_queues(config.num_outputs * config.num_priorities),
            now: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    /// The current tick.
    #[must_use]
    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn set_now(&mut self, now: Tick) {
        self.now = now;
    }

    fn unicast_index(&self, input: usize, output: usize, priority: usize) -> usize {
        (input * self.config.num_outputs + output) * self.config.num_priorities + priority
    }

    #[must_use]
    pub fn unicast(&self, input: usize, output: usize, priority: usize) -> &CellQueue {
        &self.unicast[self.unicast_index(input, output, priority)]
    }

    pub fn unicast_mut(&mut self, input: usize, output: usize, priority: usize) -> &mut CellQueue {
        let index = self.unicast_index(input, output, priority);
        &mut self.unicast[index]
    }

    #[must_use]
    pub fn multicast(&self, input: usize, priority: usize) -> &CellQueue {
        &self.multicast[input * self.config.num_priorities + priority]
    }

    pub fn multicast_mut(&mut self, input: usize, priority: usize) -> &mut CellQueue {
        &mut self.multicast[input * self.config.num_priorities + priority]
    }

    #[must_use]
    pub fn output(&self, output: usize, priority: usize) -> &CellQueue {
        &self.output[output * self.config.num_priorities + priority]
    }

    pub fn output_mut(&mut self, output: usize, priority: usize) -> &mut CellQueue {
        &mut self.output[output * self.config.num_priorities + priority]
    }

    /// Number of unicast cells waiting at `input` for `output` over all
    /// priorities.
    #[must_use]
    pub fn voq_len(&self, input: usize, output: usize) -> usize {
        (0..self.config.num_priorities)
            .map(|p| self.unicast(input, output, p).len())
            .sum()
    }

    /// The highest (numerically lowest) priority with a unicast cell waiting
    /// at `input` for `output`.
    #[must_use]
    pub fn highest_unicast_priority(&self, input: usize, output: usize) -> Option<usize> {
        (0..self.config.num_priorities).find(|p| !self.unicast(input, output, *p).is_empty())
    }

    /// The highest priority with a multicast cell waiting at `input`.
    #[must_use]
    pub fn highest_multicast_priority(&self, input: usize) -> Option<usize> {
        (0..self.config.num_priorities).find(|p| !self.multicast(input, *p).is_empty())
    }

    /// Whether `input` has any unicast cell for `output`.
    #[must_use]
    pub fn has_unicast(&self, input: usize, output: usize) -> bool {
        self.highest_unicast_priority(input, output).is_some()
    }

    /// Age of the oldest head-of-line unicast cell from `input` to `output`.
    #[must_use]
    pub fn unicast_hol_age(&self, input: usize, output: usize) -> Option<Tick> {
        (0..self.config.num_priorities)
            .filter_map(|p| self.unicast(input, output, p).head())
            .map(|c| c.age(self.now))
            .max()
    }

    /// Number of cells (unicast and multicast) waiting at an input.
    #[must_use]
    pub fn input_occupancy(&self, input: usize) -> usize {
        let unicast: usize = (0..self.config.num_outputs)
            .map(|o| self.voq_len(input, o))
            .sum();
        let multicast: usize = (0..self.config.num_priorities)
            .map(|p| self.multicast(input, p).len())
            .sum();
        unicast + multicast
    }

    /// Number of unicast cells waiting at any input for `output`.
    #[must_use]
    pub fn output_demand(&self, output: usize) -> usize {
        (0..self.config.num_inputs)
            .map(|i| self.voq_len(i, output))
            .sum()
    }

    #[must_use]
    pub fn output_occupancy(&self, output: usize) -> usize {
        (0..self.config.num_priorities)
            .map(|p| self.output(output, p).len())
            .sum()
    }

    #[must_use]
    pub fn total_input_cells(&self) -> usize {
        self.unicast.iter().chain(&self.multicast).map(CellQueue::len).sum()
    }

    #[must_use]
    pub fn total_output_cells(&self) -> usize {
        self.output.iter().map(CellQueue::len).sum()
    }

    #[must_use]
    pub fn total_cells(&self) -> usize {
        self.total_input_cells() + self.total_output_cells()
    }
}

/// An input-queued crossbar switch.
#[derive(EntityGet, EntityDisplay)]
pub struct Switch {
    pub entity: Rc<Entity>,
    config: SwitchConfig,
    queues: Queues,
    admission: AdmissionMatrix,
}

impl Switch {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str, config: SwitchConfig) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            config,
            queues: Queues::new(&config),
            admission: AdmissionMatrix::new(&config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    #[must_use]
    pub fn queues(&self) -> &Queues {
        &self.queues
    }

    pub fn queues_mut(&mut self) -> &mut Queues {
        &mut self.queues
    }

    #[must_use]
    pub fn admission(&self) -> &AdmissionMatrix {
        &self.admission
    }

    pub fn set_now(&mut self, now: Tick) {
        self.queues.set_now(now);
    }

    /// Place an arriving cell in the right input queue.
    pub fn enqueue(&mut self, cell: Cell) -> Result<(), SimError> {
        if cell.source >= self.config.num_inputs {
            return sim_error!(format!("{self}: {cell} arrived at an invalid input"));
        }
        if cell.priority >= self.config.num_priorities {
            return sim_error!(format!("{self}: {cell} has an invalid priority"));
        }
        let now = self.queues.now;
        match &cell.destination {
            Destination::Unicast(output) => {
                if *output >= self.config.num_outputs {
                    return sim_error!(format!("{self}: {cell} has an invalid output"));
                }
                trace!(self.entity ; "enqueue {cell}");
                let (input, output, priority) = (cell.source, *output, cell.priority);
                self.queues
                    .unicast_mut(input, output, priority)
                    .push(cell, now);
            }
            Destination::Multicast(set) => {
                if set.is_empty() || set.iter().any(|o| o >= self.config.num_outputs) {
                    return sim_error!(format!("{self}: {cell} has an invalid destination set"));
                }
                trace!(self.entity ; "enqueue {cell}");
                let (input, priority) = (cell.source, cell.priority);
                self.queues.multicast_mut(input, priority).push(cell, now);
            }
        }
        Ok(())
    }

    /// Clear the admission matrix and let the scheduler fill it.
    pub fn schedule(&mut self, scheduler: &mut dyn Schedule) {
        self.admission.clear();
        scheduler.exec(&self.queues, &mut self.admission);
    }

    /// Move every admitted cell across the fabric into its output queue.
    ///
    /// Returns the number of cells delivered to output queues. Any admitted
    /// grant without a matching head-of-line cell is an error.
    pub fn transfer(&mut self, stats: &mut SwitchStats) -> Result<usize, SimError> {
        self.admission.validate()?;

        let now = self.queues.now;
        let mut moved = 0;
        let mut served_multicast = Vec::new();

        for line in 0..self.admission.num_lines() {
            let Some(grant) = self.admission.line(line) else {
                continue;
            };
            let output = self.admission.output_of_line(line);
            let mut cell = match grant.kind {
                QueueKind::Unicast => {
                    let Some(cell) = self
                        .queues
                        .unicast_mut(grant.input, output, grant.priority)
                        .pop(now)
                    else {
                        return sim_error!(format!(
                            "{}: line {line} admitted empty unicast queue {}->{output} p{}",
                            self.entity, grant.input, grant.priority
                        ));
                    };
                    cell
                }
                QueueKind::Multicast => {
                    let head = self
                        .queues
                        .multicast_mut(grant.input, grant.priority)
                        .head_mut();
                    let Some(head) = head else {
                        return sim_error!(format!(
                            "{}: line {line} admitted empty multicast queue {} p{}",
                            self.entity, grant.input, grant.priority
                        ));
                    };
                    let now_empty = match &mut head.destination {
                        Destination::Multicast(pending) => {
                            pending.remove(output).then(|| pending.is_empty())
                        }
                        Destination::Unicast(_) => None,
                    };
                    let Some(now_empty) = now_empty else {
                        return sim_error!(format!(
                            "{}: line {line} admitted {head} which is not pending for output {output}",
                            self.entity
                        ));
                    };
                    if now_empty {
                        served_multicast.push((grant.input, grant.priority));
                    }
                    head.copy_for(output)
                }
            };

            cell.stamps.granted = now;
            cell.stamps.accepted = now;
            cell.stamps.fabric_arrival = now;
            cell.stamps.output_arrival = now;
            stats.record_transfer(&cell);

            trace!(self.entity ; "transfer {cell} on line {line}");
            let priority = cell.priority;
            let id = cell.id;
            self.queues.output_mut(output, priority).push(cell, now);
            enter!(self.entity ; id);
            moved += 1;
        }

        for (input, priority) in served_multicast {
            self.queues.multicast_mut(input, priority).pop(now);
        }

        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use xbar_track::Id;
    use xbar_track::entity::toplevel;
    use xbar_track::tracker::dev_null_tracker;

    use super::*;
    use crate::cell::OutputSet;

    fn switch(i: usize, o: usize, p: usize, l: usize) -> Switch {
        let tracker = dev_null_tracker();
        let top = toplevel(&tracker, "top");
        Switch::new(&top, "switch", SwitchConfig::new(i, o, p, l).unwrap())
    }

    #[test]
    fn config_rejects_zero_sizes() {
        assert!(SwitchConfig::new(0, 4, 1, 1).is_err());
        assert!(SwitchConfig::new(4, 0, 1, 1).is_err());
        assert!(SwitchConfig::new(4, 4, 0, 1).is_err());
        assert!(SwitchConfig::new(4, 4, 1, 0).is_err());
        assert_eq!(SwitchConfig::new(4, 2, 1, 3).unwrap().num_lines(), 6);
    }

    #[test]
    fn occupancy_helpers() {
        let mut sw = switch(2, 2, 2, 1);
        sw.enqueue(Cell::new(Id(1), 0, Destination::Unicast(1), 1, 0))
            .unwrap();
        sw.enqueue(Cell::new(Id(2), 0, Destination::Unicast(1), 0, 0))
            .unwrap();
        let set = OutputSet::from_outputs(2, [0, 1]);
        sw.enqueue(Cell::new(Id(3), 1, Destination::Multicast(set), 1, 0))
            .unwrap();

        let q = sw.queues();
        assert_eq!(q.voq_len(0, 1), 2);
        assert_eq!(q.highest_unicast_priority(0, 1), Some(0));
        assert_eq!(q.highest_unicast_priority(0, 0), None);
        assert_eq!(q.highest_multicast_priority(1), Some(1));
        assert_eq!(q.input_occupancy(0), 2);
        assert_eq!(q.input_occupancy(1), 1);
        assert_eq!(q.output_demand(1), 2);
        assert_eq!(q.total_cells(), 3);
    }

    #[test]
    fn enqueue_rejects_bad_cells() {
        let mut sw = switch(2, 2, 1, 1);
        assert!(
            sw.enqueue(Cell::new(Id(1), 0, Destination::Unicast(2), 0, 0))
                .is_err()
        );
        assert!(
            sw.enqueue(Cell::new(Id(1), 0, Destination::Unicast(1), 1, 0))
                .is_err()
        );
        let empty = Destination::Multicast(OutputSet::new(2));
        assert!(sw.enqueue(Cell::new(Id(1), 0, empty, 0, 0)).is_err());
    }

    #[test]
    fn multicast_partial_service_keeps_cell() {
        let mut sw = switch(2, 3, 1, 1);
        let set = OutputSet::from_outputs(3, [0, 2]);
        sw.enqueue(Cell::new(Id(5), 0, Destination::Multicast(set), 0, 0))
            .unwrap();

        let mut stats = SwitchStats::new(&sw.config);
        sw.admission.admit_multicast(0, 2, 0);
        assert_eq!(sw.transfer(&mut stats).unwrap(), 1);

        let head = sw.queues().multicast(0, 0).head().unwrap();
        assert!(head.destination.includes(0));
        assert!(!head.destination.includes(2));
        assert_eq!(sw.queues().output(2, 0).len(), 1);

        sw.admission.clear();
        sw.admission.admit_multicast(0, 0, 0);
        assert_eq!(sw.transfer(&mut stats).unwrap(), 1);
        assert!(sw.queues().multicast(0, 0).is_empty());
        assert_eq!(sw.queues().total_output_cells(), 2);
    }

    #[test]
    fn transfer_rejects_empty_queue() {
        let mut sw = switch(2, 2, 1, 1);
        let mut stats = SwitchStats::new(&sw.config);
        sw.admission.admit_unicast(1, 0, 0);
        assert!(sw.transfer(&mut stats).is_err());
    }
}
