// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The interfaces between the engine and the pluggable parts of a simulation.

use crate::admission::AdmissionMatrix;
use crate::cell::{Cell, Destination};
use crate::switch::Queues;
use crate::types::{SimResult, Tick};

/// The protocol every scheduling algorithm implements.
///
/// Option parsing and state allocation happen when the scheduler is
/// constructed. After that the engine only talks to it through these methods.
pub trait Schedule {
    /// Fill the (already cleared) admission matrix from the current queue
    /// state.
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix);

    /// Reset any statistics the scheduler collects.
    fn init_stats(&mut self) {}

    /// Named scheduler metrics collected since the last `init_stats`.
    fn report_stats(&self) -> Vec<(String, f64)> {
        Vec::new()
    }

    /// A human-readable dump of the internal state.
    fn report_state(&self) -> String {
        String::new()
    }

    /// Check the internal state for consistency.
    fn check_state(&self, _queues: &Queues) -> SimResult {
        Ok(())
    }
}

/// A cell to be created at an input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Arrival {
    pub destination: Destination,
    pub priority: usize,
}

/// A traffic generator attached to one input.
pub trait Generate {
    /// Produce at most one arrival for this traffic tick.
    fn generate(&mut self, tick: Tick) -> Option<Arrival>;
}

/// The input admission (overflow) policy.
pub trait Admit {
    /// Decide whether an arriving cell may enter its input queue.
    fn admit(&mut self, queues: &Queues, cell: &Cell) -> bool;
}

/// The output egress (pacing) policy.
pub trait Egress {
    /// Remove the cells leaving `output` this tick.
    fn egress(&mut self, queues: &mut Queues, output: usize) -> Vec<Cell>;
}
