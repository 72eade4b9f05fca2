// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Multicast schedulers.
//!
//! These only look at the multicast queues. Each input presents the head of
//! its highest priority non-empty multicast queue and fan-out splitting is
//! allowed: the cell may be sent to some of its pending destinations this
//! tick and to the rest later.

use xbar_engine::cell::Cell;
use xbar_engine::switch::Queues;

pub mod residue;
pub mod tatra;
pub mod wba;

/// The head multicast cell of `input` and the priority it is queued at.
#[must_use]
pub fn presented(queues: &Queues, input: usize) -> Option<(usize, &Cell)> {
    let priority = queues.highest_multicast_priority(input)?;
    let head = queues.multicast(input, priority).head()?;
    Some((priority, head))
}

/// The outputs still pending for a cell.
pub fn pending(cell: &Cell, num_outputs: usize) -> impl Iterator<Item = usize> + '_ {
    (0..num_outputs).filter(|o| cell.destination.includes(*o))
}
