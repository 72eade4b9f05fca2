// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! FIFO holding cells.

use std::collections::VecDeque;

use crate::cell::Cell;
use crate::types::Tick;

/// A FIFO of cells.
///
/// Pushing stamps the queue arrival time of a cell and every cell that
/// becomes the head of the queue gets its head-of-line arrival time stamped.
#[derive(Debug, Default)]
pub struct CellQueue {
    cells: VecDeque<Cell>,
}

impl CellQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut cell: Cell, now: Tick) {
        cell.stamps.queue_arrival = now;
        if self.cells.is_empty() {
            cell.stamps.hol_arrival = now;
        }
        self.cells.push_back(cell);
    }

    pub fn pop(&mut self, now: Tick) -> Option<Cell> {
        let cell = self.cells.pop_front();
        if let Some(next) = self.cells.front_mut() {
            next.stamps.hol_arrival = now;
        }
        cell
    }

    #[must_use]
    pub fn head(&self) -> Option<&Cell> {
        self.cells.front()
    }

    /// Mutable access to the head cell. Used to clear served destinations of
    /// a multicast cell.
    pub fn head_mut(&mut self) -> Option<&mut Cell> {
        self.cells.front_mut()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }
}

#[cfg(test)]
mod tests {
    use xbar_track::Id;

    use super::*;
    use crate::cell::Destination;

    fn cell(id: u64) -> Cell {
        Cell::new(Id(id), 0, Destination::Unicast(1), 0, 0)
    }

    #[test]
    fn fifo_order_and_stamps() {
        let mut q = CellQueue::new();
        q.push(cell(1), 3);
        q.push(cell(2), 4);
        assert_eq!(q.len(), 2);

        let head = q.head().unwrap();
        assert_eq!(head.id, Id(1));
        assert_eq!(head.stamps.queue_arrival, 3);
        assert_eq!(head.stamps.hol_arrival, 3);

        let first = q.pop(10).unwrap();
        assert_eq!(first.id, Id(1));

        let head = q.head().unwrap();
        assert_eq!(head.stamps.queue_arrival, 4);
        assert_eq!(head.stamps.hol_arrival, 10);

        assert!(q.pop(11).is_some());
        assert!(q.is_empty());
        assert!(q.pop(12).is_none());
    }
}
