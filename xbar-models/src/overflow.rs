// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Input admission policies applied to arriving cells.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use xbar_engine::cell::{Cell, Destination};
use xbar_engine::switch::Queues;
use xbar_engine::traits::Admit;
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::trace;

/// Which queues a buffer limit applies to.
#[derive(clap::ValueEnum, Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferScope {
    /// All cells waiting at an input share one buffer
    #[default]
    Input,

    /// Every virtual output queue (and multicast queue) has its own buffer
    Queue,
}

/// Drop an arriving cell when its buffer is full.
#[derive(EntityGet, EntityDisplay)]
pub struct DropTail {
    pub entity: Rc<Entity>,
    capacity: usize,
    scope: BufferScope,
    drops: u64,
}

impl DropTail {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str, capacity: usize, scope: BufferScope) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            capacity,
            scope,
            drops: 0,
        }
    }

    /// Number of cells dropped so far.
    #[must_use]
    pub fn drops(&self) -> u64 {
        self.drops
    }

    fn occupancy(&self, queues: &Queues, cell: &Cell) -> usize {
        match (self.scope, &cell.destination) {
            (BufferScope::Input, _) => queues.input_occupancy(cell.source),
            (BufferScope::Queue, Destination::Unicast(output)) => {
                queues.voq_len(cell.source, *output)
            }
            (BufferScope::Queue, Destination::Multicast(_)) => {
                let priorities = queues.config().num_priorities;
                (0..priorities)
                    .map(|p| queues.multicast(cell.source, p).len())
                    .sum()
            }
        }
    }
}

impl Admit for DropTail {
    fn admit(&mut self, queues: &Queues, cell: &Cell) -> bool {
        if self.occupancy(queues, cell) < self.capacity {
            return true;
        }
        trace!(self.entity ; "buffer full, drop {cell}");
        self.drops += 1;
        false
    }
}
