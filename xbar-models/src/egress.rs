// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Output egress policies.

use std::rc::Rc;

use xbar_engine::cell::Cell;
use xbar_engine::switch::Queues;
use xbar_engine::traits::Egress;
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::trace;

/// Send up to `cells_per_tick` cells from every output each output tick,
/// highest priority first.
#[derive(EntityGet, EntityDisplay)]
pub struct LineRate {
    pub entity: Rc<Entity>,
    cells_per_tick: usize,
}

impl LineRate {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str, cells_per_tick: usize) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            cells_per_tick,
        }
    }
}

impl Egress for LineRate {
    fn egress(&mut self, queues: &mut Queues, output: usize) -> Vec<Cell> {
        let now = queues.now();
        let num_priorities = queues.config().num_priorities;
        let mut sent = Vec::new();
        for priority in 0..num_priorities {
            while sent.len() < self.cells_per_tick {
                let Some(cell) = queues.output_mut(output, priority).pop(now) else {
                    break;
                };
                sent.push(cell);
            }
        }
        if !sent.is_empty() {
            trace!(self.entity ; "output {output} sent {} cells", sent.len());
        }
        sent
    }
}
