// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Bernoulli arrivals mixing multicast and unicast cells.
//!
//! Each output is a destination of a multicast cell with probability
//! `fanout_probability`; a cell always has at least one destination.

use std::rc::Rc;

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use xbar_engine::cell::{Destination, OutputSet};
use xbar_engine::rng::component_rng;
use xbar_engine::switch::SwitchConfig;
use xbar_engine::traits::{Arrival, Generate};
use xbar_engine::types::Tick;
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::trace;

use super::TrafficConfig;

#[derive(EntityGet, EntityDisplay)]
pub struct MulticastBernoulli {
    pub entity: Rc<Entity>,
    num_outputs: usize,
    num_priorities: usize,
    load: f64,
    multicast_fraction: f64,
    fanout_probability: f64,
    rng: Xoshiro256PlusPlus,
}

impl MulticastBernoulli {
    #[must_use]
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        traffic: &TrafficConfig,
        seed: u64,
    ) -> Self {
        let entity = Rc::new(Entity::new(parent, name));
        let rng = component_rng(seed, &entity);
        Self {
            entity,
            num_outputs: config.num_outputs,
            num_priorities: config.num_priorities,
            load: traffic.load,
            multicast_fraction: traffic.multicast_fraction,
            fanout_probability: traffic.fanout_probability,
            rng,
        }
    }

    fn destinations(&mut self) -> OutputSet {
        let mut outputs = OutputSet::new(self.num_outputs);
        for output in 0..self.num_outputs {
            if self.rng.random_bool(self.fanout_probability) {
                outputs.insert(output);
            }
        }
        if outputs.is_empty() {
            outputs.insert(self.rng.random_range(0..self.num_outputs));
        }
        outputs
    }
}

impl Generate for MulticastBernoulli {
    fn generate(&mut self, tick: Tick) -> Option<Arrival> {
        if !self.rng.random_bool(self.load) {
            return None;
        }
        let destination = if self.rng.random_bool(self.multicast_fraction) {
            Destination::Multicast(self.destinations())
        } else {
            Destination::Unicast(self.rng.random_range(0..self.num_outputs))
        };
        let priority = self.rng.random_range(0..self.num_priorities);
        trace!(self.entity ; "tick {tick}: cell for {destination} p{priority}");
        Some(Arrival {
            destination,
            priority,
        })
    }
}
