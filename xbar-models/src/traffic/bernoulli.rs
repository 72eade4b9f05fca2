// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Bernoulli arrivals: every traffic tick a cell arrives with probability
//! `load`, independently of the previous ticks.

use std::rc::Rc;

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use xbar_engine::cell::Destination;
use xbar_engine::rng::component_rng;
use xbar_engine::switch::SwitchConfig;
use xbar_engine::traits::{Arrival, Generate};
use xbar_engine::types::Tick;
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::trace;

use super::OutputChoice;

#[derive(EntityGet, EntityDisplay)]
pub struct Bernoulli {
    pub entity: Rc<Entity>,
    num_outputs: usize,
    num_priorities: usize,
    load: f64,
    choice: OutputChoice,
    rng: Xoshiro256PlusPlus,
}

impl Bernoulli {
    #[must_use]
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        load: f64,
        choice: OutputChoice,
        seed: u64,
    ) -> Self {
        let entity = Rc::new(Entity::new(parent, name));
        let rng = component_rng(seed, &entity);
        Self {
            entity,
            num_outputs: config.num_outputs,
            num_priorities: config.num_priorities,
            load,
            choice,
            rng,
        }
    }
}

impl Generate for Bernoulli {
    fn generate(&mut self, tick: Tick) -> Option<Arrival> {
        if !self.rng.random_bool(self.load) {
            return None;
        }
        let output = self.choice.choose(&mut self.rng, self.num_outputs);
        let priority = self.rng.random_range(0..self.num_priorities);
        trace!(self.entity ; "tick {tick}: cell for {output} p{priority}");
        Some(Arrival {
            destination: Destination::Unicast(output),
            priority,
        })
    }
}
