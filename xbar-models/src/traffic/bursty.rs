// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! On/off bursty arrivals.
//!
//! The source alternates between bursts, during which a cell arrives every
//! traffic tick and all cells go to the same output, and idle periods. Both
//! lengths are geometrically distributed. The mean idle length is chosen so
//! that the long-run arrival rate equals the load.

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

#[derive(EntityGet, EntityDisplay)]
pub struct Bursty {
    pub entity: Rc<Entity>,
    num_outputs: usize,
    num_priorities: usize,

    /// Probability that a burst ends after each cell.
    end_burst: f64,

    /// Probability that an idle period ends after each idle tick.
    start_burst: f64,

    /// The output and priority of the current burst.
    burst: Option<(usize, usize)>,
    rng: Xoshiro256PlusPlus,
}

impl Bursty {
    #[must_use]
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        load: f64,
        burst_length: f64,
        seed: u64,
    ) -> Self {
        let entity = Rc::new(Entity::new(parent, name));
        let rng = component_rng(seed, &entity);

        // A burst of mean length b is followed by a mean of b * (1 - load) /
        // load idle ticks.
        let burst_length = burst_length.max(1.0);
        let start_burst = if load > 0.0 {
            let idle_length = burst_length * (1.0 - load.min(1.0)) / load;
            1.0 / (1.0 + idle_length)
        } else {
            0.0
        };
        let end_burst = 1.0 / burst_length;

        Self {
            entity,
            num_outputs: config.num_outputs,
            num_priorities: config.num_priorities,
            end_burst,
            start_burst,
            burst: None,
            rng,
        }
    }
}

impl Generate for Bursty {
    fn generate(&mut self, tick: Tick) -> Option<Arrival> {
        if self.burst.is_none() {
            if !self.rng.random_bool(self.start_burst) {
                return None;
            }
            let output = self.rng.random_range(0..self.num_outputs);
            let priority = self.rng.random_range(0..self.num_priorities);
            trace!(self.entity ; "tick {tick}: burst to {output} p{priority}");
            self.burst = Some((output, priority));
        }

        let (output, priority) = self.burst?;
        if self.rng.random_bool(self.end_burst) {
            self.burst = None;
        }
        Some(Arrival {
            destination: Destination::Unicast(output),
            priority,
        })
    }
}
