// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Synthetic traffic.
//!
//! One generator is attached to each input. Every generator owns a random
//! stream derived from the global seed and its own name, so the traffic an
//! input sees does not depend on the other inputs.

use std::fmt;
use std::rc::Rc;

use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use xbar_engine::sim_error;
use xbar_engine::switch::SwitchConfig;
use xbar_engine::traits::Generate;
use xbar_engine::types::{SimError, SimResult};
use xbar_track::entity::Entity;

pub mod bernoulli;
pub mod bursty;
pub mod multicast;

use bernoulli::Bernoulli;
use bursty::Bursty;
use multicast::MulticastBernoulli;

#[derive(clap::ValueEnum, Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrafficPattern {
    /// Independent arrivals to uniformly random outputs
    #[default]
    Bernoulli,

    /// Bursts of cells to one output separated by idle periods
    Bursty,

    /// Independent arrivals with a share sent to one hot output
    Hotspot,

    /// Independent arrivals with a share of multicast cells
    Multicast,
}

impl fmt::Display for TrafficPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Parameters of the traffic offered to every input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrafficConfig {
    pub pattern: TrafficPattern,

    /// Probability of an arrival per traffic tick.
    pub load: f64,

    /// Mean number of cells in a burst.
    pub burst_length: f64,

    pub hotspot_output: usize,

    /// Share of the arrivals sent to the hot output.
    pub hotspot_fraction: f64,

    /// Share of the arrivals that are multicast.
    pub multicast_fraction: f64,

    /// Probability of each output being a destination of a multicast cell.
    pub fanout_probability: f64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            pattern: TrafficPattern::default(),
            load: 0.5,
            burst_length: 16.0,
            hotspot_output: 0,
            hotspot_fraction: 0.5,
            multicast_fraction: 1.0,
            fanout_probability: 0.5,
        }
    }
}

fn check_probability(name: &str, value: f64) -> SimResult {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        sim_error!(format!("{name} must be between 0 and 1, got {value}"))
    }
}

impl TrafficConfig {
    pub fn validate(&self, switch_config: &SwitchConfig) -> SimResult {
        check_probability("load", self.load)?;
        check_probability("hotspot fraction", self.hotspot_fraction)?;
        check_probability("multicast fraction", self.multicast_fraction)?;
        check_probability("fanout probability", self.fanout_probability)?;
        if self.pattern == TrafficPattern::Bursty && self.burst_length < 1.0 {
            return sim_error!(format!(
                "burst length must be at least 1, got {}",
                self.burst_length
            ));
        }
        if self.hotspot_output >= switch_config.num_outputs {
            return sim_error!(format!(
                "hotspot output {} does not exist, there are {} outputs",
                self.hotspot_output, switch_config.num_outputs
            ));
        }
        Ok(())
    }

    /// Share of the offered cells that are multicast.
    #[must_use]
    pub fn multicast_share(&self) -> f64 {
        match self.pattern {
            TrafficPattern::Multicast => self.multicast_fraction,
            TrafficPattern::Bernoulli | TrafficPattern::Bursty | TrafficPattern::Hotspot => 0.0,
        }
    }
}

/// How a unicast destination is drawn.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OutputChoice {
    Uniform,
    Hotspot { output: usize, fraction: f64 },
}

impl OutputChoice {
    pub fn choose(&self, rng: &mut Xoshiro256PlusPlus, num_outputs: usize) -> usize {
        match *self {
            OutputChoice::Uniform => rng.random_range(0..num_outputs),
            OutputChoice::Hotspot { output, fraction } => {
                if rng.random_bool(fraction) {
                    output
                } else {
                    rng.random_range(0..num_outputs)
                }
            }
        }
    }
}

/// Create one generator per input of the switch.
pub fn create_generators(
    parent: &Rc<Entity>,
    switch_config: &SwitchConfig,
    config: &TrafficConfig,
    seed: u64,
) -> Result<Vec<Box<dyn Generate>>, SimError> {
    config.validate(switch_config)?;
    let traffic = Rc::new(Entity::new(parent, "traffic"));
    let generators = (0..switch_config.num_inputs)
        .map(|input| -> Box<dyn Generate> {
            let name = format!("gen{input}");
            match config.pattern {
                TrafficPattern::Bernoulli => Box::new(Bernoulli::new(
                    &traffic,
                    &name,
                    switch_config,
                    config.load,
                    OutputChoice::Uniform,
                    seed,
                )),
                TrafficPattern::Hotspot => Box::new(Bernoulli::new(
                    &traffic,
                    &name,
                    switch_config,
                    config.load,
                    OutputChoice::Hotspot {
                        output: config.hotspot_output,
                        fraction: config.hotspot_fraction,
                    },
                    seed,
                )),
                TrafficPattern::Bursty => Box::new(Bursty::new(
                    &traffic,
                    &name,
                    switch_config,
                    config.load,
                    config.burst_length,
                    seed,
                )),
                TrafficPattern::Multicast => Box::new(MulticastBernoulli::new(
                    &traffic,
                    &name,
                    switch_config,
                    config,
                    seed,
                )),
            }
        })
        .collect();
    Ok(generators)
}
