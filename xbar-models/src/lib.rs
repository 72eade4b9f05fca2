// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! The parts of a crossbar simulation around the switch:
//!  - [`traffic`] generators that create cells at the inputs.
//!  - [`overflow`] policies that decide whether an arriving cell is queued.
//!  - [`egress`] policies that take cells out of the output queues.
//!
//! # Example
//!
//! ```rust
//! use xbar_engine::engine::{Engine, EngineConfig};
//! use xbar_engine::switch::SwitchConfig;
//! use xbar_engine::test_helpers::GreedyScheduler;
//! use xbar_models::egress::LineRate;
//! use xbar_models::traffic::{TrafficConfig, create_generators};
//! use xbar_track::tracker::dev_null_tracker;
//!
//! let config = EngineConfig {
//!     run_ticks: 100,
//!     ..EngineConfig::default()
//! };
//! let switch_config = SwitchConfig::new(4, 4, 1, 1).unwrap();
//! let mut engine = Engine::new(&dev_null_tracker(), config, switch_config).unwrap();
//!
//! let top = engine.top().clone();
//! for generator in create_generators(&top, &switch_config, &TrafficConfig::default(), 1).unwrap()
//! {
//!     engine.add_generator(generator);
//! }
//! engine.set_scheduler(Box::new(GreedyScheduler));
//! engine.set_egress(Box::new(LineRate::new(&top, "egress", 1)));
//!
//! let summary = engine.run().unwrap();
//! assert!(summary.stats.departures > 0);
//! ```

pub mod egress;
pub mod overflow;
pub mod traffic;
