// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! Assemble and run a crossbar switch simulation.
//!
//! A [`SimConfig`](config::SimConfig) describes the switch, the engine
//! timing, the traffic and the scheduler. [`build_engine`] creates all the
//! parts and connects them to an [`Engine`], ready to run.
//!
//! # Example
//!
//! ```rust
//! use xbar_sim::build_engine;
//! use xbar_sim::config::Config;
//! use xbar_track::tracker::dev_null_tracker;
//!
//! let config = Config {
//!     inputs: Some(4),
//!     outputs: Some(4),
//!     run_ticks: Some(1000),
//!     ..Config::default()
//! };
//! let sim_config = config.to_sim_config().unwrap();
//! let mut engine = build_engine(&dev_null_tracker(), &sim_config).unwrap();
//! let summary = engine.run().unwrap();
//! assert_eq!(summary.ticks, 1000);
//! ```

use xbar_engine::engine::{Engine, RunSummary};
use xbar_engine::types::SimError;
use xbar_models::egress::LineRate;
use xbar_models::overflow::DropTail;
use xbar_models::traffic::create_generators;
use xbar_track::builder::{TrackerConfig, TrackersConfig, setup_trackers};
use xbar_track::{Tracker, info};

pub mod config;

use config::{Config, SimConfig};

/// Create the engine and every part of the simulation.
pub fn build_engine(tracker: &Tracker, config: &SimConfig) -> Result<Engine, SimError> {
    let mut engine = Engine::new(tracker, config.engine.clone(), config.switch)?;
    let top = engine.top().clone();

    let scheduler = config.scheduler.init(
        &top,
        &config.switch,
        &config.scheduler_options,
        config.seed,
    )?;
    engine.set_scheduler(scheduler);

    for generator in create_generators(&top, &config.switch, &config.traffic, config.seed)? {
        engine.add_generator(generator);
    }
    if let Some(capacity) = config.buffer_size {
        engine.set_admission(Box::new(DropTail::new(
            &top,
            "overflow",
            capacity,
            config.buffer_scope,
        )));
    }
    engine.set_egress(Box::new(LineRate::new(&top, "egress", config.egress_rate)));

    let switch = &config.switch;
    info!(top ; "{}x{} switch, {} priorities, {} lines per output",
        switch.num_inputs, switch.num_outputs, switch.num_priorities, switch.lines_per_output);
    info!(top ; "scheduler {} {:?}, {} traffic at load {}, seed {}",
        config.scheduler, config.scheduler_options, config.traffic.pattern,
        config.traffic.load, config.seed);
    Ok(engine)
}

/// Build and run a simulation to completion.
pub fn simulate(tracker: &Tracker, config: &SimConfig) -> Result<RunSummary, SimError> {
    build_engine(tracker, config)?.run()
}

/// Set up the console and trace file trackers requested.
pub fn setup_tracker(config: &Config) -> Result<Tracker, SimError> {
    let stdout_filter = config.stdout_filter_regex.clone().unwrap_or_default();
    let trace_file = config.trace_file.clone().unwrap_or_default();
    let trace_filter = config.trace_filter_regex.clone().unwrap_or_default();

    let trackers = TrackersConfig {
        stdout: TrackerConfig {
            enable: config.stdout.unwrap_or(false),
            level: config.stdout_level.unwrap_or(log::Level::Info),
            filter_regex: &stdout_filter,
            file: None,
        },
        file: TrackerConfig {
            enable: !trace_file.is_empty(),
            level: config.trace_level.unwrap_or(log::Level::Debug),
            filter_regex: &trace_filter,
            file: Some(&trace_file),
        },
    };
    Ok(setup_trackers(&trackers)?)
}
