// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Layered configuration of a simulation.
//!
//! Every option can come from four places. Later ones win:
//!  - the built-in defaults,
//!  - a TOML file given with `--conf-file`,
//!  - environment variables named after the option with an `XBAR_` prefix
//!    (for example `XBAR_RUN_TICKS`),
//!  - the command line.
//!
//! All fields are optional so that a layer only overrides the values it sets.

use std::path::PathBuf;

use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use xbar_engine::engine::{ConvergenceConfig, EngineConfig};
use xbar_engine::sim_error;
use xbar_engine::switch::SwitchConfig;
use xbar_engine::types::{SimError, Tick};
use xbar_models::overflow::BufferScope;
use xbar_models::traffic::{TrafficConfig, TrafficPattern};
use xbar_schedulers::registry::{SchedulerKind, split_options};

/// Prefix of the environment variables read.
pub const ENV_PREFIX: &str = "XBAR_";

#[derive(Parser, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[command(
    name = "xbar-sim",
    about = "Input-queued crossbar switch scheduling simulator"
)]
pub struct Config {
    /// Path to a TOML file setting any of the options below.
    #[arg(long)]
    #[serde(skip)]
    pub conf_file: Option<PathBuf>,

    /// Print the options of the selected scheduler and exit.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip)]
    pub scheduler_usage: Option<bool>,

    /// Number of switch inputs [default: 16]
    #[arg(long)]
    pub inputs: Option<usize>,

    /// Number of switch outputs [default: 16]
    #[arg(long)]
    pub outputs: Option<usize>,

    /// Number of priority levels, 0 being the highest [default: 1]
    #[arg(long)]
    pub priorities: Option<usize>,

    /// Number of fabric lines into each output [default: 1]
    #[arg(long)]
    pub lines_per_output: Option<usize>,

    /// The scheduling algorithm [default: islip]
    #[arg(long, value_enum)]
    pub scheduler: Option<SchedulerKind>,

    /// Options passed to the scheduler, for example "-i 4".
    #[arg(long, allow_hyphen_values = true)]
    pub scheduler_options: Option<String>,

    /// Seed of every random stream [default: 1]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of ticks to simulate [default: 100000]
    #[arg(long)]
    pub run_ticks: Option<Tick>,

    /// Statistics are reset after this many ticks [default: 0]
    #[arg(long)]
    pub warmup_ticks: Option<Tick>,

    /// Ticks between traffic arrivals [default: 1]
    #[arg(long)]
    pub traffic_period: Option<Tick>,

    /// Ticks between scheduling decisions [default: 1]
    #[arg(long)]
    pub fabric_period: Option<Tick>,

    /// Ticks between output departures [default: 1]
    #[arg(long)]
    pub output_period: Option<Tick>,

    /// Ticks between statistics resets, 0 to never reset [default: 0]
    #[arg(long)]
    pub stats_reset_period: Option<Tick>,

    /// Ticks between scheduler state checks, 0 to never check [default: 0]
    #[arg(long)]
    pub check_state_period: Option<Tick>,

    /// Ticks between progress reports in the log, 0 for none [default: 0]
    #[arg(long)]
    pub report_period: Option<Tick>,

    /// Ticks between convergence checks, 0 to always run to the end
    /// [default: 0]
    #[arg(long)]
    pub convergence_period: Option<Tick>,

    /// Largest relative change of the mean queueing latency counted as
    /// stable [default: 0.01]
    #[arg(long)]
    pub convergence_threshold: Option<f64>,

    /// Consecutive stable checks needed to stop [default: 3]
    #[arg(long)]
    pub convergence_required: Option<usize>,

    /// Abort when more cells than this are buffered, 0 for no limit
    /// [default: 0]
    #[arg(long)]
    pub max_cells: Option<usize>,

    /// The traffic model [default: bernoulli]
    #[arg(long, value_enum)]
    pub traffic: Option<TrafficPattern>,

    /// Offered load per input [default: 0.5]
    #[arg(long)]
    pub load: Option<f64>,

    /// Mean burst length of bursty traffic [default: 16]
    #[arg(long)]
    pub burst_length: Option<f64>,

    /// The hot output of hotspot traffic [default: 0]
    #[arg(long)]
    pub hotspot_output: Option<usize>,

    /// Share of hotspot traffic sent to the hot output [default: 0.5]
    #[arg(long)]
    pub hotspot_fraction: Option<f64>,

    /// Share of multicast traffic that is multicast [default: 1]
    #[arg(long)]
    pub multicast_fraction: Option<f64>,

    /// Probability of each output being a multicast destination
    /// [default: 0.5]
    #[arg(long)]
    pub fanout_probability: Option<f64>,

    /// Cells buffered per input (or queue) before arrivals are dropped, 0
    /// for no limit [default: 0]
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// What the buffer size applies to [default: input]
    #[arg(long, value_enum)]
    pub buffer_scope: Option<BufferScope>,

    /// Cells each output sends per output tick [default: 1]
    #[arg(long)]
    pub egress_rate: Option<usize>,

    /// Log to the console.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub stdout: Option<bool>,

    /// Level of console log messages [default: Info]
    #[arg(long)]
    pub stdout_level: Option<log::Level>,

    /// Only entities matching this regular expression log at
    /// `--stdout-level`, the others only report errors.
    #[arg(long)]
    pub stdout_filter_regex: Option<String>,

    /// Write a text trace to this file.
    #[arg(long)]
    pub trace_file: Option<String>,

    /// Level of trace file messages [default: Debug]
    #[arg(long)]
    pub trace_level: Option<log::Level>,

    /// Only entities matching this regular expression are traced at
    /// `--trace-level`, the others only report errors.
    #[arg(long)]
    pub trace_filter_regex: Option<String>,

    /// Show a progress bar.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub progress: Option<bool>,

    /// Ticks between progress bar updates [default: 1000]
    #[arg(long)]
    pub progress_ticks: Option<Tick>,
}

impl Default for Config {
    fn default() -> Self {
        let engine = EngineConfig::default();
        let traffic = TrafficConfig::default();
        Self {
            conf_file: None,
            scheduler_usage: None,
            inputs: Some(16),
            outputs: Some(16),
            priorities: Some(1),
            lines_per_output: Some(1),
            scheduler: Some(SchedulerKind::default()),
            scheduler_options: Some(String::new()),
            seed: Some(1),
            run_ticks: Some(100_000),
            warmup_ticks: Some(engine.warmup_ticks),
            traffic_period: Some(engine.traffic_period),
            fabric_period: Some(engine.fabric_period),
            output_period: Some(engine.output_period),
            stats_reset_period: Some(0),
            check_state_period: Some(0),
            report_period: Some(0),
            convergence_period: Some(0),
            convergence_threshold: Some(0.01),
            convergence_required: Some(3),
            max_cells: Some(0),
            traffic: Some(traffic.pattern),
            load: Some(traffic.load),
            burst_length: Some(traffic.burst_length),
            hotspot_output: Some(traffic.hotspot_output),
            hotspot_fraction: Some(traffic.hotspot_fraction),
            multicast_fraction: Some(traffic.multicast_fraction),
            fanout_probability: Some(traffic.fanout_probability),
            buffer_size: Some(0),
            buffer_scope: Some(BufferScope::default()),
            egress_rate: Some(1),
            stdout: Some(false),
            stdout_level: Some(log::Level::Info),
            stdout_filter_regex: Some(String::new()),
            trace_file: Some(String::new()),
            trace_level: Some(log::Level::Debug),
            trace_filter_regex: Some(String::new()),
            progress: Some(false),
            progress_ticks: Some(1000),
        }
    }
}

/// Copy every field the command line set over the configuration.
macro_rules! merge_fields {
    ($config:ident, $cli:ident ; $($field:ident),* $(,)?) => {
        $(
            if $cli.$field.is_some() {
                $config.$field = $cli.$field;
            }
        )*
    };
}

/// Look up a field that the defaults always set.
macro_rules! field {
    ($config:ident . $field:ident) => {
        required(stringify!($field), &$config.$field)?
    };
}

fn required<T: Clone>(name: &str, value: &Option<T>) -> Result<T, SimError> {
    value
        .clone()
        .ok_or_else(|| SimError(format!("No value for {name}")))
}

/// A zero period disables the feature.
fn period(value: Tick) -> Option<Tick> {
    (value > 0).then_some(value)
}

impl Config {
    /// Build the configuration from all sources, given the parsed command
    /// line.
    pub fn load(cli: Config) -> Result<Config, SimError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if let Some(conf_file) = &cli.conf_file {
            if !conf_file.is_file() {
                return sim_error!(format!("{} is not a file", conf_file.display()));
            }
            figment = figment.merge(Toml::file(conf_file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX));

        let mut config: Config = figment
            .extract()
            .map_err(|e| SimError(format!("Invalid configuration: {e}")))?;
        config.merge_cli(cli);
        Ok(config)
    }

    /// Parse the process arguments and combine them with the other sources.
    pub fn parse_all_sources() -> Result<Config, SimError> {
        Config::load(Config::parse())
    }

    fn merge_cli(&mut self, cli: Config) {
        let config = self;
        merge_fields!(config, cli ;
            conf_file, scheduler_usage,
            inputs, outputs, priorities, lines_per_output,
            scheduler, scheduler_options, seed,
            run_ticks, warmup_ticks, traffic_period, fabric_period, output_period,
            stats_reset_period, check_state_period, report_period,
            convergence_period, convergence_threshold, convergence_required, max_cells,
            traffic, load, burst_length, hotspot_output, hotspot_fraction,
            multicast_fraction, fanout_probability,
            buffer_size, buffer_scope, egress_rate,
            stdout, stdout_level, stdout_filter_regex,
            trace_file, trace_level, trace_filter_regex,
            progress, progress_ticks,
        );
    }

    /// Check the values and convert them into the configuration of each part
    /// of the simulation.
    pub fn to_sim_config(&self) -> Result<SimConfig, SimError> {
        let config = self;
        let switch = SwitchConfig::new(
            field!(config.inputs),
            field!(config.outputs),
            field!(config.priorities),
            field!(config.lines_per_output),
        )?;

        let convergence = period(field!(config.convergence_period)).map(|period| {
            ConvergenceConfig {
                period,
                threshold: config.convergence_threshold.unwrap_or(0.01),
                required: config.convergence_required.unwrap_or(3),
            }
        });
        let engine = EngineConfig {
            run_ticks: field!(config.run_ticks),
            traffic_period: field!(config.traffic_period),
            fabric_period: field!(config.fabric_period),
            output_period: field!(config.output_period),
            warmup_ticks: field!(config.warmup_ticks),
            stats_reset_period: period(field!(config.stats_reset_period)),
            convergence,
            max_cells: Some(field!(config.max_cells)).filter(|m| *m > 0),
            check_state_period: period(field!(config.check_state_period)),
            report_period: period(field!(config.report_period)),
        };
        engine.validate()?;

        let traffic = TrafficConfig {
            pattern: field!(config.traffic),
            load: field!(config.load),
            burst_length: field!(config.burst_length),
            hotspot_output: field!(config.hotspot_output),
            hotspot_fraction: field!(config.hotspot_fraction),
            multicast_fraction: field!(config.multicast_fraction),
            fanout_probability: field!(config.fanout_probability),
        };
        traffic.validate(&switch)?;
        let scheduler = field!(config.scheduler);
        scheduler.check_traffic(traffic.multicast_share())?;

        let egress_rate = field!(config.egress_rate);
        if egress_rate == 0 {
            return sim_error!("The egress rate must be at least 1 cell per tick");
        }

        Ok(SimConfig {
            switch,
            engine,
            traffic,
            scheduler,
            scheduler_options: split_options(&field!(config.scheduler_options)),
            seed: field!(config.seed),
            buffer_size: Some(field!(config.buffer_size)).filter(|b| *b > 0),
            buffer_scope: field!(config.buffer_scope),
            egress_rate,
        })
    }
}

/// The checked configuration of one simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct SimConfig {
    pub switch: SwitchConfig,
    pub engine: EngineConfig,
    pub traffic: TrafficConfig,
    pub scheduler: SchedulerKind,
    pub scheduler_options: Vec<String>,
    pub seed: u64,

    /// Input buffer limit, if any.
    pub buffer_size: Option<usize>,
    pub buffer_scope: BufferScope,
    pub egress_rate: usize,
}
