// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The simulation loop.
//!
//! The [`Engine`] owns the [`Switch`] and the pluggable parts of a simulation
//! and advances time one tick per [`step`](Engine::step). Within a tick the
//! phases always run in the same order:
//!
//!  1. traffic: every generator may create one cell which the admission
//!     policy accepts or drops (every `traffic_period` ticks).
//!  2. scheduling: the scheduler fills a cleared admission matrix (every
//!     `fabric_period` ticks).
//!  3. fabric transfer: admitted cells move to the output queues (same ticks
//!     as scheduling).
//!  4. output: the egress policy removes cells from the output queues (every
//!     `output_period` ticks).
//!  5. housekeeping: occupancy sampling, statistics resets, state checks and
//!     progress reports.
//!
//! # Example
//!
//! ```rust
//! use xbar_engine::engine::{Engine, EngineConfig, StopReason};
//! use xbar_engine::switch::SwitchConfig;
//! use xbar_engine::test_helpers::{DrainOne, IdleScheduler};
//! use xbar_track::tracker::dev_null_tracker;
//!
//! let config = EngineConfig {
//!     run_ticks: 10,
//!     ..EngineConfig::default()
//! };
//! let switch_config = SwitchConfig::new(2, 2, 1, 1).unwrap();
//! let mut engine = Engine::new(&dev_null_tracker(), config, switch_config).unwrap();
//! engine.set_scheduler(Box::new(IdleScheduler));
//! engine.set_egress(Box::new(DrainOne));
//! let summary = engine.run().unwrap();
//! assert_eq!(summary.ticks, 10);
//! assert_eq!(summary.stop_reason, StopReason::TickBudget);
//! ```

use std::fmt;
use std::rc::Rc;

use xbar_track::entity::{Entity, toplevel};
use xbar_track::{Tracker, create_id, debug, error, exit, info, set_tick, trace};

use crate::cell::Cell;
use crate::sim_error;
use crate::stats::SwitchStats;
use crate::switch::{Switch, SwitchConfig};
use crate::traits::{Admit, Egress, Generate, Schedule};
use crate::types::{SimError, SimResult, Tick};

/// Early stop once the mean queueing latency settles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvergenceConfig {
    /// Ticks between checks.
    pub period: Tick,

    /// Maximum relative change between checks counted as stable.
    pub threshold: f64,

    /// Number of consecutive stable checks needed to stop.
    pub required: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Tick budget of a run.
    pub run_ticks: Tick,

    pub traffic_period: Tick,
    pub fabric_period: Tick,
    pub output_period: Tick,

    /// Statistics are reset once this many ticks have elapsed.
    pub warmup_ticks: Tick,

    pub stats_reset_period: Option<Tick>,
    pub convergence: Option<ConvergenceConfig>,

    /// Abort the run when more cells than this are buffered.
    pub max_cells: Option<usize>,

    pub check_state_period: Option<Tick>,
    pub report_period: Option<Tick>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_ticks: 10_000,
            traffic_period: 1,
            fabric_period: 1,
            output_period: 1,
            warmup_ticks: 0,
            stats_reset_period: None,
            convergence: None,
            max_cells: None,
            check_state_period: None,
            report_period: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> SimResult {
        if self.traffic_period == 0 || self.fabric_period == 0 || self.output_period == 0 {
            return sim_error!("Traffic, fabric and output periods must be at least 1 tick");
        }
        for (name, period) in [
            ("stats reset", self.stats_reset_period),
            ("check state", self.check_state_period),
            ("report", self.report_period),
        ] {
            if period == Some(0) {
                return sim_error!(format!("The {name} period must be at least 1 tick"));
            }
        }
        if let Some(convergence) = &self.convergence {
            if convergence.period == 0 || convergence.required == 0 {
                return sim_error!("Convergence needs a non-zero period and check count");
            }
            if convergence.threshold <= 0.0 {
                return sim_error!("The convergence threshold must be positive");
            }
        }
        Ok(())
    }
}

/// Why a run finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    TickBudget,
    Converged,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TickBudget => write!(f, "tick budget reached"),
            StopReason::Converged => write!(f, "converged"),
        }
    }
}

/// The results of a run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub ticks: Tick,
    pub stop_reason: StopReason,
    pub stats: SwitchStats,
    pub scheduler_stats: Vec<(String, f64)>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.stats;
        writeln!(f, "ticks: {} ({})", self.ticks, self.stop_reason)?;
        writeln!(
            f,
            "cells: {} arrived, {} dropped, {} transferred, {} departed",
            stats.arrivals, stats.drops, stats.transfers, stats.departures
        )?;
        writeln!(
            f,
            "mean input occupancy: {:.3} (max {})",
            stats.mean_input_occupancy(),
            stats.max_input_occupancy()
        )?;
        writeln!(
            f,
            "mean output occupancy: {:.3}",
            stats.mean_output_occupancy()
        )?;
        writeln!(f, "latency: {}", stats.latency)?;
        writeln!(f, "queueing latency: {}", stats.queueing_latency)?;
        write!(f, "throughput: {:.4}", stats.throughput(self.ticks))?;
        for (name, value) in &self.scheduler_stats {
            write!(f, "\n{name}: {value:.3}")?;
        }
        Ok(())
    }
}

type ProgressFn = Box<dyn FnMut(Tick)>;

pub struct Engine {
    top: Rc<Entity>,
    config: EngineConfig,
    switch: Switch,
    scheduler: Option<Box<dyn Schedule>>,
    generators: Vec<Box<dyn Generate>>,
    admit: Option<Box<dyn Admit>>,
    egress: Option<Box<dyn Egress>>,
    stats: SwitchStats,
    tick: Tick,
    last_mean_latency: Option<f64>,
    stable_checks: usize,
    progress: Option<(Tick, ProgressFn)>,
}

impl Engine {
    pub fn new(
        tracker: &Tracker,
        config: EngineConfig,
        switch_config: SwitchConfig,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let top = toplevel(tracker, "top");
        let switch = Switch::new(&top, "switch", switch_config);
        Ok(Self {
            top,
            config,
            stats: SwitchStats::new(&switch_config),
            switch,
            scheduler: None,
            generators: Vec::new(),
            admit: None,
            egress: None,
            tick: 0,
            last_mean_latency: None,
            stable_checks: 0,
            progress: None,
        })
    }

    #[must_use]
    pub fn top(&self) -> &Rc<Entity> {
        &self.top
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn switch(&self) -> &Switch {
        &self.switch
    }

    pub fn switch_mut(&mut self) -> &mut Switch {
        &mut self.switch
    }

    #[must_use]
    pub fn stats(&self) -> &SwitchStats {
        &self.stats
    }

    /// The next tick to be simulated.
    #[must_use]
    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn set_scheduler(&mut self, scheduler: Box<dyn Schedule>) {
        self.scheduler = Some(scheduler);
    }

    /// Attach a generator to the next input without one.
    pub fn add_generator(&mut self, generator: Box<dyn Generate>) {
        self.generators.push(generator);
    }

    /// Set the input admission policy. Without one every cell is accepted.
    pub fn set_admission(&mut self, admit: Box<dyn Admit>) {
        self.admit = Some(admit);
    }

    pub fn set_egress(&mut self, egress: Box<dyn Egress>) {
        self.egress = Some(egress);
    }

    /// Call `callback` with the current tick every `period` ticks.
    pub fn on_progress(&mut self, period: Tick, callback: impl FnMut(Tick) + 'static) {
        self.progress = Some((period.max(1), Box::new(callback)));
    }

    fn check_ready(&self) -> SimResult {
        if self.scheduler.is_none() {
            return sim_error!(format!("{}: no scheduler set", self.top));
        }
        if self.egress.is_none() {
            return sim_error!(format!("{}: no egress policy set", self.top));
        }
        let num_inputs = self.switch.config().num_inputs;
        if self.generators.len() > num_inputs {
            return sim_error!(format!(
                "{}: {} generators for {num_inputs} inputs",
                self.top,
                self.generators.len()
            ));
        }
        Ok(())
    }

    /// Simulate one tick.
    pub fn step(&mut self) -> SimResult {
        let tick = self.tick;
        set_tick!(self.top ; tick);
        self.switch.set_now(tick);

        if tick % self.config.traffic_period == 0 {
            self.traffic(tick)?;
        }
        if tick % self.config.fabric_period == 0 {
            self.fabric()?;
        }
        if tick % self.config.output_period == 0 {
            self.output(tick)?;
        }

        self.stats.sample(self.switch.queues());
        self.check_memory()?;

        self.tick += 1;
        self.housekeeping(self.tick)
    }

    fn traffic(&mut self, tick: Tick) -> SimResult {
        for (input, generator) in self.generators.iter_mut().enumerate() {
            let Some(arrival) = generator.generate(tick) else {
                continue;
            };
            let cell = Cell::new(
                create_id!(self.top),
                input,
                arrival.destination,
                arrival.priority,
                tick,
            );
            self.stats.record_arrival();

            let admitted = match self.admit.as_mut() {
                Some(admit) => admit.admit(self.switch.queues(), &cell),
                None => true,
            };
            if admitted {
                self.switch.enqueue(cell)?;
            } else {
                trace!(self.switch.entity ; "drop {cell}");
                self.stats.record_drop();
            }
        }
        Ok(())
    }

    fn fabric(&mut self) -> SimResult {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return sim_error!(format!("{}: no scheduler set", self.top));
        };
        self.switch.schedule(scheduler.as_mut());
        trace!(self.switch.entity ; "admit {}", self.switch.admission());
        let tick = self.tick;
        self.switch
            .transfer(&mut self.stats)
            .map_err(|e| e.context(format!("tick {tick}")))?;
        Ok(())
    }

    fn output(&mut self, tick: Tick) -> SimResult {
        let Some(egress) = self.egress.as_mut() else {
            return sim_error!(format!("{}: no egress policy set", self.top));
        };
        for output in 0..self.switch.config().num_outputs {
            for cell in egress.egress(self.switch.queues_mut(), output) {
                self.stats.record_departure(&cell, tick);
                exit!(self.switch.entity ; cell.id);
            }
        }
        Ok(())
    }

    fn check_memory(&self) -> SimResult {
        if let Some(max_cells) = self.config.max_cells {
            let buffered = self.switch.queues().total_cells();
            if buffered > max_cells {
                error!(self.top ; "{buffered} cells buffered, limit is {max_cells}");
                return sim_error!(format!(
                    "Memory ceiling exceeded at tick {}: {buffered} cells buffered (max {max_cells})",
                    self.tick
                ));
            }
        }
        Ok(())
    }

    /// End of tick processing. `elapsed` is the number of ticks simulated.
    fn housekeeping(&mut self, elapsed: Tick) -> SimResult {
        let warmup_done = self.config.warmup_ticks > 0 && elapsed == self.config.warmup_ticks;
        let periodic_reset = self
            .config
            .stats_reset_period
            .is_some_and(|p| elapsed % p == 0);
        if warmup_done || periodic_reset {
            debug!(self.top ; "reset statistics at tick {elapsed}");
            self.reset_stats(elapsed);
        }

        if let Some(period) = self.config.check_state_period {
            if elapsed % period == 0 {
                if let Some(scheduler) = &self.scheduler {
                    scheduler.check_state(self.switch.queues())?;
                }
            }
        }

        if let Some(period) = self.config.report_period {
            if elapsed % period == 0 {
                info!(self.top ; "tick {elapsed}: input occupancy {:.3}, latency {:.3}, throughput {:.4}",
                    self.stats.mean_input_occupancy(),
                    self.stats.latency.mean(),
                    self.stats.throughput(elapsed));
                if let Some(scheduler) = &self.scheduler {
                    let state = scheduler.report_state();
                    if !state.is_empty() {
                        debug!(self.switch.entity ; "{state}");
                    }
                }
            }
        }

        if let Some((period, callback)) = self.progress.as_mut() {
            if elapsed % *period == 0 {
                callback(elapsed);
            }
        }
        Ok(())
    }

    fn reset_stats(&mut self, now: Tick) {
        self.stats.reset(now);
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.init_stats();
        }
    }

    /// Whether the mean queueing latency has settled.
    fn converged(&mut self) -> bool {
        let Some(convergence) = self.config.convergence else {
            return false;
        };
        if self.tick <= self.config.warmup_ticks || self.tick % convergence.period != 0 {
            return false;
        }
        if self.stats.queueing_latency.count() == 0 {
            return false;
        }

        let mean = self.stats.queueing_latency.mean();
        let stable = match self.last_mean_latency {
            Some(last) if last > 0.0 => (mean - last).abs() / last < convergence.threshold,
            Some(_) => mean == 0.0,
            None => false,
        };
        self.last_mean_latency = Some(mean);
        self.stable_checks = if stable { self.stable_checks + 1 } else { 0 };
        debug!(self.top ; "convergence check: mean latency {mean:.4}, {} stable", self.stable_checks);
        self.stable_checks >= convergence.required
    }

    /// Run until the tick budget is used up or the statistics converge.
    pub fn run(&mut self) -> Result<RunSummary, SimError> {
        self.check_ready()?;
        info!(self.top ; "run {} ticks on {}", self.config.run_ticks, self.switch);

        let mut stop_reason = StopReason::TickBudget;
        while self.tick < self.config.run_ticks {
            self.step()?;
            if self.converged() {
                stop_reason = StopReason::Converged;
                break;
            }
        }

        let summary = self.summary(stop_reason);
        info!(self.top ; "finished: {}", summary.stop_reason);
        Ok(summary)
    }

    #[must_use]
    pub fn summary(&self, stop_reason: StopReason) -> RunSummary {
        RunSummary {
            ticks: self.tick,
            stop_reason,
            stats: self.stats.clone(),
            scheduler_stats: self
                .scheduler
                .as_ref()
                .map(|s| s.report_stats())
                .unwrap_or_default(),
        }
    }
}
