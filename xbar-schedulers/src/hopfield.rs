// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Hopfield network scheduler.
//!
//! Every (input, output) pair is a neuron with internal state `u` and output
//! `v = sigmoid(u / gain)`. Every neuron keeps its state from the previous
//! tick and is relaxed by
//!
//! ```text
//! du = step * (-u + bias + drive - inhibition * (row + col))
//! ```
//!
//! where `drive` is `length_factor` times the queue length normalised to the
//! longest queue, or `-empty_penalty` when the queue is empty, `row` is
//! the output of the other neurons of the same input and `col` is the output
//! of the other neurons of the same output beyond its number of fabric lines.
//! Once the outputs settle, neurons above one half are admitted greedily,
//! strongest first.
//!
//! The neuron of a queue that has just drained only decays over the
//! following steps, so with few iterations it can still be selected. Such
//! selections are counted as bad choices.

use std::rc::Rc;

use clap::Parser;
use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use xbar_engine::admission::AdmissionMatrix;
use xbar_engine::rng::component_rng;
use xbar_engine::switch::{Queues, SwitchConfig};
use xbar_engine::traits::Schedule;
use xbar_engine::types::SimError;
use xbar_model_builder::{EntityDisplay, EntityGet};
use xbar_track::entity::Entity;
use xbar_track::{debug, trace};

use crate::options;
use crate::stats::MatchStats;

/// Amplitude of the noise given to neurons whose queue fills up.
const NOISE: f64 = 1.0e-2;

#[derive(Parser, Debug)]
#[command(about = "Hopfield network scheduler")]
pub struct HopfieldOptions {
    /// Steepness of the sigmoid (smaller is steeper).
    #[arg(long, default_value_t = 0.1)]
    pub gain: f64,

    /// Size of each relaxation step.
    #[arg(long, default_value_t = 0.1)]
    pub step: f64,

    /// Constant excitation of every neuron.
    #[arg(long, default_value_t = 0.5)]
    pub bias: f64,

    /// Strength of the row and column inhibition.
    #[arg(long, default_value_t = 2.0)]
    pub inhibition: f64,

    /// Excitation of the longest queue.
    #[arg(long, default_value_t = 0.5)]
    pub length_factor: f64,

    /// Inhibition of the neurons of empty queues.
    #[arg(long, default_value_t = 4.0)]
    pub empty_penalty: f64,

    /// Maximum number of relaxation steps per tick.
    #[arg(short = 'i', long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_iterations: u64,

    /// The network has settled when no output moves by this much.
    #[arg(short, long, default_value_t = 1.0e-3)]
    pub threshold: f64,
}

#[derive(EntityGet, EntityDisplay)]
pub struct Hopfield {
    pub entity: Rc<Entity>,
    config: SwitchConfig,
    options: HopfieldOptions,
    rng: Xoshiro256PlusPlus,
    u: Vec<f64>,
    v: Vec<f64>,
    du: Vec<f64>,
    length: Vec<f64>,
    row_sum: Vec<f64>,
    col_sum: Vec<f64>,
    order: Vec<usize>,
    stats: MatchStats,
    bad_choices: u64,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl Hopfield {
    pub fn new(
        parent: &Rc<Entity>,
        name: &str,
        config: &SwitchConfig,
        args: &[String],
        seed: u64,
    ) -> Result<Self, SimError> {
        let options: HopfieldOptions = options::parse(name, args)?;
        let positive = [
            ("gain", options.gain),
            ("step", options.step),
            ("threshold", options.threshold),
            ("empty penalty", options.empty_penalty),
        ];
        if let Some((what, value)) = positive.iter().find(|(_, v)| v.is_nan() || *v <= 0.0) {
            return Err(SimError(format!(
                "{name}: {what} must be positive, got {value}\n{}",
                options::usage::<HopfieldOptions>(name)
            )));
        }
        if options.step > 1.0 {
            return Err(SimError(format!(
                "{name}: step must not exceed 1, got {}\n{}",
                options.step,
                options::usage::<HopfieldOptions>(name)
            )));
        }

        let entity = Rc::new(Entity::new(parent, name));
        let rng = component_rng(seed, &entity);
        let size = config.num_inputs * config.num_outputs;
        let idle = options.bias - options.empty_penalty;
        let idle_output = sigmoid(idle / options.gain);
        Ok(Self {
            entity,
            config: *config,
            options,
            rng,
            u: vec![idle; size],
            v: vec![idle_output; size],
            du: vec![0.0; size],
            length: vec![0.0; size],
            row_sum: vec![0.0; config.num_inputs],
            col_sum: vec![0.0; config.num_outputs],
            order: Vec::with_capacity(size),
            stats: MatchStats::default(),
            bad_choices: 0,
        })
    }

    /// The output of the neuron of (input, output).
    #[must_use]
    pub fn output(&self, input: usize, output: usize) -> f64 {
        self.v[input * self.config.num_outputs + output]
    }

    #[must_use]
    pub fn bad_choices(&self) -> u64 {
        self.bad_choices
    }

    fn rebias(&mut self, queues: &Queues) {
        let num_outputs = self.config.num_outputs;
        let longest = (0..self.config.num_inputs)
            .flat_map(|i| (0..num_outputs).map(move |o| (i, o)))
            .map(|(i, o)| queues.voq_len(i, o))
            .max()
            .unwrap_or(0)
            .max(1) as f64;

        for input in 0..self.config.num_inputs {
            for output in 0..num_outputs {
                let index = input * num_outputs + output;
                let len = queues.voq_len(input, output);
                let filled = self.length[index] == 0.0 && len > 0;
                self.length[index] = len as f64 / longest;
                if filled {
                    self.u[index] = self.rng.random_range(-NOISE..NOISE);
                }
                self.v[index] = sigmoid(self.u[index] / self.options.gain);
            }
        }
    }

    /// One synchronous relaxation step. Returns the largest change of any
    /// neuron output.
    fn relax(&mut self) -> f64 {
        let num_outputs = self.config.num_outputs;
        let lines = self.config.lines_per_output as f64;
        self.row_sum.fill(0.0);
        self.col_sum.fill(0.0);
        for (index, v) in self.v.iter().enumerate() {
            self.row_sum[index / num_outputs] += v;
            self.col_sum[index % num_outputs] += v;
        }

        let o = &self.options;
        for (index, du) in self.du.iter_mut().enumerate() {
            let v = self.v[index];
            let row = self.row_sum[index / num_outputs] - v;
            let col = (self.col_sum[index % num_outputs] - v - (lines - 1.0)).max(0.0);
            let length = self.length[index];
            let drive = if length > 0.0 {
                o.length_factor * length
            } else {
                -o.empty_penalty
            };
            *du = o.step * (-self.u[index] + o.bias + drive - o.inhibition * (row + col));
        }

        let mut max_delta: f64 = 0.0;
        for index in 0..self.u.len() {
            self.u[index] += self.du[index];
            let v = sigmoid(self.u[index] / self.options.gain);
            max_delta = max_delta.max((v - self.v[index]).abs());
            self.v[index] = v;
        }
        max_delta
    }
}

impl Schedule for Hopfield {
    fn exec(&mut self, queues: &Queues, admission: &mut AdmissionMatrix) {
        self.rebias(queues);

        let mut iterations = 0;
        while iterations < self.options.max_iterations as usize {
            iterations += 1;
            if self.relax() < self.options.threshold {
                break;
            }
        }
        debug!(self.entity ; "settled after {iterations} iterations");

        let num_outputs = self.config.num_outputs;
        self.order.clear();
        self.order
            .extend((0..self.v.len()).filter(|index| self.v[*index] > 0.5));
        let v = &self.v;
        self.order
            .sort_by(|a, b| v[*b].total_cmp(&v[*a]).then(a.cmp(b)));

        let mut admitted = 0;
        for index in &self.order {
            let (input, output) = (index / num_outputs, index % num_outputs);
            let Some(priority) = queues.highest_unicast_priority(input, output) else {
                trace!(self.entity ; "{input} -> {output} chosen with nothing queued");
                self.bad_choices += 1;
                continue;
            };
            if admission.is_input_matched(input) {
                continue;
            }
            if admission.admit_unicast(input, output, priority) {
                trace!(self.entity ; "{input} -> {output} v {:.3}", self.v[*index]);
                admitted += 1;
            }
        }
        self.stats.record(admitted, iterations);
    }

    fn init_stats(&mut self) {
        self.stats.reset();
        self.bad_choices = 0;
    }

    fn report_stats(&self) -> Vec<(String, f64)> {
        let mut stats = self.stats.report();
        stats.push(("bad choices".to_string(), self.bad_choices as f64));
        stats
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn sigmoid_midpoint() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }
}
