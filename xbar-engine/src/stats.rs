// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Statistics collected while the switch runs.

use std::fmt;

use crate::cell::Cell;
use crate::switch::{Queues, SwitchConfig};
use crate::types::Tick;

const LATENCY_BUCKET_WIDTH: u64 = 1;
const LATENCY_NUM_BUCKETS: usize = 1024;

/// A histogram of integer samples with fixed-width buckets.
///
/// Values beyond the last bucket are counted in the last bucket but still
/// contribute exactly to the mean and extremes.
#[derive(Clone, Debug)]
pub struct Histogram {
    bucket_width: u64,
    buckets: Vec<u64>,
    count: u64,
    sum: f64,
    sum_squares: f64,
    min: Option<u64>,
    max: Option<u64>,
}

impl Histogram {
    #[must_use]
    pub fn new(bucket_width: u64, num_buckets: usize) -> Self {
        Self {
            bucket_width: bucket_width.max(1),
            buckets: vec![0; num_buckets.max(1)],
            count: 0,
            sum: 0.0,
            sum_squares: 0.0,
            min: None,
            max: None,
        }
    }

    pub fn add(&mut self, value: u64) {
        let last = self.buckets.len() - 1;
        let bucket = usize::try_from(value / self.bucket_width).map_or(last, |b| b.min(last));
        self.buckets[bucket] += 1;
        self.count += 1;
        let v = value as f64;
        self.sum += v;
        self.sum_squares += v * v;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    pub fn reset(&mut self) {
        self.buckets.fill(0);
        self.count = 0;
        self.sum = 0.0;
        self.sum_squares = 0.0;
        self.min = None;
        self.max = None;
    }

    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub fn min(&self) -> Option<u64> {
        self.min
    }

    #[must_use]
    pub fn max(&self) -> Option<u64> {
        self.max
    }

    /// The mean of all samples, or 0 if there are none.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    #[must_use]
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let variance = (self.sum_squares - self.sum * self.sum / n) / (n - 1.0);
        variance.max(0.0).sqrt()
    }

    /// Lower bound of the bucket holding the given percentile (0..=100).
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }
        let target = ((percentile / 100.0) * self.count as f64).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (bucket, count) in self.buckets.iter().enumerate() {
            seen += count;
            if seen >= target {
                return bucket as u64 * self.bucket_width;
            }
        }
        (self.buckets.len() as u64 - 1) * self.bucket_width
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} mean={:.3} sd={:.3} min={} max={} p99={}",
            self.count,
            self.mean(),
            self.std_dev(),
            self.min.unwrap_or(0),
            self.max.unwrap_or(0),
            self.percentile(99.0)
        )
    }
}

/// Statistics of the whole switch.
#[derive(Clone, Debug)]
pub struct SwitchStats {
    num_inputs: usize,
    num_outputs: usize,

    /// Tick at which collection (re)started.
    pub start_tick: Tick,

    pub arrivals: u64,
    pub drops: u64,
    pub transfers: u64,
    pub departures: u64,

    /// From creation to departure from the output queue.
    pub latency: Histogram,

    /// From arrival in an input queue to crossing the fabric.
    pub queueing_latency: Histogram,

    input_occupancy_sum: f64,
    output_occupancy_sum: f64,
    max_input_occupancy: usize,
    num_samples: u64,
}

impl SwitchStats {
    #[must_use]
    pub fn new(config: &SwitchConfig) -> Self {
        Self::with_ports(config.num_inputs, config.num_outputs)
    }

    fn with_ports(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            num_inputs,
            num_outputs,
            start_tick: 0,
            arrivals: 0,
            drops: 0,
            transfers: 0,
            departures: 0,
            latency: Histogram::new(LATENCY_BUCKET_WIDTH, LATENCY_NUM_BUCKETS),
            queueing_latency: Histogram::new(LATENCY_BUCKET_WIDTH, LATENCY_NUM_BUCKETS),
            input_occupancy_sum: 0.0,
            output_occupancy_sum: 0.0,
            max_input_occupancy: 0,
            num_samples: 0,
        }
    }

    /// Restart collection from `now`.
    pub fn reset(&mut self, now: Tick) {
        *self = Self {
            start_tick: now,
            ..Self::with_ports(self.num_inputs, self.num_outputs)
        };
    }

    pub fn record_arrival(&mut self) {
        self.arrivals += 1;
    }

    pub fn record_drop(&mut self) {
        self.drops += 1;
    }

    /// Record a cell crossing the fabric. Its fabric arrival must be stamped.
    pub fn record_transfer(&mut self, cell: &Cell) {
        self.transfers += 1;
        self.queueing_latency.add(
            cell.stamps
                .fabric_arrival
                .saturating_sub(cell.stamps.queue_arrival),
        );
    }

    pub fn record_departure(&mut self, cell: &Cell, now: Tick) {
        self.departures += 1;
        self.latency.add(now.saturating_sub(cell.stamps.created));
    }

    /// Sample the queue occupancy.
    pub fn sample(&mut self, queues: &Queues) {
        let mut total = 0;
        for input in 0..self.num_inputs {
            let occupancy = queues.input_occupancy(input);
            self.max_input_occupancy = self.max_input_occupancy.max(occupancy);
            total += occupancy;
        }
        self.input_occupancy_sum += total as f64 / self.num_inputs as f64;
        self.output_occupancy_sum += queues.total_output_cells() as f64 / self.num_outputs as f64;
        self.num_samples += 1;
    }

    /// Mean number of cells waiting per input.
    #[must_use]
    pub fn mean_input_occupancy(&self) -> f64 {
        if self.num_samples == 0 {
            0.0
        } else {
            self.input_occupancy_sum / self.num_samples as f64
        }
    }

    #[must_use]
    pub fn mean_output_occupancy(&self) -> f64 {
        if self.num_samples == 0 {
            0.0
        } else {
            self.output_occupancy_sum / self.num_samples as f64
        }
    }

    #[must_use]
    pub fn max_input_occupancy(&self) -> usize {
        self.max_input_occupancy
    }

    /// Departures per output per tick since `start_tick`.
    #[must_use]
    pub fn throughput(&self, now: Tick) -> f64 {
        let ticks = now.saturating_sub(self.start_tick);
        if ticks == 0 {
            0.0
        } else {
            self.departures as f64 / (ticks as f64 * self.num_outputs as f64)
        }
    }

    /// Fraction of arrivals that were dropped.
    #[must_use]
    pub fn drop_rate(&self) -> f64 {
        if self.arrivals == 0 {
            0.0
        } else {
            self.drops as f64 / self.arrivals as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn histogram_moments() {
        let mut h = Histogram::new(1, 16);
        for v in [2, 4, 4, 4, 5, 5, 7, 9] {
            h.add(v);
        }
        assert_eq!(h.count(), 8);
        assert_relative_eq!(h.mean(), 5.0);
        assert_relative_eq!(h.std_dev(), 2.138_089_935, epsilon = 1e-6);
        assert_eq!(h.min(), Some(2));
        assert_eq!(h.max(), Some(9));
        assert_eq!(h.percentile(50.0), 4);
        assert_eq!(h.percentile(100.0), 9);

        h.reset();
        assert_eq!(h.count(), 0);
        assert_relative_eq!(h.mean(), 0.0);
    }

    #[test]
    fn histogram_overflow_bucket() {
        let mut h = Histogram::new(10, 2);
        h.add(5);
        h.add(1000);
        assert_eq!(h.percentile(100.0), 10);
        assert_relative_eq!(h.mean(), 502.5);
    }

    #[test]
    fn throughput_and_drops() {
        let config = SwitchConfig::new(2, 2, 1, 1).unwrap();
        let mut stats = SwitchStats::new(&config);
        stats.reset(10);
        for _ in 0..4 {
            stats.record_arrival();
        }
        stats.record_drop();
        stats.departures = 10;
        assert_relative_eq!(stats.throughput(20), 0.5);
        assert_relative_eq!(stats.drop_rate(), 0.25);
    }
}
