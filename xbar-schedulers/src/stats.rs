// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Counters shared by the schedulers.

/// Matching quality counters reported through `report_stats`.
#[derive(Clone, Debug, Default)]
pub struct MatchStats {
    execs: u64,
    admitted: u64,
    iterations: u64,
}

impl MatchStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record one `exec` that admitted `admitted` lines after `iterations`
    /// iterations.
    pub fn record(&mut self, admitted: usize, iterations: usize) {
        self.execs += 1;
        self.admitted += admitted as u64;
        self.iterations += iterations as u64;
    }

    #[must_use]
    pub fn execs(&self) -> u64 {
        self.execs
    }

    #[must_use]
    pub fn mean_admitted(&self) -> f64 {
        self.mean(self.admitted)
    }

    #[must_use]
    pub fn mean_iterations(&self) -> f64 {
        self.mean(self.iterations)
    }

    fn mean(&self, total: u64) -> f64 {
        if self.execs == 0 {
            0.0
        } else {
            total as f64 / self.execs as f64
        }
    }

    /// The counters in the form returned by `report_stats`.
    #[must_use]
    pub fn report(&self) -> Vec<(String, f64)> {
        vec![
            ("mean admitted".to_string(), self.mean_admitted()),
            ("mean iterations".to_string(), self.mean_iterations()),
        ]
    }
}
