// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! A reusable request matrix.
//!
//! Rows are inputs and columns are outputs or fabric lines depending on the
//! scheduler. The buffers are sized once when a scheduler is created and
//! refilled every tick.

use std::fmt;

#[derive(Clone, Debug)]
pub struct RequestMatrix {
    rows: usize,
    cols: usize,
    requested: Vec<bool>,
    weights: Vec<i64>,
}

impl RequestMatrix {
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            requested: vec![false; rows * cols],
            weights: vec![0; rows * cols],
        }
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn clear(&mut self) {
        self.requested.fill(false);
        self.weights.fill(0);
    }

    /// Refill the matrix from a function returning the weight of each
    /// requested (row, col) or `None`.
    pub fn fill(&mut self, mut weight: impl FnMut(usize, usize) -> Option<i64>) {
        for row in 0..self.rows {
            for col in 0..self.cols {
                let index = row * self.cols + col;
                match weight(row, col) {
                    Some(w) => {
                        self.requested[index] = true;
                        self.weights[index] = w;
                    }
                    None => {
                        self.requested[index] = false;
                        self.weights[index] = 0;
                    }
                }
            }
        }
    }

    pub fn set(&mut self, row: usize, col: usize, weight: i64) {
        let index = row * self.cols + col;
        self.requested[index] = true;
        self.weights[index] = weight;
    }

    #[must_use]
    pub fn has(&self, row: usize, col: usize) -> bool {
        self.requested[row * self.cols + col]
    }

    /// Weight of a request, 0 if there is none.
    #[must_use]
    pub fn weight(&self, row: usize, col: usize) -> i64 {
        self.weights[row * self.cols + col]
    }

    #[must_use]
    pub fn non_empty_rows(&self) -> usize {
        (0..self.rows)
            .filter(|r| (0..self.cols).any(|c| self.has(*r, c)))
            .count()
    }

    #[must_use]
    pub fn non_empty_cols(&self) -> usize {
        (0..self.cols)
            .filter(|c| (0..self.rows).any(|r| self.has(r, *c)))
            .count()
    }
}

impl fmt::Display for RequestMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            for col in 0..self.cols {
                if self.has(row, col) {
                    write!(f, "{:>4}", self.weight(row, col))?;
                } else {
                    write!(f, "   .")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
