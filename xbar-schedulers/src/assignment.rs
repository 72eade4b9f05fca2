// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Maximum-weight assignment.
//!
//! The solver pads the weight matrix to a square with zero-weight dummy edges
//! and solves the minimum-cost assignment on `cost = -weight` with the
//! primal-dual shortest augmenting path method. Rows are added one at a
//! time: the set of labelled columns grows by relaxing reduced costs
//! `cost - u[row] - v[col]` until an unmatched column is reached, then the
//! path is augmented. Whenever the search stalls the duals of the labelled
//! columns and of the rows matched to them shift by the smallest slack so
//! every reduced cost stays non-negative and every matched edge keeps a
//! reduced cost of zero.
//!
//! All buffers are allocated for the largest problem up front and reused.

const INF: i64 = i64::MAX / 4;

pub struct AssignmentSolver {
    capacity: usize,
    n: usize,
    cost: Vec<i64>,
    // Potentials and matching are 1-indexed; index 0 is the virtual root.
    u: Vec<i64>,
    v: Vec<i64>,
    col_match: Vec<usize>,
    way: Vec<usize>,
    min_slack: Vec<i64>,
    labelled: Vec<bool>,
    row_match: Vec<Option<usize>>,
}

impl AssignmentSolver {
    /// Create a solver for problems of up to `capacity` rows and columns.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let n = capacity + 1;
        Self {
            capacity,
            n: 0,
            cost: vec![0; capacity * capacity],
            u: vec![0; n],
            v: vec![0; n],
            col_match: vec![0; n],
            way: vec![0; n],
            min_slack: vec![0; n],
            labelled: vec![false; n],
            row_match: vec![None; capacity],
        }
    }

    fn cost(&self, row: usize, col: usize) -> i64 {
        self.cost[row * self.n + col]
    }

    /// Solve the maximum-weight assignment of a `rows` x `cols` problem.
    ///
    /// Returns, for each row, the column it is assigned to. Rows or columns
    /// beyond the real problem size are padding and never reported, but a
    /// real row may be matched to a real column through a zero-weight edge.
    ///
    /// Panics if the problem is larger than the capacity.
    pub fn solve(
        &mut self,
        rows: usize,
        cols: usize,
        weight: impl Fn(usize, usize) -> i64,
    ) -> &[Option<usize>] {
        assert!(
            rows <= self.capacity && cols <= self.capacity,
            "{rows}x{cols} assignment exceeds capacity {}",
            self.capacity
        );
        let n = rows.max(cols);
        self.n = n;
        for row in 0..n {
            for col in 0..n {
                let w = if row < rows && col < cols {
                    weight(row, col)
                } else {
                    0
                };
                self.cost[row * n + col] = -w;
            }
        }

        self.u[..=n].fill(0);
        self.v[..=n].fill(0);
        self.col_match[..=n].fill(0);
        self.way[..=n].fill(0);

        for row in 1..=n {
            self.add_row(row);
        }

        self.row_match[..rows].fill(None);
        for col in 1..=n {
            let row = self.col_match[col];
            if row != 0 && row <= rows && col <= cols {
                self.row_match[row - 1] = Some(col - 1);
            }
        }
        &self.row_match[..rows]
    }

    fn add_row(&mut self, row: usize) {
        let n = self.n;
        self.col_match[0] = row;
        let mut col0 = 0;
        self.min_slack[..=n].fill(INF);
        self.labelled[..=n].fill(false);

        loop {
            self.labelled[col0] = true;
            let row0 = self.col_match[col0];
            let mut delta = INF;
            let mut col1 = 0;
            for col in 1..=n {
                if self.labelled[col] {
                    continue;
                }
                let reduced = self.cost(row0 - 1, col - 1) - self.u[row0] - self.v[col];
                if reduced < self.min_slack[col] {
                    self.min_slack[col] = reduced;
                    self.way[col] = col0;
                }
                if self.min_slack[col] < delta {
                    delta = self.min_slack[col];
                    col1 = col;
                }
            }
            for col in 0..=n {
                if self.labelled[col] {
                    self.u[self.col_match[col]] += delta;
                    self.v[col] -= delta;
                } else {
                    self.min_slack[col] -= delta;
                }
            }
            col0 = col1;
            if self.col_match[col0] == 0 {
                break;
            }
        }

        // Augment along the alternating path back to the root
        loop {
            let col1 = self.way[col0];
            self.col_match[col0] = self.col_match[col1];
            col0 = col1;
            if col0 == 0 {
                break;
            }
        }
    }

    /// Size of the (padded) square problem last solved.
    #[must_use]
    pub fn size(&self) -> usize {
        self.n
    }

    /// Reduced cost of an edge of the padded problem last solved.
    #[must_use]
    pub fn reduced_cost(&self, row: usize, col: usize) -> i64 {
        self.cost(row, col) - self.u[row + 1] - self.v[col + 1]
    }

    /// Column matched to a row of the padded problem last solved.
    #[must_use]
    pub fn padded_match(&self, row: usize) -> Option<usize> {
        (1..=self.n)
            .find(|col| self.col_match[*col] == row + 1)
            .map(|col| col - 1)
    }
}
