// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use xbar_schedulers::assignment::AssignmentSolver;
use xbar_schedulers::max_size::BipartiteMatcher;
use xbar_schedulers::requests::RequestMatrix;
use xbar_schedulers::wavefront::wavefront;

fn random_requests(rng: &mut Xoshiro256PlusPlus, max_size: usize) -> RequestMatrix {
    let rows = rng.random_range(1..=max_size);
    let cols = rng.random_range(1..=max_size);
    let density = rng.random_range(0.1..0.9);
    let mut requests = RequestMatrix::new(rows, cols);
    requests.fill(|_, _| {
        if rng.random_bool(density) {
            Some(rng.random_range(1..=20))
        } else {
            None
        }
    });
    requests
}

/// The best total over every assignment of rows to distinct columns.
fn brute_force(requests: &RequestMatrix, value: impl Fn(usize, usize) -> i64) -> i64 {
    let n = requests.rows().max(requests.cols());
    (0..n)
        .permutations(n)
        .map(|perm| {
            perm.iter()
                .enumerate()
                .filter(|(row, col)| *row < requests.rows() && **col < requests.cols())
                .filter(|(row, col)| requests.has(*row, **col))
                .map(|(row, col)| value(row, *col))
                .sum::<i64>()
        })
        .max()
        .unwrap_or(0)
}

fn check_is_matching(requests: &RequestMatrix, matching: &[Option<usize>]) {
    let cols: Vec<usize> = matching.iter().flatten().copied().collect();
    assert!(cols.iter().all_unique(), "column used twice in {matching:?}");
    assert!(cols.iter().all(|c| *c < requests.cols()));
}

#[test]
fn max_size_equals_brute_force() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
    for _ in 0..40 {
        let requests = random_requests(&mut rng, 8);
        let mut matcher = BipartiteMatcher::new(requests.rows(), requests.cols());
        let matching = matcher.solve(&requests).to_vec();
        check_is_matching(&requests, &matching);

        let size = matching
            .iter()
            .enumerate()
            .filter(|(row, col)| col.is_some_and(|c| requests.has(*row, c)))
            .count();
        assert_eq!(size, matching.iter().flatten().count(), "non-request edge used");
        assert!(size <= requests.non_empty_rows().min(requests.non_empty_cols()));
        assert_eq!(size as i64, brute_force(&requests, |_, _| 1), "{requests}");
    }
}

#[test]
fn assignment_equals_brute_force() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(12);
    let mut solver = AssignmentSolver::new(7);
    for _ in 0..40 {
        let requests = random_requests(&mut rng, 7);
        let matching = solver
            .solve(requests.rows(), requests.cols(), |r, c| requests.weight(r, c))
            .to_vec();
        check_is_matching(&requests, &matching);

        let total: i64 = matching
            .iter()
            .enumerate()
            .filter_map(|(row, col)| col.map(|c| requests.weight(row, c)))
            .sum();
        let best = brute_force(&requests, |r, c| requests.weight(r, c));
        assert_eq!(total, best, "{requests}");
    }
}

#[test]
fn assignment_duals_are_feasible_and_tight() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(13);
    let mut solver = AssignmentSolver::new(8);
    for _ in 0..40 {
        let requests = random_requests(&mut rng, 8);
        solver.solve(requests.rows(), requests.cols(), |r, c| requests.weight(r, c));
        let n = solver.size();
        for row in 0..n {
            for col in 0..n {
                assert!(
                    solver.reduced_cost(row, col) >= 0,
                    "negative reduced cost at ({row}, {col})"
                );
            }
            let matched = solver.padded_match(row).unwrap();
            assert_eq!(solver.reduced_cost(row, matched), 0);
        }
    }
}

#[test]
fn wavefront_all_ones_is_a_permutation() {
    let mut requests = RequestMatrix::new(3, 3);
    requests.fill(|_, _| Some(1));
    let mut grants = vec![None; 3];
    let mut busy = vec![false; 3];
    for offset in 0..3 {
        wavefront(&requests, offset, &mut grants, &mut busy);
        // The first diagonal swept already covers every row
        let expected: Vec<_> = (0..3).map(|row| Some((offset + 3 - row) % 3)).collect();
        assert_eq!(grants, expected);
    }
}

#[test]
fn wavefront_follows_diagonals() {
    // Row 0 requests columns 0 and 1, row 1 column 0, row 2 columns 1 and 2.
    let mut requests = RequestMatrix::new(3, 3);
    for (row, col) in [(0, 0), (0, 1), (1, 0), (2, 1), (2, 2)] {
        requests.set(row, col, 1);
    }
    let mut grants = vec![None; 3];
    let mut busy = vec![false; 3];

    // Diagonal 0 holds (0,0), (1,2) and (2,1); nothing else fits afterwards.
    wavefront(&requests, 0, &mut grants, &mut busy);
    assert_eq!(grants, vec![Some(0), None, Some(1)]);

    // Diagonal 1 holds (0,1), (1,0) and (2,2), all requested.
    wavefront(&requests, 1, &mut grants, &mut busy);
    assert_eq!(grants, vec![Some(1), Some(0), Some(2)]);

    // Diagonal 2 holds nothing requested; diagonal 0 then gives (0,0) and
    // (2,1).
    wavefront(&requests, 2, &mut grants, &mut busy);
    assert_eq!(grants, vec![Some(0), None, Some(1)]);
}

#[test]
fn wavefront_handles_rectangles() {
    let mut requests = RequestMatrix::new(2, 4);
    requests.fill(|_, _| Some(1));
    let mut grants = vec![None; 2];
    let mut busy = vec![false; 4];
    wavefront(&requests, 0, &mut grants, &mut busy);
    // N = 4: diagonal 0 gives (0,0) and (1,3)
    assert_eq!(grants, vec![Some(0), Some(3)]);
}
