//! Minimum-cost assignment for small pools.
//!
//! Each category is expanded into one slot per worker; slot `k` of a category
//! costs `k * crowding_penalty` on top of the pair cost. Every worker with at
//! least one capable category is then guaranteed a slot, and the solver
//! trades skill against spreading workers over categories. The expanded
//! matrix is solved exactly with the Hungarian method (potentials form,
//! O(rows^2 * cols)).

use tracing::debug;

use super::cost::MatchProblem;
use super::{MatchStrategy, StrategyKind};

/// Cost for pairs that must never be chosen.
const FORBIDDEN: f64 = 1.0e12;

/// Exact solver over the slot-expanded cost matrix.
#[derive(Debug, Clone)]
pub struct OptimalMatcher {
    crowding_penalty: f64,
}

impl OptimalMatcher {
    pub fn new(crowding_penalty: f64) -> Self {
        Self { crowding_penalty }
    }
}

impl MatchStrategy for OptimalMatcher {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Optimal
    }

    fn solve(&self, problem: &MatchProblem) -> Vec<Option<usize>> {
        let mut result = vec![None; problem.rows()];
        let cats = problem.cols();

        // Rows with no capable category stay unassigned and are left out.
        let rows: Vec<usize> = (0..problem.rows())
            .filter(|&row| problem.is_assignable(row))
            .collect();
        if rows.is_empty() || cats == 0 {
            return result;
        }

        let slots = rows.len();
        let width = cats * slots;
        let costs: Vec<Vec<f64>> = rows
            .iter()
            .map(|&row| {
                (0..width)
                    .map(|col| {
                        let (cat, slot) = (col / slots, col % slots);
                        problem
                            .cost(row, cat)
                            .map(|c| c + slot as f64 * self.crowding_penalty)
                            .unwrap_or(FORBIDDEN)
                    })
                    .collect()
            })
            .collect();

        let columns = hungarian(&costs, width);
        for (i, col) in columns.into_iter().enumerate() {
            let row = rows[i];
            let cat = col / slots;
            if problem.cost(row, cat).is_some() {
                result[row] = Some(cat);
            }
        }

        debug!(rows = rows.len(), columns = width, "Optimal match solved");
        result
    }
}

/// Hungarian method for an `n x m` matrix with `n <= m`.
///
/// Returns the chosen column for every row.
fn hungarian(costs: &[Vec<f64>], m: usize) -> Vec<usize> {
    let n = costs.len();
    debug_assert!(n <= m);

    // 1-indexed potentials; column 0 is a virtual start column.
    let mut u = vec![0.0; n + 1];
    let mut v = vec![0.0; m + 1];
    let mut owner = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for i in 1..=n {
        owner[0] = i;
        let mut j0 = 0;
        let mut minv = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[j0] = true;
            let i0 = owner[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0;

            for j in 1..=m {
                if used[j] {
                    continue;
                }
                let reduced = costs[i0 - 1][j - 1] - u[i0] - v[j];
                if reduced < minv[j] {
                    minv[j] = reduced;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=m {
                if used[j] {
                    u[owner[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if owner[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            owner[j0] = owner[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; n];
    for j in 1..=m {
        if owner[j] != 0 {
            assignment[owner[j] - 1] = j - 1;
        }
    }
    assignment
}
