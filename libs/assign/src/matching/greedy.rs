//! Single-pass greedy matching for large pools.

use std::collections::HashSet;

use super::cost::MatchProblem;
use super::{MatchStrategy, StrategyKind};

/// Walks workers once; each takes its best category, with a large bonus for
/// categories nobody has claimed yet so coverage spreads first.
#[derive(Debug, Clone)]
pub struct GreedyMatcher {
    unclaimed_bonus: f64,
}

impl GreedyMatcher {
    pub fn new(unclaimed_bonus: f64) -> Self {
        Self { unclaimed_bonus }
    }
}

impl MatchStrategy for GreedyMatcher {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Greedy
    }

    fn solve(&self, problem: &MatchProblem) -> Vec<Option<usize>> {
        let mut claimed = HashSet::new();

        (0..problem.rows())
            .map(|row| {
                let mut best: Option<(usize, f64)> = None;
                for col in 0..problem.cols() {
                    let Some(score) = problem.score(row, col) else {
                        continue;
                    };
                    let bonus = if claimed.contains(&col) {
                        0.0
                    } else {
                        self.unclaimed_bonus
                    };
                    let total = score + bonus;
                    if best.is_none_or(|(_, current)| total > current) {
                        best = Some((col, total));
                    }
                }

                let (col, _) = best?;
                claimed.insert(col);
                Some(col)
            })
            .collect()
    }
}
