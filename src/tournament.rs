//! Tournament data handed to the rankers
//!
//! The contest-generation side of the system produces an outcome matrix and,
//! optionally, the ordered history of individual matches. This module holds
//! those inputs and checks that they agree with each other.

use nalgebra::DMatrix;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{RankError, RankResult};

/// Square matrix of pairwise win counts: `o[i, j]` is how often `i` beat `j`
#[derive(Clone, Debug, PartialEq)]
pub struct OutcomeMatrix {
    counts: DMatrix<f64>,
}

impl OutcomeMatrix {
    /// Wrap a matrix of non-negative, finite counts
    pub fn new(counts: DMatrix<f64>) -> RankResult<Self> {
        if counts.nrows() != counts.ncols() {
            return Err(RankError::DimensionMismatch {
                expected: counts.nrows(),
                actual: counts.ncols(),
            });
        }
        if let Some(bad) = counts.iter().find(|c| !c.is_finite() || **c < 0.0) {
            return Err(RankError::invalid(format!(
                "outcome counts must be finite and non-negative, found {bad}"
            )));
        }
        Ok(Self { counts })
    }

    /// Build from row-major counts
    pub fn from_row_slice(n: usize, counts: &[f64]) -> RankResult<Self> {
        if counts.len() != n * n {
            return Err(RankError::DimensionMismatch {
                expected: n * n,
                actual: counts.len(),
            });
        }
        Self::new(DMatrix::from_row_slice(n, n, counts))
    }

    /// All-zero outcomes for `n` competitors
    pub fn zeros(n: usize) -> Self {
        Self {
            counts: DMatrix::zeros(n, n),
        }
    }

    /// Number of competitors
    pub fn len(&self) -> usize {
        self.counts.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.nrows() == 0
    }

    /// How often `i` beat `j`
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.counts[(i, j)]
    }

    /// Total wins of `i`
    pub fn wins(&self, i: usize) -> f64 {
        self.counts.row(i).sum()
    }

    /// Total losses of `i`
    pub fn losses(&self, i: usize) -> f64 {
        self.counts.column(i).sum()
    }

    /// Total games per pair: `o + oᵀ`
    pub fn games(&self) -> DMatrix<f64> {
        &self.counts + self.counts.transpose()
    }

    /// Principal sub-matrix over `indices`
    pub fn select(&self, indices: &[usize]) -> Self {
        let k = indices.len();
        Self {
            counts: DMatrix::from_fn(k, k, |a, b| self.counts[(indices[a], indices[b])]),
        }
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.counts
    }
}

/// A single contest result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Match {
    pub winner: usize,
    pub loser: usize,
}

impl Match {
    pub fn new(winner: usize, loser: usize) -> Self {
        Self { winner, loser }
    }
}

impl From<(usize, usize)> for Match {
    fn from((winner, loser): (usize, usize)) -> Self {
        Self { winner, loser }
    }
}

/// Outcome matrix plus the optional ordered match history
#[derive(Clone, Debug, PartialEq)]
pub struct Tournament {
    outcomes: OutcomeMatrix,
    history: Option<Vec<Match>>,
}

impl Tournament {
    /// Outcome-only tournament; order-sensitive rankers cannot use it
    pub fn from_outcomes(outcomes: OutcomeMatrix) -> Self {
        Self {
            outcomes,
            history: None,
        }
    }

    /// Tournament from an ordered match history
    ///
    /// The competitor count is one more than the largest index seen.
    pub fn from_history(history: Vec<Match>) -> Self {
        let n = history
            .iter()
            .map(|m| m.winner.max(m.loser) + 1)
            .max()
            .unwrap_or(0);
        let mut counts = DMatrix::zeros(n, n);
        for m in &history {
            counts[(m.winner, m.loser)] += 1.0;
        }
        Self {
            outcomes: OutcomeMatrix { counts },
            history: Some(history),
        }
    }

    /// Outcome matrix plus a caller-supplied history, checked for consistency
    pub fn with_history(outcomes: OutcomeMatrix, history: Vec<Match>) -> RankResult<Self> {
        let n = outcomes.len();
        let mut counts = DMatrix::zeros(n, n);
        for m in &history {
            if m.winner >= n || m.loser >= n {
                return Err(RankError::invalid(format!(
                    "match {}-{} out of range for {} competitors",
                    m.winner, m.loser, n
                )));
            }
            counts[(m.winner, m.loser)] += 1.0;
        }
        if &counts != outcomes.as_matrix() {
            return Err(RankError::invalid("match history disagrees with outcome matrix"));
        }
        Ok(Self {
            outcomes,
            history: Some(history),
        })
    }

    /// Expand every outcome cell into matches and shuffle them
    ///
    /// Counts must be whole numbers.
    pub fn with_synthetic_history<R: Rng + ?Sized>(
        outcomes: OutcomeMatrix,
        rng: &mut R,
    ) -> RankResult<Self> {
        let n = outcomes.len();
        let mut history = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let count = outcomes.get(i, j);
                if count.fract() != 0.0 {
                    return Err(RankError::invalid(format!(
                        "cannot expand fractional count {count} into matches"
                    )));
                }
                history.extend(std::iter::repeat(Match::new(i, j)).take(count as usize));
            }
        }
        history.shuffle(rng);
        Ok(Self {
            outcomes,
            history: Some(history),
        })
    }

    /// Number of competitors
    pub fn nplayers(&self) -> usize {
        self.outcomes.len()
    }

    pub fn outcomes(&self) -> &OutcomeMatrix {
        &self.outcomes
    }

    /// The ordered match history
    pub fn history(&self) -> RankResult<&[Match]> {
        self.history.as_deref().ok_or(RankError::MissingHistory)
    }

    pub fn has_history(&self) -> bool {
        self.history.is_some()
    }
}
