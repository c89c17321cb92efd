//! Boyd–Silk cardinal dominance ranks
//!
//! A multiplicative fixed-point iteration on positive weights `p`:
//!
//! ```text
//! p'_i = Σ_j o_ij / Σ_j (o_ij + o_ji) / (p_i + p_j)
//! ```
//!
//! renormalized to sum to one after every step. The reported rank is
//! `log p` re-centered to zero mean.
//!
//! Reference: Boyd & Silk, "A Method for Assigning Cardinal Dominance
//! Ranks", Anim. Behav. 31 (1983).

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{ConvergenceError, RankError, RankResult};
use crate::numeric::guarded;
use crate::rankers::Ranker;
use crate::tournament::{OutcomeMatrix, Tournament};

/// One unnormalized fixed-point step
pub fn dominance_step(weights: &DVector<f64>, outcomes: &OutcomeMatrix) -> DVector<f64> {
    let games = outcomes.games();
    let n = weights.len();
    DVector::from_fn(n, |i, _| {
        let exposure: f64 = (0..n).map(|j| games[(i, j)] / (weights[i] + weights[j])).sum();
        outcomes.wins(i) / exposure
    })
}

/// Converged weights and the ranks derived from them
#[derive(Clone, Debug, PartialEq)]
pub struct DominanceFit {
    /// Weights summing to one
    pub weights: DVector<f64>,
    /// Zero-mean log weights
    pub rank: DVector<f64>,
    /// Steps taken
    pub iterations: usize,
}

/// Fixed-point dominance ranker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DominanceRanker {
    /// Stop once successive weight vectors are this close in L1
    pub tolerance: f64,
    /// Steps allowed before giving up
    pub iteration_limit: usize,
}

impl Default for DominanceRanker {
    fn default() -> Self {
        Self {
            tolerance: 5e-4,
            iteration_limit: 10_000,
        }
    }
}

impl DominanceRanker {
    pub fn new(tolerance: f64, iteration_limit: usize) -> Self {
        Self {
            tolerance,
            iteration_limit,
        }
    }

    pub fn validate(&self) -> RankResult<()> {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(RankError::invalid(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.iteration_limit == 0 {
            return Err(RankError::invalid("iteration limit must be at least 1"));
        }
        Ok(())
    }

    /// Iterate to the fixed point
    pub fn fit(&self, outcomes: &OutcomeMatrix) -> RankResult<DominanceFit> {
        self.validate()?;
        self.iterate(outcomes).map_err(|err| {
            warn!(error = %err, "dominance ranking failed");
            err
        })
    }

    fn iterate(&self, outcomes: &OutcomeMatrix) -> RankResult<DominanceFit> {
        let n = outcomes.len();
        if n == 0 {
            return Ok(DominanceFit {
                weights: DVector::zeros(0),
                rank: DVector::zeros(0),
                iterations: 0,
            });
        }

        let mut weights = DVector::from_element(n, 1.0 / n as f64);
        for iteration in 1..=self.iteration_limit {
            let next = guarded("dominance step", || dominance_step(&weights, outcomes))?;
            let distance = (&next - &weights).lp_norm(1);
            trace!(iteration, distance, "dominance step");

            let total = next.sum();
            weights = guarded("dominance normalization", || next / total)?;

            if distance <= self.tolerance {
                // A winless competitor leaves a zero weight here
                let rank = guarded("dominance rank", || {
                    let logs = weights.map(f64::ln);
                    let mean = logs.mean();
                    logs.add_scalar(-mean)
                })?;
                debug!(players = n, iterations = iteration, "dominance ranks converged");
                return Ok(DominanceFit {
                    weights,
                    rank,
                    iterations: iteration,
                });
            }
        }

        Err(ConvergenceError::IterationLimit {
            limit: self.iteration_limit,
        }
        .into())
    }
}

impl Ranker for DominanceRanker {
    fn name(&self) -> &'static str {
        "dominance"
    }

    fn rank(&self, tournament: &Tournament) -> RankResult<DVector<f64>> {
        Ok(self.fit(tournament.outcomes())?.rank)
    }
}
