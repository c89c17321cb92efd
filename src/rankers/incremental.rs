//! Incremental Elo-style ranker
//!
//! Replays a match history in order. For each result the winner-minus-loser
//! difference `d` is looked up in a [`WinProbabilityTable`] and the winner
//! gains `k·f(d)` while the loser gives up the same amount, so every step
//! preserves the sum of ranks.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RankError, RankResult};
use crate::rankers::Ranker;
use crate::tournament::{Match, OutcomeMatrix, Tournament};

/// Albers & de Vries empirical win probabilities by rating difference
const ALBERS_DE_VRIES: [(f64, f64); 51] = [
    (0.0, 0.50),
    (4.0, 0.51),
    (11.0, 0.52),
    (18.0, 0.53),
    (26.0, 0.54),
    (33.0, 0.55),
    (40.0, 0.56),
    (47.0, 0.57),
    (54.0, 0.58),
    (62.0, 0.59),
    (69.0, 0.60),
    (77.0, 0.61),
    (84.0, 0.62),
    (92.0, 0.63),
    (99.0, 0.64),
    (107.0, 0.65),
    (114.0, 0.66),
    (122.0, 0.67),
    (130.0, 0.68),
    (138.0, 0.69),
    (146.0, 0.70),
    (154.0, 0.71),
    (163.0, 0.72),
    (171.0, 0.73),
    (180.0, 0.74),
    (189.0, 0.75),
    (198.0, 0.76),
    (207.0, 0.77),
    (216.0, 0.78),
    (226.0, 0.79),
    (236.0, 0.80),
    (246.0, 0.81),
    (257.0, 0.82),
    (268.0, 0.83),
    (279.0, 0.84),
    (291.0, 0.85),
    (303.0, 0.86),
    (316.0, 0.87),
    (329.0, 0.88),
    (345.0, 0.89),
    (358.0, 0.90),
    (375.0, 0.91),
    (392.0, 0.92),
    (412.0, 0.93),
    (433.0, 0.94),
    (457.0, 0.95),
    (485.0, 0.96),
    (518.0, 0.97),
    (560.0, 0.98),
    (620.0, 0.99),
    (736.0, 1.00),
];

/// Monotone piecewise-linear win probability over non-negative differences
///
/// Saturates at the last control point and extends to negative differences
/// by `f(-d) = 1 - f(d)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct WinProbabilityTable {
    points: Vec<(f64, f64)>,
}

impl WinProbabilityTable {
    /// Table from `(difference, probability)` control points
    pub fn new(points: Vec<(f64, f64)>) -> RankResult<Self> {
        match points.first() {
            None => return Err(RankError::invalid("win probability table is empty")),
            Some(&(d, p)) if d != 0.0 || p != 0.5 => {
                return Err(RankError::invalid(format!(
                    "win probability table must start at (0, 0.5), got ({d}, {p})"
                )))
            }
            Some(_) => {}
        }
        for pair in points.windows(2) {
            let ((d0, p0), (d1, p1)) = (pair[0], pair[1]);
            if !(d1 > d0) || !d1.is_finite() {
                return Err(RankError::invalid(format!(
                    "differences must be finite and strictly increasing at {d1}"
                )));
            }
            if !(p1 >= p0 && p1 <= 1.0) {
                return Err(RankError::invalid(format!(
                    "probabilities must be non-decreasing within [0.5, 1] at {d1}"
                )));
            }
        }
        Ok(Self { points })
    }

    /// The 51-point table of Albers & de Vries
    pub fn albers_de_vries() -> Self {
        Self {
            points: ALBERS_DE_VRIES.to_vec(),
        }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Expected score for a rating difference `d`
    pub fn probability(&self, d: f64) -> f64 {
        if d < 0.0 {
            return 1.0 - self.probability(-d);
        }
        let upper = self.points.partition_point(|&(x, _)| x <= d);
        if upper == 0 {
            return self.points[0].1;
        }
        let (d0, p0) = self.points[upper - 1];
        match self.points.get(upper) {
            None => p0,
            Some(_) if d == d0 => p0,
            Some(&(d1, p1)) => p0 + (p1 - p0) * (d - d0) / (d1 - d0),
        }
    }
}

impl Default for WinProbabilityTable {
    fn default() -> Self {
        Self::albers_de_vries()
    }
}

impl TryFrom<Vec<(f64, f64)>> for WinProbabilityTable {
    type Error = RankError;

    fn try_from(points: Vec<(f64, f64)>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<WinProbabilityTable> for Vec<(f64, f64)> {
    fn from(table: WinProbabilityTable) -> Self {
        table.points
    }
}

/// Sequential pairwise-update ranker
#[derive(Clone, Debug, PartialEq)]
pub struct IncrementalRanker {
    /// Step size
    pub k: f64,
    /// Expected-score lookup
    pub table: WinProbabilityTable,
    /// Rank from aggregate outcomes assuming equal prior strength
    pub use_pretournament_scores: bool,
}

impl Default for IncrementalRanker {
    fn default() -> Self {
        Self::new(32.0)
    }
}

impl IncrementalRanker {
    pub fn new(k: f64) -> Self {
        Self {
            k,
            table: WinProbabilityTable::albers_de_vries(),
            use_pretournament_scores: false,
        }
    }

    pub fn with_table(mut self, table: WinProbabilityTable) -> Self {
        self.table = table;
        self
    }

    pub fn with_pretournament_scores(mut self, enabled: bool) -> Self {
        self.use_pretournament_scores = enabled;
        self
    }

    fn check_step(&self) -> RankResult<()> {
        if !(self.k > 0.0 && self.k.is_finite()) {
            return Err(RankError::invalid(format!("step size must be positive, got {}", self.k)));
        }
        Ok(())
    }

    /// Replay `history` over `n` competitors starting from zero
    pub fn rank_history(&self, n: usize, history: &[Match]) -> RankResult<DVector<f64>> {
        self.check_step()?;
        let mut rank = DVector::zeros(n);
        for m in history {
            if m.winner >= n || m.loser >= n {
                return Err(RankError::invalid(format!(
                    "match {}-{} out of range for {n} competitors",
                    m.winner, m.loser
                )));
            }
            let delta = self.k * self.table.probability(rank[m.winner] - rank[m.loser]);
            rank[m.winner] += delta;
            rank[m.loser] -= delta;
        }
        debug!(players = n, matches = history.len(), "incremental ranks");
        Ok(rank)
    }

    /// History-free ranks `k/2 · (wins - losses)`
    pub fn rank_aggregate(&self, outcomes: &OutcomeMatrix) -> RankResult<DVector<f64>> {
        self.check_step()?;
        let n = outcomes.len();
        Ok(DVector::from_fn(n, |i, _| {
            0.5 * self.k * (outcomes.wins(i) - outcomes.losses(i))
        }))
    }
}

impl Ranker for IncrementalRanker {
    fn name(&self) -> &'static str {
        "incremental"
    }

    fn rank(&self, tournament: &Tournament) -> RankResult<DVector<f64>> {
        if self.use_pretournament_scores {
            self.rank_aggregate(tournament.outcomes())
        } else {
            self.rank_history(tournament.nplayers(), tournament.history()?)
        }
    }
}
