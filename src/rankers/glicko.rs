//! Glicko rating-period update
//!
//! One Bayesian update of every competitor's rating mean and deviation from
//! a rating period's outcome matrix, following Glickman's Glicko
//! system. Competitors with no games in the period are held fixed: the
//! update runs on the sub-tournament of participants and is merged back.

use std::f64::consts::{LN_10, PI};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RankError, RankResult};
use crate::numeric::guarded;
use crate::rankers::Ranker;
use crate::tournament::{OutcomeMatrix, Tournament};

/// Mean assigned to unrated competitors
pub const DEFAULT_RATING: f64 = 1500.0;

/// Deviation assigned to unrated competitors
pub const DEFAULT_DEVIATION: f64 = 350.0;

/// Scale constant `ln(10) / 400`
pub const Q: f64 = LN_10 / 400.0;

/// Rating means and deviations for a field of competitors
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingState {
    pub ratings: DVector<f64>,
    pub deviations: DVector<f64>,
}

impl RatingState {
    /// Every competitor at 1500 / 350
    pub fn unrated(n: usize) -> Self {
        Self {
            ratings: DVector::from_element(n, DEFAULT_RATING),
            deviations: DVector::from_element(n, DEFAULT_DEVIATION),
        }
    }

    pub fn new(ratings: DVector<f64>, deviations: DVector<f64>) -> RankResult<Self> {
        if ratings.len() != deviations.len() {
            return Err(RankError::DimensionMismatch {
                expected: ratings.len(),
                actual: deviations.len(),
            });
        }
        if ratings.iter().any(|r| !r.is_finite()) {
            return Err(RankError::invalid("ratings must be finite"));
        }
        if deviations.iter().any(|d| !(d.is_finite() && *d > 0.0)) {
            return Err(RankError::invalid("deviations must be finite and positive"));
        }
        Ok(Self { ratings, deviations })
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// State restricted to `indices`
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            ratings: self.ratings.select_rows(indices),
            deviations: self.deviations.select_rows(indices),
        }
    }

    /// Write `subset` back at `indices`
    fn scatter(&mut self, indices: &[usize], subset: &RatingState) {
        for (k, &i) in indices.iter().enumerate() {
            self.ratings[i] = subset.ratings[k];
            self.deviations[i] = subset.deviations[k];
        }
    }
}

/// Opponent-uncertainty discount `g(rd)²`
fn discount_squared(deviation: f64) -> f64 {
    1.0 / (1.0 + 3.0 * Q * Q * deviation * deviation / (PI * PI))
}

/// One rating-period update
///
/// Competitors with no games keep their mean and deviation exactly.
pub fn glicko_update(state: &RatingState, outcomes: &OutcomeMatrix) -> RankResult<RatingState> {
    let n = outcomes.len();
    if state.len() != n {
        return Err(RankError::DimensionMismatch {
            expected: n,
            actual: state.len(),
        });
    }

    let games = outcomes.games();
    let participants: Vec<usize> = (0..n)
        .filter(|&i| games.row(i).iter().any(|&g| g != 0.0))
        .collect();
    if participants.len() == n {
        return update_participants(state, outcomes);
    }

    debug!(
        players = n,
        participants = participants.len(),
        "holding isolated competitors fixed"
    );
    let mut next = state.clone();
    if !participants.is_empty() {
        let updated = update_participants(&state.select(&participants), &outcomes.select(&participants))?;
        next.scatter(&participants, &updated);
    }
    Ok(next)
}

/// Update assuming every competitor has at least one game
fn update_participants(state: &RatingState, outcomes: &OutcomeMatrix) -> RankResult<RatingState> {
    let n = state.len();
    let games = outcomes.games();
    let r = &state.ratings;
    let rd = &state.deviations;

    let (ratings, deviations) = guarded("glicko update", || {
        let g2 = rd.map(discount_squared);
        let g = g2.map(f64::sqrt);
        let mut ratings = DVector::zeros(n);
        let mut deviations = DVector::zeros(n);

        for i in 0..n {
            let mut information = 0.0;
            let mut surprise = 0.0;
            for j in 0..n {
                let expected = 1.0 / (1.0 + 10f64.powf(-g[j] * (r[i] - r[j]) / 400.0));
                information += games[(i, j)] * g2[j] * expected * (1.0 - expected);
                surprise += g[j] * (outcomes.get(i, j) - games[(i, j)] * expected);
            }
            // 1/rd² + 1/d²
            let precision = 1.0 / (rd[i] * rd[i]) + Q * Q * information;
            deviations[i] = (1.0 / precision).sqrt();
            ratings[i] = r[i] + Q / precision * surprise;
        }
        (ratings, deviations)
    })
    .map_err(|fault| {
        warn!(%fault, "glicko update failed");
        RankError::from(fault)
    })?;

    Ok(RatingState { ratings, deviations })
}

/// Ranker that applies one rating period to a prior state
#[derive(Clone, Debug, Default)]
pub struct GlickoRanker {
    /// Prior state; unrated when `None`
    pub initial: Option<RatingState>,
}

impl GlickoRanker {
    pub fn with_state(state: RatingState) -> Self {
        Self { initial: Some(state) }
    }

    /// Updated means and deviations
    pub fn update(&self, outcomes: &OutcomeMatrix) -> RankResult<RatingState> {
        match &self.initial {
            Some(state) => glicko_update(state, outcomes),
            None => glicko_update(&RatingState::unrated(outcomes.len()), outcomes),
        }
    }
}

impl Ranker for GlickoRanker {
    fn name(&self) -> &'static str {
        "glicko"
    }

    fn rank(&self, tournament: &Tournament) -> RankResult<DVector<f64>> {
        Ok(self.update(tournament.outcomes())?.ratings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_q_constant() {
        assert_relative_eq!(Q, 0.005_756_462_732_485_114_6, epsilon = 1e-15);
    }

    #[test]
    fn test_unrated_defaults() {
        let state = RatingState::unrated(3);
        assert!(state.ratings.iter().all(|&r| r == 1500.0));
        assert!(state.deviations.iter().all(|&d| d == 350.0));
    }

    #[test]
    fn test_glickman_worked_example() {
        // 1500/200 beats 1400/30, loses to 1550/100 and 1700/300
        let state = RatingState::new(
            DVector::from_vec(vec![1500.0, 1400.0, 1550.0, 1700.0]),
            DVector::from_vec(vec![200.0, 30.0, 100.0, 300.0]),
        )
        .unwrap();
        let mut counts = vec![0.0; 16];
        counts[1] = 1.0; // 0 beats 1
        counts[8] = 1.0; // 2 beats 0
        counts[12] = 1.0; // 3 beats 0
        let outcomes = OutcomeMatrix::from_row_slice(4, &counts).unwrap();

        let next = glicko_update(&state, &outcomes).unwrap();
        assert_relative_eq!(next.ratings[0], 1464.106, epsilon = 1e-2);
        assert_relative_eq!(next.deviations[0], 151.399, epsilon = 1e-2);
    }

    #[test]
    fn test_single_game_from_unrated() {
        let outcomes = OutcomeMatrix::from_row_slice(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        let next = GlickoRanker::default().update(&outcomes).unwrap();

        assert_relative_eq!(next.ratings[0], 1662.212, epsilon = 1e-2);
        assert_relative_eq!(next.ratings[0] - 1500.0, 1500.0 - next.ratings[1], epsilon = 1e-9);
        assert_relative_eq!(next.deviations[0], 290.231, epsilon = 1e-2);
        assert_eq!(next.deviations[0], next.deviations[1]);
    }

    #[test]
    fn test_isolated_competitor_is_unchanged() {
        let state = RatingState::new(
            DVector::from_vec(vec![1500.0, 1620.0, 1711.5]),
            DVector::from_vec(vec![350.0, 120.0, 83.25]),
        )
        .unwrap();
        let outcomes =
            OutcomeMatrix::from_row_slice(3, &[0.0, 2.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]).unwrap();

        let next = glicko_update(&state, &outcomes).unwrap();
        assert_eq!(next.ratings[2], 1711.5);
        assert_eq!(next.deviations[2], 83.25);
        assert!(next.deviations[0] < 350.0);

        let direct = glicko_update(&state.select(&[0, 1]), &outcomes.select(&[0, 1])).unwrap();
        assert_eq!(next.ratings.rows(0, 2), direct.ratings);
    }

    #[test]
    fn test_no_games_passes_state_through() {
        let state = RatingState::unrated(4);
        let next = glicko_update(&state, &OutcomeMatrix::zeros(4)).unwrap();
        assert_eq!(next, state);
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = glicko_update(&RatingState::unrated(2), &OutcomeMatrix::zeros(3)).unwrap_err();
        assert_eq!(err, RankError::DimensionMismatch { expected: 3, actual: 2 });
    }

    #[test]
    fn test_state_validation() {
        assert!(RatingState::new(DVector::zeros(2), DVector::zeros(2)).is_err());
        assert!(RatingState::new(DVector::zeros(2), DVector::from_element(3, 1.0)).is_err());
        assert!(RatingState::new(DVector::zeros(2), DVector::from_element(2, 50.0)).is_ok());
    }
}
