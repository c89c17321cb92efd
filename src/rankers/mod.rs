//! Ranking models
//!
//! Every model implements [`Ranker`], turning a [`Tournament`] into one
//! estimate per competitor (higher is better). [`RankerConfig`] selects and
//! parameterizes a model from plain data, e.g. a JSON document.

pub mod dominance;
pub mod glicko;
pub mod incremental;
pub mod maxlik;

use std::fmt;
use std::str::FromStr;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RankError, RankResult};
use crate::kernel::KernelFamily;
use crate::optimize::{SolverConfig, SolverMethod};
use crate::tournament::Tournament;

use dominance::DominanceRanker;
use glicko::{GlickoRanker, RatingState, DEFAULT_DEVIATION, DEFAULT_RATING};
use incremental::{IncrementalRanker, WinProbabilityTable};
use maxlik::{AnchoredRanker, MaxLikelihoodRanker};

/// A model that assigns a real-valued rank to each competitor
pub trait Ranker: Send + Sync {
    /// Short model name
    fn name(&self) -> &'static str;

    /// One estimate per competitor
    fn rank(&self, tournament: &Tournament) -> RankResult<DVector<f64>>;
}

/// Available ranking models
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankerKind {
    /// Regularized maximum likelihood
    #[default]
    #[serde(alias = "maxlik", alias = "pbs")]
    MaxLikelihood,
    /// Maximum likelihood with competitor 0 fixed at zero
    Anchored,
    /// Glicko rating-period update from unrated or given state
    Glicko,
    /// Boyd–Silk dominance fixed point
    #[serde(alias = "boyd_silk")]
    Dominance,
    /// Sequential Elo-style updates
    #[serde(alias = "elo")]
    Incremental,
}

impl RankerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RankerKind::MaxLikelihood => "max_likelihood",
            RankerKind::Anchored => "anchored",
            RankerKind::Glicko => "glicko",
            RankerKind::Dominance => "dominance",
            RankerKind::Incremental => "incremental",
        }
    }
}

impl fmt::Display for RankerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankerKind {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maxlik" | "pbs" | "max_likelihood" => Ok(RankerKind::MaxLikelihood),
            "anchored" => Ok(RankerKind::Anchored),
            "glicko" => Ok(RankerKind::Glicko),
            "dominance" | "boyd_silk" => Ok(RankerKind::Dominance),
            "incremental" | "elo" => Ok(RankerKind::Incremental),
            other => Err(RankError::invalid(format!("unknown ranking model '{other}'"))),
        }
    }
}

/// Model selection and parameters
///
/// Fields that do not apply to the selected model are ignored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Which model to run
    pub model: RankerKind,

    /// L2 regularization (maximum likelihood)
    pub alpha: f64,
    /// Kernel family; each likelihood model has its own default
    pub kernel: Option<KernelFamily>,
    /// Starting skills (maximum likelihood)
    pub start: Option<Vec<f64>>,
    /// Use Newton steps from the analytic Hessian
    pub use_hessian: bool,
    /// Minimizer settings
    pub solver: SolverConfig,

    /// Step size (incremental)
    pub k: f64,
    /// Rank from aggregate outcomes instead of history (incremental)
    pub use_pretournament_scores: bool,
    /// Win-probability control points (incremental)
    pub win_probabilities: Option<WinProbabilityTable>,

    /// L1 convergence tolerance (dominance)
    pub tolerance: f64,
    /// Iteration cap (dominance)
    pub iteration_limit: usize,

    /// Prior rating means (glicko)
    pub ratings: Option<Vec<f64>>,
    /// Prior rating deviations (glicko)
    pub deviations: Option<Vec<f64>>,
}

impl Default for RankerConfig {
    fn default() -> Self {
        let dominance = DominanceRanker::default();
        Self {
            model: RankerKind::MaxLikelihood,
            alpha: 0.01,
            kernel: None,
            start: None,
            use_hessian: false,
            solver: SolverConfig::default(),
            k: 32.0,
            use_pretournament_scores: false,
            win_probabilities: None,
            tolerance: dominance.tolerance,
            iteration_limit: dominance.iteration_limit,
            ratings: None,
            deviations: None,
        }
    }
}

impl RankerConfig {
    /// Default parameters for `model`
    pub fn new(model: RankerKind) -> Self {
        Self {
            model,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> RankResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RankError::invalid(format!("malformed ranker configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> RankResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RankError::invalid(format!("cannot serialize ranker configuration: {e}")))
    }

    /// Check the parameters the selected model uses
    pub fn validate(&self) -> RankResult<()> {
        match self.model {
            RankerKind::MaxLikelihood => {
                if !(self.alpha >= 0.0 && self.alpha.is_finite()) {
                    return Err(RankError::invalid(format!(
                        "alpha must be finite and non-negative, got {}",
                        self.alpha
                    )));
                }
                if let Some(start) = &self.start {
                    if start.iter().any(|x| !x.is_finite()) {
                        return Err(RankError::invalid("start must be finite"));
                    }
                }
                self.solver.validate()
            }
            RankerKind::Anchored => self.solver.validate(),
            RankerKind::Glicko => self.prior_state().map(|_| ()),
            RankerKind::Dominance => DominanceRanker::new(self.tolerance, self.iteration_limit).validate(),
            RankerKind::Incremental => {
                if !(self.k > 0.0 && self.k.is_finite()) {
                    return Err(RankError::invalid(format!("k must be positive, got {}", self.k)));
                }
                Ok(())
            }
        }
    }

    /// Prior rating state when either vector is given
    ///
    /// A missing vector is filled with the unrated default to match the other.
    fn prior_state(&self) -> RankResult<Option<RatingState>> {
        let (ratings, deviations) = match (&self.ratings, &self.deviations) {
            (None, None) => return Ok(None),
            (Some(r), Some(d)) => (r.clone(), d.clone()),
            (Some(r), None) => (r.clone(), vec![DEFAULT_DEVIATION; r.len()]),
            (None, Some(d)) => (vec![DEFAULT_RATING; d.len()], d.clone()),
        };
        RatingState::new(DVector::from_vec(ratings), DVector::from_vec(deviations)).map(Some)
    }

    /// Construct the configured ranker
    pub fn build(&self) -> RankResult<Box<dyn Ranker>> {
        self.validate()?;
        let ranker: Box<dyn Ranker> = match self.model {
            RankerKind::MaxLikelihood => {
                let mut ranker = MaxLikelihoodRanker::new(self.alpha)
                    .with_kernel(self.kernel.unwrap_or(KernelFamily::ReciprocalSigmoid))
                    .with_solver(self.solver.clone());
                if let Some(start) = &self.start {
                    ranker = ranker.with_start(DVector::from_column_slice(start));
                }
                if self.use_hessian {
                    ranker = ranker.with_hessian();
                }
                Box::new(ranker)
            }
            RankerKind::Anchored => {
                let mut solver = self.solver.clone();
                if self.use_hessian {
                    solver.method = SolverMethod::Newton;
                }
                Box::new(
                    AnchoredRanker::default()
                        .with_kernel(self.kernel.unwrap_or(KernelFamily::ArctanCdf))
                        .with_solver(solver),
                )
            }
            RankerKind::Glicko => Box::new(GlickoRanker {
                initial: self.prior_state()?,
            }),
            RankerKind::Dominance => Box::new(DominanceRanker::new(self.tolerance, self.iteration_limit)),
            RankerKind::Incremental => {
                let table = self.win_probabilities.clone().unwrap_or_default();
                Box::new(
                    IncrementalRanker::new(self.k)
                        .with_table(table)
                        .with_pretournament_scores(self.use_pretournament_scores),
                )
            }
        };
        debug!(model = %self.model, "built ranker");
        Ok(ranker)
    }
}

/// Build the configured ranker and apply it to `tournament`
pub fn rank(tournament: &Tournament, config: &RankerConfig) -> RankResult<DVector<f64>> {
    config.build()?.rank(tournament)
}

pub mod prelude {
    pub use super::dominance::{DominanceFit, DominanceRanker};
    pub use super::glicko::{glicko_update, GlickoRanker, RatingState};
    pub use super::incremental::{IncrementalRanker, WinProbabilityTable};
    pub use super::maxlik::{AnchoredRanker, MaxLikelihoodRanker};
    pub use super::{rank, Ranker, RankerConfig, RankerKind};
}
