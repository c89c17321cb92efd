//! # rank-fit
//!
//! Ranking inference from pairwise contest outcomes.
//!
//! Given an outcome matrix `o[i, j]` (how often competitor `i` beat `j`) and,
//! for order-sensitive models, the match history behind it, each ranker
//! produces one real estimate per competitor, higher meaning stronger.
//!
//! ## Models
//!
//! - **Maximum likelihood**: regularized or anchored pairwise likelihood over a
//!   pluggable probability [`kernel`], solved with exact derivatives
//! - **Glicko**: one Bayesian rating-period update of means and deviations
//! - **Dominance**: the Boyd–Silk multiplicative fixed point
//! - **Incremental**: Elo-style sequential updates driven by an empirical
//!   win-probability table
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rank_fit::prelude::*;
//!
//! let outcomes = OutcomeMatrix::from_row_slice(2, &[0.0, 3.0, 1.0, 0.0])?;
//! let tournament = Tournament::from_outcomes(outcomes);
//!
//! let skills = MaxLikelihoodRanker::new(0.01).rank(&tournament)?;
//! let config = RankerConfig::from_json(r#"{"model": "dominance"}"#)?;
//! let dominance = rank(&tournament, &config)?;
//! ```

pub mod error;
pub mod kernel;
pub mod numeric;
pub mod optimize;
pub mod rankers;
pub mod table;
pub mod tournament;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::kernel::{ArctanCdf, Kernel, KernelFamily, ReciprocalSigmoid};
    pub use crate::optimize::{SolverConfig, SolverMethod};
    pub use crate::rankers::prelude::*;
    pub use crate::table::ProbabilityTable;
    pub use crate::tournament::{Match, OutcomeMatrix, Tournament};
}
