//! Error types for rank-fit
//!
//! This module defines all error types used throughout the library.

use std::fmt;

use thiserror::Error;

/// Kind of floating-point fault caught by a numeric-fault scope
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A value grew past the representable range (±inf)
    #[error("overflow")]
    Overflow,

    /// An operation produced an undefined value (NaN), e.g. 0/0 or log of a negative
    #[error("invalid value")]
    InvalidOperation,
}

/// A floating-point fault raised inside a numeric-fault scope
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{kind} encountered in {operation}")]
pub struct NumericFault {
    /// Name of the computation that faulted
    pub operation: &'static str,
    /// What went wrong
    pub kind: FaultKind,
}

/// Error type for iterative methods that failed to produce a solution
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConvergenceError {
    /// A floating-point fault interrupted the computation
    #[error("numeric fault: {0}")]
    Numeric(#[from] NumericFault),

    /// The minimizer reported failure
    #[error("convergence failure: {0}")]
    Solver(String),

    /// A fixed-point iteration ran out of iterations
    #[error("iteration limit of {limit} exceeded")]
    IterationLimit { limit: usize },
}

/// Error type for probability table validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TableError {
    /// The table is not square
    #[error("probability table is not square ({rows}x{cols})")]
    NotSquare { rows: usize, cols: usize },

    /// `p[row, col] + p[col, row]` is not 1 within tolerance
    #[error("p[{row},{col}] + p[{col},{row}] = {sum}, expected 1")]
    Asymmetric { row: usize, col: usize, sum: f64 },
}

/// Top-level error type for ranking operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RankError {
    /// Probability table failed validation
    #[error("invalid probability table: {0}")]
    InvalidProbabilityTable(#[from] TableError),

    /// A ranker could not produce a result
    #[error("{0}")]
    ConvergenceFailure(#[from] ConvergenceError),

    /// Out-of-domain configuration or input
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The sequential ranker needs a match history and none was supplied
    #[error("incremental ranking requires a match history")]
    MissingHistory,

    /// Vector or matrix dimensions disagree
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl RankError {
    /// Shorthand for an [`RankError::InvalidParameter`] from anything displayable
    pub fn invalid(msg: impl fmt::Display) -> Self {
        Self::InvalidParameter(msg.to_string())
    }
}

impl From<NumericFault> for RankError {
    fn from(fault: NumericFault) -> Self {
        Self::ConvergenceFailure(ConvergenceError::Numeric(fault))
    }
}

/// Result type alias for ranking operations
pub type RankResult<T> = Result<T, RankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_fault_display() {
        let fault = NumericFault {
            operation: "objective",
            kind: FaultKind::Overflow,
        };
        assert_eq!(fault.to_string(), "overflow encountered in objective");

        let fault = NumericFault {
            operation: "dominance step",
            kind: FaultKind::InvalidOperation,
        };
        assert_eq!(
            fault.to_string(),
            "invalid value encountered in dominance step"
        );
    }

    #[test]
    fn test_table_error_display() {
        let err = TableError::NotSquare { rows: 2, cols: 3 };
        assert_eq!(err.to_string(), "probability table is not square (2x3)");
    }

    #[test]
    fn test_rank_error_from_convergence_error() {
        let err: RankError = ConvergenceError::IterationLimit { limit: 10 }.into();
        assert!(matches!(
            err,
            RankError::ConvergenceFailure(ConvergenceError::IterationLimit { limit: 10 })
        ));
        assert_eq!(err.to_string(), "iteration limit of 10 exceeded");
    }

    #[test]
    fn test_rank_error_from_numeric_fault() {
        let fault = NumericFault {
            operation: "jacobian",
            kind: FaultKind::InvalidOperation,
        };
        let err: RankError = fault.clone().into();
        assert_eq!(
            err,
            RankError::ConvergenceFailure(ConvergenceError::Numeric(fault))
        );
    }

    #[test]
    fn test_invalid_parameter_shorthand() {
        let err = RankError::invalid("k must be positive");
        assert_eq!(err.to_string(), "invalid parameter: k must be positive");
    }
}
