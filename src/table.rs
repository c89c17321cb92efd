//! Probability tables and the symmetry utilities shared by their builders
//!
//! A probability table holds `p[i, j]`, the probability that competitor `i`
//! beats competitor `j`. A valid table is square with `p[i, j] + p[j, i] = 1`
//! for every pair (so `p[i, i] = 0.5`). A table whose entries are all undefined
//! (NaN) is accepted as a placeholder for callers that supply outcomes directly.

use nalgebra::{DMatrix, DVector};

use crate::error::{RankError, RankResult, TableError};

/// Tolerance on `p[i, j] + p[j, i] - 1`
pub const SYMMETRY_TOLERANCE: f64 = 1.667 * f64::EPSILON;

/// Copy the strictly lower triangle of `source` into `target`, put 0.5 on the
/// diagonal, and fill the strictly upper triangle with `1 - target[j, i]`.
///
/// Only the lower triangle of `source` is read.
pub fn balance(target: &mut DMatrix<f64>, source: &DMatrix<f64>) -> RankResult<()> {
    if target.nrows() != source.nrows() {
        return Err(RankError::DimensionMismatch {
            expected: target.nrows(),
            actual: source.nrows(),
        });
    }
    if target.ncols() != source.ncols() {
        return Err(RankError::DimensionMismatch {
            expected: target.ncols(),
            actual: source.ncols(),
        });
    }
    let (rows, cols) = target.shape();
    if rows != cols {
        return Err(TableError::NotSquare { rows, cols }.into());
    }

    for i in 0..rows {
        for j in 0..i {
            target[(i, j)] = source[(i, j)];
        }
        target[(i, i)] = 0.5;
    }
    for i in 0..rows {
        for j in (i + 1)..rows {
            target[(i, j)] = 1.0 - target[(j, i)];
        }
    }
    Ok(())
}

/// Check squareness and the sum-symmetry invariant
pub fn validate(table: &DMatrix<f64>) -> Result<(), TableError> {
    let (rows, cols) = table.shape();
    if rows != cols {
        return Err(TableError::NotSquare { rows, cols });
    }

    if table.iter().all(|p| p.is_nan()) {
        return Ok(());
    }

    for i in 0..rows {
        for j in 0..=i {
            let sum = table[(i, j)] + table[(j, i)];
            // NaN fails this comparison too
            if !((sum - 1.0).abs() < SYMMETRY_TOLERANCE) {
                return Err(TableError::Asymmetric { row: i, col: j, sum });
            }
        }
    }
    Ok(())
}

/// A validated table of pairwise win probabilities
#[derive(Clone, Debug, PartialEq)]
pub struct ProbabilityTable {
    table: DMatrix<f64>,
}

impl ProbabilityTable {
    /// Wrap a matrix after validating it
    pub fn new(table: DMatrix<f64>) -> RankResult<Self> {
        validate(&table)?;
        Ok(Self { table })
    }

    /// The all-undefined placeholder table for `n` competitors
    pub fn placeholder(n: usize) -> Self {
        Self {
            table: DMatrix::from_element(n, n, f64::NAN),
        }
    }

    /// Build a table from latent skills: `p[i, j] = cdf(s_i - s_j)`
    ///
    /// `cdf` is evaluated below the diagonal only; the rest follows from symmetry.
    pub fn from_skills(skills: &DVector<f64>, cdf: impl Fn(f64) -> f64) -> RankResult<Self> {
        let n = skills.len();
        let lower = DMatrix::from_fn(n, n, |i, j| if i > j { cdf(skills[i] - skills[j]) } else { 0.0 });
        let mut table = DMatrix::zeros(n, n);
        balance(&mut table, &lower)?;
        Self::new(table)
    }

    /// Whether this is the all-undefined placeholder
    pub fn is_placeholder(&self) -> bool {
        self.table.iter().all(|p| p.is_nan())
    }

    /// Probability that `i` beats `j`
    pub fn win_probability(&self, i: usize, j: usize) -> f64 {
        self.table[(i, j)]
    }

    /// Number of competitors
    pub fn len(&self) -> usize {
        self.table.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.table.nrows() == 0
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.table
    }
}
