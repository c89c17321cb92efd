//! Probability kernels
//!
//! A kernel maps a skill difference `d = x_i - x_j` to a likelihood-relevant
//! positive value, together with its first and second derivatives. The
//! maximum-likelihood objectives take the log of the kernel over every ordered
//! pair of competitors, so any type implementing [`Kernel`] can be substituted
//! at every objective, Jacobian and Hessian call site.

use std::f64::consts::FRAC_1_PI;
use std::fmt::Debug;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::RankError;

/// A scalar transform with its first and second derivatives
///
/// Only the scalar methods are required; the matrix forms apply them
/// elementwise to a matrix of pairwise differences.
pub trait Kernel: Debug + Send + Sync {
    /// Kernel value at `x`
    fn value(&self, x: f64) -> f64;

    /// First derivative at `x`
    fn derivative(&self, x: f64) -> f64;

    /// Second derivative at `x`
    fn second_derivative(&self, x: f64) -> f64;

    /// Elementwise kernel value
    fn apply(&self, diffs: &DMatrix<f64>) -> DMatrix<f64> {
        diffs.map(|x| self.value(x))
    }

    /// Elementwise first derivative
    fn apply_derivative(&self, diffs: &DMatrix<f64>) -> DMatrix<f64> {
        diffs.map(|x| self.derivative(x))
    }

    /// Elementwise second derivative
    fn apply_second_derivative(&self, diffs: &DMatrix<f64>) -> DMatrix<f64> {
        diffs.map(|x| self.second_derivative(x))
    }
}

/// Reciprocal of the logistic sigmoid: `1 + e^(-x)`
///
/// `log(1 + e^(-d))` is the negative log of the logistic win probability, so
/// summing it weighted by outcomes gives a negative log-likelihood directly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReciprocalSigmoid;

impl Kernel for ReciprocalSigmoid {
    fn value(&self, x: f64) -> f64 {
        1.0 + (-x).exp()
    }

    fn derivative(&self, x: f64) -> f64 {
        -(-x).exp()
    }

    fn second_derivative(&self, x: f64) -> f64 {
        (-x).exp()
    }
}

/// Cumulative distribution function of the standard Cauchy distribution:
/// `0.5 + arctan(x) / π`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArctanCdf;

impl Kernel for ArctanCdf {
    fn value(&self, x: f64) -> f64 {
        0.5 + FRAC_1_PI * x.atan()
    }

    fn derivative(&self, x: f64) -> f64 {
        FRAC_1_PI / (1.0 + x * x)
    }

    fn second_derivative(&self, x: f64) -> f64 {
        let s = 1.0 + x * x;
        -2.0 * x * FRAC_1_PI / (s * s)
    }
}

/// Built-in kernel selector for configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelFamily {
    #[default]
    ReciprocalSigmoid,
    ArctanCdf,
}

impl KernelFamily {
    /// The kernel implementation for this family
    pub fn kernel(self) -> &'static dyn Kernel {
        match self {
            Self::ReciprocalSigmoid => &ReciprocalSigmoid,
            Self::ArctanCdf => &ArctanCdf,
        }
    }
}

impl FromStr for KernelFamily {
    type Err = RankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reciprocal_sigmoid" | "recipsigmoid" => Ok(Self::ReciprocalSigmoid),
            "arctan_cdf" | "arctan" => Ok(Self::ArctanCdf),
            other => Err(RankError::invalid(format!("unknown kernel family '{other}'"))),
        }
    }
}

/// Matrix of pairwise differences `D[i, j] = x[i] - x[j]`
pub fn pairwise_differences(x: &DVector<f64>) -> DMatrix<f64> {
    let n = x.len();
    DMatrix::from_fn(n, n, |i, j| x[i] - x[j])
}
