//! Unconstrained minimization
//!
//! A small quasi-Newton / Newton minimizer driven by an [`Objective`] that
//! supplies its value, gradient and optionally its Hessian. Both methods share
//! a backtracking Armijo line search; convergence is declared when the largest
//! gradient component falls to the configured tolerance.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{ConvergenceError, NumericFault, RankError, RankResult};

const ARMIJO: f64 = 1e-4;
const CURVATURE_FLOOR: f64 = 1e-10;

const MSG_MAX_ITERATIONS: &str = "maximum number of iterations has been exceeded";
const MSG_PRECISION_LOSS: &str = "desired error not necessarily achieved due to precision loss";

/// A twice-differentiable function to minimize
pub trait Objective {
    /// Number of free variables
    fn dimension(&self) -> usize;

    /// Function value
    fn value(&self, x: &DVector<f64>) -> Result<f64, NumericFault>;

    /// Gradient
    fn gradient(&self, x: &DVector<f64>) -> Result<DVector<f64>, NumericFault>;

    /// Hessian, when the objective provides one
    fn hessian(&self, _x: &DVector<f64>) -> Option<Result<DMatrix<f64>, NumericFault>> {
        None
    }
}

/// Search direction strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverMethod {
    /// Quasi-Newton with an inverse-Hessian estimate built from gradients
    #[default]
    Bfgs,
    /// Newton steps from the objective's own Hessian
    Newton,
}

/// Minimizer configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Direction strategy
    pub method: SolverMethod,
    /// Iteration cap; `None` means 200 per variable
    pub max_iterations: Option<usize>,
    /// Convergence threshold on the largest gradient component, scaled by
    /// `max(1, |f|)`
    pub gradient_tolerance: f64,
    /// Halvings allowed per line search
    pub max_line_search_steps: usize,
    /// Largest coordinate change attempted by the first trial of a line search
    pub max_step: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: SolverMethod::Bfgs,
            max_iterations: None,
            gradient_tolerance: 1e-5,
            max_line_search_steps: 40,
            max_step: 20.0,
        }
    }
}

impl SolverConfig {
    /// Newton configuration with default tolerances
    pub fn newton() -> Self {
        Self {
            method: SolverMethod::Newton,
            ..Default::default()
        }
    }

    /// Set the iteration cap
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Whether the largest gradient component is small relative to the
    /// objective's scale: `|g|∞ <= tol * max(1, |f|)`
    pub fn is_converged(&self, gradient_norm: f64, value: f64) -> bool {
        gradient_norm <= self.gradient_tolerance * value.abs().max(1.0)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> RankResult<()> {
        if !(self.gradient_tolerance > 0.0) {
            return Err(RankError::invalid("gradient tolerance must be positive"));
        }
        if !(self.max_step > 0.0) {
            return Err(RankError::invalid("maximum step must be positive"));
        }
        if self.max_line_search_steps == 0 {
            return Err(RankError::invalid("line search needs at least one step"));
        }
        if self.max_iterations == Some(0) {
            return Err(RankError::invalid("iteration cap must be at least 1"));
        }
        Ok(())
    }
}

/// Result of a successful minimization
#[derive(Clone, Debug)]
pub struct Minimum {
    /// Minimizer
    pub x: DVector<f64>,
    /// Objective value at `x`
    pub value: f64,
    /// Largest gradient component at `x`
    pub gradient_norm: f64,
    /// Iterations taken
    pub iterations: usize,
}

/// Minimize `objective` from `start`
pub fn minimize<O: Objective + ?Sized>(
    objective: &O,
    start: DVector<f64>,
    config: &SolverConfig,
) -> RankResult<Minimum> {
    let n = objective.dimension();
    if start.len() != n {
        return Err(RankError::DimensionMismatch {
            expected: n,
            actual: start.len(),
        });
    }
    if n == 0 {
        let value = objective.value(&start)?;
        return Ok(Minimum {
            x: start,
            value,
            gradient_norm: 0.0,
            iterations: 0,
        });
    }
    let max_iterations = config.max_iterations.unwrap_or(200 * n);

    let mut x = start;
    let mut f = objective.value(&x)?;
    let mut g = objective.gradient(&x)?;
    let mut inv_hessian = DMatrix::identity(n, n);

    for iteration in 0..max_iterations {
        let gradient_norm = g.amax();
        trace!(iteration, value = f, gradient_norm, "solver step");
        if config.is_converged(gradient_norm, f) {
            debug!(iterations = iteration, value = f, "solver converged");
            return Ok(Minimum {
                x,
                value: f,
                gradient_norm,
                iterations: iteration,
            });
        }

        let proposed = match config.method {
            SolverMethod::Bfgs => -(&inv_hessian * &g),
            SolverMethod::Newton => newton_direction(objective, &x, &g)?,
        };
        // Fall back to steepest descent when the proposal points uphill
        let direction = if proposed.dot(&g) < 0.0 {
            proposed
        } else {
            inv_hessian = DMatrix::identity(n, n);
            -&g
        };
        let slope = direction.dot(&g);

        let largest = direction.amax();
        let mut step = if largest > config.max_step {
            config.max_step / largest
        } else {
            1.0
        };

        // Backtracking line search; a step must strictly lower `f`
        let mut accepted = None;
        for _ in 0..config.max_line_search_steps {
            let trial = &x + step * &direction;
            if trial == x {
                break;
            }
            let f_trial = objective.value(&trial)?;
            if f_trial < f && f_trial <= f + ARMIJO * step * slope {
                accepted = Some((trial, f_trial));
                break;
            }
            step *= 0.5;
        }
        let Some((x_new, f_new)) = accepted else {
            debug!(iteration, value = f, gradient_norm, "line search stalled");
            return Err(ConvergenceError::Solver(MSG_PRECISION_LOSS.to_string()).into());
        };
        let g_new = objective.gradient(&x_new)?;

        if config.method == SolverMethod::Bfgs {
            let s = &x_new - &x;
            let y = &g_new - &g;
            let sy = s.dot(&y);
            if sy > CURVATURE_FLOOR {
                let rho = 1.0 / sy;
                let identity = DMatrix::<f64>::identity(n, n);
                let left = &identity - rho * &s * y.transpose();
                let right = &identity - rho * &y * s.transpose();
                inv_hessian = &left * &inv_hessian * &right + rho * &s * s.transpose();
            }
        }

        x = x_new;
        f = f_new;
        g = g_new;
    }

    let gradient_norm = g.amax();
    if config.is_converged(gradient_norm, f) {
        return Ok(Minimum {
            x,
            value: f,
            gradient_norm,
            iterations: max_iterations,
        });
    }
    Err(ConvergenceError::Solver(MSG_MAX_ITERATIONS.to_string()).into())
}

/// Newton direction `-H⁻¹g`, or `-g` when no usable Hessian is available
fn newton_direction<O: Objective + ?Sized>(
    objective: &O,
    x: &DVector<f64>,
    g: &DVector<f64>,
) -> RankResult<DVector<f64>> {
    let hessian = match objective.hessian(x) {
        Some(h) => h?,
        None => return Ok(-g),
    };
    match hessian.lu().solve(&(-g)) {
        Some(direction) => Ok(direction),
        None => Ok(-g),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::guarded;
    use approx::assert_relative_eq;

    /// f(x) = ½ xᵀAx − bᵀx
    struct Quadratic {
        a: DMatrix<f64>,
        b: DVector<f64>,
    }

    impl Objective for Quadratic {
        fn dimension(&self) -> usize {
            self.b.len()
        }

        fn value(&self, x: &DVector<f64>) -> Result<f64, NumericFault> {
            Ok(0.5 * x.dot(&(&self.a * x)) - self.b.dot(x))
        }

        fn gradient(&self, x: &DVector<f64>) -> Result<DVector<f64>, NumericFault> {
            Ok(&self.a * x - &self.b)
        }

        fn hessian(&self, _x: &DVector<f64>) -> Option<Result<DMatrix<f64>, NumericFault>> {
            Some(Ok(self.a.clone()))
        }
    }

    struct Rosenbrock;

    impl Objective for Rosenbrock {
        fn dimension(&self) -> usize {
            2
        }

        fn value(&self, x: &DVector<f64>) -> Result<f64, NumericFault> {
            Ok((1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2))
        }

        fn gradient(&self, x: &DVector<f64>) -> Result<DVector<f64>, NumericFault> {
            let t = x[1] - x[0] * x[0];
            Ok(DVector::from_vec(vec![
                -2.0 * (1.0 - x[0]) - 400.0 * x[0] * t,
                200.0 * t,
            ]))
        }
    }

    /// exp(x) overflows for large x
    struct Exponential;

    impl Objective for Exponential {
        fn dimension(&self) -> usize {
            1
        }

        fn value(&self, x: &DVector<f64>) -> Result<f64, NumericFault> {
            guarded("exponential", || x[0].exp())
        }

        fn gradient(&self, x: &DVector<f64>) -> Result<DVector<f64>, NumericFault> {
            guarded("exponential gradient", || DVector::from_element(1, x[0].exp()))
        }
    }

    /// Constant value with a gradient that keeps pointing downhill
    struct Flat;

    impl Objective for Flat {
        fn dimension(&self) -> usize {
            1
        }

        fn value(&self, _x: &DVector<f64>) -> Result<f64, NumericFault> {
            Ok(1e4)
        }

        fn gradient(&self, _x: &DVector<f64>) -> Result<DVector<f64>, NumericFault> {
            Ok(DVector::from_element(1, 1.0))
        }
    }

    fn quadratic() -> Quadratic {
        Quadratic {
            a: DMatrix::from_row_slice(2, 2, &[3.0, 1.0, 1.0, 2.0]),
            b: DVector::from_vec(vec![1.0, -1.0]),
        }
    }

    #[test]
    fn test_bfgs_quadratic() {
        let q = quadratic();
        let min = minimize(&q, DVector::zeros(2), &SolverConfig::default()).unwrap();
        // A⁻¹b = [0.6, -0.8]
        assert_relative_eq!(min.x[0], 0.6, epsilon = 1e-5);
        assert_relative_eq!(min.x[1], -0.8, epsilon = 1e-5);
        assert!(min.gradient_norm <= 1e-5);
    }

    #[test]
    fn test_newton_quadratic_single_step() {
        let q = quadratic();
        let min = minimize(&q, DVector::zeros(2), &SolverConfig::newton()).unwrap();
        assert_relative_eq!(min.x[0], 0.6, epsilon = 1e-10);
        assert_relative_eq!(min.x[1], -0.8, epsilon = 1e-10);
        assert_eq!(min.iterations, 1);
    }

    #[test]
    fn test_newton_without_hessian_uses_gradient() {
        let min = minimize(
            &Rosenbrock,
            DVector::from_vec(vec![1.0, 1.0]),
            &SolverConfig::newton(),
        )
        .unwrap();
        assert_eq!(min.iterations, 0);
    }

    #[test]
    fn test_bfgs_rosenbrock() {
        let config = SolverConfig::default().with_max_iterations(2000);
        let min = minimize(&Rosenbrock, DVector::from_vec(vec![-1.2, 1.0]), &config).unwrap();
        assert_relative_eq!(min.x[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(min.x[1], 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_iteration_cap_is_a_solver_failure() {
        let config = SolverConfig::default().with_max_iterations(1);
        let err = minimize(&Rosenbrock, DVector::from_vec(vec![-1.2, 1.0]), &config).unwrap_err();
        assert_eq!(
            err,
            RankError::ConvergenceFailure(ConvergenceError::Solver(MSG_MAX_ITERATIONS.to_string()))
        );
    }

    #[test]
    fn test_steps_without_decrease_are_precision_loss() {
        let config = SolverConfig::default().with_max_iterations(100_000);
        let err = minimize(&Flat, DVector::zeros(1), &config).unwrap_err();
        assert_eq!(
            err,
            RankError::ConvergenceFailure(ConvergenceError::Solver(MSG_PRECISION_LOSS.to_string()))
        );
    }

    #[test]
    fn test_convergence_scales_with_objective() {
        let config = SolverConfig::default();
        assert!(config.is_converged(1e-5, 0.5));
        assert!(!config.is_converged(2e-5, 0.5));
        assert!(config.is_converged(0.049, -5_000.0));
        assert!(!config.is_converged(0.06, 5_000.0));
    }

    #[test]
    fn test_numeric_fault_is_reported() {
        let err = minimize(
            &Exponential,
            DVector::from_element(1, 1000.0),
            &SolverConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RankError::ConvergenceFailure(ConvergenceError::Numeric(_))
        ));
    }

    #[test]
    fn test_start_dimension_checked() {
        let err = minimize(&quadratic(), DVector::zeros(3), &SolverConfig::default()).unwrap_err();
        assert_eq!(err, RankError::DimensionMismatch { expected: 2, actual: 3 });
    }

    #[test]
    fn test_config_validation() {
        assert!(SolverConfig::default().validate().is_ok());
        let bad = SolverConfig {
            gradient_tolerance: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        assert!(SolverConfig::default().with_max_iterations(0).validate().is_err());
    }
}
