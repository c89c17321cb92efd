//! Maximum-likelihood skill estimation
//!
//! Each competitor gets a real skill `x_i`; an outcome count `o[i, j]`
//! contributes `o[i, j] * log K(x_i - x_j)` for a [`Kernel`] `K`. Two
//! formulations are provided:
//!
//! - **Regularized** (`f = Σ o log K + α Σ x²`): `K` is the reciprocal sigmoid by
//!   default, so the sum is a negative log-likelihood. The L2 term pins the
//!   otherwise translation-invariant and possibly unbounded problem.
//! - **Anchored** (`F = -Σ o log K` with `x_0 = 0`): `K` is a CDF (the arctangent
//!   CDF by default) and competitor 0 is fixed at zero instead of regularizing.
//!
//! Both expose exact gradients and Hessians, so either solver method can be used.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::error::{NumericFault, RankError, RankResult};
use crate::kernel::{pairwise_differences, Kernel, KernelFamily};
use crate::numeric::guarded;
use crate::optimize::{minimize, Minimum, Objective, SolverConfig, SolverMethod};
use crate::rankers::Ranker;
use crate::tournament::{OutcomeMatrix, Tournament};

/// Panics unless `outcomes` is `n x n`
fn assert_shape(outcomes: &DMatrix<f64>, n: usize) {
    assert_eq!(
        outcomes.shape(),
        (n, n),
        "outcome matrix must be {n}x{n} to match the skill vector"
    );
}

/// `Σ_ij o_ij log K(x_i - x_j)`
fn log_kernel_sum(x: &DVector<f64>, outcomes: &DMatrix<f64>, kernel: &dyn Kernel) -> f64 {
    let values = kernel.apply(&pairwise_differences(x));
    values.zip_map(outcomes, |k, o| o * k.ln()).sum()
}

/// Gradient of [`log_kernel_sum`]:
/// `g_i = Σ_j o_ij (K'/K)(x_i - x_j) - Σ_j o_ji (K'/K)(x_j - x_i)`
fn log_kernel_gradient(x: &DVector<f64>, outcomes: &DMatrix<f64>, kernel: &dyn Kernel) -> DVector<f64> {
    let diffs = pairwise_differences(x);
    let ratio = kernel.apply_derivative(&diffs).component_div(&kernel.apply(&diffs));
    let weighted = outcomes.component_mul(&ratio);
    let n = x.len();
    DVector::from_fn(n, |i, _| (0..n).map(|j| weighted[(i, j)] - weighted[(j, i)]).sum())
}

/// Hessian of [`log_kernel_sum`]
///
/// With `c = K''/K - (K'/K)²` and `w = o ∘ c`, off-diagonal entries are
/// `-(w_ij + w_ji)` and each diagonal entry is the negated sum of its row.
fn log_kernel_hessian(x: &DVector<f64>, outcomes: &DMatrix<f64>, kernel: &dyn Kernel) -> DMatrix<f64> {
    let diffs = pairwise_differences(x);
    let values = kernel.apply(&diffs);
    let first = kernel.apply_derivative(&diffs).component_div(&values);
    let second = kernel.apply_second_derivative(&diffs).component_div(&values);
    let curvature = second - first.component_mul(&first);
    let weighted = outcomes.component_mul(&curvature);

    let n = x.len();
    let mut hessian = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            0.0
        } else {
            -(weighted[(i, j)] + weighted[(j, i)])
        }
    });
    for i in 0..n {
        hessian[(i, i)] = -hessian.row(i).sum();
    }
    hessian
}

/// Regularized objective `Σ o log K(x_i - x_j) + α Σ x²`
///
/// # Panics
///
/// Panics if `outcomes` is not `x.len()` square.
pub fn objective(
    x: &DVector<f64>,
    outcomes: &DMatrix<f64>,
    alpha: f64,
    kernel: &dyn Kernel,
) -> Result<f64, NumericFault> {
    assert_shape(outcomes, x.len());
    guarded("objective", || log_kernel_sum(x, outcomes, kernel) + alpha * x.norm_squared())
}

/// Gradient of [`objective`]
///
/// # Panics
///
/// Panics if `outcomes` is not `x.len()` square.
pub fn jacobian(
    x: &DVector<f64>,
    outcomes: &DMatrix<f64>,
    alpha: f64,
    kernel: &dyn Kernel,
) -> Result<DVector<f64>, NumericFault> {
    assert_shape(outcomes, x.len());
    guarded("jacobian", || log_kernel_gradient(x, outcomes, kernel) + 2.0 * alpha * x)
}

/// Hessian of [`objective`]
///
/// # Panics
///
/// Panics if `outcomes` is not `x.len()` square.
pub fn hessian(
    x: &DVector<f64>,
    outcomes: &DMatrix<f64>,
    alpha: f64,
    kernel: &dyn Kernel,
) -> Result<DMatrix<f64>, NumericFault> {
    assert_shape(outcomes, x.len());
    let n = x.len();
    guarded("hessian", || {
        log_kernel_hessian(x, outcomes, kernel) + DMatrix::from_diagonal_element(n, n, 2.0 * alpha)
    })
}

/// Prepend the anchored competitor's fixed zero skill
fn anchor(free: &DVector<f64>) -> DVector<f64> {
    let mut x = DVector::zeros(free.len() + 1);
    x.rows_mut(1, free.len()).copy_from(free);
    x
}

/// Anchored objective `-Σ o log K(x_i - x_j)` with `x = [0, free...]`
///
/// # Panics
///
/// Panics if `outcomes` is not `free.len() + 1` square.
pub fn anchored_objective(
    free: &DVector<f64>,
    outcomes: &DMatrix<f64>,
    kernel: &dyn Kernel,
) -> Result<f64, NumericFault> {
    let x = anchor(free);
    assert_shape(outcomes, x.len());
    guarded("anchored objective", || -log_kernel_sum(&x, outcomes, kernel))
}

/// Gradient of [`anchored_objective`] with respect to the free skills
///
/// # Panics
///
/// Panics if `outcomes` is not `free.len() + 1` square.
pub fn anchored_jacobian(
    free: &DVector<f64>,
    outcomes: &DMatrix<f64>,
    kernel: &dyn Kernel,
) -> Result<DVector<f64>, NumericFault> {
    let x = anchor(free);
    assert_shape(outcomes, x.len());
    guarded("anchored jacobian", || {
        -log_kernel_gradient(&x, outcomes, kernel).rows(1, free.len()).into_owned()
    })
}

/// Hessian of [`anchored_objective`] with respect to the free skills
///
/// # Panics
///
/// Panics if `outcomes` is not `free.len() + 1` square.
pub fn anchored_hessian(
    free: &DVector<f64>,
    outcomes: &DMatrix<f64>,
    kernel: &dyn Kernel,
) -> Result<DMatrix<f64>, NumericFault> {
    let x = anchor(free);
    assert_shape(outcomes, x.len());
    let m = free.len();
    guarded("anchored hessian", || {
        -log_kernel_hessian(&x, outcomes, kernel).view((1, 1), (m, m)).into_owned()
    })
}

/// [`objective`] bound to its data, for the minimizer
pub struct RegularizedLikelihood<'a> {
    pub outcomes: &'a DMatrix<f64>,
    pub alpha: f64,
    pub kernel: &'a dyn Kernel,
}

impl Objective for RegularizedLikelihood<'_> {
    fn dimension(&self) -> usize {
        self.outcomes.nrows()
    }

    fn value(&self, x: &DVector<f64>) -> Result<f64, NumericFault> {
        objective(x, self.outcomes, self.alpha, self.kernel)
    }

    fn gradient(&self, x: &DVector<f64>) -> Result<DVector<f64>, NumericFault> {
        jacobian(x, self.outcomes, self.alpha, self.kernel)
    }

    fn hessian(&self, x: &DVector<f64>) -> Option<Result<DMatrix<f64>, NumericFault>> {
        Some(hessian(x, self.outcomes, self.alpha, self.kernel))
    }
}

/// [`anchored_objective`] bound to its data, for the minimizer
pub struct AnchoredLikelihood<'a> {
    pub outcomes: &'a DMatrix<f64>,
    pub kernel: &'a dyn Kernel,
}

impl Objective for AnchoredLikelihood<'_> {
    fn dimension(&self) -> usize {
        self.outcomes.nrows().saturating_sub(1)
    }

    fn value(&self, x: &DVector<f64>) -> Result<f64, NumericFault> {
        anchored_objective(x, self.outcomes, self.kernel)
    }

    fn gradient(&self, x: &DVector<f64>) -> Result<DVector<f64>, NumericFault> {
        anchored_jacobian(x, self.outcomes, self.kernel)
    }

    fn hessian(&self, x: &DVector<f64>) -> Option<Result<DMatrix<f64>, NumericFault>> {
        Some(anchored_hessian(x, self.outcomes, self.kernel))
    }
}

/// Regularized maximum-likelihood ranker
#[derive(Clone, Debug)]
pub struct MaxLikelihoodRanker {
    /// L2 regularization strength
    pub alpha: f64,
    /// Kernel family
    pub kernel: KernelFamily,
    /// Starting skills; the zero vector when `None`
    pub start: Option<DVector<f64>>,
    /// Minimizer settings
    pub solver: SolverConfig,
}

impl MaxLikelihoodRanker {
    /// Ranker with regularization `alpha` and default kernel and solver
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            kernel: KernelFamily::ReciprocalSigmoid,
            start: None,
            solver: SolverConfig::default(),
        }
    }

    pub fn with_kernel(mut self, kernel: KernelFamily) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_start(mut self, start: DVector<f64>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Use Newton steps from the analytic Hessian
    pub fn with_hessian(mut self) -> Self {
        self.solver.method = SolverMethod::Newton;
        self
    }

    /// Fit with the configured kernel family
    pub fn fit(&self, outcomes: &OutcomeMatrix) -> RankResult<Minimum> {
        self.fit_with_kernel(outcomes, self.kernel.kernel())
    }

    /// Fit with any kernel
    pub fn fit_with_kernel(&self, outcomes: &OutcomeMatrix, kernel: &dyn Kernel) -> RankResult<Minimum> {
        if !(self.alpha >= 0.0 && self.alpha.is_finite()) {
            return Err(RankError::invalid(format!(
                "regularization must be finite and non-negative, got {}",
                self.alpha
            )));
        }
        self.solver.validate()?;

        let n = outcomes.len();
        let start = self.start.clone().unwrap_or_else(|| DVector::zeros(n));
        let problem = RegularizedLikelihood {
            outcomes: outcomes.as_matrix(),
            alpha: self.alpha,
            kernel,
        };
        let fitted = minimize(&problem, start, &self.solver).map_err(|err| {
            warn!(error = %err, alpha = self.alpha, "maximum-likelihood ranking failed");
            err
        })?;
        debug!(
            players = n,
            iterations = fitted.iterations,
            value = fitted.value,
            "maximum-likelihood fit"
        );
        Ok(fitted)
    }

    /// Fitted skills
    pub fn skills(&self, outcomes: &OutcomeMatrix) -> RankResult<DVector<f64>> {
        Ok(self.fit(outcomes)?.x)
    }
}

impl Default for MaxLikelihoodRanker {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl Ranker for MaxLikelihoodRanker {
    fn name(&self) -> &'static str {
        "maxlik"
    }

    fn rank(&self, tournament: &Tournament) -> RankResult<DVector<f64>> {
        self.skills(tournament.outcomes())
    }
}

/// Maximum-likelihood ranker with competitor 0 anchored at zero
#[derive(Clone, Debug)]
pub struct AnchoredRanker {
    /// Kernel family; must be a CDF
    pub kernel: KernelFamily,
    /// Minimizer settings
    pub solver: SolverConfig,
}

impl Default for AnchoredRanker {
    fn default() -> Self {
        Self {
            kernel: KernelFamily::ArctanCdf,
            solver: SolverConfig::default(),
        }
    }
}

impl AnchoredRanker {
    pub fn with_kernel(mut self, kernel: KernelFamily) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Fitted skills, starting with the anchor's 0
    pub fn skills(&self, outcomes: &OutcomeMatrix) -> RankResult<DVector<f64>> {
        self.skills_with_kernel(outcomes, self.kernel.kernel())
    }

    /// Fitted skills for any kernel
    pub fn skills_with_kernel(&self, outcomes: &OutcomeMatrix, kernel: &dyn Kernel) -> RankResult<DVector<f64>> {
        self.solver.validate()?;
        let n = outcomes.len();
        if n == 0 {
            return Ok(DVector::zeros(0));
        }
        let problem = AnchoredLikelihood {
            outcomes: outcomes.as_matrix(),
            kernel,
        };
        let fitted = minimize(&problem, DVector::zeros(n - 1), &self.solver).map_err(|err| {
            warn!(error = %err, "anchored maximum-likelihood ranking failed");
            err
        })?;
        debug!(players = n, iterations = fitted.iterations, "anchored fit");
        Ok(anchor(&fitted.x))
    }
}

impl Ranker for AnchoredRanker {
    fn name(&self) -> &'static str {
        "anchored"
    }

    fn rank(&self, tournament: &Tournament) -> RankResult<DVector<f64>> {
        self.skills(tournament.outcomes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvergenceError;
    use crate::kernel::{ArctanCdf, ReciprocalSigmoid};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const POINTS: [[f64; 4]; 4] = [
        [0.1, 0.5, 1.0, 1.2],
        [0.2, 1.0, 2.0, 2.4],
        [0.3, 0.1, 0.5, -0.2],
        [-0.2, -0.3, -1.2, -2.4],
    ];
    const SCALES: [f64; 4] = [1e-6, 1e-7, 1e-8, 1e-9];

    fn data() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            4,
            4,
            &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0],
        )
    }

    /// Every point paired with every scaled perturbation
    fn perturbations(len: usize) -> Vec<(DVector<f64>, DVector<f64>)> {
        let mut pairs = Vec::new();
        for x in &POINTS {
            for (scale, dir) in SCALES.iter().zip(POINTS.iter()) {
                let x = DVector::from_row_slice(&x[..len]);
                let dx = DVector::from_row_slice(&dir[..len]) * *scale;
                pairs.push((x, dx));
            }
        }
        pairs
    }

    fn check_regularized(kernel: &dyn Kernel) {
        let o = data();
        let alpha = 0.01;
        for (x, dx) in perturbations(4) {
            let xp = &x + &dx;
            let f = objective(&x, &o, alpha, kernel).unwrap();
            let fp = objective(&xp, &o, alpha, kernel).unwrap();
            let j = jacobian(&x, &o, alpha, kernel).unwrap();
            let jp = jacobian(&xp, &o, alpha, kernel).unwrap();
            let h = hessian(&x, &o, alpha, kernel).unwrap();

            let bound = 1e-3 * dx.norm() + 1e-12;
            assert!((fp - f - j.dot(&dx)).abs() <= bound, "{kernel:?} jacobian at {x}");
            assert!((jp - j - &h * &dx).norm() <= bound, "{kernel:?} hessian at {x}");
        }
    }

    fn check_anchored(kernel: &dyn Kernel) {
        let o = data();
        for (y, dy) in perturbations(3) {
            let yp = &y + &dy;
            let f = anchored_objective(&y, &o, kernel).unwrap();
            let fp = anchored_objective(&yp, &o, kernel).unwrap();
            let j = anchored_jacobian(&y, &o, kernel).unwrap();
            let jp = anchored_jacobian(&yp, &o, kernel).unwrap();
            let h = anchored_hessian(&y, &o, kernel).unwrap();

            let bound = 1e-3 * dy.norm() + 1e-12;
            assert!((fp - f - j.dot(&dy)).abs() <= bound, "{kernel:?} jacobian at {y}");
            assert!((jp - j - &h * &dy).norm() <= bound, "{kernel:?} hessian at {y}");
        }
    }

    #[test]
    fn test_regularized_derivatives_reciprocal_sigmoid() {
        check_regularized(&ReciprocalSigmoid);
    }

    #[test]
    fn test_regularized_derivatives_arctan() {
        check_regularized(&ArctanCdf);
    }

    #[test]
    fn test_anchored_derivatives_reciprocal_sigmoid() {
        check_anchored(&ReciprocalSigmoid);
    }

    #[test]
    fn test_anchored_derivatives_arctan() {
        check_anchored(&ArctanCdf);
    }

    #[test]
    fn test_hessian_is_symmetric() {
        let o = data();
        let x = DVector::from_row_slice(&POINTS[2]);
        let h = hessian(&x, &o, 0.5, &ReciprocalSigmoid).unwrap();
        assert!((&h - h.transpose()).amax() < 1e-12);
    }

    #[test]
    fn test_anchored_hessian_matches_pairwise_form() {
        // off-diagonal: -o_ij e_ij - o_ji e_ji with e = (K'/K)² - K''/K
        let o = data();
        let free = DVector::from_row_slice(&POINTS[0][..3]);
        let h = anchored_hessian(&free, &o, &ArctanCdf).unwrap();
        let x = anchor(&free);
        let e = |i: usize, j: usize| {
            let d = x[i] - x[j];
            let k = ArctanCdf.value(d);
            (ArctanCdf.derivative(d) / k).powi(2) - ArctanCdf.second_derivative(d) / k
        };
        let expected = -o[(1, 2)] * e(1, 2) - o[(2, 1)] * e(2, 1);
        assert!((h[(0, 1)] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_anchor_scenario_gap_grows_as_alpha_shrinks() {
        let outcomes = OutcomeMatrix::from_row_slice(2, &[0.0, 5.0, 0.0, 0.0]).unwrap();

        let weak = MaxLikelihoodRanker::new(1e-3).skills(&outcomes).unwrap();
        let strong = MaxLikelihoodRanker::new(1e-4).skills(&outcomes).unwrap();

        assert!(strong[0] > strong[1]);
        assert!(weak[0] > weak[1]);
        assert!(strong[0] - strong[1] > weak[0] - weak[1]);
    }

    #[test]
    fn test_newton_agrees_with_bfgs() {
        let outcomes =
            OutcomeMatrix::from_row_slice(3, &[0.0, 3.0, 4.0, 1.0, 0.0, 3.0, 0.0, 1.0, 0.0]).unwrap();
        let bfgs = MaxLikelihoodRanker::new(0.01).skills(&outcomes).unwrap();
        let newton = MaxLikelihoodRanker::new(0.01).with_hessian().skills(&outcomes).unwrap();

        assert!(bfgs[0] > bfgs[1] && bfgs[1] > bfgs[2]);
        assert!((bfgs - newton).amax() < 1e-3);
    }

    #[test]
    fn test_even_results_give_equal_skills() {
        let outcomes = OutcomeMatrix::from_row_slice(2, &[0.0, 4.0, 4.0, 0.0]).unwrap();
        let skills = MaxLikelihoodRanker::new(0.01).skills(&outcomes).unwrap();
        assert!(skills.amax() < 1e-6);
    }

    #[test]
    fn test_overflow_is_a_convergence_failure() {
        let outcomes = OutcomeMatrix::from_row_slice(2, &[0.0, 1.0, 1.0, 0.0]).unwrap();
        let ranker = MaxLikelihoodRanker::new(0.01).with_start(DVector::from_vec(vec![800.0, -800.0]));
        let err = ranker.skills(&outcomes).unwrap_err();
        assert!(matches!(
            err,
            RankError::ConvergenceFailure(ConvergenceError::Numeric(_))
        ));
    }

    #[test]
    fn test_iteration_cap_is_a_convergence_failure() {
        let outcomes =
            OutcomeMatrix::from_row_slice(3, &[0.0, 3.0, 4.0, 1.0, 0.0, 3.0, 0.0, 1.0, 0.0]).unwrap();
        let ranker =
            MaxLikelihoodRanker::new(0.01).with_solver(SolverConfig::default().with_max_iterations(1));
        assert!(matches!(
            ranker.skills(&outcomes),
            Err(RankError::ConvergenceFailure(ConvergenceError::Solver(_)))
        ));
    }

    #[test]
    fn test_invalid_alpha_and_start() {
        let outcomes = OutcomeMatrix::zeros(2);
        assert!(matches!(
            MaxLikelihoodRanker::new(-1.0).skills(&outcomes),
            Err(RankError::InvalidParameter(_))
        ));
        assert!(matches!(
            MaxLikelihoodRanker::new(0.1)
                .with_start(DVector::zeros(3))
                .skills(&outcomes),
            Err(RankError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_anchored_ranker_pins_first_competitor() {
        let outcomes =
            OutcomeMatrix::from_row_slice(3, &[0.0, 3.0, 4.0, 1.0, 0.0, 3.0, 0.0, 1.0, 0.0]).unwrap();
        let skills = AnchoredRanker::default().skills(&outcomes).unwrap();

        assert_eq!(skills.len(), 3);
        assert_eq!(skills[0], 0.0);
        assert!(skills[1] < 0.0);
        assert!(skills[2] < skills[1]);
    }

    /// Seeded logistic round robin over evenly spaced skills from 2 down to -2
    fn round_robin(n: usize, games: usize, seed: u64) -> OutcomeMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let skill = |i: usize| 2.0 - 4.0 * i as f64 / (n - 1) as f64;
        let mut counts = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in (i + 1)..n {
                let p = 1.0 / (1.0 + (skill(j) - skill(i)).exp());
                for _ in 0..games {
                    if rng.gen_bool(p) {
                        counts[(i, j)] += 1.0;
                    } else {
                        counts[(j, i)] += 1.0;
                    }
                }
            }
        }
        OutcomeMatrix::new(counts).unwrap()
    }

    #[test]
    fn test_regularized_bfgs_converges_on_large_round_robin() {
        for (games, seed) in [(100, 11), (2000, 12)] {
            let outcomes = round_robin(20, games, seed);
            let bfgs = MaxLikelihoodRanker::new(0.01).fit(&outcomes).unwrap();
            let newton = MaxLikelihoodRanker::new(0.01).with_hessian().fit(&outcomes).unwrap();

            assert!(bfgs.x[0] > bfgs.x[19], "{games} games");
            assert!((&bfgs.x - &newton.x).amax() < 1e-2, "{games} games");
        }
    }

    #[test]
    fn test_anchored_bfgs_converges_on_large_round_robin() {
        for (games, seed) in [(100, 21), (2000, 22)] {
            let outcomes = round_robin(20, games, seed);
            let bfgs = AnchoredRanker::default().skills(&outcomes).unwrap();
            let newton = AnchoredRanker::default()
                .with_solver(SolverConfig::newton())
                .skills(&outcomes)
                .unwrap();

            assert_eq!(bfgs[0], 0.0);
            assert!(bfgs[19] < bfgs[10] && bfgs[10] < 0.0, "{games} games");
            assert!((&bfgs - &newton).amax() < 5e-2, "{games} games");
        }
    }

    #[test]
    #[should_panic(expected = "outcome matrix must be 3x3")]
    fn test_objective_rejects_mismatched_outcomes() {
        let _ = objective(&DVector::zeros(3), &data(), 0.1, &ReciprocalSigmoid);
    }

    #[test]
    #[should_panic(expected = "outcome matrix must be 3x3")]
    fn test_anchored_jacobian_rejects_mismatched_outcomes() {
        let _ = anchored_jacobian(&DVector::zeros(2), &data(), &ArctanCdf);
    }

    #[test]
    fn test_anchored_ranker_single_competitor() {
        let skills = AnchoredRanker::default().skills(&OutcomeMatrix::zeros(1)).unwrap();
        assert_eq!(skills, DVector::zeros(1));
    }
}
