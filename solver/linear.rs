use crate::path::PathSolver;
use crate::sweep::{CoordinateWorkspace, InnerSweep, SweepLimits, run_sweeps};
use crate::types::{
    Coefficients, ConvergenceCriterion, FitError, FitOutcome, FitStatus, NonConvergenceWarning,
    check_budget, check_dimensions, check_lambda, check_tolerance, check_warm_start,
};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Hyperparameters of the penalized least-squares solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearSettings {
    pub tolerance: f64,
    /// Maximum number of full coordinate sweeps per lambda.
    pub max_iterations: usize,
    /// Fit an unpenalized intercept. Off by default so that every slope is
    /// exactly zero at `lambda_max`.
    #[serde(default)]
    pub fit_intercept: bool,
    #[serde(default)]
    pub criterion: ConvergenceCriterion,
}

impl Default for LinearSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-7,
            max_iterations: 100_000,
            fit_intercept: false,
            criterion: ConvergenceCriterion::MaxAbsolute,
        }
    }
}

/// Weighted-least-squares-with-L1 for one lambda at a time.
#[derive(Debug, Clone)]
pub struct LinearSolver {
    settings: LinearSettings,
}

impl LinearSolver {
    pub fn new(settings: LinearSettings) -> Result<Self, FitError> {
        check_tolerance(settings.tolerance)?;
        check_budget("max_iterations", settings.max_iterations)?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &LinearSettings {
        &self.settings
    }

    /// Solves at a single `lambda`, starting from `warm_start` (zeros if `None`).
    ///
    /// Running out of sweeps is not an error: the best coefficients are
    /// returned with [`FitStatus::IterationLimitReached`].
    pub fn solve(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        lambda: f64,
        warm_start: Option<&Coefficients>,
    ) -> Result<FitOutcome, FitError> {
        self.validate(x, y)?;
        check_lambda(lambda)?;
        let start = match warm_start {
            Some(coefficients) => {
                check_warm_start(coefficients, x.ncols())?;
                coefficients.clone()
            }
            None => Coefficients::zeros(x.ncols()),
        };
        Ok(self.solve_validated(x, y, lambda, start))
    }
}

impl PathSolver for LinearSolver {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn validate(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), FitError> {
        check_dimensions(x, y)
    }

    fn solve_validated(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        lambda: f64,
        start: Coefficients,
    ) -> FitOutcome {
        let mut coefficients = start;
        if !self.settings.fit_intercept {
            coefficients.intercept = 0.0;
        }

        let mut workspace =
            CoordinateWorkspace::new(x, y, None, &coefficients, self.settings.fit_intercept);
        let limits = SweepLimits {
            tolerance: self.settings.tolerance,
            max_sweeps: self.settings.max_iterations,
            criterion: self.settings.criterion,
        };
        let state = run_sweeps(&mut workspace, &mut coefficients, lambda, &limits);

        let status = match state {
            InnerSweep::Converged { .. } => FitStatus::Converged,
            _ => {
                log::warn!(
                    "{}",
                    NonConvergenceWarning {
                        lambda,
                        iterations: state.sweeps(),
                    }
                );
                FitStatus::IterationLimitReached
            }
        };

        log::debug!(
            "linear fit at lambda={:.4e}: {:?} after {} sweeps, {} active",
            lambda,
            status,
            state.sweeps(),
            coefficients.active_count()
        );

        FitOutcome {
            coefficients,
            status,
            iterations: state.sweeps(),
            floored_weights: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lambda::lambda_max;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2, array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn noisy_design(n: usize, p: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Array2::from_shape_fn((n, p), |_| rng.r#gen::<f64>() * 2.0 - 1.0);
        let noise = Array1::from_shape_fn(n, |_| (rng.r#gen::<f64>() - 0.5) * 0.1);
        let y = 3.0 * &x.column(0) - 2.0 * &x.column(2) + noise;
        (x, y)
    }

    #[test]
    fn slopes_are_zero_at_lambda_max() {
        let (x, y) = noisy_design(60, 5, 7);
        let solver = LinearSolver::new(LinearSettings::default()).unwrap();
        let outcome = solver
            .solve(x.view(), y.view(), lambda_max(x.view(), y.view()), None)
            .unwrap();
        assert!(outcome.converged());
        assert!(outcome.coefficients.slopes.iter().all(|&b| b == 0.0));
        assert_eq!(outcome.coefficients.intercept, 0.0);
    }

    #[test]
    fn small_penalty_recovers_the_signal() {
        let (x, y) = noisy_design(200, 5, 11);
        let solver = LinearSolver::new(LinearSettings::default()).unwrap();
        let outcome = solver.solve(x.view(), y.view(), 1e-4, None).unwrap();
        assert!(outcome.converged());
        assert_abs_diff_eq!(outcome.coefficients.slopes[0], 3.0, epsilon = 0.05);
        assert_abs_diff_eq!(outcome.coefficients.slopes[2], -2.0, epsilon = 0.05);
        assert!(outcome.coefficients.slopes[1].abs() < 0.05);
    }

    #[test]
    fn intercept_is_estimated_when_requested() {
        let (x, y) = noisy_design(200, 5, 3);
        let shifted = &y + 4.0;
        let solver = LinearSolver::new(LinearSettings {
            fit_intercept: true,
            ..LinearSettings::default()
        })
        .unwrap();
        let outcome = solver.solve(x.view(), shifted.view(), 1e-4, None).unwrap();
        assert_abs_diff_eq!(outcome.coefficients.intercept, 4.0, epsilon = 0.05);
    }

    #[test]
    fn exhausted_budget_is_reported_not_raised() {
        let (x, y) = noisy_design(50, 4, 5);
        let solver = LinearSolver::new(LinearSettings {
            tolerance: 1e-15,
            max_iterations: 1,
            ..LinearSettings::default()
        })
        .unwrap();
        let outcome = solver.solve(x.view(), y.view(), 1e-3, None).unwrap();
        assert_eq!(outcome.status, FitStatus::IterationLimitReached);
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.coefficients.is_finite());
    }

    #[test]
    fn invalid_arguments_fail_before_solving() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![1.0, 2.0, 3.0];
        let solver = LinearSolver::new(LinearSettings::default()).unwrap();
        assert!(matches!(
            solver.solve(x.view(), y.view(), 0.1, None),
            Err(FitError::DimensionMismatch { .. })
        ));
        let y = array![1.0, 2.0];
        assert!(matches!(
            solver.solve(x.view(), y.view(), 0.0, None),
            Err(FitError::InvalidArgument(_))
        ));
        let wrong_width = Coefficients::zeros(3);
        assert!(matches!(
            solver.solve(x.view(), y.view(), 0.1, Some(&wrong_width)),
            Err(FitError::InvalidArgument(_))
        ));
        assert!(LinearSolver::new(LinearSettings {
            tolerance: 0.0,
            ..LinearSettings::default()
        })
        .is_err());
    }
}
