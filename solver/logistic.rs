//! L1-penalized logistic regression by IRLS with coordinate-descent inner solves.
//!
//! Two explicit state machines are composed here. [`OuterRefresh`] rebuilds
//! the quadratic approximation of the log-likelihood around the current
//! coefficients; each of its steps runs the inner [`InnerSweep`] machine to a
//! terminal state on the weighted least-squares problem that approximation
//! defines. Both machines are bounded by their own iteration budgets.

use crate::path::PathSolver;
use crate::sweep::{CoordinateWorkspace, SweepLimits, run_sweeps};
use crate::types::{
    Coefficients, ConvergenceCriterion, FitError, FitOutcome, FitStatus, NonConvergenceWarning,
    check_binary, check_budget, check_dimensions, check_lambda, check_tolerance, check_warm_start,
};
use crate::working::{WorkingResponse, compute_working_response};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticSettings {
    /// Applies to both the outer coefficient change and the inner sweeps.
    pub tolerance: f64,
    /// Maximum number of quadratic-approximation refreshes per lambda.
    pub max_outer_iterations: usize,
    /// Maximum number of coordinate sweeps per refresh.
    pub max_inner_iterations: usize,
    #[serde(default)]
    pub criterion: ConvergenceCriterion,
}

impl Default for LogisticSettings {
    fn default() -> Self {
        Self {
            tolerance: 1e-7,
            max_outer_iterations: 100,
            max_inner_iterations: 10_000,
            criterion: ConvergenceCriterion::MaxAbsolute,
        }
    }
}

/// The outer quadratic-refresh state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OuterRefresh {
    Init,
    Iterating { completed: usize },
    Converged { iterations: usize },
    IterationLimitReached { iterations: usize },
}

/// Mutable state threaded through the outer machine. Owned by one solve.
struct RefreshState {
    coefficients: Coefficients,
    total_sweeps: usize,
    floored: usize,
}

impl OuterRefresh {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Converged { .. } | Self::IterationLimitReached { .. }
        )
    }

    pub fn iterations(self) -> usize {
        match self {
            Self::Init => 0,
            Self::Iterating { completed } => completed,
            Self::Converged { iterations } | Self::IterationLimitReached { iterations } => {
                iterations
            }
        }
    }

    fn step(
        self,
        state: &mut RefreshState,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        lambda: f64,
        settings: &LogisticSettings,
    ) -> Self {
        let completed = match self {
            Self::Init => return Self::Iterating { completed: 0 },
            Self::Iterating { completed } => completed,
            terminal => return terminal,
        };
        if completed >= settings.max_outer_iterations {
            return Self::IterationLimitReached {
                iterations: completed,
            };
        }

        let previous = state.coefficients.clone();
        let WorkingResponse {
            z,
            weights,
            floored,
            ..
        } = compute_working_response(x, y, &state.coefficients);
        state.floored = state.floored.max(floored);

        let mut workspace = CoordinateWorkspace::new(x, z.view(), Some(weights), &previous, true);
        let limits = SweepLimits {
            tolerance: settings.tolerance,
            max_sweeps: settings.max_inner_iterations,
            criterion: settings.criterion,
        };
        let inner = run_sweeps(&mut workspace, &mut state.coefficients, lambda, &limits);
        state.total_sweeps += inner.sweeps();

        if !state.coefficients.is_finite() {
            log::warn!(
                "Logistic fit at lambda={lambda:.4e} produced non-finite coefficients; keeping the last finite iterate"
            );
            state.coefficients = previous;
            return Self::IterationLimitReached {
                iterations: completed + 1,
            };
        }

        let change = state.coefficients.distance(&previous, settings.criterion);
        log::trace!(
            "outer step {}: inner {:?}, coefficient change {:.3e}",
            completed + 1,
            inner,
            change
        );
        if change < settings.tolerance {
            Self::Converged {
                iterations: completed + 1,
            }
        } else {
            Self::Iterating {
                completed: completed + 1,
            }
        }
    }
}

/// Penalized binomial likelihood for one lambda at a time; the intercept is unpenalized.
#[derive(Debug, Clone)]
pub struct LogisticSolver {
    settings: LogisticSettings,
}

impl LogisticSolver {
    pub fn new(settings: LogisticSettings) -> Result<Self, FitError> {
        check_tolerance(settings.tolerance)?;
        check_budget("max_outer_iterations", settings.max_outer_iterations)?;
        check_budget("max_inner_iterations", settings.max_inner_iterations)?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &LogisticSettings {
        &self.settings
    }

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

impl PathSolver for LogisticSolver {
    fn name(&self) -> &'static str {
        "logistic"
    }

    fn validate(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), FitError> {
        check_dimensions(x, y)?;
        check_binary(y)
    }

    fn solve_validated(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        lambda: f64,
        start: Coefficients,
    ) -> FitOutcome {
        let mut state = RefreshState {
            coefficients: start,
            total_sweeps: 0,
            floored: 0,
        };
        let mut machine = OuterRefresh::Init;
        while !machine.is_terminal() {
            machine = machine.step(&mut state, x, y, lambda, &self.settings);
        }

        let status = match machine {
            OuterRefresh::Converged { .. } => FitStatus::Converged,
            _ => {
                log::warn!(
                    "{}",
                    NonConvergenceWarning {
                        lambda,
                        iterations: state.total_sweeps,
                    }
                );
                FitStatus::IterationLimitReached
            }
        };
        if state.floored > 0 {
            log::warn!(
                "{} curvature weights floored at lambda={:.4e}; the classes may be nearly separable",
                state.floored,
                lambda
            );
        }

        log::debug!(
            "logistic fit at lambda={:.4e}: {:?} after {} refreshes ({} sweeps), {} active",
            lambda,
            status,
            machine.iterations(),
            state.total_sweeps,
            state.coefficients.active_count()
        );

        FitOutcome {
            coefficients: state.coefficients,
            status,
            iterations: state.total_sweeps,
            floored_weights: state.floored,
        }
    }
}
