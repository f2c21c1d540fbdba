//! Cyclic coordinate sweeps shared by the linear and logistic solvers.
//!
//! Both solvers minimise
//!
//! ```text
//! (1 / 2n) * sum_i w_i (t_i - b0 - x_i . b)^2 + lambda * |b|_1
//! ```
//!
//! for a target `t` and weights `w`. The linear solver uses `t = y, w = 1`;
//! the logistic solver uses the IRLS working response and curvature weights.
//! The residual `t - b0 - X b` is owned by one [`CoordinateWorkspace`] and is
//! updated incrementally, never recomputed from scratch.

use crate::threshold::shrink;
use crate::types::{Coefficients, ConvergenceCriterion};
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};

/// Stopping rules for one run of the inner sweep machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepLimits {
    pub tolerance: f64,
    pub max_sweeps: usize,
    pub criterion: ConvergenceCriterion,
}

/// Residual and per-column scale for one solver invocation.
pub(crate) struct CoordinateWorkspace<'a> {
    x: ArrayView2<'a, f64>,
    /// `None` means unit weights.
    weights: Option<Array1<f64>>,
    residual: Array1<f64>,
    /// `v_j = sum_i w_i x_ij^2 / n`.
    variances: Array1<f64>,
    /// `sum_i w_i / n`; only consulted when the intercept is free.
    weight_mean: f64,
    fit_intercept: bool,
    n: f64,
}

impl<'a> CoordinateWorkspace<'a> {
    pub(crate) fn new(
        x: ArrayView2<'a, f64>,
        target: ArrayView1<f64>,
        weights: Option<Array1<f64>>,
        start: &Coefficients,
        fit_intercept: bool,
    ) -> Self {
        let n = x.nrows() as f64;
        let residual = &target - &x.dot(&start.slopes) - start.intercept;

        let (variances, weight_mean) = match &weights {
            Some(w) => (
                Array1::from_iter(x.columns().into_iter().map(|column| {
                    Zip::from(&column)
                        .and(w)
                        .fold(0.0, |acc, &xij, &wi| acc + wi * xij * xij)
                        / n
                })),
                w.sum() / n,
            ),
            None => (
                Array1::from_iter(
                    x.columns()
                        .into_iter()
                        .map(|column| column.dot(&column) / n),
                ),
                1.0,
            ),
        };

        Self {
            x,
            weights,
            residual,
            variances,
            weight_mean,
            fit_intercept,
            n,
        }
    }

    fn weighted_sum(&self) -> f64 {
        match &self.weights {
            Some(w) => w.dot(&self.residual),
            None => self.residual.sum(),
        }
    }

    fn weighted_dot(&self, j: usize) -> f64 {
        let column = self.x.column(j);
        match &self.weights {
            Some(w) => Zip::from(&column)
                .and(w)
                .and(&self.residual)
                .fold(0.0, |acc, &xij, &wi, &ri| acc + xij * wi * ri),
            None => column.dot(&self.residual),
        }
    }

    /// One full cycle over the intercept (if free) and every slope, in column order.
    ///
    /// Returns the change measure of the cycle under `criterion`.
    pub(crate) fn sweep(
        &mut self,
        coefficients: &mut Coefficients,
        lambda: f64,
        criterion: ConvergenceCriterion,
    ) -> f64 {
        let mut change = 0.0;

        if self.fit_intercept && self.weight_mean > 0.0 {
            let shift = self.weighted_sum() / (self.n * self.weight_mean);
            coefficients.intercept += shift;
            self.residual -= shift;
            change = criterion.accumulate(change, shift);
        }

        for j in 0..self.x.ncols() {
            let old = coefficients.slopes[j];
            let variance = self.variances[j];

            // Partial residual correlation: x_j . (r + x_j b_j) / n.
            let new = if variance > 0.0 {
                let correlation = self.weighted_dot(j) / self.n + variance * old;
                shrink(correlation, lambda) / variance
            } else {
                0.0
            };

            if new != old {
                self.residual.scaled_add(old - new, &self.x.column(j));
                coefficients.slopes[j] = new;
                change = criterion.accumulate(change, new - old);
            }
        }

        change
    }
}

/// Columns whose variance `x_j . x_j / n` is zero. Their slopes are pinned to zero.
pub fn zero_variance_columns(x: ArrayView2<f64>) -> Vec<usize> {
    x.columns()
        .into_iter()
        .enumerate()
        .filter_map(|(j, column)| column.iter().all(|&v| v == 0.0).then_some(j))
        .collect()
}

/// The inner coordinate-sweep state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerSweep {
    Init,
    Sweeping { completed: usize },
    Converged { sweeps: usize },
    IterationLimitReached { sweeps: usize },
}

impl InnerSweep {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Converged { .. } | Self::IterationLimitReached { .. }
        )
    }

    pub fn sweeps(self) -> usize {
        match self {
            Self::Init => 0,
            Self::Sweeping { completed } => completed,
            Self::Converged { sweeps } | Self::IterationLimitReached { sweeps } => sweeps,
        }
    }

    fn step(
        self,
        workspace: &mut CoordinateWorkspace<'_>,
        coefficients: &mut Coefficients,
        lambda: f64,
        limits: &SweepLimits,
    ) -> Self {
        match self {
            Self::Init => Self::Sweeping { completed: 0 },
            Self::Sweeping { completed } if completed >= limits.max_sweeps => {
                Self::IterationLimitReached { sweeps: completed }
            }
            Self::Sweeping { completed } => {
                let change = workspace.sweep(coefficients, lambda, limits.criterion);
                log::trace!("sweep {}: change {:.3e}", completed + 1, change);
                if change < limits.tolerance {
                    Self::Converged {
                        sweeps: completed + 1,
                    }
                } else {
                    Self::Sweeping {
                        completed: completed + 1,
                    }
                }
            }
            terminal => terminal,
        }
    }
}

/// Drives the inner machine from `Init` to a terminal state. Bounded by `limits.max_sweeps`.
pub(crate) fn run_sweeps(
    workspace: &mut CoordinateWorkspace<'_>,
    coefficients: &mut Coefficients,
    lambda: f64,
    limits: &SweepLimits,
) -> InnerSweep {
    let mut state = InnerSweep::Init;
    while !state.is_terminal() {
        state = state.step(workspace, coefficients, lambda, limits);
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn limits(max_sweeps: usize) -> SweepLimits {
        SweepLimits {
            tolerance: 1e-12,
            max_sweeps,
            criterion: ConvergenceCriterion::MaxAbsolute,
        }
    }

    #[test]
    fn residual_stays_consistent_with_coefficients() {
        let x = array![[1.0, 0.5], [0.0, 1.0], [2.0, -1.0], [1.0, 1.0]];
        let y = array![2.0, 1.0, 3.0, 2.5];
        let mut coefficients = Coefficients::zeros(2);
        let mut workspace = CoordinateWorkspace::new(x.view(), y.view(), None, &coefficients, true);

        for _ in 0..5 {
            workspace.sweep(&mut coefficients, 0.05, ConvergenceCriterion::MaxAbsolute);
        }

        let expected = &y - &x.dot(&coefficients.slopes) - coefficients.intercept;
        for (a, b) in workspace.residual.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn orthogonal_design_converges_in_one_productive_sweep() {
        // Orthonormal-ish columns: each coordinate update is exact on the first pass.
        let x = array![[1.0, 0.0], [0.0, 1.0], [-1.0, 0.0], [0.0, -1.0]];
        let y = array![2.0, 1.0, -2.0, -1.0];
        let mut coefficients = Coefficients::zeros(2);
        let mut workspace = CoordinateWorkspace::new(x.view(), y.view(), None, &coefficients, false);

        let state = run_sweeps(&mut workspace, &mut coefficients, 0.1, &limits(50));
        assert_eq!(state, InnerSweep::Converged { sweeps: 2 });
        // c_1 = 4/4 = 1, v_1 = 0.5  ->  (1 - 0.1) / 0.5
        assert_abs_diff_eq!(coefficients.slopes[0], 1.8, epsilon = 1e-12);
        assert_abs_diff_eq!(coefficients.slopes[1], 0.8, epsilon = 1e-12);
    }

    #[test]
    fn zero_columns_are_pinned_and_reported() {
        let x = array![[0.0, 1.0], [0.0, 2.0], [0.0, 3.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut coefficients = Coefficients {
            intercept: 0.0,
            slopes: array![5.0, 0.0],
        };
        let mut workspace = CoordinateWorkspace::new(x.view(), y.view(), None, &coefficients, false);
        run_sweeps(&mut workspace, &mut coefficients, 0.01, &limits(100));
        assert_eq!(coefficients.slopes[0], 0.0);
        assert_eq!(zero_variance_columns(x.view()), vec![0]);
    }

    #[test]
    fn sweep_budget_is_respected() {
        let x = array![[1.0, 0.9], [0.9, 1.0], [0.5, 0.4], [0.2, 0.3]];
        let y = array![1.0, 2.0, 0.5, 0.1];
        let mut coefficients = Coefficients::zeros(2);
        let mut workspace = CoordinateWorkspace::new(x.view(), y.view(), None, &coefficients, false);
        let state = run_sweeps(&mut workspace, &mut coefficients, 1e-4, &limits(1));
        assert_eq!(state, InnerSweep::IterationLimitReached { sweeps: 1 });
        assert!(state.is_terminal());
    }
}
