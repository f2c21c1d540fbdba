//! Fitting a solver across a whole lambda sequence.
//!
//! With warm starts the path is an ordered pipeline: each [`PathStage`] is
//! seeded with the coefficients the previous stage froze, so the stages must
//! run one after another in decreasing-lambda order. Cold-start paths have no
//! such dependency and are solved in parallel.

use crate::linear::{LinearSettings, LinearSolver};
use crate::logistic::{LogisticSettings, LogisticSolver};
use crate::progress::{NoopPathProgress, PathProgressObserver, PathProgressStage};
use crate::sweep::zero_variance_columns;
use crate::types::{
    CoefficientPath, Coefficients, FitError, FitOutcome, NonConvergenceWarning, PathWarning,
    check_lambda_sequence,
};
use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Which likelihood the path is fitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Family {
    /// Penalized least squares on a real-valued response.
    Linear,
    /// Penalized binomial likelihood on a 0/1 response.
    Logistic,
}

/// A single-lambda solver that can be driven along a path.
pub trait PathSolver: Sync {
    fn name(&self) -> &'static str;

    /// Every argument check that does not depend on lambda. Runs once per path.
    fn validate(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), FitError>;

    /// Solves at `lambda` from `start`. Inputs must already have passed
    /// [`PathSolver::validate`].
    fn solve_validated(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        lambda: f64,
        start: Coefficients,
    ) -> FitOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathOptions {
    /// Seed each lambda with the previous solution. When off, every lambda
    /// starts from zero and the fits run in parallel.
    pub warm_start: bool,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self { warm_start: true }
    }
}

/// One step of the warm-start pipeline.
#[derive(Debug, Clone)]
pub struct PathStage {
    pub index: usize,
    pub lambda: f64,
    pub warm_start: Coefficients,
}

impl PathStage {
    /// The first stage starts from zero, which is exact at `lambda_max`.
    pub fn first(lambda: f64, num_features: usize) -> Self {
        Self {
            index: 0,
            lambda,
            warm_start: Coefficients::zeros(num_features),
        }
    }

    /// The stage that follows this one, seeded with the coefficients it produced.
    pub fn next(&self, lambda: f64, produced: &FitOutcome) -> Self {
        Self {
            index: self.index + 1,
            lambda,
            warm_start: produced.coefficients.clone(),
        }
    }

    pub fn run<S: PathSolver + ?Sized>(
        &self,
        solver: &S,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> FitOutcome {
        solver.solve_validated(x, y, self.lambda, self.warm_start.clone())
    }
}

/// Fits `solver` at every lambda, in the order given.
///
/// All validation happens before the first solve. A lambda whose fit runs out
/// of iterations is recorded as non-converged and the path carries on.
pub fn fit_path<S: PathSolver + ?Sized>(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    lambdas: ArrayView1<f64>,
    solver: &S,
    options: &PathOptions,
    observer: &mut dyn PathProgressObserver,
) -> Result<CoefficientPath, FitError> {
    solver.validate(x, y)?;
    check_lambda_sequence(lambdas)?;

    let start_time = Instant::now();
    let num_features = x.ncols();
    log::info!(
        "Fitting {} path: {} lambdas, {} observations, {} features, warm start {}",
        solver.name(),
        lambdas.len(),
        x.nrows(),
        num_features,
        if options.warm_start { "on" } else { "off" }
    );

    let mut path = CoefficientPath::with_capacity(lambdas.len(), num_features);
    for column in zero_variance_columns(x) {
        log::warn!("Feature column {column} has zero variance; its slope is held at zero");
        path.warnings.push(PathWarning::ZeroVarianceFeature { column });
    }

    observer.on_stage_start(PathProgressStage::Path, lambdas.len());

    if options.warm_start {
        let mut stage = PathStage::first(lambdas[0], num_features);
        loop {
            let outcome = stage.run(solver, x, y);
            record(&mut path, stage.index, stage.lambda, &outcome)?;
            observer.on_stage_advance(PathProgressStage::Path, stage.index + 1);

            match lambdas.get(stage.index + 1) {
                Some(&lambda) => stage = stage.next(lambda, &outcome),
                None => break,
            }
        }
    } else {
        let outcomes: Vec<FitOutcome> = lambdas
            .to_vec()
            .into_par_iter()
            .map(|lambda| {
                solver.solve_validated(x, y, lambda, Coefficients::zeros(num_features))
            })
            .collect();
        for (index, (&lambda, outcome)) in lambdas.iter().zip(outcomes.iter()).enumerate() {
            record(&mut path, index, lambda, outcome)?;
            observer.on_stage_advance(PathProgressStage::Path, index + 1);
        }
    }

    observer.on_stage_finish(PathProgressStage::Path);

    let misses = path.non_converged_indices().len();
    log::info!(
        "Finished {} path in {:.2?}: {}/{} lambdas converged, final active set {}",
        solver.name(),
        start_time.elapsed(),
        path.len() - misses,
        path.len(),
        path.active_set_sizes().last().copied().unwrap_or(0)
    );

    Ok(path)
}

fn record(
    path: &mut CoefficientPath,
    index: usize,
    lambda: f64,
    outcome: &FitOutcome,
) -> Result<(), FitError> {
    path.push(lambda, outcome)?;
    if !outcome.converged() {
        path.warnings.push(PathWarning::NonConvergence {
            index,
            warning: NonConvergenceWarning {
                lambda,
                iterations: outcome.iterations,
            },
        });
    }
    if outcome.floored_weights > 0 {
        path.warnings.push(PathWarning::WeightsFloored {
            index,
            lambda,
            count: outcome.floored_weights,
        });
    }
    Ok(())
}

/// Warm-started penalized least-squares path.
pub fn fit_linear_path(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    lambdas: ArrayView1<f64>,
    settings: &LinearSettings,
) -> Result<CoefficientPath, FitError> {
    let solver = LinearSolver::new(*settings)?;
    fit_path(
        x,
        y,
        lambdas,
        &solver,
        &PathOptions::default(),
        &mut NoopPathProgress,
    )
}

/// Warm-started penalized logistic path. `y` must be coded 0/1.
pub fn fit_logistic_path(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    lambdas: ArrayView1<f64>,
    settings: &LogisticSettings,
) -> Result<CoefficientPath, FitError> {
    let solver = LogisticSolver::new(*settings)?;
    fit_path(
        x,
        y,
        lambdas,
        &solver,
        &PathOptions::default(),
        &mut NoopPathProgress,
    )
}
