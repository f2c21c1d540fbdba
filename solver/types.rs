use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures raised before or during a fit.
///
/// Validation always runs before any numeric work starts, so a caller that
/// receives one of these never observes partially updated solver state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error(
        "The design matrix has {rows} rows but the response vector has {response_len} entries."
    )]
    DimensionMismatch { rows: usize, response_len: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),
}

/// Raised (non-fatally) when a solver exhausts its iteration budget.
#[derive(Error, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[error("Solver did not converge at lambda={lambda:.6e} after {iterations} coordinate sweeps.")]
pub struct NonConvergenceWarning {
    pub lambda: f64,
    /// Coordinate sweeps performed, summed over outer refreshes for logistic fits.
    pub iterations: usize,
}

/// Numerical events that were handled locally and did not abort the path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathWarning {
    /// The fit at path position `index` ran out of iterations.
    NonConvergence {
        index: usize,
        warning: NonConvergenceWarning,
    },
    /// The column has zero variance; its slope is pinned to zero.
    ZeroVarianceFeature { column: usize },
    /// Curvature weights hit the floor at path position `index`
    /// (near-complete separation).
    WeightsFloored {
        index: usize,
        lambda: f64,
        count: usize,
    },
}

/// Rule used to decide that successive iterates have stopped moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConvergenceCriterion {
    /// Largest absolute per-coordinate change.
    #[default]
    MaxAbsolute,
    /// Sum of absolute coordinate changes.
    SumAbsolute,
}

impl ConvergenceCriterion {
    /// Folds one coordinate change into the running measure.
    pub fn accumulate(self, acc: f64, change: f64) -> f64 {
        match self {
            Self::MaxAbsolute => acc.max(change.abs()),
            Self::SumAbsolute => acc + change.abs(),
        }
    }
}

/// Intercept plus one slope per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub intercept: f64,
    pub slopes: Array1<f64>,
}

impl Coefficients {
    pub fn zeros(num_features: usize) -> Self {
        Self {
            intercept: 0.0,
            slopes: Array1::zeros(num_features),
        }
    }

    pub fn num_features(&self) -> usize {
        self.slopes.len()
    }

    /// Number of slopes that are exactly non-zero. The intercept is not counted.
    pub fn active_count(&self) -> usize {
        self.slopes.iter().filter(|&&b| b != 0.0).count()
    }

    /// Change between two coefficient vectors under `criterion`, intercept included.
    pub fn distance(&self, other: &Self, criterion: ConvergenceCriterion) -> f64 {
        let start = criterion.accumulate(0.0, self.intercept - other.intercept);
        self.slopes
            .iter()
            .zip(other.slopes.iter())
            .fold(start, |acc, (a, b)| criterion.accumulate(acc, a - b))
    }

    pub fn is_finite(&self) -> bool {
        self.intercept.is_finite() && self.slopes.iter().all(|b| b.is_finite())
    }
}

/// The terminal state a single-lambda fit ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    Converged,
    IterationLimitReached,
}

/// The result of solving at one lambda.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub coefficients: Coefficients,
    pub status: FitStatus,
    /// Total coordinate sweeps performed (summed over outer steps for logistic fits).
    pub iterations: usize,
    /// Observations whose curvature weight was floored during the fit.
    pub floored_weights: usize,
}

impl FitOutcome {
    pub fn converged(&self) -> bool {
        self.status == FitStatus::Converged
    }
}

/// Accepts a strictly decreasing sequence of at least two positive penalties.
pub(crate) fn check_lambda_sequence(values: ArrayView1<f64>) -> Result<(), FitError> {
    if values.len() < 2 {
        return Err(FitError::InvalidArgument(format!(
            "a lambda sequence needs at least 2 values, got {}",
            values.len()
        )));
    }
    if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        return Err(FitError::InvalidArgument(format!(
            "lambda values must be positive and finite, found {bad}"
        )));
    }
    if values.windows(2).into_iter().any(|w| w[1] >= w[0]) {
        return Err(FitError::InvalidArgument(
            "lambda values must be strictly decreasing".to_string(),
        ));
    }
    Ok(())
}

/// Coefficients for every lambda of a path, one row per lambda.
///
/// Column 0 of `coefficients` is the intercept, columns `1..=p` the slopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientPath {
    pub lambdas: Array1<f64>,
    pub coefficients: Array2<f64>,
    pub converged: Vec<bool>,
    pub iterations: Vec<usize>,
    #[serde(default)]
    pub warnings: Vec<PathWarning>,
}

impl CoefficientPath {
    pub(crate) fn with_capacity(num_lambdas: usize, num_features: usize) -> Self {
        Self {
            lambdas: Array1::zeros(0),
            coefficients: Array2::zeros((0, num_features + 1)),
            converged: Vec::with_capacity(num_lambdas),
            iterations: Vec::with_capacity(num_lambdas),
            warnings: Vec::new(),
        }
    }

    /// Appends the frozen result for `lambda`.
    pub(crate) fn push(&mut self, lambda: f64, outcome: &FitOutcome) -> Result<(), FitError> {
        let mut row = Vec::with_capacity(outcome.coefficients.num_features() + 1);
        row.push(outcome.coefficients.intercept);
        row.extend(outcome.coefficients.slopes.iter().copied());
        self.coefficients
            .push_row(ArrayView1::from(&row))
            .map_err(|e| FitError::InvalidArgument(format!("coefficient row shape: {e}")))?;
        self.lambdas
            .append(Axis(0), ArrayView1::from(&[lambda]))
            .map_err(|e| FitError::InvalidArgument(format!("lambda column shape: {e}")))?;
        self.converged.push(outcome.converged());
        self.iterations.push(outcome.iterations);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.converged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converged.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.coefficients.ncols() - 1
    }

    pub fn intercepts(&self) -> ArrayView1<'_, f64> {
        self.coefficients.column(0)
    }

    /// Slopes only, K x p.
    pub fn slopes(&self) -> ArrayView2<'_, f64> {
        self.coefficients.slice(s![.., 1..])
    }

    pub fn coefficients_at(&self, index: usize) -> Option<Coefficients> {
        if index >= self.len() {
            return None;
        }
        let row = self.coefficients.row(index);
        Some(Coefficients {
            intercept: row[0],
            slopes: row.slice(s![1..]).to_owned(),
        })
    }

    /// Number of non-zero slopes at each lambda.
    pub fn active_set_sizes(&self) -> Vec<usize> {
        self.slopes()
            .rows()
            .into_iter()
            .map(|row| row.iter().filter(|&&b| b != 0.0).count())
            .collect()
    }

    pub fn all_converged(&self) -> bool {
        self.converged.iter().all(|&c| c)
    }

    /// Path positions whose fit ran out of iterations.
    pub fn non_converged_indices(&self) -> Vec<usize> {
        self.converged
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| (!c).then_some(i))
            .collect()
    }
}

/// Shape checks shared by every public entry point.
pub(crate) fn check_dimensions(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), FitError> {
    if x.nrows() != y.len() {
        return Err(FitError::DimensionMismatch {
            rows: x.nrows(),
            response_len: y.len(),
        });
    }
    if x.nrows() == 0 {
        return Err(FitError::InvalidArgument(
            "the design matrix has no rows".to_string(),
        ));
    }
    if !x.iter().all(|v| v.is_finite()) {
        return Err(FitError::InvalidArgument(
            "the design matrix contains non-finite values".to_string(),
        ));
    }
    if !y.iter().all(|v| v.is_finite()) {
        return Err(FitError::InvalidArgument(
            "the response vector contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_binary(y: ArrayView1<f64>) -> Result<(), FitError> {
    match y.iter().position(|&v| v != 0.0 && v != 1.0) {
        Some(i) => Err(FitError::InvalidArgument(format!(
            "expected a response coded 0/1, found {} at row {}",
            y[i],
            i + 1
        ))),
        None => Ok(()),
    }
}

pub(crate) fn check_tolerance(tolerance: f64) -> Result<(), FitError> {
    if tolerance.is_finite() && tolerance > 0.0 {
        Ok(())
    } else {
        Err(FitError::InvalidArgument(format!(
            "tolerance must be positive, got {tolerance}"
        )))
    }
}

pub(crate) fn check_lambda(lambda: f64) -> Result<(), FitError> {
    if lambda.is_finite() && lambda > 0.0 {
        Ok(())
    } else {
        Err(FitError::InvalidArgument(format!(
            "lambda must be positive and finite, got {lambda}"
        )))
    }
}

pub(crate) fn check_warm_start(warm_start: &Coefficients, num_features: usize) -> Result<(), FitError> {
    if warm_start.num_features() != num_features {
        return Err(FitError::InvalidArgument(format!(
            "warm start has {} slopes but the design matrix has {} columns",
            warm_start.num_features(),
            num_features
        )));
    }
    if !warm_start.is_finite() {
        return Err(FitError::InvalidArgument(
            "warm start contains non-finite coefficients".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_budget(name: &str, value: usize) -> Result<(), FitError> {
    if value == 0 {
        Err(FitError::InvalidArgument(format!("{name} must be at least 1")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn lambda_sequence_rejects_non_decreasing_values() {
        assert!(check_lambda_sequence(array![1.0, 0.5, 0.1].view()).is_ok());
        for bad in [array![1.0, 1.0], array![1.0], array![1.0, -0.5], array![1.0, f64::NAN]] {
            assert!(matches!(
                check_lambda_sequence(bad.view()),
                Err(FitError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn coefficient_distance_respects_criterion() {
        let a = Coefficients {
            intercept: 1.0,
            slopes: array![0.0, 2.0, -1.0],
        };
        let b = Coefficients {
            intercept: 0.5,
            slopes: array![0.0, 1.0, 0.0],
        };
        assert_eq!(a.distance(&b, ConvergenceCriterion::MaxAbsolute), 1.0);
        assert_eq!(a.distance(&b, ConvergenceCriterion::SumAbsolute), 2.5);
        assert_eq!(a.active_count(), 2);
    }

    #[test]
    fn path_tracks_rows_and_convergence() {
        let mut path = CoefficientPath::with_capacity(2, 2);
        let outcome = FitOutcome {
            coefficients: Coefficients {
                intercept: 0.1,
                slopes: array![0.0, 0.3],
            },
            status: FitStatus::IterationLimitReached,
            iterations: 7,
            floored_weights: 0,
        };
        path.push(0.5, &outcome).unwrap();
        path.push(0.25, &FitOutcome {
            status: FitStatus::Converged,
            ..outcome.clone()
        })
        .unwrap();

        assert_eq!(path.len(), 2);
        assert_eq!(path.coefficients.shape(), &[2, 3]);
        assert_eq!(path.lambdas.to_vec(), vec![0.5, 0.25]);
        assert_eq!(path.non_converged_indices(), vec![0]);
        assert_eq!(path.active_set_sizes(), vec![1, 1]);
        assert_eq!(path.coefficients_at(1).unwrap().slopes, array![0.0, 0.3]);
        assert!(path.coefficients_at(2).is_none());
    }

    #[test]
    fn dimension_check_reports_both_sizes() {
        let x = Array2::<f64>::zeros((3, 2));
        let y = array![1.0, 2.0];
        assert_eq!(
            check_dimensions(x.view(), y.view()),
            Err(FitError::DimensionMismatch {
                rows: 3,
                response_len: 2
            })
        );
    }
}
