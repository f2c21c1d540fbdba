//! Data-driven penalty sequences.
//!
//! The sequence starts at the smallest penalty that zeroes every slope under
//! the correlation-screening rule and decays geometrically to
//! `epsilon * lambda_max` (Friedman, Hastie and Tibshirani, 2010).

use crate::types::{FitError, check_dimensions};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Number of lambdas generated when the caller does not choose.
pub const DEFAULT_PATH_LENGTH: usize = 100;

/// `lambda_min / lambda_max` when there are more observations than features.
const RATIO_TALL: f64 = 1e-4;
/// `lambda_min / lambda_max` otherwise.
const RATIO_WIDE: f64 = 1e-2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaPath {
    /// Entry value: every slope is zero at this penalty.
    pub lambda_max: f64,
    /// Minimum ratio, `lambda_min / lambda_max`.
    pub epsilon: f64,
    /// `k` values decreasing from `lambda_max` to `epsilon * lambda_max` on the log scale.
    pub lambdas: Array1<f64>,
}

impl LambdaPath {
    pub fn lambda_min(&self) -> f64 {
        self.lambda_max * self.epsilon
    }
}

/// Largest absolute feature/response correlation, `max_j |x_j . y| / n`.
pub fn lambda_max(x: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
    let n = x.nrows() as f64;
    x.columns()
        .into_iter()
        .map(|column| (column.dot(&y) / n).abs())
        .fold(0.0, f64::max)
}

pub fn generate_lambda_path(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    k: usize,
) -> Result<LambdaPath, FitError> {
    check_dimensions(x, y)?;
    if k < 2 {
        return Err(FitError::InvalidArgument(format!(
            "the path length must be at least 2, got {k}"
        )));
    }

    let entry = lambda_max(x, y);
    if !(entry.is_finite() && entry > 0.0) {
        return Err(FitError::DegenerateInput(format!(
            "lambda_max is {entry}; the response is uncorrelated with every feature"
        )));
    }

    let epsilon = if x.nrows() > x.ncols() {
        RATIO_TALL
    } else {
        RATIO_WIDE
    };

    let log_max = entry.ln();
    let step = epsilon.ln() / (k - 1) as f64;
    let mut lambdas = Array1::from_shape_fn(k, |i| (log_max + i as f64 * step).exp());
    lambdas[0] = entry;
    lambdas[k - 1] = entry * epsilon;

    log::debug!(
        "Lambda path: lambda_max={:.6e}, epsilon={:.0e}, {} values",
        entry,
        epsilon,
        k
    );

    Ok(LambdaPath {
        lambda_max: entry,
        epsilon,
        lambdas,
    })
}
