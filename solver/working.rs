//! Local quadratic approximation of the binomial log-likelihood.
//!
//! Given the current coefficients this produces the linear predictor, fitted
//! probabilities, curvature weights and working response consumed by one
//! outer step of the logistic solver.

use crate::path::Family;
use crate::types::Coefficients;
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};

/// Fitted probabilities are kept inside `[PROB_EPS, 1 - PROB_EPS]`.
pub const PROB_EPS: f64 = 1e-5;
/// Lower bound on every curvature weight.
pub const MIN_WEIGHT: f64 = PROB_EPS * (1.0 - PROB_EPS);
/// The linear predictor is clamped before exponentiation.
const ETA_CLAMP: f64 = 700.0;

/// The IRLS quantities for one outer iteration.
#[derive(Debug, Clone)]
pub struct WorkingResponse {
    pub eta: Array1<f64>,
    pub probabilities: Array1<f64>,
    /// `w_i = p_i (1 - p_i)`, always in `[MIN_WEIGHT, 0.25]`.
    pub weights: Array1<f64>,
    /// `z_i = eta_i + (y_i - p_i) / w_i`.
    pub z: Array1<f64>,
    /// Observations whose raw probability fell outside the clamp.
    pub floored: usize,
}

/// `eta_i = b0 + row_i . b`.
pub fn linear_predictor(x: ArrayView2<f64>, intercept: f64, slopes: ArrayView1<f64>) -> Array1<f64> {
    x.dot(&slopes) + intercept
}

/// Inverse logit, clamped away from 0 and 1.
pub fn probabilities(eta: ArrayView1<f64>) -> Array1<f64> {
    eta.mapv(|e| {
        let p = 1.0 / (1.0 + (-e.clamp(-ETA_CLAMP, ETA_CLAMP)).exp());
        p.clamp(PROB_EPS, 1.0 - PROB_EPS)
    })
}

/// `p (1 - p)`: maximal (0.25) at `p = 0.5`, vanishing toward 0 and 1.
pub fn curvature_weights(probabilities: ArrayView1<f64>) -> Array1<f64> {
    probabilities.mapv(|p| (p * (1.0 - p)).max(MIN_WEIGHT))
}

pub fn compute_working_response(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    coefficients: &Coefficients,
) -> WorkingResponse {
    let eta = linear_predictor(x, coefficients.intercept, coefficients.slopes.view());
    let floored = eta
        .iter()
        .filter(|&&e| {
            let raw = 1.0 / (1.0 + (-e.clamp(-ETA_CLAMP, ETA_CLAMP)).exp());
            !(PROB_EPS..=1.0 - PROB_EPS).contains(&raw)
        })
        .count();
    let probabilities = probabilities(eta.view());
    let weights = curvature_weights(probabilities.view());
    let z = Zip::from(&eta)
        .and(y)
        .and(&probabilities)
        .and(&weights)
        .map_collect(|&e, &yi, &p, &w| e + (yi - p) / w);

    WorkingResponse {
        eta,
        probabilities,
        weights,
        z,
        floored,
    }
}

/// Model deviance: residual sum of squares for linear fits, `-2 log L` for logistic fits.
pub fn deviance(y: ArrayView1<f64>, fitted: ArrayView1<f64>, family: Family) -> f64 {
    match family {
        Family::Logistic => {
            let total = Zip::from(y).and(fitted).fold(0.0, |acc, &yi, &mu| {
                let mu = mu.clamp(PROB_EPS, 1.0 - PROB_EPS);
                let positive = if yi > 0.0 { yi * (yi.ln() - mu.ln()) } else { 0.0 };
                let negative = if yi < 1.0 {
                    (1.0 - yi) * ((1.0 - yi).ln() - (1.0 - mu).ln())
                } else {
                    0.0
                };
                acc + positive + negative
            });
            2.0 * total
        }
        Family::Linear => Zip::from(y)
            .and(fitted)
            .fold(0.0, |acc, &yi, &mu| acc + (yi - mu) * (yi - mu)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn weights_peak_at_one_half() {
        let p = probabilities(array![0.0, 2.0, -2.0].view());
        let w = curvature_weights(p.view());
        assert_abs_diff_eq!(p[0], 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(w[0], 0.25, epsilon = 1e-15);
        assert!(w[1] < 0.25 && w[2] < 0.25);
        assert_abs_diff_eq!(w[1], w[2], epsilon = 1e-15);
    }

    #[test]
    fn extreme_predictors_are_clamped_not_infinite() {
        let p = probabilities(array![1e6, -1e6].view());
        assert_eq!(p[0], 1.0 - PROB_EPS);
        assert_eq!(p[1], PROB_EPS);
        let w = curvature_weights(p.view());
        assert!(w.iter().all(|&v| v >= MIN_WEIGHT && v <= 0.25));
    }

    #[test]
    fn working_response_linearizes_around_the_current_fit() {
        let x = array![[1.0], [-1.0], [30.0]];
        let y = array![1.0, 0.0, 1.0];
        let coefficients = Coefficients {
            intercept: 0.0,
            slopes: array![1.0],
        };
        let working = compute_working_response(x.view(), y.view(), &coefficients);

        let p0 = 1.0 / (1.0 + (-1.0f64).exp());
        assert_abs_diff_eq!(working.eta[0], 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(working.z[0], 1.0 + (1.0 - p0) / (p0 * (1.0 - p0)), epsilon = 1e-12);
        assert_eq!(working.floored, 1);
    }

    #[test]
    fn deviance_matches_hand_computation() {
        let y = array![1.0, 0.0];
        let mu = array![0.8, 0.4];
        let expected = -2.0 * (0.8f64.ln() + 0.6f64.ln());
        assert_abs_diff_eq!(
            deviance(y.view(), mu.view(), Family::Logistic),
            expected,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            deviance(y.view(), mu.view(), Family::Linear),
            0.04 + 0.16,
            epsilon = 1e-12
        );
    }
}
