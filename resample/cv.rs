//! Fold-wise path fitting with held-out loss.
//!
//! Every training split is fitted over the same lambda sequence, so the loss
//! curves line up by index. Choosing a lambda from them is left to the caller.

use super::ResampleError;
use super::folds::FoldAssignment;
use crate::model::PathConfig;
use crate::path::Family;
use crate::progress::{NoopPathProgress, PathProgressObserver, PathProgressStage};
use crate::types::{CoefficientPath, check_dimensions, check_lambda_sequence};
use crate::working::{deviance, linear_predictor, probabilities};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct FoldFit {
    pub fold: usize,
    pub path: CoefficientPath,
    /// Held-out loss at each lambda.
    pub test_loss: Array1<f64>,
    pub test_size: usize,
}

#[derive(Debug, Clone)]
pub struct CrossValidatedPath {
    pub lambdas: Array1<f64>,
    pub folds: Vec<FoldFit>,
    /// Average of the fold losses at each lambda.
    pub mean_loss: Array1<f64>,
    /// Standard error of `mean_loss` across folds.
    pub std_error: Array1<f64>,
}

/// Mean squared error for linear paths, mean binomial deviance for logistic paths.
fn held_out_loss(
    path: &CoefficientPath,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    family: Family,
) -> Array1<f64> {
    let n = y.len() as f64;
    (0..path.len())
        .map(|index| {
            let intercept = path.intercepts()[index];
            let all_slopes = path.slopes();
            let eta = linear_predictor(x, intercept, all_slopes.row(index));
            let fitted = match family {
                Family::Linear => eta,
                Family::Logistic => probabilities(eta.view()),
            };
            deviance(y, fitted.view(), family) / n
        })
        .collect()
}

fn fit_fold(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    folds: &FoldAssignment,
    fold: usize,
    lambdas: ArrayView1<f64>,
    config: &PathConfig,
) -> Result<FoldFit, ResampleError> {
    let train = folds.train_indices(fold);
    let test = folds.test_indices(fold);
    if train.is_empty() || test.is_empty() {
        return Err(ResampleError::EmptySplit(fold));
    }

    let x_train = x.select(Axis(0), &train);
    let y_train = y.select(Axis(0), &train);
    let path = config.fit_lambdas(
        x_train.view(),
        y_train.view(),
        lambdas,
        &mut NoopPathProgress,
    )?;

    let x_test: Array2<f64> = x.select(Axis(0), &test);
    let y_test = y.select(Axis(0), &test);
    let test_loss = held_out_loss(&path, x_test.view(), y_test.view(), config.family);
    log::debug!(
        "Fold {fold}: trained on {} rows, held-out loss {:.4} at the smallest lambda",
        train.len(),
        test_loss.last().copied().unwrap_or(f64::NAN)
    );

    Ok(FoldFit {
        fold,
        path,
        test_loss,
        test_size: test.len(),
    })
}

/// Fits `config` on every training split of `folds` in parallel.
pub fn cross_validate_path(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    folds: &FoldAssignment,
    lambdas: ArrayView1<f64>,
    config: &PathConfig,
    observer: &mut dyn PathProgressObserver,
) -> Result<CrossValidatedPath, ResampleError> {
    check_dimensions(x, y)?;
    check_lambda_sequence(lambdas)?;
    if folds.fold_of.len() != y.len() {
        return Err(ResampleError::FoldLengthMismatch {
            assigned: folds.fold_of.len(),
            observations: y.len(),
        });
    }

    let k = folds.num_folds();
    if k < 2 {
        return Err(ResampleError::TooFewFolds(k));
    }

    let start_time = Instant::now();
    log::info!(
        "Cross-validating {:?} path over {k} folds and {} lambdas",
        config.family,
        lambdas.len()
    );
    observer.on_stage_start(PathProgressStage::CrossValidation, k);

    let fits = (0..k)
        .into_par_iter()
        .map(|fold| fit_fold(x, y, folds, fold, lambdas, config))
        .collect::<Result<Vec<_>, _>>()?;
    observer.on_stage_advance(PathProgressStage::CrossValidation, k);
    observer.on_stage_finish(PathProgressStage::CrossValidation);

    let mut losses = Array2::zeros((k, lambdas.len()));
    for (mut row, fit) in losses.axis_iter_mut(Axis(0)).zip(fits.iter()) {
        row.assign(&fit.test_loss);
    }
    let mean_loss = losses.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(lambdas.len()));
    let std_error = losses.std_axis(Axis(0), 1.0) / (k as f64).sqrt();

    log::info!("Cross-validation finished in {:.2?}", start_time.elapsed());
    Ok(CrossValidatedPath {
        lambdas: lambdas.to_owned(),
        folds: fits,
        mean_loss,
        std_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lambda::generate_lambda_path;
    use crate::resample::folds::stratified_folds;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn simulate(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Array2::from_shape_fn((n, 3), |_| rng.r#gen::<f64>() * 2.0 - 1.0);
        let y = x.column(0).mapv(|v| if v + 0.3 * rng.r#gen::<f64>() > 0.1 { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn every_fold_reports_a_loss_per_lambda() {
        let (x, y) = simulate(120, 4);
        let mut rng = StdRng::seed_from_u64(42);
        let folds = stratified_folds(y.view(), 4, &mut rng).unwrap();
        let grid = generate_lambda_path(x.view(), y.view(), 8).unwrap();
        let config = PathConfig {
            family: Family::Logistic,
            ..PathConfig::default()
        };

        let cv = cross_validate_path(
            x.view(),
            y.view(),
            &folds,
            grid.lambdas.view(),
            &config,
            &mut NoopPathProgress,
        )
        .unwrap();

        assert_eq!(cv.folds.len(), 4);
        assert_eq!(cv.mean_loss.len(), 8);
        for (fold, fit) in cv.folds.iter().enumerate() {
            assert_eq!(fit.fold, fold);
            assert_eq!(fit.test_size, folds.sample_sizes[fold]);
            assert_eq!(fit.path.len(), 8);
            assert!(fit.test_loss.iter().all(|l| l.is_finite() && *l > 0.0));
        }
        // A real signal beats the intercept-only model out of sample.
        assert!(cv.mean_loss[7] < cv.mean_loss[0]);
        assert!(cv.std_error.iter().all(|s| s.is_finite() && *s >= 0.0));
    }

    #[test]
    fn linear_loss_is_mean_squared_error() {
        let x = ndarray::array![[1.0], [2.0], [3.0], [4.0]];
        let y = ndarray::array![2.0, 4.0, 6.0, 8.0];
        let folds = FoldAssignment {
            fold_of: vec![0, 1, 0, 1],
            sample_sizes: vec![2, 2],
            event_sizes: vec![0, 0],
        };
        let lambdas = ndarray::array![100.0, 50.0];
        let cv = cross_validate_path(
            x.view(),
            y.view(),
            &folds,
            lambdas.view(),
            &PathConfig::default(),
            &mut NoopPathProgress,
        )
        .unwrap();

        // Both lambdas zero every slope, so the loss is the mean of y^2 over the held-out rows.
        assert_eq!(cv.folds[0].test_loss.to_vec(), vec![20.0, 20.0]);
        assert_eq!(cv.folds[1].test_loss.to_vec(), vec![40.0, 40.0]);
        assert_eq!(cv.mean_loss.to_vec(), vec![30.0, 30.0]);
    }

    #[test]
    fn mismatched_fold_assignment_is_rejected() {
        let (x, y) = simulate(20, 1);
        let folds = FoldAssignment {
            fold_of: vec![0, 1],
            sample_sizes: vec![1, 1],
            event_sizes: vec![0, 0],
        };
        let grid = generate_lambda_path(x.view(), y.view(), 3).unwrap();
        assert!(matches!(
            cross_validate_path(
                x.view(),
                y.view(),
                &folds,
                grid.lambdas.view(),
                &PathConfig::default(),
                &mut NoopPathProgress,
            ),
            Err(ResampleError::FoldLengthMismatch { assigned: 2, observations: 20 })
        ));
    }
}
