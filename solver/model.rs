use crate::lambda::{DEFAULT_PATH_LENGTH, generate_lambda_path};
use crate::linear::{LinearSettings, LinearSolver};
use crate::logistic::{LogisticSettings, LogisticSolver};
use crate::path::{Family, PathOptions, fit_path};
use crate::progress::PathProgressObserver;
use crate::types::{CoefficientPath, ConvergenceCriterion, FitError};
use crate::working::{linear_predictor, probabilities};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

// --- Public Data Structures ---
// These structs define the human-readable format of a fitted path when
// serialized to a TOML file.

/// Every knob of a path fit. Missing keys in a TOML file take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub family: Family,
    /// Number of lambdas generated from the data.
    pub path_length: usize,
    pub tolerance: f64,
    /// Sweep budget per lambda for linear fits.
    pub max_iterations: usize,
    /// Quadratic-refresh budget per lambda for logistic fits.
    pub max_outer_iterations: usize,
    /// Sweep budget per refresh for logistic fits.
    pub max_inner_iterations: usize,
    pub criterion: ConvergenceCriterion,
    /// Linear fits only; logistic fits always carry an intercept.
    pub fit_intercept: bool,
    pub warm_start: bool,
}

impl Default for PathConfig {
    fn default() -> Self {
        let linear = LinearSettings::default();
        let logistic = LogisticSettings::default();
        Self {
            family: Family::Linear,
            path_length: DEFAULT_PATH_LENGTH,
            tolerance: linear.tolerance,
            max_iterations: linear.max_iterations,
            max_outer_iterations: logistic.max_outer_iterations,
            max_inner_iterations: logistic.max_inner_iterations,
            criterion: ConvergenceCriterion::MaxAbsolute,
            fit_intercept: linear.fit_intercept,
            warm_start: PathOptions::default().warm_start,
        }
    }
}

/// The top-level artifact of a path fit.
/// This is the structure that gets saved to and loaded from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPath {
    pub config: PathConfig,
    /// Names of the feature columns in design-matrix order.
    pub feature_names: Vec<String>,
    pub lambda_max: f64,
    pub epsilon: f64,
    pub path: CoefficientPath,
}

/// Custom error type for fitting, saving, loading and prediction.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write path file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error("Prediction data has {found} feature columns, but the path was fitted on {expected}.")]
    MismatchedFeatureCount { found: usize, expected: usize },
    #[error("Lambda index {index} is out of range for a path of {len} lambdas.")]
    IndexOutOfRange { index: usize, len: usize },
}

impl PathConfig {
    /// Reads a configuration file. Keys that are absent keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, ModelError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn linear_settings(&self) -> LinearSettings {
        LinearSettings {
            tolerance: self.tolerance,
            max_iterations: self.max_iterations,
            fit_intercept: self.fit_intercept,
            criterion: self.criterion,
        }
    }

    pub fn logistic_settings(&self) -> LogisticSettings {
        LogisticSettings {
            tolerance: self.tolerance,
            max_outer_iterations: self.max_outer_iterations,
            max_inner_iterations: self.max_inner_iterations,
            criterion: self.criterion,
        }
    }

    pub fn options(&self) -> PathOptions {
        PathOptions {
            warm_start: self.warm_start,
        }
    }

    /// Fits the configured family over an explicit lambda sequence.
    pub fn fit_lambdas(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        lambdas: ArrayView1<f64>,
        observer: &mut dyn PathProgressObserver,
    ) -> Result<CoefficientPath, FitError> {
        match self.family {
            Family::Linear => {
                let solver = LinearSolver::new(self.linear_settings())?;
                fit_path(x, y, lambdas, &solver, &self.options(), observer)
            }
            Family::Logistic => {
                let solver = LogisticSolver::new(self.logistic_settings())?;
                fit_path(x, y, lambdas, &solver, &self.options(), observer)
            }
        }
    }

    /// Generates the lambda sequence from the data and fits the whole path.
    pub fn fit(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        feature_names: Vec<String>,
        observer: &mut dyn PathProgressObserver,
    ) -> Result<FittedPath, ModelError> {
        if feature_names.len() != x.ncols() {
            return Err(ModelError::MismatchedFeatureCount {
                found: feature_names.len(),
                expected: x.ncols(),
            });
        }
        let grid = generate_lambda_path(x, y, self.path_length)?;
        let path = self.fit_lambdas(x, y, grid.lambdas.view(), observer)?;
        Ok(FittedPath {
            config: self.clone(),
            feature_names,
            lambda_max: grid.lambda_max,
            epsilon: grid.epsilon,
            path,
        })
    }
}

impl FittedPath {
    /// Predicts with the coefficients at path position `index`.
    ///
    /// Linear paths return the linear predictor; logistic paths return
    /// probabilities, clamped exactly as during fitting.
    pub fn predict(&self, x: ArrayView2<f64>, index: usize) -> Result<Array1<f64>, ModelError> {
        if x.ncols() != self.feature_names.len() {
            return Err(ModelError::MismatchedFeatureCount {
                found: x.ncols(),
                expected: self.feature_names.len(),
            });
        }
        let coefficients =
            self.path
                .coefficients_at(index)
                .ok_or(ModelError::IndexOutOfRange {
                    index,
                    len: self.path.len(),
                })?;
        let eta = linear_predictor(x, coefficients.intercept, coefficients.slopes.view());
        Ok(match self.config.family {
            Family::Linear => eta,
            Family::Logistic => probabilities(eta.view()),
        })
    }

    /// Names of the features with a non-zero slope at path position `index`.
    pub fn active_features(&self, index: usize) -> Result<Vec<&str>, ModelError> {
        let coefficients =
            self.path
                .coefficients_at(index)
                .ok_or(ModelError::IndexOutOfRange {
                    index,
                    len: self.path.len(),
                })?;
        Ok(self
            .feature_names
            .iter()
            .zip(coefficients.slopes.iter())
            .filter(|&(_, &b)| b != 0.0)
            .map(|(name, _)| name.as_str())
            .collect())
    }

    /// Saves the fitted path to a file in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Loads a fitted path from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let fitted = toml::from_str(&toml_string)?;
        Ok(fitted)
    }
}
