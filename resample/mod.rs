//! Resampling utilities for imbalanced binary outcomes: synthetic minority
//! oversampling, stratified fold assignment and fold-wise path fitting.

pub mod cv;
pub mod folds;
pub mod smote;

use crate::types::FitError;
use thiserror::Error;

pub use cv::{CrossValidatedPath, FoldFit, cross_validate_path};
pub use folds::{DEFAULT_FOLDS, FoldAssignment, stratified_folds};
pub use smote::{DEFAULT_NEIGHBORS, DEFAULT_SYNTHETIC_PER_SAMPLE, SmoteResult, oversample_minority, smote_minority};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResampleError {
    #[error(
        "k = {k} nearest neighbours requested, but only {available} other minority observations exist. Please select a smaller k."
    )]
    TooFewNeighbors { k: usize, available: usize },
    #[error("{0} folds requested; at least 2 are required.")]
    TooFewFolds(usize),
    #[error("{folds} folds requested for only {observations} observations.")]
    TooManyFolds { folds: usize, observations: usize },
    #[error("Fold {0} leaves an empty training or held-out split.")]
    EmptySplit(usize),
    #[error("The fold assignment covers {assigned} observations, but the data has {observations}.")]
    FoldLengthMismatch { assigned: usize, observations: usize },
    #[error(transparent)]
    Fit(#[from] FitError),
}
