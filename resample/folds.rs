use super::ResampleError;
use crate::types::check_binary;
use ndarray::ArrayView1;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FOLDS: usize = 10;

/// Fold membership that keeps the event rate of every fold close to the overall rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldAssignment {
    /// 0-based fold label per observation.
    pub fold_of: Vec<usize>,
    /// Observations per fold, indexed by fold label.
    pub sample_sizes: Vec<usize>,
    /// Positive outcomes per fold, indexed by fold label.
    pub event_sizes: Vec<usize>,
}

impl FoldAssignment {
    pub fn num_folds(&self) -> usize {
        self.sample_sizes.len()
    }

    /// Indices of the held-out observations of `fold`, ascending.
    pub fn test_indices(&self, fold: usize) -> Vec<usize> {
        self.fold_of
            .iter()
            .enumerate()
            .filter(|&(_, &f)| f == fold)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of every observation outside `fold`, ascending.
    pub fn train_indices(&self, fold: usize) -> Vec<usize> {
        self.fold_of
            .iter()
            .enumerate()
            .filter(|&(_, &f)| f != fold)
            .map(|(i, _)| i)
            .collect()
    }
}

/// `total` split into `k` parts of `total / k`, the first `total % k` parts one larger.
fn balanced_sizes(total: usize, k: usize) -> Vec<usize> {
    let (base, remainder) = (total / k, total % k);
    (0..k).map(|i| base + usize::from(i < remainder)).collect()
}

pub fn stratified_folds<R: Rng + ?Sized>(
    y: ArrayView1<f64>,
    k: usize,
    rng: &mut R,
) -> Result<FoldAssignment, ResampleError> {
    let n = y.len();
    if k < 2 {
        return Err(ResampleError::TooFewFolds(k));
    }
    if k > n {
        return Err(ResampleError::TooManyFolds {
            folds: k,
            observations: n,
        });
    }
    check_binary(y)?;

    let (mut positives, mut negatives): (Vec<usize>, Vec<usize>) =
        (0..n).partition(|&i| y[i] == 1.0);
    positives.shuffle(rng);
    negatives.shuffle(rng);

    let mut labels: Vec<usize> = (0..k).collect();
    labels.shuffle(rng);

    let totals = balanced_sizes(n, k);
    let events = balanced_sizes(positives.len(), k);
    // Floors and remainders are front-loaded in both splits, so events never exceed totals.
    let mut fold_of = vec![0; n];
    let mut sample_sizes = vec![0; k];
    let mut event_sizes = vec![0; k];
    let (mut pos_cursor, mut neg_cursor) = (0, 0);
    for (slot, &label) in labels.iter().enumerate() {
        let n_events = events[slot];
        let n_non_events = totals[slot] - n_events;
        for &i in &positives[pos_cursor..pos_cursor + n_events] {
            fold_of[i] = label;
        }
        for &i in &negatives[neg_cursor..neg_cursor + n_non_events] {
            fold_of[i] = label;
        }
        pos_cursor += n_events;
        neg_cursor += n_non_events;
        sample_sizes[label] = totals[slot];
        event_sizes[label] = n_events;
    }

    log::debug!("Assigned {n} observations to {k} folds; events per fold {event_sizes:?}");
    Ok(FoldAssignment {
        fold_of,
        sample_sizes,
        event_sizes,
    })
}
