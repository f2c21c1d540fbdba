//! Synthetic minority oversampling.

use super::ResampleError;
use crate::types::{FitError, check_binary, check_dimensions};
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip, concatenate};
use rand::Rng;
use rand::seq::SliceRandom;

pub const DEFAULT_NEIGHBORS: usize = 5;
pub const DEFAULT_SYNTHETIC_PER_SAMPLE: usize = 9;

#[derive(Debug, Clone)]
pub struct SmoteResult {
    /// Row `i` lists the `k` nearest other observations of observation `i`, nearest first.
    pub neighbors: Array2<usize>,
    /// Symmetric Euclidean distance matrix with a zero diagonal.
    pub distances: Array2<f64>,
    /// `m * n_synthetic` rows; rows `i * n_synthetic ..` derive from observation `i`.
    pub synthetic: Array2<f64>,
}

fn euclidean_distances(x: ArrayView2<f64>) -> Array2<f64> {
    let m = x.nrows();
    let mut distances = Array2::zeros((m, m));
    for i in 0..m {
        for j in (i + 1)..m {
            let d = Zip::from(x.row(i))
                .and(x.row(j))
                .fold(0.0, |acc, &a, &b| acc + (a - b) * (a - b))
                .sqrt();
            distances[[i, j]] = d;
            distances[[j, i]] = d;
        }
    }
    distances
}

/// Generates `n_synthetic` interpolated rows per minority observation.
///
/// Each synthetic row is `x_i + u * (x_j - x_i)` for a neighbour `j` drawn
/// from the `k` nearest and `u` uniform in `(0, 1]`. Neighbours are drawn
/// without replacement when `n_synthetic <= k`. Distance ties are broken by
/// row order.
pub fn smote_minority<R: Rng + ?Sized>(
    x: ArrayView2<f64>,
    k: usize,
    n_synthetic: usize,
    rng: &mut R,
) -> Result<SmoteResult, ResampleError> {
    let m = x.nrows();
    if k == 0 || k + 1 > m {
        return Err(ResampleError::TooFewNeighbors {
            k,
            available: m.saturating_sub(1),
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(FitError::InvalidArgument("feature matrix contains non-finite values".into()).into());
    }

    let distances = euclidean_distances(x);
    let mut neighbors = Array2::zeros((m, k));
    let mut synthetic = Array2::zeros((m * n_synthetic, x.ncols()));

    for i in 0..m {
        let row = distances.row(i);
        let nearest: Vec<usize> = (0..m)
            .filter(|&j| j != i)
            .sorted_by(|&a, &b| row[a].total_cmp(&row[b]).then(a.cmp(&b)))
            .take(k)
            .collect();
        for (slot, &j) in nearest.iter().enumerate() {
            neighbors[[i, slot]] = j;
        }

        let drawn: Vec<usize> = if n_synthetic <= k {
            nearest.choose_multiple(rng, n_synthetic).copied().collect()
        } else {
            (0..n_synthetic)
                .map(|_| nearest[rng.gen_range(0..k)])
                .collect()
        };

        let origin = x.row(i);
        for (offset, &j) in drawn.iter().enumerate() {
            let u = 1.0 - rng.r#gen::<f64>();
            let mut target = synthetic.row_mut(i * n_synthetic + offset);
            Zip::from(&mut target)
                .and(origin)
                .and(x.row(j))
                .for_each(|s, &a, &b| *s = a + u * (b - a));
        }
    }

    log::debug!(
        "Generated {} synthetic rows from {} minority observations (k={k})",
        synthetic.nrows(),
        m
    );
    Ok(SmoteResult {
        neighbors,
        distances,
        synthetic,
    })
}

/// Appends SMOTE rows for the `y == 1` class to `(x, y)`.
pub fn oversample_minority<R: Rng + ?Sized>(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    k: usize,
    n_synthetic: usize,
    rng: &mut R,
) -> Result<(Array2<f64>, Array1<f64>), ResampleError> {
    check_dimensions(x, y)?;
    check_binary(y)?;
    let minority: Vec<usize> = y
        .iter()
        .positions(|&v| v == 1.0)
        .collect();
    let result = smote_minority(x.select(Axis(0), &minority).view(), k, n_synthetic, rng)?;

    let added = result.synthetic.nrows();
    let x_out = concatenate(Axis(0), &[x.view(), result.synthetic.view()])
        .map_err(|e| FitError::InvalidArgument(e.to_string()))?;
    let y_out = y
        .iter()
        .copied()
        .chain(std::iter::repeat_n(1.0, added))
        .collect::<Array1<f64>>();
    log::info!(
        "Oversampled {} minority rows into {} synthetic rows",
        minority.len(),
        added
    );
    Ok((x_out, y_out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn neighbours_exclude_self_and_are_sorted() {
        let x = array![[0.0, 0.0], [1.0, 0.0], [3.0, 0.0], [7.0, 0.0]];
        let mut rng = StdRng::seed_from_u64(42);
        let result = smote_minority(x.view(), 2, 1, &mut rng).unwrap();

        assert_eq!(result.neighbors.row(0).to_vec(), vec![1, 2]);
        assert_eq!(result.neighbors.row(2).to_vec(), vec![1, 0]);
        assert_eq!(result.neighbors.row(3).to_vec(), vec![2, 1]);
        assert_abs_diff_eq!(result.distances[[0, 3]], 7.0, epsilon = 1e-15);
        assert_eq!(result.distances[[2, 2]], 0.0);
        assert_eq!(result.distances, result.distances.t());
    }

    #[test]
    fn synthetic_rows_lie_on_segments_to_neighbours() {
        let x = array![[0.0, 0.0], [2.0, 2.0], [10.0, -4.0], [11.0, -4.0], [5.0, 5.0]];
        let mut rng = StdRng::seed_from_u64(7);
        let (k, n) = (2, 3);
        let result = smote_minority(x.view(), k, n, &mut rng).unwrap();
        assert_eq!(result.synthetic.dim(), (x.nrows() * n, 2));

        for i in 0..x.nrows() {
            for offset in 0..n {
                let s = result.synthetic.row(i * n + offset);
                // Some neighbour j and u in (0, 1] reproduce the row.
                let explained = result.neighbors.row(i).iter().any(|&j| {
                    let direction = &x.row(j) - &x.row(i);
                    let step = &s - &x.row(i);
                    let scale = direction.dot(&direction);
                    let u = step.dot(&direction) / scale;
                    let rebuilt = &x.row(i) + &(direction * u);
                    u > 0.0 && u <= 1.0 + 1e-12 && (&rebuilt - &s).iter().all(|d| d.abs() < 1e-9)
                });
                assert!(explained, "row {} of observation {i} is not an interpolation", offset);
            }
        }
    }

    #[test]
    fn same_seed_same_synthetic_rows() {
        let x = array![[0.0], [1.0], [2.5], [4.0]];
        let a = smote_minority(x.view(), 3, 5, &mut StdRng::seed_from_u64(3)).unwrap();
        let b = smote_minority(x.view(), 3, 5, &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a.synthetic, b.synthetic);
    }

    #[test]
    fn too_many_neighbours_is_an_error() {
        let x = array![[0.0], [1.0], [2.0]];
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            smote_minority(x.view(), 3, 1, &mut rng).unwrap_err(),
            ResampleError::TooFewNeighbors { k: 3, available: 2 }
        );
        assert!(smote_minority(x.view(), 0, 1, &mut rng).is_err());
    }

    #[test]
    fn oversampling_appends_positive_rows() {
        let x = array![[0.0], [0.1], [5.0], [5.2], [4.9], [0.3]];
        let y = array![0.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        let mut rng = StdRng::seed_from_u64(11);
        let (x_out, y_out) = oversample_minority(x.view(), y.view(), 2, 4, &mut rng).unwrap();

        assert_eq!(x_out.nrows(), 6 + 3 * 4);
        assert_eq!(y_out.len(), x_out.nrows());
        assert_eq!(x_out.slice(ndarray::s![..6, ..]), x);
        assert!(y_out.iter().skip(6).all(|&v| v == 1.0));
        assert!(x_out.column(0).iter().skip(6).all(|&v| (4.9..=5.2).contains(&v)));
    }
}
