// ========================================================================================
//
//                 Sparsepath warm versus cold start benchmark
//
// ========================================================================================
//
// This benchmark measures what warm starts buy along a full lambda path, for both
// families, on simulated designs of increasing width.
//
// ========================================================================================

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use sparsepath::progress::NoopPathProgress;
use sparsepath::{Family, PathConfig, generate_lambda_path};
use std::hint::black_box;

// --- Benchmark Tuning Parameters ---

/// The number of observations in every simulated design.
const NUM_OBSERVATIONS: usize = 500;
/// Design widths to test. This array defines the x-axis of the report.
const NUM_FEATURES: [usize; 3] = [10, 50, 200];
/// Lambdas per path.
const PATH_LENGTH: usize = 50;

/// Sparse ground truth: the first five features carry signal.
fn simulate(p: usize, family: Family, seed: u64) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((NUM_OBSERVATIONS, p), |_| rng.sample::<f64, _>(StandardNormal));
    let eta = Array1::from_shape_fn(NUM_OBSERVATIONS, |i| {
        (0..p.min(5)).map(|j| x[[i, j]] * (1.0 - 0.3 * j as f64)).sum::<f64>()
    });
    let y = match family {
        Family::Linear => eta.mapv(|e| e + 0.5 * rng.sample::<f64, _>(StandardNormal)),
        Family::Logistic => eta.mapv(|e| {
            let prob = 1.0 / (1.0 + (-e).exp());
            if rng.r#gen::<f64>() < prob { 1.0 } else { 0.0 }
        }),
    };
    (x, y)
}

fn bench_paths(c: &mut Criterion) {
    for family in [Family::Linear, Family::Logistic] {
        let mut group = c.benchmark_group(format!("{family:?} path"));
        group.sample_size(10);

        for &p in &NUM_FEATURES {
            let (x, y) = simulate(p, family, 42);
            let grid = match generate_lambda_path(x.view(), y.view(), PATH_LENGTH) {
                Ok(grid) => grid,
                Err(e) => panic!("benchmark data produced no lambda path: {e}"),
            };
            group.throughput(Throughput::Elements((NUM_OBSERVATIONS * p) as u64));

            for warm_start in [true, false] {
                let config = PathConfig {
                    family,
                    path_length: PATH_LENGTH,
                    warm_start,
                    ..PathConfig::default()
                };
                let label = if warm_start { "warm" } else { "cold" };
                group.bench_with_input(BenchmarkId::new(label, p), &p, |b, _| {
                    b.iter(|| {
                        let path = config.fit_lambdas(
                            black_box(x.view()),
                            black_box(y.view()),
                            grid.lambdas.view(),
                            &mut NoopPathProgress,
                        );
                        black_box(path)
                    })
                });
            }
        }
        group.finish();
    }
}

criterion_group!(benches, bench_paths);
criterion_main!(benches);
