/// Change-point search cost
///
/// The permutation test dominates: every accepted split reshuffles its segment
/// `permutations` times. These benchmarks track how that scales with history
/// length and how it compares with the fixed-threshold method.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use orion::change_point::{find_change_points, ChangePointConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Noisy series with a level shift two thirds of the way through
fn step_series(len: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..len)
        .map(|i| {
            let level = if i < len * 2 / 3 { 100.0 } else { 120.0 };
            level + rng.gen_range(-2.0..2.0)
        })
        .collect()
}

fn bench_permutation(c: &mut Criterion) {
    let mut group = c.benchmark_group("permutation");
    let config = ChangePointConfig::default();

    for len in [30usize, 100, 300] {
        let series = step_series(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &series, |b, series| {
            b.iter(|| black_box(find_change_points(series.clone(), &config)));
        });
    }

    group.finish();
}

fn bench_threshold(c: &mut Criterion) {
    let mut group = c.benchmark_group("threshold");
    let config = ChangePointConfig::threshold();

    for len in [30usize, 100, 300, 1000] {
        let series = step_series(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &series, |b, series| {
            b.iter(|| black_box(find_change_points(series.clone(), &config)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_permutation, bench_threshold);
criterion_main!(benches);
