use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use iterkmeans_rs::{
    run_kmeanspp_seeding, run_random_seeding, AggregationOracle, DistanceMetric, KMeans,
    KMeansArgs, KMeansConfig, NdarrayOracle, ReductionStrategy, RunConfig,
};
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use std::time::Duration;

fn benchmark_fit_varying_samples(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit_samples");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    let n_features = 64;
    let k = 20;
    let sample_sizes = [1_000, 5_000, 10_000];

    for n_samples in sample_sizes.iter() {
        group.throughput(Throughput::Elements(*n_samples as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(n_samples),
            n_samples,
            |b, &n_samples| {
                let data = Array2::random((n_samples, n_features), Uniform::new(-1.0f32, 1.0));
                let config = KMeansConfig::new(k).with_max_iters(5).with_seed(42);

                b.iter(|| {
                    let mut kmeans = KMeans::with_config(config.clone());
                    kmeans.fit(black_box(&data.view())).unwrap();
                    kmeans
                });
            },
        );
    }
    group.finish();
}

fn benchmark_seeding(c: &mut Criterion) {
    let mut group = c.benchmark_group("seeding");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    let data = Array2::random((10_000, 32), Uniform::new(-1.0f32, 1.0));
    let config = RunConfig::default().with_seed(42);
    let oracle = NdarrayOracle::new(&config);

    for k in [10, 50].iter() {
        let args = KMeansArgs::new(*k);
        group.bench_with_input(BenchmarkId::new("random", k), &args, |b, args| {
            b.iter(|| run_random_seeding(args, black_box(&data), &oracle, &config).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("plusplus", k), &args, |b, args| {
            b.iter(|| run_kmeanspp_seeding(args, black_box(&data), &oracle, &config).unwrap())
        });
    }
    group.finish();
}

fn benchmark_assign_and_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("assign_and_reduce");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    let n_samples = 20_000;
    let data = Array2::random((n_samples, 64), Uniform::new(-1.0f32, 1.0));
    let centroids = Array2::random((50, 64), Uniform::new(-1.0f32, 1.0));

    for strategy in [ReductionStrategy::Serial, ReductionStrategy::Parallel] {
        let oracle = NdarrayOracle::new(&RunConfig::default().with_reduction(strategy));
        group.throughput(Throughput::Elements(n_samples as u64));
        group.bench_function(format!("{:?}", strategy), |b| {
            b.iter(|| {
                oracle
                    .assign_and_reduce(
                        black_box(&data),
                        &centroids.view(),
                        None,
                        DistanceMetric::SquaredL2,
                    )
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn benchmark_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    let train_data = Array2::random((5_000, 128), Uniform::new(-1.0f32, 1.0));
    let mut kmeans = KMeans::with_config(KMeansConfig::new(50).with_max_iters(10).with_seed(42));
    kmeans.fit(&train_data.view()).unwrap();

    for n_predict in [1_000, 5_000].iter() {
        group.throughput(Throughput::Elements(*n_predict as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(n_predict),
            n_predict,
            |b, &n_predict| {
                let test_data = Array2::random((n_predict, 128), Uniform::new(-1.0f32, 1.0));

                b.iter(|| kmeans.predict(black_box(&test_data.view())).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_fit_varying_samples,
    benchmark_seeding,
    benchmark_assign_and_reduce,
    benchmark_predict,
);

criterion_main!(benches);
