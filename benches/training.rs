use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use housing_mlp::export::ONNXExporter;
use housing_mlp::inference::{ONNXSession, Session};
use housing_mlp::training::{MLPConfig, MLPRegressor};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

fn create_regression_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>() * 2.0 - 1.0);

    // Target as weighted sum of features + noise
    let y = x
        .rows()
        .into_iter()
        .map(|row| {
            row.iter().enumerate().map(|(j, v)| v * (j + 1) as f64).sum::<f64>() + rng.gen::<f64>() * 0.1
        })
        .collect();

    (x, y)
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10); // Fewer samples for training benchmarks

    for n_rows in [500, 2000, 5000].iter() {
        let data = create_regression_data(*n_rows, 10);

        group.bench_with_input(BenchmarkId::new("fit", n_rows), &data, |b, (x, y)| {
            b.iter(|| {
                let config = MLPConfig::default()
                    .with_hidden_layers(vec![64, 32])
                    .with_max_epochs(10)
                    .with_patience(None);
                let mut mlp = MLPRegressor::new(config);
                mlp.fit(black_box(x), black_box(y)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("prediction");

    // Train model once
    let (x, y) = create_regression_data(2000, 10);
    let mut mlp = MLPRegressor::new(MLPConfig::default().with_hidden_layers(vec![64, 32]).with_max_epochs(5));
    mlp.fit(&x, &y).unwrap();
    let bytes = ONNXExporter::new().export_bytes(&mlp).unwrap();
    let session = ONNXSession::from_bytes(&bytes).unwrap();

    for n_rows in [1, 100, 10000].iter() {
        let (test_x, _) = create_regression_data(*n_rows, 10);
        let test_x32 = test_x.mapv(|v| v as f32);

        group.bench_with_input(BenchmarkId::new("mlp", n_rows), &test_x, |b, x| {
            b.iter(|| mlp.predict(black_box(x)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("onnx_session", n_rows), &test_x32, |b, x| {
            b.iter(|| session.run(black_box(x)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_training, bench_prediction);
criterion_main!(benches);
