use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::{DMatrix, DVector};
use nested_kriging::{CovarianceParams, Kernel, KrigingType, RescaledPoints};
use nested_kriging::submodel::build_submodel;
use nested_kriging::partition::Subgroup;

const N: usize = 500;
const Q: usize = 100;

fn setup() -> (Subgroup, RescaledPoints, CovarianceParams) {
    let params = CovarianceParams::new(1, Kernel::Exponential, &[1.0], 1.0).unwrap();

    let raw = DMatrix::<f64>::from_iterator(N, 1, (0..N).map(|i| i as f64));
    let points = RescaledPoints::from_raw(&raw, &params, None).unwrap();
    let y = DVector::<f64>::new_random(N);
    let subgroup = Subgroup { points, y };

    let raw_q = DMatrix::<f64>::new_random(Q, 1).map(|v| v * N as f64);
    let queries = RescaledPoints::from_raw(&raw_q, &params, None).unwrap();

    (subgroup, queries, params)
}

fn criterion_benchmark(c: &mut Criterion) {
    rayon::ThreadPoolBuilder::new()
        .num_threads(12)
        .build_global()
        .unwrap();

    c.bench_function(format!("submodel-build-{N}-{Q}").as_str(), |b| {
        b.iter_batched(
            setup,
            |(subgroup, queries, params)| {
                build_submodel(0, black_box(subgroup), black_box(&queries), black_box(&params), &[], KrigingType::Simple).unwrap();
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
