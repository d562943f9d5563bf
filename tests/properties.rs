use nalgebra::{DMatrix, DVector};
use nested_kriging::{nested_kriging, CovarianceParams, Kernel, NestedKrigingRequest, RescaledPoints};
use proptest::prelude::*;

fn request_with(x: Vec<f64>, y: Vec<f64>, xp: Vec<f64>, clusters: Vec<i64>) -> NestedKrigingRequest<'static> {
    let n = x.len();
    let q = xp.len();
    NestedKrigingRequest {
        d: 1,
        x: DMatrix::from_row_slice(n, 1, &x),
        y: DVector::from_vec(y),
        clusters,
        xp: DMatrix::from_row_slice(q, 1, &xp),
        kernel_tag: "exp",
        param: vec![1.0],
        sd2: 1.0,
        nugget: vec![],
        kriging_type_tag: "simple",
        output_level: 0,
        num_threads_zones: 1,
        num_threads_pairs: 2,
        num_threads_blas: 1,
        global_options: vec![],
        verbose_level: 0,
        alternatives: vec![],
    }
}

proptest! {
    /// Invariant: predicting at a training point interpolates its observed
    /// response to numerical precision, for any distinct point set and any
    /// partition.
    #[test]
    fn interpolates_at_training_points(
        offsets in prop::collection::vec(1.0..5.0_f64, 3..8),
        responses in prop::collection::vec(-10.0..10.0_f64, 3..8),
    ) {
        let n = offsets.len().min(responses.len());
        let mut x = Vec::with_capacity(n);
        let mut acc = 0.0;
        for o in offsets.iter().take(n) {
            acc += o;
            x.push(acc);
        }
        let y: Vec<f64> = responses.into_iter().take(n).collect();
        let clusters: Vec<i64> = (0..n as i64).map(|i| i % 2).collect();

        let request = request_with(x.clone(), y.clone(), x.clone(), clusters);
        let output = nested_kriging(request).unwrap();

        for i in 0..n {
            prop_assert!((output.mean[i] - y[i]).abs() < 1e-5);
            prop_assert!(output.sd2[i] <= 1e-5);
        }
    }

    /// Invariant: relabelling the partition by an arbitrary bijection does
    /// not change the aggregated prediction.
    #[test]
    fn relabelling_partition_leaves_prediction_unchanged(
        offsets in prop::collection::vec(1.0..5.0_f64, 4..8),
        responses in prop::collection::vec(-10.0..10.0_f64, 4..8),
    ) {
        let n = offsets.len().min(responses.len());
        let mut x = Vec::with_capacity(n);
        let mut acc = 0.0;
        for o in offsets.iter().take(n) {
            acc += o;
            x.push(acc);
        }
        let y: Vec<f64> = responses.into_iter().take(n).collect();
        let xp = vec![x[0] + 0.5];

        let clusters_a: Vec<i64> = (0..n as i64).map(|i| i % 3).collect();
        let clusters_b: Vec<i64> = clusters_a.iter().map(|&c| 1000 - c * 17).collect();

        let out_a = nested_kriging(request_with(x.clone(), y.clone(), xp.clone(), clusters_a)).unwrap();
        let out_b = nested_kriging(request_with(x, y, xp, clusters_b)).unwrap();

        prop_assert!((out_a.mean[0] - out_b.mean[0]).abs() < 1e-8);
        prop_assert!((out_a.sd2[0] - out_b.sd2[0]).abs() < 1e-8);
    }

    /// Invariant: every kernel's correlation matrix over a random point set
    /// is positive semi-definite (every Cholesky attempt under the tiny
    /// nugget succeeds, i.e. no subgroup ever exhausts its retries).
    #[test]
    fn kernel_correlation_matrix_is_positive_semidefinite(
        points in prop::collection::vec(-20.0..20.0_f64, 2..30),
    ) {
        for kernel in [Kernel::Exponential, Kernel::Gaussian, Kernel::Matern3_2, Kernel::Matern5_2, Kernel::WhiteNoise] {
            let params = CovarianceParams::new(1, kernel, &[1.3], 1.0).unwrap();
            let raw = DMatrix::from_row_slice(points.len(), 1, &points);
            let rescaled = RescaledPoints::from_raw(&raw, &params, None).unwrap();

            let m = nested_kriging::assembler::fill_corr_matrix(&rescaled, &[], &params, 1.0);
            prop_assert!(m.clone().cholesky().is_some(), "{:?} matrix failed to factor", kernel);
        }
    }

    /// Invariant: adding a larger nugget never decreases posterior variance
    /// at a query point coincident with a training point's neighbourhood.
    #[test]
    fn larger_nugget_does_not_decrease_variance(
        nugget_small in 0.0..1.0_f64,
        nugget_extra in 0.0..1.0_f64,
    ) {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![0.0, 1.0, 0.0, 1.0];
        let xp = vec![1.5];
        let clusters = vec![0, 0, 0, 0];

        let mut small = request_with(x.clone(), y.clone(), xp.clone(), clusters.clone());
        small.nugget = vec![nugget_small];
        let mut large = request_with(x, y, xp, clusters);
        large.nugget = vec![nugget_small + nugget_extra];

        let out_small = nested_kriging(small).unwrap();
        let out_large = nested_kriging(large).unwrap();

        prop_assert!(out_large.sd2[0] >= out_small.sd2[0] - 1e-9);
    }

    /// Invariant: multiplying every lengthscale and every raw coordinate by
    /// the same factor `k` leaves predictions unchanged (the kernels are
    /// isotropic-product and scale-covariant by construction).
    #[test]
    fn scaling_identity_leaves_predictions_unchanged(
        offsets in prop::collection::vec(1.0..5.0_f64, 4..8),
        responses in prop::collection::vec(-10.0..10.0_f64, 4..8),
        k in 0.2..5.0_f64,
    ) {
        let n = offsets.len().min(responses.len());
        let mut x = Vec::with_capacity(n);
        let mut acc = 0.0;
        for o in offsets.iter().take(n) {
            acc += o;
            x.push(acc);
        }
        let y: Vec<f64> = responses.into_iter().take(n).collect();
        let xp = vec![x[0] + 0.5];
        let clusters: Vec<i64> = (0..n as i64).map(|i| i % 2).collect();

        let mut base = request_with(x.clone(), y.clone(), xp.clone(), clusters.clone());
        base.param = vec![1.3];
        let base_out = nested_kriging(base).unwrap();

        let scaled_x: Vec<f64> = x.iter().map(|v| v * k).collect();
        let scaled_xp: Vec<f64> = xp.iter().map(|v| v * k).collect();
        let mut scaled = request_with(scaled_x, y, scaled_xp, clusters);
        scaled.param = vec![1.3 * k];
        let scaled_out = nested_kriging(scaled).unwrap();

        prop_assert!((base_out.mean[0] - scaled_out.mean[0]).abs() < 1e-8);
        prop_assert!((base_out.sd2[0] - scaled_out.sd2[0]).abs() < 1e-8);
    }

    /// Kernel-scaling-factor self-test (§8): a reference correlation built
    /// directly from the spec's per-kernel formula table on raw coordinates
    /// and lengthscales agrees with the production path, which precomputes
    /// `CovarianceParams::scaling_factors()` and rescales through
    /// `RescaledPoints` before ever calling `Kernel::correlation`.
    #[test]
    fn kernel_scaling_factor_self_test(
        a in prop::collection::vec(-10.0..10.0_f64, 1..4),
        b in prop::collection::vec(-10.0..10.0_f64, 1..4),
        lengthscale in 0.3..4.0_f64,
    ) {
        let d = a.len().min(b.len());
        let a: Vec<f64> = a.into_iter().take(d).collect();
        let b: Vec<f64> = b.into_iter().take(d).collect();

        for (kernel, c) in [
            (Kernel::Exponential, 1.0),
            (Kernel::Gaussian, std::f64::consts::SQRT_2 / 2.0),
            (Kernel::Matern3_2, 3.0_f64.sqrt()),
            (Kernel::Matern5_2, 5.0_f64.sqrt()),
        ] {
            let reference = reference_correlation(kernel, c, &a, &b, lengthscale);

            let params = CovarianceParams::new(d, kernel, &vec![lengthscale; d], 1.0).unwrap();
            let raw_a = DMatrix::from_row_slice(1, d, &a);
            let raw_b = DMatrix::from_row_slice(1, d, &b);
            let pa = RescaledPoints::from_raw(&raw_a, &params, None).unwrap();
            let pb = RescaledPoints::from_raw(&raw_b, &params, None).unwrap();
            let optimised = params.correlation(pa.point(0), pb.point(0));

            prop_assert!((reference - optimised).abs() < 1e-12, "{:?}: {} vs {}", kernel, reference, optimised);
        }
    }
}

/// Evaluates a kernel's spec-table formula directly on raw, non-rescaled
/// coordinates: `sₖ = c·|aₖ-bₖ|/lengthscale`, independent of
/// [`CovarianceParams`]'s own precomputed scaling factors.
fn reference_correlation(kernel: Kernel, c: f64, a: &[f64], b: &[f64], lengthscale: f64) -> f64 {
    match kernel {
        Kernel::Exponential => {
            let sum: f64 = a.iter().zip(b).map(|(ai, bi)| c * (ai - bi).abs() / lengthscale).sum();
            (-sum).exp()
        }
        Kernel::Gaussian => {
            let sum_sq: f64 = a
                .iter()
                .zip(b)
                .map(|(ai, bi)| {
                    let s = c * (ai - bi).abs() / lengthscale;
                    s * s
                })
                .sum();
            (-sum_sq).exp()
        }
        Kernel::Matern3_2 => {
            let (mut sum, mut prod) = (0.0, 1.0);
            for (ai, bi) in a.iter().zip(b) {
                let s = c * (ai - bi).abs() / lengthscale;
                sum += s;
                prod *= 1.0 + s;
            }
            prod * (-sum).exp()
        }
        Kernel::Matern5_2 => {
            let (mut sum, mut prod) = (0.0, 1.0);
            for (ai, bi) in a.iter().zip(b) {
                let s = c * (ai - bi).abs() / lengthscale;
                sum += s;
                prod *= 1.0 + s + s * s / 3.0;
            }
            prod * (-sum).exp()
        }
        _ => unreachable!("self-test only exercises kernels with a fixed scaling constant"),
    }
}

/// Round-trip property: the `K_M`/`k_M` tensors reported under
/// `OutputLevel::FULL_TENSORS` are exactly what an external aggregator call
/// would need to reproduce the fused mean and variance on its own, without
/// access to the original submodels.
#[test]
fn tensors_round_trip_into_the_same_aggregated_prediction() {
    let request = request_with(
        vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
        vec![0.1, 0.4, -0.2, 0.3, 0.9, -0.5],
        vec![1.5, 3.5],
        vec![0, 0, 0, 1, 1, 1],
    );
    use nested_kriging::OutputLevel;
    let tensor_request = NestedKrigingRequest {
        output_level: OutputLevel::FULL_TENSORS | OutputLevel::PER_SUBMODEL,
        ..request
    };
    let output = nested_kriging(tensor_request).unwrap();

    let cov_m = output.cov_m.unwrap();
    let mean_m = output.mean_m.unwrap();

    for (qi, _tile) in cov_m.iter().enumerate() {
        let weights = output.weights.as_ref().unwrap()[qi].clone();
        let recomputed_mean: f64 = (0..mean_m.nrows()).map(|i| weights[i] * mean_m[(i, qi)]).sum();
        assert!((recomputed_mean - output.mean[qi]).abs() < 1e-8);
    }
}
