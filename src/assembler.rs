use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::linalg::nugget_at;
use crate::params::CovarianceParams;
use crate::points::RescaledPoints;

/// `256 * ε_machine`, the tiny on-diagonal regulariser from §4.4. A power
/// of 2 times machine epsilon so that repeated rows plus nugget still
/// factor cleanly under doubling retries.
pub const TINY_NUGGET: f64 = 256.0 * f64::EPSILON;

/// Fills the `n × n` symmetric correlation matrix for a single point set,
/// with `Mᵢᵢ = 1 + delta_multiplier·TINY_NUGGET + nuggetᵢ/σ²` and
/// `Mᵢⱼ = kernel(Pᵢ,Pⱼ)` off-diagonal. `delta_multiplier` is `1.0` normally
/// and doubled by the Cholesky retry loop on non-positive-definite failure.
pub fn fill_corr_matrix(
    points: &RescaledPoints,
    nugget: &[f64],
    params: &CovarianceParams,
    delta_multiplier: f64,
) -> DMatrix<f64> {
    let n = points.n();
    let mut m = DMatrix::<f64>::zeros(n, n);
    let delta = TINY_NUGGET * delta_multiplier;

    for i in 0..n {
        for j in i..n {
            let value = if i == j {
                1.0 + delta + nugget_at(nugget, i) * params.inv_variance()
            } else {
                params.correlation(points.point(i), points.point(j))
            };
            m[(i, j)] = value;
            if i != j {
                m[(j, i)] = value;
            }
        }
    }

    m
}

/// Fills the `|A| × |B|` cross-correlation matrix between two point sets.
/// No diagonal regularisation — used for design/query cross terms, where
/// no entry is a self-covariance.
pub fn fill_cross_correlations(a: &RescaledPoints, b: &RescaledPoints, params: &CovarianceParams) -> DMatrix<f64> {
    let (na, nb) = (a.n(), b.n());
    let mut m = DMatrix::<f64>::zeros(na, nb);

    m.as_mut_slice()
        .par_chunks_exact_mut(na)
        .enumerate()
        .for_each(|(bj, col)| {
            let b_point = b.point(bj);
            for (ai, slot) in col.iter_mut().enumerate() {
                *slot = params.correlation(a.point(ai), b_point);
            }
        });

    m
}
