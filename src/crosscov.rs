use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::assembler::fill_cross_correlations;
use crate::linalg::{par_matmul, par_tr_matmul};
use crate::params::CovarianceParams;
use crate::submodel::{Submodel, SubmodelQueries};

/// The `N × N` submodel cross-covariance Gram matrix for a single query
/// point (§4.7's `K_M(q)`), plus — only when a caller needs the joint
/// prediction covariance across different query points — the off-diagonal
/// `q × q` Gram blocks per subgroup pair.
pub struct CrossCovariance {
    /// `tiles[q]` is the symmetric `N × N` matrix of `Cov(Mᵢ(q), Mⱼ(q))`.
    pub tiles: Vec<DMatrix<f64>>,
    /// Present only when joint covariance was requested: `pair_grams[(i,j)]`
    /// (upper triangle, `i <= j`) is the `q × q` matrix whose `(q,q')` entry
    /// is `Cov(Mᵢ(q), Mⱼ(q'))`, reused directly as the diagonal blocks of
    /// §4.8 step 6's joint-covariance assembly.
    pub pair_grams: Option<Vec<((usize, usize), DMatrix<f64>)>>,
}

/// Computes the pairwise cross-covariance tiles for every ordered pair of
/// subgroups (upper triangle only, by symmetry) and every query point.
///
/// Parallelises across the subgroup-pair set: each pair's contribution is
/// independent of every other pair's, so the whole pair list maps onto
/// rayon's work-stealing pool and results are assembled into the output
/// tensor afterwards, which keeps every write targeting a unique cell
/// without requiring unsafe concurrent aliasing into the shared tiles.
pub fn compute_cross_covariance<S: SubmodelQueries>(
    submodels: &[S],
    params: &CovarianceParams,
    q: usize,
    need_joint_cov: bool,
) -> CrossCovariance {
    let n_groups = submodels.len();
    let sigma2 = params.variance();

    let mut pairs = Vec::with_capacity(n_groups * (n_groups + 1) / 2);
    for i in 0..n_groups {
        for j in i..n_groups {
            pairs.push((i, j));
        }
    }

    // Per-pair: compute the full q x q Gram sigma2 * lambda_i^T * C(Gi,Gj) * lambda_j.
    // Its diagonal (q == q') reproduces §4.7's Cov(Mi(q), Mj(q)); the full
    // matrix additionally serves §4.8's joint covariance without a second pass.
    let grams: Vec<((usize, usize), DMatrix<f64>)> = pairs
        .into_par_iter()
        .map(|(i, j)| {
            let gram = if i == j && !need_joint_cov {
                // Only the diagonal (q == q') is ever read: the cheap
                // identity from §4.7 avoids the O(nᵢ²q) matmul entirely.
                DMatrix::from_diagonal(&submodels[i].variance().map(|v| sigma2 - v))
            } else if i == j {
                // Joint covariance additionally needs the q != q' entries,
                // which the diagonal-reuse identity does not give; fall
                // back to the general formula and then apply the exact
                // identity on the diagonal.
                let cross = fill_cross_correlations(submodels[i].points(), submodels[i].points(), params);
                let t = par_matmul(&cross, submodels[i].lambda()).unwrap();
                let mut gram = par_tr_matmul(submodels[i].lambda(), &t).unwrap() * sigma2;
                for qi in 0..q {
                    gram[(qi, qi)] = sigma2 - submodels[i].variance()[qi];
                }
                gram
            } else {
                let cross = fill_cross_correlations(submodels[i].points(), submodels[j].points(), params);
                let t = par_matmul(&cross, submodels[j].lambda()).unwrap();
                par_tr_matmul(submodels[i].lambda(), &t).unwrap() * sigma2
            };
            ((i, j), gram)
        })
        .collect();

    let mut tiles = vec![DMatrix::<f64>::zeros(n_groups, n_groups); q];
    for ((i, j), gram) in &grams {
        for qi in 0..q {
            let value = gram[(qi, qi)];
            tiles[qi][(*i, *j)] = value;
            tiles[qi][(*j, *i)] = value;
        }
    }

    CrossCovariance {
        tiles,
        pair_grams: if need_joint_cov { Some(grams) } else { None },
    }
}

/// Per-submodel self cross-covariance Gram, `Cᵢ(q,q') = σ²·factᵢ(q)ᵀfactᵢ(q')`
/// — `Cov(Mᵢ(q), Y*(q'))`, the cross term between submodel `i`'s prediction
/// at one query point and the true response at another. Needed only by the
/// posterior joint covariance (§4.8 step 6); `Cov_pred` above (submodel vs.
/// submodel) is a different quantity and cannot stand in for it.
pub fn compute_submodel_self_cross(submodels: &[Submodel], sigma2: f64) -> Vec<DMatrix<f64>> {
    submodels
        .par_iter()
        .map(|s| par_tr_matmul(&s.fact, &s.fact).expect("fact has one column per query by construction") * sigma2)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;
    use crate::partition::Subgroup;
    use crate::points::RescaledPoints;
    use crate::submodel::build_submodel;
    use crate::types::KrigingType;
    use nalgebra::{DMatrix as NaDMatrix, DVector};

    #[test]
    fn diagonal_tile_matches_variance_reuse_identity() {
        let params = CovarianceParams::new(1, Kernel::Exponential, &[1.0], 1.0).unwrap();
        let raw = NaDMatrix::from_row_slice(3, 1, &[0.0, 1.0, 2.0]);
        let points = RescaledPoints::from_raw(&raw, &params, None).unwrap();
        let y = DVector::from_vec(vec![0.1, 0.2, 0.3]);

        let queries_raw = NaDMatrix::from_row_slice(2, 1, &[0.5, 1.5]);
        let queries = RescaledPoints::from_raw(&queries_raw, &params, None).unwrap();

        let (submodel, _) = build_submodel(
            0,
            Subgroup { points, y },
            &queries,
            &params,
            &[],
            KrigingType::Simple,
        )
        .unwrap();

        let variance = submodel.variance.clone();
        let cc = compute_cross_covariance(&[submodel], &params, 2, false);
        for qi in 0..2 {
            let expected = params.variance() - variance[qi];
            assert!((cc.tiles[qi][(0, 0)] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn joint_cov_diagonal_matches_tile_diagonal() {
        let params = CovarianceParams::new(1, Kernel::Exponential, &[1.0], 1.0).unwrap();
        let raw = NaDMatrix::from_row_slice(3, 1, &[0.0, 1.0, 2.0]);
        let points = RescaledPoints::from_raw(&raw, &params, None).unwrap();
        let y = DVector::from_vec(vec![0.1, 0.2, 0.3]);

        let queries_raw = NaDMatrix::from_row_slice(2, 1, &[0.5, 1.5]);
        let queries = RescaledPoints::from_raw(&queries_raw, &params, None).unwrap();

        let (submodel, _) = build_submodel(
            0,
            Subgroup { points, y },
            &queries,
            &params,
            &[],
            KrigingType::Simple,
        )
        .unwrap();

        let cc = compute_cross_covariance(&[submodel], &params, 2, true);
        let grams = cc.pair_grams.as_ref().unwrap();
        let (_, gram) = &grams[0];
        for qi in 0..2 {
            assert!((gram[(qi, qi)] - cc.tiles[qi][(0, 0)]).abs() < 1e-12);
        }
    }
}
