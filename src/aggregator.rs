use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::crosscov::CrossCovariance;
use crate::error::{NestedKrigingError, Warning};
use crate::linalg::{cholesky_with_retry, MAX_NUGGET_RETRIES};
use crate::params::CovarianceParams;
use crate::points::RescaledPoints;
use crate::submodel::SubmodelQueries;

/// `256 * ε_machine`, reused as the aggregation system's tiny on-diagonal
/// regulariser (§4.8's tie-break nugget), mirroring the assembler's.
const TINY_NUGGET: f64 = 256.0 * f64::EPSILON;

/// Per-query result of the second-level fusion (§4.8).
pub struct AggregatedQuery {
    pub mean: f64,
    pub sd2: f64,
    pub weights: DVector<f64>,
}

/// Solves, for every query point, the `N × N` system that fuses submodel
/// means and variances into the nested predictor.
///
/// Parallelises across query points; the driver runs this inside the §5 `Z`
/// zone pool, over one zone's disjoint query range at a time.
pub fn aggregate<S: SubmodelQueries>(
    submodels: &[S],
    cross_covariance: &CrossCovariance,
    sigma2: f64,
) -> Result<(Vec<AggregatedQuery>, Vec<Warning>), NestedKrigingError> {
    let n_groups = submodels.len();
    let q = cross_covariance.tiles.len();

    let results: Vec<Result<(AggregatedQuery, Vec<Warning>), NestedKrigingError>> = (0..q)
        .into_par_iter()
        .map(|qi| aggregate_one(submodels, cross_covariance, sigma2, qi, n_groups))
        .collect();

    let mut out = Vec::with_capacity(q);
    let mut warnings = Vec::new();
    for r in results {
        let (aq, w) = r?;
        out.push(aq);
        warnings.extend(w);
    }
    Ok((out, warnings))
}

fn aggregate_one<S: SubmodelQueries>(
    submodels: &[S],
    cross_covariance: &CrossCovariance,
    sigma2: f64,
    qi: usize,
    n_groups: usize,
) -> Result<(AggregatedQuery, Vec<Warning>), NestedKrigingError> {
    // Cov(Mᵢ(q), Y*(q)) equals Var(Mᵢ(q)) by the usual best-linear-predictor
    // projection identity, which is exactly the diagonal entry K_M(q)ᵢᵢ
    // already computed by the cross-covariance engine (§4.7's diagonal
    // reuse). Reusing it here — rather than the posterior variance vᵢ(q)
    // itself — is what makes the N=1 case collapse exactly to the single
    // submodel's own prediction; see DESIGN.md.
    let k_m: DVector<f64> = cross_covariance.tiles[qi].diagonal();

    let (cholesky, _attempts) = cholesky_with_retry(|multiplier| {
        let mut m = cross_covariance.tiles[qi].clone();
        for d in 0..n_groups {
            m[(d, d)] += TINY_NUGGET * multiplier;
        }
        m
    })
    .ok_or(NestedKrigingError::SingularAggregation {
        query: qi,
        attempts: MAX_NUGGET_RETRIES,
    })?;

    let weights = cholesky.solve(&k_m);

    let mean: f64 = (0..n_groups).map(|i| weights[i] * submodels[i].mean()[qi]).sum();

    let mut warnings = Vec::new();
    let raw_sd2 = sigma2 - weights.dot(&k_m);
    let sd2 = if raw_sd2 < 0.0 {
        warnings.push(Warning::VarianceUnderflow { query: qi, value: raw_sd2 });
        0.0
    } else {
        raw_sd2
    };

    Ok((AggregatedQuery { mean, sd2, weights }, warnings))
}

/// Assembles both joint-covariance outputs of §6/§4.8 step 6:
///
/// - `cov_prior(q,q') = w(q)ᵀ·Cov_pred(q,q')·w(q')`, the prior covariance of
///   the weighted-sum submodel estimator itself (`Var(Σᵢwᵢ(q)Mᵢ(q))`); its
///   diagonal is `wᵀk_M`, not a predictive variance.
/// - `cov(q,q')`, the posterior predictive covariance of the nested
///   predictor's prediction error `Y*(q) - Ŷ(q)`, whose diagonal reconciles
///   with [`aggregate`]'s `sd2 = σ² − wᵀk_M`:
///
///   `cov(q,q') = σ²·ρ(q,q') − w(q)ᵀc(q,q') − w(q')ᵀc(q',q) + cov_prior(q,q')`
///
///   where `ρ(q,q')` is the query points' prior correlation under the shared
///   kernel and `c(q,q')ᵢ = Cov(Mᵢ(q), Y*(q')) = σ²·factᵢ(q)ᵀfactᵢ(q')` is
///   the per-submodel self cross term from
///   [`crate::crosscov::compute_submodel_self_cross`]. At `q = q'` this
///   collapses to `σ² − 2wᵀk_M + wᵀk_M = σ² − wᵀk_M`, matching `sd2`; see
///   DESIGN.md for the full derivation.
///
/// Requires [`CrossCovariance::pair_grams`] to have been computed with
/// `need_joint_cov = true`.
pub fn joint_covariance(
    cross_covariance: &CrossCovariance,
    self_cross: &[DMatrix<f64>],
    query_points: &RescaledPoints,
    params: &CovarianceParams,
    weights: &[DVector<f64>],
) -> (DMatrix<f64>, DMatrix<f64>) {
    let grams = cross_covariance
        .pair_grams
        .as_ref()
        .expect("joint_covariance requires CrossCovariance::pair_grams");
    let q = weights.len();
    let sigma2 = params.variance();
    let mut cov_prior = DMatrix::<f64>::zeros(q, q);
    let mut cov = DMatrix::<f64>::zeros(q, q);

    for qa in 0..q {
        for qb in qa..q {
            let mut prior_value = 0.0;
            for ((i, j), gram) in grams {
                let contribution = weights[qa][*i] * gram[(qa, qb)] * weights[qb][*j];
                prior_value += contribution;
                if i != j {
                    // the pair list only stores the upper triangle (i<=j);
                    // the symmetric (j,i) contribution uses gram(qb,qa)
                    // since Cov(Mj(qb), Mi(qa)) = Cov(Mi(qa), Mj(qb))ᵀ pairwise.
                    prior_value += weights[qa][*j] * gram[(qb, qa)] * weights[qb][*i];
                }
            }
            cov_prior[(qa, qb)] = prior_value;
            cov_prior[(qb, qa)] = prior_value;

            let rho = params.correlation(query_points.point(qa), query_points.point(qb));
            let cross_qa: f64 = (0..self_cross.len()).map(|i| weights[qa][i] * self_cross[i][(qa, qb)]).sum();
            let cross_qb: f64 = (0..self_cross.len()).map(|i| weights[qb][i] * self_cross[i][(qb, qa)]).sum();
            let value = sigma2 * rho - cross_qa - cross_qb + prior_value;
            cov[(qa, qb)] = value;
            cov[(qb, qa)] = value;
        }
    }

    (cov, cov_prior)
}
