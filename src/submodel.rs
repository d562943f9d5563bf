use nalgebra::{Cholesky, DMatrix, DVector, Dynamic};

use crate::assembler::{fill_corr_matrix, fill_cross_correlations, TINY_NUGGET};
use crate::error::{NestedKrigingError, Warning};
use crate::linalg::{cholesky_with_retry, par_solve_lower_triangular_unchecked, par_tr_matmul_diag, par_tr_matmul_vec};
use crate::params::CovarianceParams;
use crate::partition::Subgroup;
use crate::points::RescaledPoints;
use crate::types::KrigingType;

/// A single subgroup's compiled predictor: its correlation factor and the
/// auxiliary quantities the cross-covariance engine and aggregator need.
pub struct Submodel {
    pub points: RescaledPoints,
    pub y: DVector<f64>,
    pub cholesky: Cholesky<f64, Dynamic>,
    /// `Kᵢ⁻¹kᵢ`, `nᵢ × q`.
    pub lambda: DMatrix<f64>,
    /// `L⁻¹kᵢ`, `nᵢ × q`; retained for the posterior joint covariance's
    /// submodel self cross term (§4.8 step 6), see
    /// [`crate::crosscov::compute_submodel_self_cross`].
    pub fact: DMatrix<f64>,
    /// Posterior mean at every query point, `q`.
    pub mean: DVector<f64>,
    /// Posterior variance at every query point, `q`, floored at 0.
    pub variance: DVector<f64>,
}

/// What the cross-covariance engine and aggregator read from a submodel's
/// query-indexed quantities. Implemented by [`Submodel`] itself (the
/// whole-range case) and by [`SubmodelZone`] (one §5 zone's column slice),
/// so both drive the same pair-fan-out and aggregation code.
pub trait SubmodelQueries: Sync {
    fn points(&self) -> &RescaledPoints;
    fn lambda(&self) -> &DMatrix<f64>;
    fn mean(&self) -> &DVector<f64>;
    fn variance(&self) -> &DVector<f64>;
}

impl SubmodelQueries for Submodel {
    fn points(&self) -> &RescaledPoints {
        &self.points
    }
    fn lambda(&self) -> &DMatrix<f64> {
        &self.lambda
    }
    fn mean(&self) -> &DVector<f64> {
        &self.mean
    }
    fn variance(&self) -> &DVector<f64> {
        &self.variance
    }
}

/// One §5 zone's contiguous column slice of a submodel's query-indexed
/// quantities. `points` is query-independent and simply borrowed; `fact` and
/// `cholesky` are never read past submodel-build time, so they are left
/// behind rather than sliced.
pub struct SubmodelZone<'a> {
    points: &'a RescaledPoints,
    lambda: DMatrix<f64>,
    mean: DVector<f64>,
    variance: DVector<f64>,
}

impl<'a> SubmodelQueries for SubmodelZone<'a> {
    fn points(&self) -> &RescaledPoints {
        self.points
    }
    fn lambda(&self) -> &DMatrix<f64> {
        &self.lambda
    }
    fn mean(&self) -> &DVector<f64> {
        &self.mean
    }
    fn variance(&self) -> &DVector<f64> {
        &self.variance
    }
}

impl Submodel {
    /// Slices this submodel's query-indexed quantities to one zone's
    /// contiguous query range `[start, start+len)`, for the driver's §5
    /// zone-parallel cross-covariance/aggregation pass.
    pub fn zone(&self, start: usize, len: usize) -> SubmodelZone<'_> {
        SubmodelZone {
            points: &self.points,
            lambda: self.lambda.columns(start, len).into_owned(),
            mean: self.mean.rows(start, len).into_owned(),
            variance: self.variance.rows(start, len).into_owned(),
        }
    }
}

/// Builds the predictor for one subgroup against the shared query set,
/// retrying the on-diagonal tiny nugget doubling on non-positive-definite
/// failure per §7, and estimating a constant trend first if `kriging_type`
/// is [`KrigingType::Ordinary`].
pub fn build_submodel(
    subgroup_index: usize,
    subgroup: Subgroup,
    queries: &RescaledPoints,
    params: &CovarianceParams,
    nugget: &[f64],
    kriging_type: KrigingType,
) -> Result<(Submodel, Vec<Warning>), NestedKrigingError> {
    let Subgroup { points, y } = subgroup;
    let n = points.n();

    let mut applied_delta = TINY_NUGGET;
    let cholesky = cholesky_with_retry(|multiplier| {
        applied_delta = TINY_NUGGET * multiplier;
        fill_corr_matrix(&points, nugget, params, multiplier)
    });
    let (cholesky, _attempts) = cholesky.ok_or(NestedKrigingError::NonPositiveDefinite {
        subgroup: subgroup_index,
        attempts: crate::linalg::MAX_NUGGET_RETRIES,
    })?;

    let k_design_query = fill_cross_correlations(&points, queries, params);

    let fact = par_solve_lower_triangular_unchecked(cholesky.l_dirty(), &k_design_query);
    let lambda = cholesky.solve(&k_design_query);
    let alpha = cholesky.solve(&y);

    let (alpha_used, trend) = match kriging_type {
        KrigingType::Simple => (alpha, 0.0),
        KrigingType::Ordinary => {
            let ones = DVector::<f64>::repeat(n, 1.0);
            let w1 = cholesky.solve(&ones);
            let s1 = ones.dot(&w1);
            let trend = ones.dot(&alpha) / s1;
            (&alpha - &w1 * trend, trend)
        }
    };

    let mut mean = par_tr_matmul_vec(&k_design_query, &alpha_used)
        .map_err(|e| NestedKrigingError::InvalidShape {
            argument: "x",
            expected: format!("{n} rows"),
            actual: format!("{:?}", e.shapes),
        })?;
    mean.add_scalar_mut(trend);

    let diag_k_inv_k = par_tr_matmul_diag(&fact, &fact).expect("fact is square-compatible by construction");

    let sigma2 = params.variance();
    let mut warnings = Vec::new();
    let variance = DVector::from_iterator(
        diag_k_inv_k.len(),
        diag_k_inv_k.iter().enumerate().map(|(q, d)| {
            let raw = sigma2 * (1.0 + applied_delta - d);
            if raw < 0.0 {
                warnings.push(Warning::VarianceUnderflow { query: q, value: raw });
                0.0
            } else {
                raw
            }
        }),
    );

    Ok((
        Submodel {
            points,
            y,
            cholesky,
            lambda,
            fact,
            mean,
            variance,
        },
        warnings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Kernel;
    use nalgebra::DMatrix as NaDMatrix;

    fn simple_params() -> CovarianceParams {
        CovarianceParams::new(1, Kernel::Exponential, &[1.0], 1.0).unwrap()
    }

    #[test]
    fn interpolates_noiseless_training_points() {
        let params = simple_params();
        let raw = NaDMatrix::from_row_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
        let points = RescaledPoints::from_raw(&raw, &params, None).unwrap();
        let y = DVector::from_vec(vec![0.0, 1.0, 2.0, 3.0]);
        let subgroup = Subgroup { points: points.clone(), y: y.clone() };

        let (submodel, _warnings) =
            build_submodel(0, subgroup, &points, &params, &[], KrigingType::Simple).unwrap();

        for i in 0..4 {
            assert!((submodel.mean[i] - y[i]).abs() < 1e-9);
            assert!(submodel.variance[i] <= 1e-9);
        }
    }

    #[test]
    fn ordinary_kriging_trend_reproduces_shifted_predictions() {
        let params = simple_params();
        let raw = NaDMatrix::from_row_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
        let points = RescaledPoints::from_raw(&raw, &params, None).unwrap();

        let shift = 5.0;
        let y_unshifted = DVector::from_vec(vec![0.1, 0.4, -0.2, 0.3]);
        let y_shifted = y_unshifted.add_scalar(shift);

        let queries_raw = NaDMatrix::from_row_slice(2, 1, &[0.5, 1.5]);
        let queries = RescaledPoints::from_raw(&queries_raw, &params, None).unwrap();

        let (unshifted, _) = build_submodel(
            0,
            Subgroup { points: points.clone(), y: y_unshifted },
            &queries,
            &params,
            &[],
            KrigingType::Ordinary,
        )
        .unwrap();
        let (shifted, _) = build_submodel(
            0,
            Subgroup { points, y: y_shifted },
            &queries,
            &params,
            &[],
            KrigingType::Ordinary,
        )
        .unwrap();

        for i in 0..2 {
            assert!((shifted.mean[i] - unshifted.mean[i] - shift).abs() < 1e-8);
        }
    }
}
