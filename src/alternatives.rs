use nalgebra::DVector;

use crate::submodel::Submodel;

/// Which combination rule `§4.9`'s alternatives module applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternativeKind {
    /// Product of experts: precision-weighted average, equal weights.
    Poe,
    /// Generalized product of experts, equal weights (`1/N`).
    GPoeUniform,
    /// Generalized product of experts, differential-entropy weights.
    GPoeEntropy,
    /// Bayesian committee machine: PoE plus a prior-precision correction.
    Bcm,
    /// Robust BCM: GPoE's entropy weights plus BCM's prior correction.
    Rbcm,
    /// Smallest predictive variance: passes through the most confident
    /// submodel per query, unfused.
    Spv,
}

impl AlternativeKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "poe" => Some(AlternativeKind::Poe),
            "gpoe" => Some(AlternativeKind::GPoeUniform),
            "gpoe_entropy" => Some(AlternativeKind::GPoeEntropy),
            "bcm" => Some(AlternativeKind::Bcm),
            "rbcm" => Some(AlternativeKind::Rbcm),
            "spv" => Some(AlternativeKind::Spv),
            _ => None,
        }
    }
}

/// Per-query mean and variance from one alternative combination rule.
pub struct AlternativePrediction {
    pub mean: DVector<f64>,
    pub sd2: DVector<f64>,
}

/// Computes one of `§4.9`'s closed-form combination rules directly from the
/// already-built per-submodel `(mean, variance)` pairs. No Cholesky is
/// needed beyond what [`crate::submodel::build_submodel`] already produced:
/// every rule here only ever combines scalar means and variances, per query.
pub fn combine(submodels: &[Submodel], sigma2: f64, kind: AlternativeKind) -> AlternativePrediction {
    let q = submodels[0].mean.len();
    let n = submodels.len();

    match kind {
        AlternativeKind::Poe => fuse(submodels, sigma2, q, |_qi| vec![1.0; n], false),
        AlternativeKind::GPoeUniform => fuse(submodels, sigma2, q, |_qi| vec![1.0 / n as f64; n], false),
        AlternativeKind::GPoeEntropy => fuse(submodels, sigma2, q, |qi| entropy_weights(submodels, sigma2, qi), false),
        AlternativeKind::Bcm => fuse(submodels, sigma2, q, |_qi| vec![1.0; n], true),
        AlternativeKind::Rbcm => fuse(submodels, sigma2, q, |qi| entropy_weights(submodels, sigma2, qi), true),
        AlternativeKind::Spv => spv(submodels, q),
    }
}

/// Per-submodel differential-entropy-reduction weight at query `qi`:
/// `wᵢ(q) = ½·(log σ² − log vᵢ(q))`, the standard GPoE/RBCM weighting that
/// favours submodels whose prediction is most confident relative to the
/// unconditional prior variance.
fn entropy_weights(submodels: &[Submodel], sigma2: f64, qi: usize) -> Vec<f64> {
    submodels
        .iter()
        .map(|s| {
            let v = s.variance[qi].max(1e-300);
            0.5 * (sigma2.ln() - v.ln())
        })
        .collect()
}

/// Shared precision-weighted-average core for every fusion rule.
///
/// `fused precision = Σ wᵢ/vᵢ(q) [+ (1-Σwᵢ)/σ² if `with_prior_correction`]`,
/// `fused mean = (Σ wᵢ·mᵢ(q)/vᵢ(q)) / fused precision`.
///
/// PoE is the `wᵢ = 1`, no-correction case; GPoE keeps the same shape with
/// its own weights; BCM and RBCM add the prior-precision correction term
/// (with weights `1` and entropy weights respectively) that keeps the fused
/// variance from collapsing to zero as the number of submodels grows.
fn fuse<F>(submodels: &[Submodel], sigma2: f64, q: usize, weights_at: F, with_prior_correction: bool) -> AlternativePrediction
where
    F: Fn(usize) -> Vec<f64>,
{
    let n = submodels.len();
    let mut mean = DVector::<f64>::zeros(q);
    let mut sd2 = DVector::<f64>::zeros(q);

    for qi in 0..q {
        let weights = weights_at(qi);
        let mut precision = 0.0;
        let mut weighted_mean_precision = 0.0;
        let mut weight_sum = 0.0;
        for i in 0..n {
            let v = submodels[i].variance[qi].max(1e-300);
            precision += weights[i] / v;
            weighted_mean_precision += weights[i] * submodels[i].mean[qi] / v;
            weight_sum += weights[i];
        }
        if with_prior_correction {
            precision += (1.0 - weight_sum) / sigma2;
        }

        let s = if precision > 0.0 { 1.0 / precision } else { 0.0 };
        sd2[qi] = s;
        mean[qi] = weighted_mean_precision * s;
    }

    AlternativePrediction { mean, sd2 }
}

/// Smallest predictive variance: for each query, passes through the single
/// submodel with the lowest posterior variance unchanged. No fusion, no
/// weights — the cheapest of the alternatives.
fn spv(submodels: &[Submodel], q: usize) -> AlternativePrediction {
    let mut mean = DVector::<f64>::zeros(q);
    let mut sd2 = DVector::<f64>::zeros(q);

    for qi in 0..q {
        let (best, _) = submodels
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.variance[qi].partial_cmp(&b.variance[qi]).unwrap())
            .expect("at least one submodel");
        mean[qi] = submodels[best].mean[qi];
        sd2[qi] = submodels[best].variance[qi];
    }

    AlternativePrediction { mean, sd2 }
}
