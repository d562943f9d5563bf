use std::collections::HashMap;
use std::ops::Range;
use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::aggregator::{aggregate, joint_covariance, AggregatedQuery};
use crate::alternatives::{combine, AlternativeKind, AlternativePrediction};
use crate::crosscov::{compute_cross_covariance, compute_submodel_self_cross, CrossCovariance};
use crate::error::{NestedKrigingError, Warning};
use crate::params::CovarianceParams;
use crate::partition::split_partition;
use crate::points::RescaledPoints;
use crate::submodel::{build_submodel, Submodel, SubmodelZone};
use crate::threadpool::ThreadBudget;
use crate::types::{DurationDetails, KrigingType, OutputLevel};

/// A name and version string identifying this crate's implementation of the
/// algorithm, echoed back in every [`NestedKrigingOutput`] the way the
/// source algorithm's `sourceCode` output field identifies its own build.
pub const SOURCE_CODE: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Every input `§6`'s entry point accepts.
pub struct NestedKrigingRequest<'a> {
    /// Input dimension.
    pub d: usize,
    /// Raw `n × d` design matrix (rows are observed points).
    pub x: DMatrix<f64>,
    /// Observed responses, length `n`.
    pub y: DVector<f64>,
    /// Partition labels, length `n`; any bijective relabelling yields the
    /// same subgroups.
    pub clusters: Vec<i64>,
    /// Raw `q × d` query matrix (rows are prediction points).
    pub xp: DMatrix<f64>,
    /// Kernel tag (`"exp"`, `"gauss"`, `"matern3_2"`, `"matern5_2"`,
    /// `"powexp"`, `"white_noise"`); unrecognised tags fall back to `"exp"`
    /// with a [`Warning::UnknownKernelFallback`].
    pub kernel_tag: &'a str,
    /// Kernel parameters: length `d` normally, `2d` for `powexp`.
    pub param: Vec<f64>,
    /// Process variance `σ²`.
    pub sd2: f64,
    /// Nugget values, broadcast cyclically across observations; empty means
    /// no nugget.
    pub nugget: Vec<f64>,
    /// `"simple"` or `"ordinary"` (defaults to simple on any other tag).
    pub kriging_type_tag: &'a str,
    /// Bitfield controlling optional outputs (`§6`).
    pub output_level: i64,
    /// `Z`: query-zone thread count.
    pub num_threads_zones: usize,
    /// `T`: subgroup/pair-worker thread count.
    pub num_threads_pairs: usize,
    /// `B`: accepted for interface parity, not used (see `threadpool`).
    pub num_threads_blas: usize,
    /// Accepted for interface parity; an explicit no-op.
    pub global_options: Vec<i64>,
    /// `0` = silent, `1` = warnings only, `>=2` = debug/trace diagnostics.
    pub verbose_level: i64,
    /// Alternative combination rules to additionally compute, by tag
    /// (`"poe"`, `"gpoe"`, `"gpoe_entropy"`, `"bcm"`, `"rbcm"`, `"spv"`).
    /// Only consulted when `output_level` requests alternatives.
    pub alternatives: Vec<String>,
}

/// Every output `§6`'s entry point produces.
pub struct NestedKrigingOutput {
    pub mean: DVector<f64>,
    pub sd2: DVector<f64>,
    /// Posterior predictive joint covariance of `Y*(q) - Ŷ(q)`, present only
    /// when `output_level` requests joint covariance. `diag(cov)` reconciles
    /// with `sd2`.
    pub cov: Option<DMatrix<f64>>,
    /// Prior covariance of the weighted-sum submodel estimator itself,
    /// `w(q)ᵀ·Cov_pred(q,q')·w(q')` (§6's `covPrior`); its diagonal is
    /// `wᵀk_M`, not a predictive variance. Present under the same condition
    /// as `cov`.
    pub cov_prior: Option<DMatrix<f64>>,
    pub duration: f64,
    pub duration_details: DurationDetails,
    pub source_code: String,
    /// Per-query aggregation weight vectors, present when `per_submodel`
    /// output is requested.
    pub weights: Option<Vec<DVector<f64>>>,
    /// Per-submodel mean, `n_groups × q`, present when `per_submodel` output
    /// is requested.
    pub mean_m: Option<DMatrix<f64>>,
    /// Per-submodel variance, `n_groups × q`, present when `per_submodel`
    /// output is requested.
    pub sd2_m: Option<DMatrix<f64>>,
    /// Per-query `k_M(q)` vectors, present when `full_tensors` output is
    /// requested.
    pub k_m: Option<Vec<DVector<f64>>>,
    /// Per-query `K_M(q)` matrices, present when `full_tensors` output is
    /// requested.
    pub cov_m: Option<Vec<DMatrix<f64>>>,
    /// Results of every requested alternative combination rule, keyed by
    /// tag.
    pub alternatives: Option<HashMap<String, AlternativePrediction>>,
    pub warnings: Vec<Warning>,
}

/// Wires the nine components together: rescale, split, solve submodels,
/// compute cross-covariances, aggregate, and optionally run the
/// alternatives module — the single public entry point, mirroring `§6`'s
/// `nestedKriging` call.
pub fn nested_kriging(request: NestedKrigingRequest) -> Result<NestedKrigingOutput, NestedKrigingError> {
    let start = Instant::now();
    let mut warnings = Vec::new();
    let mut durations = DurationDetails::default();

    let budget = ThreadBudget::new(request.num_threads_zones, request.num_threads_pairs, request.num_threads_blas);
    let pair_pool = budget
        .build_pair_pool()
        .map_err(|e| NestedKrigingError::InvalidShape {
            argument: "num_threads_pairs",
            expected: "a buildable thread count".to_string(),
            actual: e.to_string(),
        })?;

    let output_level = OutputLevel::new(request.output_level);

    // --- phase a: parameter bundle + rescaling ---
    let phase_start = Instant::now();
    let (params, kernel_warning) = CovarianceParams::from_tag(request.d, request.kernel_tag, &request.param, request.sd2)?;
    if let Some(w) = kernel_warning {
        log_warning(&w, request.verbose_level);
        warnings.push(w);
    }
    let kriging_type = KrigingType::from_tag(request.kriging_type_tag);

    let design_points = RescaledPoints::from_raw(&request.x, &params, None)?;
    let query_points = RescaledPoints::from_raw(&request.xp, &params, None)?;
    let q = query_points.n();
    durations.part_a = phase_start.elapsed().as_secs_f64();

    // --- phase b: subgroup splitter + per-subgroup submodel solves ---
    let phase_start = Instant::now();
    let subgroups = split_partition(&request.clusters, &design_points, &request.y)?;
    let n_groups = subgroups.len();

    let submodel_results: Vec<Result<(Submodel, Vec<Warning>), NestedKrigingError>> = pair_pool.install(|| {
        subgroups
            .into_par_iter()
            .enumerate()
            .map(|(i, subgroup)| build_submodel(i, subgroup, &query_points, &params, &request.nugget, kriging_type))
            .collect()
    });

    let mut submodels = Vec::with_capacity(n_groups);
    for r in submodel_results {
        let (submodel, ws) = r?;
        for w in ws {
            log_warning(&w, request.verbose_level);
            warnings.push(w);
        }
        submodels.push(submodel);
    }
    durations.part_b = phase_start.elapsed().as_secs_f64();

    // --- phase c: cross-covariance engine, run per §5's Z zones ---
    //
    // Skipped entirely when outputLevel == -1 (alternatives only, §6): the
    // cross-covariance tensor only feeds the aggregator, which is skipped
    // too in that case, so building it would be wasted work.
    //
    // Each zone is a disjoint slice of the query set, processed as a fully
    // independent task inside `zone_pool`; the subgroup-pair fan-out within
    // one zone still runs on `pair_pool` (T), matching §5's nested Z×T
    // model. Joint covariance is the one exception: its (q, q') entries can
    // straddle two zones, so requesting it forces a single whole-range pass
    // instead (see DESIGN.md).
    let nested_requested = output_level.nested_requested();
    let need_joint_cov = output_level.joint_cov();
    let zone_pool = budget
        .build_zone_pool()
        .map_err(|e| NestedKrigingError::InvalidShape {
            argument: "num_threads_zones",
            expected: "a buildable thread count".to_string(),
            actual: e.to_string(),
        })?;

    let phase_start = Instant::now();
    let cross_covariance = if !nested_requested {
        None
    } else if need_joint_cov {
        Some(pair_pool.install(|| compute_cross_covariance(&submodels, &params, q, true)))
    } else {
        let ranges = zone_ranges(q, budget.zones);
        let zone_tiles: Vec<Vec<DMatrix<f64>>> = zone_pool.install(|| {
            ranges
                .par_iter()
                .map(|range| {
                    let zone_submodels: Vec<SubmodelZone<'_>> =
                        submodels.iter().map(|s| s.zone(range.start, range.len())).collect();
                    pair_pool
                        .install(|| compute_cross_covariance(&zone_submodels, &params, range.len(), false))
                        .tiles
                })
                .collect()
        });
        let mut tiles = Vec::with_capacity(q);
        for zt in zone_tiles {
            tiles.extend(zt);
        }
        Some(CrossCovariance { tiles, pair_grams: None })
    };
    durations.part_c = phase_start.elapsed().as_secs_f64();

    // --- phase d: aggregator, zoned identically to phase c ---
    let phase_start = Instant::now();
    let (mean, sd2, weights, cov, cov_prior) = if let Some(cross_covariance) = cross_covariance.as_ref() {
        if need_joint_cov {
            let (aggregated, agg_warnings) = aggregate(&submodels, cross_covariance, params.variance())?;
            for w in agg_warnings {
                log_warning(&w, request.verbose_level);
                warnings.push(w);
            }
            let mean = DVector::from_iterator(q, aggregated.iter().map(|a| a.mean));
            let sd2 = DVector::from_iterator(q, aggregated.iter().map(|a| a.sd2));
            let weights: Vec<DVector<f64>> = aggregated.iter().map(|a| a.weights.clone()).collect();

            let self_cross = pair_pool.install(|| compute_submodel_self_cross(&submodels, params.variance()));
            let (cov, cov_prior) = joint_covariance(cross_covariance, &self_cross, &query_points, &params, &weights);
            (mean, sd2, weights, Some(cov), Some(cov_prior))
        } else {
            let ranges = zone_ranges(q, budget.zones);
            let zone_results: Vec<Result<(Vec<AggregatedQuery>, Vec<Warning>), NestedKrigingError>> =
                zone_pool.install(|| {
                    ranges
                        .par_iter()
                        .map(|range| {
                            let zone_submodels: Vec<SubmodelZone<'_>> =
                                submodels.iter().map(|s| s.zone(range.start, range.len())).collect();
                            let zone_cc = CrossCovariance {
                                tiles: cross_covariance.tiles[range.clone()].to_vec(),
                                pair_grams: None,
                            };
                            pair_pool
                                .install(|| aggregate(&zone_submodels, &zone_cc, params.variance()))
                                .map_err(|e| offset_error_query(e, range.start))
                                .map(|(aggregated, ws)| {
                                    let ws = ws.into_iter().map(|w| offset_warning_query(w, range.start)).collect();
                                    (aggregated, ws)
                                })
                        })
                        .collect()
                });

            let mut mean_vals = Vec::with_capacity(q);
            let mut sd2_vals = Vec::with_capacity(q);
            let mut weight_vecs = Vec::with_capacity(q);
            for r in zone_results {
                let (aggregated, ws) = r?;
                for w in ws {
                    log_warning(&w, request.verbose_level);
                    warnings.push(w);
                }
                for a in aggregated {
                    mean_vals.push(a.mean);
                    sd2_vals.push(a.sd2);
                    weight_vecs.push(a.weights);
                }
            }
            (DVector::from_vec(mean_vals), DVector::from_vec(sd2_vals), weight_vecs, None, None)
        }
    } else {
        (DVector::zeros(0), DVector::zeros(0), Vec::new(), None, None)
    };
    durations.part_d = phase_start.elapsed().as_secs_f64();

    // --- phase e: alternatives module ---
    let phase_start = Instant::now();
    let alternatives = if output_level.alternatives_requested() && !request.alternatives.is_empty() {
        let mut map = HashMap::new();
        for tag in &request.alternatives {
            if let Some(kind) = AlternativeKind::from_tag(tag) {
                map.insert(tag.clone(), combine(&submodels, params.variance(), kind));
            } else {
                let w = Warning::UnknownAlternativeTag { tag: tag.clone() };
                log_warning(&w, request.verbose_level);
                warnings.push(w);
            }
        }
        Some(map)
    } else {
        None
    };
    durations.part_e = phase_start.elapsed().as_secs_f64();

    let mean_m = if output_level.per_submodel() {
        Some(DMatrix::from_fn(n_groups, q, |i, qi| submodels[i].mean[qi]))
    } else {
        None
    };
    let sd2_m = if output_level.per_submodel() {
        Some(DMatrix::from_fn(n_groups, q, |i, qi| submodels[i].variance[qi]))
    } else {
        None
    };
    let k_m = if output_level.full_tensors() {
        cross_covariance
            .as_ref()
            .map(|cc| cc.tiles.iter().map(|tile| tile.diagonal()).collect())
    } else {
        None
    };
    let cov_m = if output_level.full_tensors() {
        cross_covariance.as_ref().map(|cc| cc.tiles.clone())
    } else {
        None
    };
    let weights_out = if output_level.per_submodel() { Some(weights) } else { None };

    Ok(NestedKrigingOutput {
        mean,
        sd2,
        cov,
        cov_prior,
        duration: start.elapsed().as_secs_f64(),
        duration_details: durations,
        source_code: SOURCE_CODE.to_string(),
        weights: weights_out,
        mean_m,
        sd2_m,
        k_m,
        cov_m,
        alternatives,
        warnings,
    })
}

fn log_warning(warning: &Warning, verbose_level: i64) {
    if verbose_level >= 1 {
        log::warn!("{warning}");
    } else {
        log::debug!("{warning}");
    }
}

/// Splits `0..q` into up to `zones` contiguous, near-equal ranges (the last
/// range absorbs the remainder), for the §5 `Z`-axis zone pool. Never
/// produces more ranges than query points.
fn zone_ranges(q: usize, zones: usize) -> Vec<Range<usize>> {
    let zones = zones.min(q.max(1));
    if zones <= 1 || q == 0 {
        return vec![0..q];
    }
    let base = q / zones;
    let remainder = q % zones;
    let mut ranges = Vec::with_capacity(zones);
    let mut start = 0;
    for z in 0..zones {
        let len = base + if z < remainder { 1 } else { 0 };
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Rewrites a within-zone query index in an aggregator error back to its
/// position in the full query set.
fn offset_error_query(err: NestedKrigingError, offset: usize) -> NestedKrigingError {
    match err {
        NestedKrigingError::SingularAggregation { query, attempts } => {
            NestedKrigingError::SingularAggregation { query: query + offset, attempts }
        }
        other => other,
    }
}

/// Rewrites a within-zone query index in an aggregator warning back to its
/// position in the full query set.
fn offset_warning_query(warning: Warning, offset: usize) -> Warning {
    match warning {
        Warning::VarianceUnderflow { query, value } => Warning::VarianceUnderflow { query: query + offset, value },
        other => other,
    }
}
