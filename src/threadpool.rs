use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

/// The three thread-count knobs from `§5`'s concurrency model: `Z` zones
/// (splitting the query set), `T` pair-workers (subgroup pairs within the
/// cross-covariance engine and independent per-subgroup submodel builds),
/// and `B` BLAS threads.
///
/// `Z` and `T` are realised as actual rayon thread pools; `B` is accepted
/// for interface fidelity with the source algorithm's `numThreadsBLAS`
/// option but is a documented no-op here — nalgebra's dense `Cholesky` in
/// this crate performs no further internal parallelism to bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadBudget {
    pub zones: usize,
    pub pairs: usize,
    pub blas: usize,
}

impl ThreadBudget {
    pub fn new(zones: usize, pairs: usize, blas: usize) -> Self {
        ThreadBudget {
            zones: zones.max(1),
            pairs: pairs.max(1),
            blas: blas.max(1),
        }
    }

    /// Builds the pair-worker pool (`T`), used for the per-subgroup submodel
    /// builds and the cross-covariance pair fan-out.
    pub fn build_pair_pool(&self) -> Result<ThreadPool, ThreadPoolBuildError> {
        ThreadPoolBuilder::new().num_threads(self.pairs).build()
    }

    /// Builds the zone pool (`Z`), used to split the query set into disjoint
    /// ranges that the driver runs independently through the
    /// cross-covariance engine and aggregator (each range's pair-level work
    /// still goes through the pair pool). Joint covariance forces a single
    /// whole-range pass instead, since its entries can straddle zones.
    pub fn build_zone_pool(&self) -> Result<ThreadPool, ThreadPoolBuildError> {
        ThreadPoolBuilder::new().num_threads(self.zones).build()
    }
}
