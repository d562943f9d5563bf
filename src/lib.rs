//! Nested Kriging: an aggregated Gaussian-process predictor over a
//! user-supplied partition of observations.
//!
//! Exact Kriging is restricted to each subgroup in the partition, and the
//! resulting per-subgroup submodels are fused into a single prediction
//! through their cross-covariances — trading the optimality of exact
//! Kriging over the full dataset for tractable scaling. See
//! [`driver::nested_kriging`] for the entry point.

pub mod aggregator;
pub mod alternatives;
pub mod assembler;
pub mod crosscov;
pub mod driver;
pub mod error;
pub mod kernel;
pub mod linalg;
pub mod params;
pub mod partition;
pub mod points;
pub mod submodel;
pub mod threadpool;
pub mod types;

pub use driver::{nested_kriging, NestedKrigingOutput, NestedKrigingRequest};
pub use error::{NestedKrigingError, NestedKrigingResult, Warning};
pub use kernel::Kernel;
pub use params::CovarianceParams;
pub use points::RescaledPoints;
pub use types::{DurationDetails, KrigingType, OutputLevel};
