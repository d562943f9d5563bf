use thiserror::Error;

/// Fatal error kinds the core can return.
///
/// These mirror the error taxonomy of the nested-Kriging entry point:
/// shape mismatches are caught before any numerical work starts, while
/// non-positive-definite and singular-system errors surface only after
/// the doubling-nugget retry has been exhausted.
#[derive(Debug, Error, PartialEq)]
pub enum NestedKrigingError {
    #[error("{argument}: expected {expected}, got {actual}")]
    InvalidShape {
        argument: &'static str,
        expected: String,
        actual: String,
    },

    #[error("subgroup {subgroup} correlation matrix is not positive-definite after {attempts} nugget doublings")]
    NonPositiveDefinite { subgroup: usize, attempts: u32 },

    #[error("aggregation system at query {query} is singular after {attempts} nugget doublings")]
    SingularAggregation { query: usize, attempts: u32 },
}

/// Non-fatal diagnostics, buffered during a phase and flushed at its boundary
/// so output ordering does not depend on thread scheduling.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// An unrecognised covariance tag was substituted with `exp`.
    UnknownKernelFallback { tag: String },
    /// A variance that underflowed below zero was clamped to 0.
    VarianceUnderflow { query: usize, value: f64 },
    /// A requested alternative combination tag was not recognised and skipped.
    UnknownAlternativeTag { tag: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnknownKernelFallback { tag } => {
                write!(f, "unknown covariance tag '{tag}', falling back to exp")
            }
            Warning::VarianceUnderflow { query, value } => {
                write!(f, "variance underflow at query {query} ({value}), clamped to 0")
            }
            Warning::UnknownAlternativeTag { tag } => {
                write!(f, "unknown alternative combination tag '{tag}', skipped")
            }
        }
    }
}

pub type NestedKrigingResult<T> = Result<T, NestedKrigingError>;

/// Two operands whose shapes disagree for the linear-algebra operation attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("incompatible shapes: {shapes:?}")]
pub struct IncompatibleShapeError {
    pub shapes: Vec<(usize, usize)>,
}

