use nalgebra::DMatrix;

use crate::error::NestedKrigingError;
use crate::params::CovarianceParams;

/// A rescaled point cloud: each stored coordinate is
/// `(raw - origin) × scalingFactorₖ`, so the active kernel's inner loop
/// never divides by a lengthscale.
///
/// Stored column-major with one column per point (`d` rows, `n` columns) —
/// a packed, contiguous layout close to the "packed, SIMD-aligned" storage
/// Design Note 2 recommends, without hand-rolled alignment.
#[derive(Debug, Clone)]
pub struct RescaledPoints {
    coords: DMatrix<f64>,
}

impl RescaledPoints {
    /// Builds a rescaled point set from a raw `n × d` matrix (rows are
    /// points) and an optional origin row (defaults to all zeros).
    pub fn from_raw(
        raw: &DMatrix<f64>,
        params: &CovarianceParams,
        origin: Option<&[f64]>,
    ) -> Result<Self, NestedKrigingError> {
        let d = params.d();
        if raw.ncols() != d {
            return Err(NestedKrigingError::InvalidShape {
                argument: "X",
                expected: format!("n x {d}"),
                actual: format!("{} x {}", raw.nrows(), raw.ncols()),
            });
        }
        if let Some(origin) = origin {
            if origin.len() != d {
                return Err(NestedKrigingError::InvalidShape {
                    argument: "origin",
                    expected: d.to_string(),
                    actual: origin.len().to_string(),
                });
            }
        }

        let n = raw.nrows();
        let scaling = params.scaling_factors();
        let mut coords = DMatrix::<f64>::zeros(d, n);
        for i in 0..n {
            for k in 0..d {
                let o = origin.map(|o| o[k]).unwrap_or(0.0);
                coords[(k, i)] = (raw[(i, k)] - o) * scaling[k];
            }
        }

        Ok(RescaledPoints { coords })
    }

    /// Number of points.
    pub fn n(&self) -> usize {
        self.coords.ncols()
    }

    /// Input-space dimension.
    pub fn d(&self) -> usize {
        self.coords.nrows()
    }

    /// Read-only access to a single point's rescaled coordinates.
    pub fn point(&self, i: usize) -> &[f64] {
        self.coords.column(i).as_slice()
    }

    /// Builds a new point set containing only the given column indices,
    /// preserving their order. Used by the subgroup splitter.
    pub fn select_columns(&self, indices: &[usize]) -> Self {
        let d = self.d();
        let mut coords = DMatrix::<f64>::zeros(d, indices.len());
        for (new_i, &old_i) in indices.iter().enumerate() {
            coords.set_column(new_i, &self.coords.column(old_i));
        }
        RescaledPoints { coords }
    }
}
