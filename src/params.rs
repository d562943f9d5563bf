use crate::error::{NestedKrigingError, Warning};
use crate::kernel::Kernel;

/// Safety floor added to `σ²` before inverting it, matching the source
/// algorithm's `ε ≈ 1e-100` guard against division by an exactly-zero
/// variance.
const VARIANCE_EPSILON: f64 = 1e-100;

/// Immutable carrier of dimension, lengthscales, variance, kernel choice,
/// and pre-computed per-dimension scaling factors.
///
/// Built once per call and shared read-only across every thread; never
/// copied or moved afterwards (callers hold it behind a shared reference,
/// typically wrapped in an [`std::sync::Arc`] by the driver).
#[derive(Debug, Clone)]
pub struct CovarianceParams {
    d: usize,
    kernel: Kernel,
    /// Length `d`, always > 0.
    lengthscales: Vec<f64>,
    /// Length `d` for `powexp`, empty otherwise.
    exponents: Vec<f64>,
    /// `c / lengthscaleₖ` per dimension; all `1.0` for `powexp` since its
    /// rescaling is disabled.
    scaling_factors: Vec<f64>,
    variance: f64,
    inv_variance: f64,
}

impl CovarianceParams {
    /// Builds a parameter bundle from a raw `param` vector as accepted by
    /// the `nestedKriging` entry point: length `d` normally, length `2d`
    /// for `powexp` (lengthscales followed by exponents).
    pub fn new(
        d: usize,
        kernel: Kernel,
        param: &[f64],
        variance: f64,
    ) -> Result<Self, NestedKrigingError> {
        let expected = if kernel.carries_exponents() { 2 * d } else { d };
        if param.len() != expected {
            return Err(NestedKrigingError::InvalidShape {
                argument: "param",
                expected: expected.to_string(),
                actual: param.len().to_string(),
            });
        }

        let lengthscales = param[..d].to_vec();
        for (k, l) in lengthscales.iter().enumerate() {
            if *l <= 0.0 {
                return Err(NestedKrigingError::InvalidShape {
                    argument: "param",
                    expected: format!("lengthscale[{k}] > 0"),
                    actual: l.to_string(),
                });
            }
        }

        let exponents = if kernel.carries_exponents() {
            param[d..].to_vec()
        } else {
            Vec::new()
        };

        if variance <= 0.0 {
            return Err(NestedKrigingError::InvalidShape {
                argument: "sd2",
                expected: "> 0".to_string(),
                actual: variance.to_string(),
            });
        }

        let scaling_factors = if kernel.carries_exponents() {
            vec![1.0; d]
        } else {
            let c = kernel.scaling_constant();
            lengthscales.iter().map(|l| c / l).collect()
        };

        Ok(CovarianceParams {
            d,
            kernel,
            lengthscales,
            exponents,
            scaling_factors,
            variance,
            inv_variance: 1.0 / (variance + VARIANCE_EPSILON),
        })
    }

    /// Builds the bundle from a raw kernel tag, substituting `exp` and
    /// returning a [`Warning`] if the tag is unrecognised.
    pub fn from_tag(
        d: usize,
        tag: &str,
        param: &[f64],
        variance: f64,
    ) -> Result<(Self, Option<Warning>), NestedKrigingError> {
        let (kernel, warning) = Kernel::from_tag(tag);
        let params = Self::new(d, kernel, param, variance)?;
        Ok((params, warning))
    }

    pub fn d(&self) -> usize {
        self.d
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    pub fn lengthscales(&self) -> &[f64] {
        &self.lengthscales
    }

    pub fn exponents(&self) -> &[f64] {
        &self.exponents
    }

    pub fn scaling_factors(&self) -> &[f64] {
        &self.scaling_factors
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn inv_variance(&self) -> f64 {
        self.inv_variance
    }

    /// Evaluates the kernel's correlation between two coordinate slices
    /// that are already in this bundle's rescaled frame.
    #[inline]
    pub fn correlation(&self, a: &[f64], b: &[f64]) -> f64 {
        self.kernel.correlation(a, b, &self.lengthscales, &self.exponents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length_param() {
        let err = CovarianceParams::new(3, Kernel::Exponential, &[1.0, 2.0], 1.0).unwrap_err();
        assert!(matches!(err, NestedKrigingError::InvalidShape { .. }));
    }

    #[test]
    fn powexp_requires_double_length_param() {
        let params = CovarianceParams::new(2, Kernel::PowerExponential, &[1.0, 2.0, 1.5, 1.8], 1.0).unwrap();
        assert_eq!(params.lengthscales(), &[1.0, 2.0]);
        assert_eq!(params.exponents(), &[1.5, 1.8]);
        assert_eq!(params.scaling_factors(), &[1.0, 1.0]);
    }

    #[test]
    fn rejects_non_positive_lengthscale() {
        let err = CovarianceParams::new(1, Kernel::Exponential, &[0.0], 1.0).unwrap_err();
        assert!(matches!(err, NestedKrigingError::InvalidShape { .. }));
    }

    #[test]
    fn scaling_factor_matches_kernel_constant_over_lengthscale() {
        let params = CovarianceParams::new(1, Kernel::Gaussian, &[2.0], 1.0).unwrap();
        let expected = (std::f64::consts::SQRT_2 / 2.0) / 2.0;
        assert!((params.scaling_factors()[0] - expected).abs() < 1e-15);
    }
}
