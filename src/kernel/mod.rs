//! The closed family of stationary isotropic-product correlation kernels.
//!
//! Represented as a tagged enum rather than a trait object: the
//! correlation call sits in the tightest inner loop of the whole core, and
//! a `match` on a plain tag inlines where a `dyn Kernel` vtable call would
//! not.

use crate::error::Warning;

/// One of the six supported covariance kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// `exp(-Σ sₖ)`
    Exponential,
    /// `exp(-Σ sₖ²)`
    Gaussian,
    /// `Πₖ(1+sₖ)·exp(-Σ sₖ)`
    Matern3_2,
    /// `Πₖ(1+sₖ+sₖ²/3)·exp(-Σ sₖ)`
    Matern5_2,
    /// `exp(-Σₖ (|raw diff|/lengthscaleₖ)^pₖ)`, evaluated on raw coordinates
    PowerExponential,
    /// `1` if `Σ sₖ < 1e-15` else `0`
    WhiteNoise,
}

impl Kernel {
    /// Parses one of the six kernel tags. An unrecognised tag falls back to
    /// `exp` and reports a [`Warning`], per §7's behaviour-compatible
    /// fallback policy.
    pub fn from_tag(tag: &str) -> (Kernel, Option<Warning>) {
        match tag {
            "exp" => (Kernel::Exponential, None),
            "gauss" => (Kernel::Gaussian, None),
            "matern3_2" => (Kernel::Matern3_2, None),
            "matern5_2" => (Kernel::Matern5_2, None),
            "powexp" => (Kernel::PowerExponential, None),
            "white_noise" => (Kernel::WhiteNoise, None),
            other => (
                Kernel::Exponential,
                Some(Warning::UnknownKernelFallback {
                    tag: other.to_string(),
                }),
            ),
        }
    }

    /// The kernel-specific scaling constant `c` used to build per-dimension
    /// scaling factors `c / lengthscaleₖ`. `powexp` reports `1.0` but its
    /// rescaling is disabled entirely (see [`crate::params::CovarianceParams`]).
    pub fn scaling_constant(&self) -> f64 {
        match self {
            Kernel::Exponential => 1.0,
            Kernel::Gaussian => std::f64::consts::SQRT_2 / 2.0,
            Kernel::Matern3_2 => 3.0_f64.sqrt(),
            Kernel::Matern5_2 => 5.0_f64.sqrt(),
            Kernel::PowerExponential => 1.0,
            Kernel::WhiteNoise => 1.0,
        }
    }

    /// Whether this kernel carries extra per-dimension exponents (only
    /// `powexp` does), i.e. whether its parameter vector has length `2d`.
    pub fn carries_exponents(&self) -> bool {
        matches!(self, Kernel::PowerExponential)
    }

    /// Evaluates the correlation between two points given as slices of
    /// already-rescaled coordinates (for every kernel but `powexp`) or
    /// origin-shifted raw coordinates (for `powexp`, whose scaling factor
    /// is fixed at `1.0`).
    ///
    /// For `powexp`, `lengthscales` and `exponents` (each length `d`) are
    /// required; they are ignored by every other kernel.
    #[inline]
    pub fn correlation(&self, a: &[f64], b: &[f64], lengthscales: &[f64], exponents: &[f64]) -> f64 {
        debug_assert_eq!(a.len(), b.len());

        match self {
            Kernel::PowerExponential => {
                let sum: f64 = a
                    .iter()
                    .zip(b)
                    .zip(lengthscales)
                    .zip(exponents)
                    .map(|(((ai, bi), l), p)| ((ai - bi).abs() / l).powf(*p))
                    .sum();
                (-sum).exp()
            }
            Kernel::Exponential => {
                let sum: f64 = a.iter().zip(b).map(|(ai, bi)| (ai - bi).abs()).sum();
                (-sum).exp()
            }
            Kernel::Gaussian => {
                let sum_sq: f64 = a
                    .iter()
                    .zip(b)
                    .map(|(ai, bi)| {
                        let d = ai - bi;
                        d * d
                    })
                    .sum();
                (-sum_sq).exp()
            }
            Kernel::Matern3_2 => {
                let (mut sum, mut prod) = (0.0, 1.0);
                for (ai, bi) in a.iter().zip(b) {
                    let s = (ai - bi).abs();
                    sum += s;
                    prod *= 1.0 + s;
                }
                prod * (-sum).exp()
            }
            Kernel::Matern5_2 => {
                let (mut sum, mut prod) = (0.0, 1.0);
                for (ai, bi) in a.iter().zip(b) {
                    let s = (ai - bi).abs();
                    sum += s;
                    prod *= 1.0 + s + s * s / 3.0;
                }
                prod * (-sum).exp()
            }
            Kernel::WhiteNoise => {
                let sum: f64 = a.iter().zip(b).map(|(ai, bi)| (ai - bi).abs()).sum();
                if sum < 1e-15 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}
