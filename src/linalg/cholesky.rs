use nalgebra::{Cholesky, DMatrix, Dynamic};

/// Small cap on the number of on-diagonal tiny-nugget doublings attempted
/// before a non-positive-definite or singular system is reported fatal,
/// per §7's retry policy.
pub const MAX_NUGGET_RETRIES: u32 = 5;

/// Attempts a Cholesky factorisation, doubling the on-diagonal tiny nugget
/// on each retry up to [`MAX_NUGGET_RETRIES`] times.
///
/// `build` receives the current doubling multiplier (starting at `1.0`) and
/// must return a freshly assembled matrix reflecting it. Returns the
/// successful factor plus the number of retries it took, or `None` if every
/// attempt failed.
pub fn cholesky_with_retry<F>(mut build: F) -> Option<(Cholesky<f64, Dynamic>, u32)>
where
    F: FnMut(f64) -> DMatrix<f64>,
{
    let mut multiplier = 1.0;
    for attempt in 0..=MAX_NUGGET_RETRIES {
        let matrix = build(multiplier);
        if let Some(cholesky) = matrix.cholesky() {
            return Some((cholesky, attempt));
        }
        multiplier *= 2.0;
    }
    None
}
