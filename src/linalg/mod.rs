//! Thin façade over the dense-linear-algebra backend (`nalgebra`) and the
//! parallel primitives (`rayon`) the rest of the core is built on.

mod cholesky;
mod matmul;
mod nugget;
mod solve;
pub mod util;

pub use cholesky::{cholesky_with_retry, MAX_NUGGET_RETRIES};
pub use matmul::{par_matmul, par_tr_matmul, par_tr_matmul_diag, par_tr_matmul_vec};
pub use nugget::nugget_at;
pub use solve::{par_solve_lower_triangular_unchecked, par_solve_lower_triangular_unchecked_mut};
pub use util::par_add_diagonal_mut_unchecked;
