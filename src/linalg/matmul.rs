use nalgebra::{DMatrix, DVector, Dim, Matrix, Storage};
use rayon::prelude::*;

use crate::error::IncompatibleShapeError;

/// Parallel matrix multiplication implementation with rayon
///
/// # Examples
/// ```rust
/// use nalgebra::DMatrix;
/// use nested_kriging::linalg::par_matmul;
///
/// // these look transposed since they are stored column-major
///
/// let lhs = DMatrix::from_vec(2, 3, vec![
/// 1.0, 4.0,
/// 2.0, 5.0,
/// 3.0, 6.0,
/// ]);
///
/// let rhs = DMatrix::from_vec(3, 2, vec![
/// 7.0,  9.0, 11.0,
/// 8.0, 10.0, 12.0,
/// ]);
///
///
/// let expected = DMatrix::from_vec(2, 2, vec![
/// 58.0, 139.0,
/// 64.0, 154.0,
/// ]);
///
/// assert_eq!(par_matmul(&lhs, &rhs).unwrap(), expected);
/// ```
pub fn par_matmul<LI, LJ, RI, RJ, SL, SR>(
    lhs: &Matrix<f64, LI, LJ, SL>,
    rhs: &Matrix<f64, RI, RJ, SR>,
) -> Result<DMatrix<f64>, IncompatibleShapeError>
where
    LI: Dim,
    LJ: Dim,
    RI: Dim,
    RJ: Dim,
    SL: Storage<f64, LI, LJ> + Sync,
    SR: Storage<f64, RI, RJ> + Sync,
{
    let l_shape = lhs.shape();
    let r_shape = rhs.shape();

    // nrows of lhs must == ncols of rhs
    if l_shape.1 != r_shape.0 {
        return Err(IncompatibleShapeError {
            shapes: vec![l_shape, r_shape],
        });
    }

    // iterate down cols of rhs, zipping with the rows of the lhs
    let vals: Vec<f64> = (0..r_shape.1)
        .into_par_iter()
        .flat_map(move |rj| {
            (0..l_shape.0).into_par_iter().map(move |li| {
                (0..r_shape.0)
                    .into_par_iter()
                    .zip(0..l_shape.1)
                    .map(move |(ri, lj)| lhs.index((li, lj)) * rhs.index((ri, rj)))
                    .sum::<f64>()
            })
        })
        .collect();

    Ok(DMatrix::from_vec(l_shape.0, r_shape.1, vals))
}

/// Computes `aᵀb` in full, parallelising over the columns of `b`.
///
/// Used by the aggregator to build per-query-pair joint-covariance Gram
/// matrices from retained submodel factors.
pub fn par_tr_matmul(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>, IncompatibleShapeError> {
    if a.nrows() != b.nrows() {
        return Err(IncompatibleShapeError {
            shapes: vec![a.shape(), b.shape()],
        });
    }

    let (n, p) = (a.ncols(), b.ncols());
    let vals: Vec<f64> = (0..p)
        .into_par_iter()
        .flat_map(|bj| {
            let b_col = b.column(bj);
            (0..n)
                .into_par_iter()
                .map(move |ai| a.column(ai).dot(&b_col))
        })
        .collect();

    Ok(DMatrix::from_vec(n, p, vals))
}

/// Computes `aᵀb` restricted to a single vector `b`, i.e. `aᵀ·v`.
///
/// Used to turn a cross-correlation matrix `k` (design points × queries)
/// into a per-query mean contribution `kᵀα`.
pub fn par_tr_matmul_vec(a: &DMatrix<f64>, v: &DVector<f64>) -> Result<DVector<f64>, IncompatibleShapeError> {
    if a.nrows() != v.len() {
        return Err(IncompatibleShapeError {
            shapes: vec![a.shape(), v.shape()],
        });
    }

    let vals: Vec<f64> = (0..a.ncols())
        .into_par_iter()
        .map(|ai| a.column(ai).dot(v))
        .collect();

    Ok(DVector::from_vec(vals))
}

/// Computes `diag(aᵀb)`, i.e. the column-wise dot products of `a` and `b`,
/// without materialising the full product.
///
/// Used by the submodel solver to compute posterior variance from the
/// triangular-solved factor without an O(q²) full matmul.
pub fn par_tr_matmul_diag(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<Vec<f64>, IncompatibleShapeError> {
    if a.shape() != b.shape() {
        return Err(IncompatibleShapeError {
            shapes: vec![a.shape(), b.shape()],
        });
    }

    let vals: Vec<f64> = (0..a.ncols())
        .into_par_iter()
        .map(|j| a.column(j).dot(&b.column(j)))
        .collect();

    Ok(vals)
}
