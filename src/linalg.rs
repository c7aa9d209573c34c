// src/linalg.rs - Pseudo-inverse and projection helpers

use nalgebra::DMatrix;

use crate::errors::{Result, WingShapeError};

/// Singular-value cutoff relative to the largest singular value, matching
/// the usual `max(m, n) * eps * sigma_max` rule
fn svd_tolerance(singular_values: &[f64], rows: usize, cols: usize) -> f64 {
    let sigma_max = singular_values.iter().copied().fold(0.0, f64::max);
    sigma_max * rows.max(cols) as f64 * f64::EPSILON
}

/// Moore-Penrose pseudo-inverse via SVD
pub fn pseudo_inverse(matrix: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (rows, cols) = matrix.shape();
    if rows == 0 || cols == 0 {
        return Ok(DMatrix::zeros(cols, rows));
    }
    let svd = matrix.clone().svd(true, true);
    let tol = svd_tolerance(svd.singular_values.as_slice(), rows, cols);
    svd.pseudo_inverse(tol)
        .map_err(|e| WingShapeError::Numeric(format!("pseudo-inverse failed: {}", e)))
}

/// Numerical rank from the singular values of `matrix` itself, using the
/// `max(m, n) * eps * sigma_max` cutoff. [`projection`] applies that cutoff to
/// X^t X, whose singular values are the squares of these, so the two agree
/// only away from the threshold.
pub fn rank(matrix: &DMatrix<f64>) -> usize {
    let (rows, cols) = matrix.shape();
    if rows == 0 || cols == 0 {
        return 0;
    }
    let singular_values = matrix.singular_values();
    let tol = svd_tolerance(singular_values.as_slice(), rows, cols);
    singular_values.iter().filter(|&&s| s > tol).count()
}

/// Hat matrix P = X (X^t X)^+ X^t.
///
/// The pseudo-inverse keeps aliased or rank-deficient designs usable.
pub fn projection(x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let xtx = x.transpose() * x;
    let xtx_pinv = pseudo_inverse(&xtx)?;
    Ok(x * xtx_pinv * x.transpose())
}

/// trace(M^t M), the squared Frobenius norm
pub fn sscp_trace(m: &DMatrix<f64>) -> f64 {
    m.iter().map(|v| v * v).sum()
}

/// Copy of `x` without the columns in `drop`
pub fn drop_columns(x: &DMatrix<f64>, drop: std::ops::Range<usize>) -> DMatrix<f64> {
    let keep: Vec<usize> = (0..x.ncols()).filter(|c| !drop.contains(c)).collect();
    x.select_columns(keep.iter())
}

/// Subtract the column means
pub fn center_columns(y: &DMatrix<f64>) -> DMatrix<f64> {
    let mut centered = y.clone();
    if y.nrows() == 0 {
        return centered;
    }
    for mut col in centered.column_iter_mut() {
        let mean = col.mean();
        col.add_scalar_mut(-mean);
    }
    centered
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn projection_is_idempotent_and_symmetric() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let p = projection(&x).unwrap();
        let pp = &p * &p;
        for (a, b) in pp.iter().zip(p.iter()) {
            assert_approx_eq!(*a, *b, 1e-10);
        }
        for (a, b) in p.iter().zip(p.transpose().iter()) {
            assert_approx_eq!(*a, *b, 1e-10);
        }
        assert_approx_eq!(p.trace(), 2.0, 1e-10);
    }

    #[test]
    fn aliased_columns_do_not_fail() {
        // third column duplicates the second
        let x = DMatrix::from_row_slice(3, 3, &[1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 2.0, 2.0]);
        assert_eq!(rank(&x), 2);
        let p = projection(&x).unwrap();
        assert_approx_eq!(p.trace(), 2.0, 1e-8);
    }

    #[test]
    fn rank_matches_projection_trace() {
        // third column is the sum of the first two
        let x = DMatrix::from_row_slice(4, 3, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 0.0, 1.0, 1.0, 1.0, 2.0, 3.0]);
        assert_eq!(rank(&x), 2);
        assert_approx_eq!(projection(&x).unwrap().trace(), 2.0, 1e-9);
    }

    #[test]
    fn helpers() {
        let x = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let reduced = drop_columns(&x, 1..2);
        assert_eq!(reduced, DMatrix::from_row_slice(2, 2, &[1.0, 3.0, 4.0, 6.0]));
        assert_approx_eq!(sscp_trace(&x), 91.0, 1e-12);
        let c = center_columns(&x);
        assert_approx_eq!(c[(0, 0)], -1.5, 1e-12);
        assert_approx_eq!(c[(1, 2)], 1.5, 1e-12);
    }
}
