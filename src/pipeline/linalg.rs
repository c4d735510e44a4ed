//! Small dense linear algebra helpers on top of faer

use faer::prelude::SolverCore;
use faer::{Mat, Side};

use super::error::ModelError;

/// Invert a symmetric positive-definite matrix through its Cholesky factor.
///
/// Returns `None` when the factorisation fails or the inverse is not finite.
pub fn invert_spd(matrix: &Mat<f64>) -> Option<Mat<f64>> {
    let chol = matrix.cholesky(Side::Lower).ok()?;
    let inverse = chol.inverse();

    let all_finite = (0..inverse.nrows())
        .all(|i| (0..inverse.ncols()).all(|j| inverse[(i, j)].is_finite()));

    all_finite.then_some(inverse)
}

/// [`invert_spd`] for a matrix held as nested rows.
pub fn invert_spd_rows(rows: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let p = rows.len();
    if rows.iter().any(|row| row.len() != p) {
        return None;
    }
    let matrix = Mat::from_fn(p, p, |i, j| rows[i][j]);
    invert_spd(&matrix).map(|inverse| to_rows(&inverse))
}

/// Solve the normal equations `(X'WX) b = X'Wz` for weighted least squares.
///
/// Returns the coefficients together with `(X'WX)^-1`.
pub fn weighted_least_squares(
    x: &Mat<f64>,
    weights: &[f64],
    z: &[f64],
) -> Result<(Vec<f64>, Mat<f64>), ModelError> {
    let n = x.nrows();
    let p = x.ncols();
    if weights.len() != n || z.len() != n {
        return Err(ModelError::DimensionMismatch {
            what: "weighted least squares inputs".to_string(),
            expected: n,
            actual: weights.len().min(z.len()),
        });
    }

    // Scale rows by sqrt(w) so that X'WX = Xw' Xw
    let xw = Mat::from_fn(n, p, |i, j| weights[i].sqrt() * x[(i, j)]);
    let xtwx = xw.transpose() * &xw;

    let xtwz: Vec<f64> = (0..p)
        .map(|j| (0..n).map(|i| x[(i, j)] * weights[i] * z[i]).sum())
        .collect();

    let inverse = invert_spd(&xtwx).ok_or(ModelError::SingularDesign)?;
    let coefficients = mat_vec(&inverse, &xtwz);

    Ok((coefficients, inverse))
}

/// Dense matrix-vector product.
pub fn mat_vec(matrix: &Mat<f64>, v: &[f64]) -> Vec<f64> {
    (0..matrix.nrows())
        .map(|i| (0..matrix.ncols()).map(|j| matrix[(i, j)] * v[j]).sum())
        .collect()
}

/// Copy a matrix into nested rows (for serialization).
pub fn to_rows(matrix: &Mat<f64>) -> Vec<Vec<f64>> {
    (0..matrix.nrows())
        .map(|i| (0..matrix.ncols()).map(|j| matrix[(i, j)]).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_spd_2x2() {
        let m = Mat::from_fn(2, 2, |i, j| [[4.0, 2.0], [2.0, 3.0]][i][j]);
        let inv = invert_spd(&m).unwrap();
        // det = 8, inverse = [[3, -2], [-2, 4]] / 8
        assert!((inv[(0, 0)] - 0.375).abs() < 1e-12);
        assert!((inv[(0, 1)] + 0.25).abs() < 1e-12);
        assert!((inv[(1, 1)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_invert_spd_rejects_indefinite() {
        let m = Mat::from_fn(2, 2, |i, j| [[1.0, 2.0], [2.0, 1.0]][i][j]);
        assert!(invert_spd(&m).is_none());
    }

    #[test]
    fn test_invert_spd_rows_matches_matrix_form() {
        let inv = invert_spd_rows(&[vec![4.0, 2.0], vec![2.0, 3.0]]).unwrap();
        assert!((inv[0][0] - 0.375).abs() < 1e-12);
        assert!((inv[1][0] + 0.25).abs() < 1e-12);
        assert!(invert_spd_rows(&[vec![1.0, 2.0]]).is_none());
    }

    #[test]
    fn test_weighted_least_squares_exact_line() {
        // y = 1 + 2x
        let x = Mat::from_fn(4, 2, |i, j| if j == 0 { 1.0 } else { i as f64 });
        let z = vec![1.0, 3.0, 5.0, 7.0];
        let (coef, _) = weighted_least_squares(&x, &[1.0; 4], &z).unwrap();
        assert!((coef[0] - 1.0).abs() < 1e-10);
        assert!((coef[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_weighted_least_squares_collinear() {
        // Second column is twice the first: X'X = [[4, 8], [8, 16]]
        let x = Mat::from_fn(4, 2, |_, j| (j + 1) as f64);
        let result = weighted_least_squares(&x, &[1.0; 4], &[1.0, 2.0, 3.0, 4.0]);
        assert!(matches!(result, Err(ModelError::SingularDesign)));
    }
}
