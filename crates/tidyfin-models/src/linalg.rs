//! Dense linear algebra helpers.
//!
//! The systems solved here are small (a handful of regressors or assets), so
//! Gauss-Jordan elimination with partial pivoting is sufficient.

use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, Axis};

/// Relative pivot threshold below which a matrix is treated as singular.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Invert a square matrix.
pub fn invert(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(ModelError::DimensionMismatch {
            expected: n,
            actual: matrix.ncols(),
        });
    }

    let scale = matrix.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);
    let mut a = matrix.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot_row, col]].abs() <= PIVOT_TOLERANCE * scale {
            return Err(ModelError::Singular);
        }
        if pivot_row != col {
            for k in 0..n {
                a.swap([pivot_row, k], [col, k]);
                inv.swap([pivot_row, k], [col, k]);
            }
        }

        let pivot = a[[col, col]];
        for k in 0..n {
            a[[col, k]] /= pivot;
            inv[[col, k]] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[[row, k]] -= factor * a[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }
    Ok(inv)
}

/// Solve `A x = b`.
pub fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    if a.nrows() != b.len() {
        return Err(ModelError::DimensionMismatch {
            expected: a.nrows(),
            actual: b.len(),
        });
    }
    Ok(invert(a)?.dot(b))
}

/// Prepend a column of ones.
pub fn add_intercept(x: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::<f64>::ones((x.nrows(), x.ncols() + 1));
    out.slice_mut(ndarray::s![.., 1..]).assign(x);
    out
}

/// Column means.
pub fn column_means(x: &Array2<f64>) -> Array1<f64> {
    x.mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()))
}

/// Sample covariance matrix of the columns (divides by `T - 1`).
pub fn sample_covariance(x: &Array2<f64>) -> Result<Array2<f64>> {
    let n = x.nrows();
    if n < 2 {
        return Err(ModelError::InsufficientData {
            required: 2,
            actual: n,
        });
    }
    let centered = x - &column_means(x);
    Ok(centered.t().dot(&centered) / (n - 1) as f64)
}

/// Build a row-major matrix from rows of equal length.
pub fn matrix_from_rows(rows: &[Vec<f64>], n_cols: usize) -> Result<Array2<f64>> {
    let mut flat = Vec::with_capacity(rows.len() * n_cols);
    for row in rows {
        if row.len() != n_cols {
            return Err(ModelError::DimensionMismatch {
                expected: n_cols,
                actual: row.len(),
            });
        }
        flat.extend_from_slice(row);
    }
    Array2::from_shape_vec((rows.len(), n_cols), flat)
        .map_err(|e| ModelError::InvalidParameter(e.to_string()))
}
