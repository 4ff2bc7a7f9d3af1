//! Newey-West HAC (Heteroskedasticity and Autocorrelation Consistent) estimation
//!
//! The long-run covariance of a vector series adds lagged cross-products with
//! Bartlett kernel weights:
//! ```text
//! S = Γ_0 + Σ_{l=1}^{L} w_l * (Γ_l + Γ_l^T)
//! where:
//! - Γ_l = (1/T) Σ_{t=l+1}^T (g_t - ḡ)(g_{t-l} - ḡ)^T
//! - w_l = 1 - l/(L+1) (Bartlett kernel weights)
//! - L = lag length, by default ceil(4*(T/100)^(2/9))
//! ```
//!
//! The HAC standard error of a sample mean is `sqrt(S / T)`; the HAC
//! covariance of OLS coefficients uses `T * S` of the scores `x_t u_t` as
//! the meat of the sandwich.
//!
//! # References
//! - Newey, W. K., & West, K. D. (1987). "A Simple, Positive Semi-Definite,
//!   Heteroskedasticity and Autocorrelation Consistent Covariance Matrix."
//!   Econometrica, 55(3), 703-708.

use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Lag length from the Newey-West rule of thumb.
///
/// Formula: L = ceil(4 * (T/100)^(2/9))
pub fn optimal_lags(n_periods: usize) -> usize {
    let t = n_periods as f64;
    (4.0 * (t / 100.0).powf(2.0 / 9.0)).ceil() as usize
}

/// Bartlett kernel weight `1 - l/(L+1)`, zero beyond `max_lag`.
pub fn bartlett_weight(lag: usize, max_lag: usize) -> f64 {
    if lag == 0 {
        1.0
    } else if lag <= max_lag {
        1.0 - (lag as f64) / (max_lag as f64 + 1.0)
    } else {
        0.0
    }
}

/// Long-run covariance of the columns of `series`.
///
/// With `demean` the column means are removed first; scores of a fitted
/// regression are used as they are. Lags are clamped to `T - 1`.
pub fn long_run_covariance(series: ArrayView2<'_, f64>, lags: usize, demean: bool) -> Result<Array2<f64>> {
    let (n_periods, n_cols) = series.dim();
    if n_periods == 0 {
        return Err(ModelError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    let centered = if demean {
        let means = series
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_cols));
        &series - &means
    } else {
        series.to_owned()
    };

    let t = n_periods as f64;
    let mut cov = centered.t().dot(&centered) / t;
    let max_lag = lags.min(n_periods - 1);
    for lag in 1..=max_lag {
        let weight = bartlett_weight(lag, max_lag);
        let current = centered.slice(ndarray::s![lag.., ..]);
        let lagged = centered.slice(ndarray::s![..n_periods - lag, ..]);
        let gamma = current.t().dot(&lagged) / t;
        cov = cov + (&gamma + &gamma.t()) * weight;
    }
    Ok(cov)
}

/// Long-run variance of a single series.
pub fn long_run_variance(series: ArrayView1<'_, f64>, lags: usize) -> Result<f64> {
    let column = series.insert_axis(Axis(1));
    Ok(long_run_covariance(column, lags, true)?[[0, 0]])
}

/// HAC standard error of the sample mean of `series`.
pub fn mean_standard_error(series: &[f64], lags: usize) -> Result<f64> {
    let view = ArrayView1::from(series);
    let variance = long_run_variance(view, lags)?;
    Ok((variance.max(0.0) / series.len() as f64).sqrt())
}

/// HAC covariance of OLS coefficients.
///
/// `xtx_inv` is `(X'X)^{-1}`, `x` the design and `residuals` the fitted
/// residuals.
pub fn hac_coefficient_covariance(
    x: &Array2<f64>,
    residuals: &Array1<f64>,
    xtx_inv: &Array2<f64>,
    lags: usize,
) -> Result<Array2<f64>> {
    if x.nrows() != residuals.len() {
        return Err(ModelError::DimensionMismatch {
            expected: x.nrows(),
            actual: residuals.len(),
        });
    }
    let scores = x * &residuals.view().insert_axis(Axis(1));
    let meat = long_run_covariance(scores.view(), lags, false)? * x.nrows() as f64;
    Ok(xtx_inv.dot(&meat).dot(xtx_inv))
}
