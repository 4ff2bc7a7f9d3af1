//! Time-series CAPM regressions.

use crate::error::{ModelError, Result};
use crate::ols::{CovarianceType, ols};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// CAPM alpha and beta of one return series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapmEstimate {
    /// Intercept
    pub alpha: f64,
    /// Market beta
    pub beta: f64,
    /// t-statistic of alpha
    pub alpha_t: f64,
    /// t-statistic of beta
    pub beta_t: f64,
    /// R²
    pub r_squared: f64,
    /// Observations used
    pub n_obs: usize,
}

/// Regress excess returns on market excess returns.
///
/// Pairs where either value is not finite are dropped. With `lags` the
/// t-statistics use Newey-West standard errors.
pub fn estimate_capm(ret_excess: &[f64], mkt_excess: &[f64], lags: Option<usize>) -> Result<CapmEstimate> {
    if ret_excess.len() != mkt_excess.len() {
        return Err(ModelError::DimensionMismatch {
            expected: ret_excess.len(),
            actual: mkt_excess.len(),
        });
    }
    let (y, x): (Vec<f64>, Vec<f64>) = ret_excess
        .iter()
        .zip(mkt_excess)
        .filter(|(r, m)| r.is_finite() && m.is_finite())
        .map(|(r, m)| (*r, *m))
        .unzip();

    let n = y.len();
    let x = Array2::from_shape_vec((n, 1), x).map_err(|e| ModelError::InvalidParameter(e.to_string()))?;
    let covariance = match lags {
        Some(lags) => CovarianceType::NeweyWest { lags: Some(lags) },
        None => CovarianceType::Classical,
    };
    let fit = ols(&Array1::from(y), &x, true, &covariance)?;
    Ok(CapmEstimate {
        alpha: fit.coefficients[0],
        beta: fit.coefficients[1],
        alpha_t: fit.t_stats[0],
        beta_t: fit.t_stats[1],
        r_squared: fit.r_squared,
        n_obs: n,
    })
}
