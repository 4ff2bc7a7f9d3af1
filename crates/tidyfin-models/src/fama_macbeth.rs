//! Fama-MacBeth (1973) two-pass cross-sectional regressions.
//!
//! Each period the excess returns are regressed on the lagged
//! characteristics; the risk premium of a characteristic is the time-series
//! average of its period slopes and its standard error comes from the time
//! series of slopes (plain or Newey-West).

use crate::error::{ModelError, Result};
use crate::linalg::matrix_from_rows;
use crate::newey_west::mean_standard_error;
use crate::ols::{CovarianceType, ols};
use chrono::NaiveDate;
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One stock-period observation.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSectionObservation {
    /// Period (month)
    pub period: NaiveDate,
    /// Dependent variable, usually the excess return
    pub y: f64,
    /// Regressors, in the same order for every observation
    pub x: Vec<f64>,
}

/// Fama-MacBeth settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamaMacBethConfig {
    /// Minimum observations per period; `None` requires `k + 2`
    pub min_obs: Option<usize>,
    /// Newey-West lags for the time series of slopes
    pub nw_lags: usize,
}

impl Default for FamaMacBethConfig {
    fn default() -> Self {
        Self {
            min_obs: None,
            nw_lags: 6,
        }
    }
}

/// Slopes of a single period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodCoefficients {
    /// Period
    pub period: NaiveDate,
    /// Intercept followed by the regressor slopes
    pub coefficients: Vec<f64>,
    /// Cross-sectional observations used
    pub n_obs: usize,
}

/// Risk premium estimate of one regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPremium {
    /// Regressor name (`intercept` for the constant)
    pub name: String,
    /// Time-series mean of the slopes
    pub estimate: f64,
    /// t-statistic with the plain standard error
    pub t_stat: f64,
    /// t-statistic with the Newey-West standard error
    pub t_stat_nw: f64,
}

/// Output of [`fama_macbeth`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamaMacBethResult {
    /// Intercept first, then one entry per regressor
    pub premia: Vec<RiskPremium>,
    /// First-pass slopes per period
    pub periods: Vec<PeriodCoefficients>,
}

impl FamaMacBethResult {
    /// Premium of a named regressor.
    pub fn premium(&self, name: &str) -> Option<&RiskPremium> {
        self.premia.iter().find(|p| p.name == name)
    }
}

/// Run the two passes.
///
/// `names` labels the regressors. Periods with too few observations or a
/// singular design are skipped.
pub fn fama_macbeth(
    observations: &[CrossSectionObservation],
    names: &[&str],
    config: &FamaMacBethConfig,
) -> Result<FamaMacBethResult> {
    let k = names.len();
    let min_obs = config.min_obs.unwrap_or(k + 2).max(k + 2);

    let mut by_period: BTreeMap<NaiveDate, Vec<&CrossSectionObservation>> = BTreeMap::new();
    for obs in observations {
        if obs.x.len() != k {
            return Err(ModelError::DimensionMismatch {
                expected: k,
                actual: obs.x.len(),
            });
        }
        if obs.y.is_finite() && obs.x.iter().all(|v| v.is_finite()) {
            by_period.entry(obs.period).or_default().push(obs);
        }
    }

    let mut periods: Vec<PeriodCoefficients> = by_period
        .into_par_iter()
        .filter_map(|(period, rows)| {
            if rows.len() < min_obs {
                return None;
            }
            let y = Array1::from_iter(rows.iter().map(|r| r.y));
            let x_rows: Vec<Vec<f64>> = rows.iter().map(|r| r.x.clone()).collect();
            let x = matrix_from_rows(&x_rows, k).ok()?;
            match ols(&y, &x, true, &CovarianceType::Classical) {
                Ok(fit) => Some(PeriodCoefficients {
                    period,
                    coefficients: fit.coefficients.to_vec(),
                    n_obs: fit.n_obs,
                }),
                Err(e) => {
                    debug!(%period, error = %e, "skipping cross-section");
                    None
                }
            }
        })
        .collect();
    periods.sort_by_key(|p| p.period);

    let t = periods.len();
    if t < 2 {
        return Err(ModelError::InsufficientData { required: 2, actual: t });
    }

    let labels = std::iter::once("intercept").chain(names.iter().copied());
    let premia = labels
        .enumerate()
        .map(|(j, name)| -> Result<RiskPremium> {
            let series: Vec<f64> = periods.iter().map(|p| p.coefficients[j]).collect();
            let mean = series.iter().sum::<f64>() / t as f64;
            let var = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (t - 1) as f64;
            let se = (var / t as f64).sqrt();
            let se_nw = mean_standard_error(&series, config.nw_lags)?;
            Ok(RiskPremium {
                name: name.to_string(),
                estimate: mean,
                t_stat: mean / se,
                t_stat_nw: mean / se_nw,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FamaMacBethResult { premia, periods })
}
