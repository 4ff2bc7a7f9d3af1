//! Univariate predictive regressions of the equity premium.

use super::require_table;
use crate::error::{Error, Result};
use ndarray::{Array1, Array2};
use serde::Serialize;
use tidyfin_data::Database;
use tidyfin_data::sources::macro_predictors::PREDICTOR_NAMES;
use tidyfin_data::store::tables::MACRO_PREDICTORS;
use tidyfin_models::{CovarianceType, ols};
use tidyfin_output::Table;
use tidyfin_output::table::format_number;

/// Regression of next month's equity premium on one predictor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictiveRegression {
    /// Predictor name
    pub predictor: String,
    /// Slope
    pub coefficient: f64,
    /// Newey-West t-statistic of the slope
    pub t_stat: f64,
    /// R-squared
    pub r_squared: f64,
    /// Months used
    pub n_obs: usize,
}

/// Regress `rp_div` on each Welch-Goyal predictor separately.
///
/// `rp_div` in a row is the premium of the following month, so every
/// regression is predictive. Months with a missing predictor are dropped.
pub fn predictive_regressions(db: &Database, nw_lags: usize) -> Result<Vec<PredictiveRegression>> {
    require_table(db, MACRO_PREDICTORS, "run `tidyfin download macro` first")?;
    let rows = db.load_macro_predictors()?;
    if rows.is_empty() {
        return Err(Error::InsufficientData("macro_predictors is empty".into()));
    }

    PREDICTOR_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| -> Result<PredictiveRegression> {
            let (y, x): (Vec<f64>, Vec<f64>) = rows
                .iter()
                .map(|r| (r.rp_div, r.values()[i]))
                .filter(|(y, x)| y.is_finite() && x.is_finite())
                .unzip();
            let design = Array2::from_shape_fn((x.len(), 1), |(row, _)| x[row]);
            let fit = ols(
                &Array1::from(y),
                &design,
                true,
                &CovarianceType::NeweyWest { lags: Some(nw_lags) },
            )?;
            Ok(PredictiveRegression {
                predictor: (*name).to_string(),
                coefficient: fit.coefficients[1],
                t_stat: fit.t_stats[1],
                r_squared: fit.r_squared,
                n_obs: fit.n_obs,
            })
        })
        .collect()
}

/// Regressions as a table.
pub fn predictive_table(regressions: &[PredictiveRegression]) -> Table {
    let mut table = Table::new(
        "Predictive regressions of the equity premium",
        ["predictor", "coefficient", "t-stat (NW)", "R2 (%)", "months"],
    );
    for r in regressions {
        table.push_row([
            r.predictor.clone(),
            format_number(r.coefficient, 4),
            format_number(r.t_stat, 2),
            format_number(100.0 * r.r_squared, 2),
            r.n_obs.to_string(),
        ]);
    }
    table
}
