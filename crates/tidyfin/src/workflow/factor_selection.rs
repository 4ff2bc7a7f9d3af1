//! Penalized selection of industry return drivers.
//!
//! Each industry's excess return is regressed on the Fama-French three
//! factors and the Welch-Goyal predictors of the same month. The mixing
//! weight and penalty of the elastic net are chosen by cross validation over
//! contiguous folds, so no fold trains on months after its test block.

use super::require_table;
use crate::config::FactorSelectionSettings;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::collections::HashMap;
use tidyfin_data::Database;
use tidyfin_data::sources::macro_predictors::PREDICTOR_NAMES;
use tidyfin_data::store::tables::{FACTORS_FF3_MONTHLY, INDUSTRIES_FF_MONTHLY, MACRO_PREDICTORS};
use tidyfin_models::{ElasticNet, ElasticNetConfig, cross_validate, lambda_max, lambda_path};
use tidyfin_output::Table;
use tidyfin_output::table::format_number;
use tracing::{debug, info};

/// Factor regressors, ahead of the macro predictors.
pub const FACTOR_REGRESSORS: [&str; 3] = ["mkt_excess", "smb", "hml"];

/// Tuned elastic net for one industry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndustrySelection {
    /// Industry portfolio
    pub industry: String,
    /// Chosen mixing weight
    pub alpha: f64,
    /// Chosen penalty
    pub lambda: f64,
    /// Cross-validated mean squared error at the chosen point
    pub cv_mse: f64,
    /// Months used
    pub n_obs: usize,
    /// Regressors with a nonzero slope
    pub n_selected: usize,
    /// Names of those regressors, comma-separated
    pub selected: String,
}

/// One slope of a refitted model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedCoefficient {
    /// Industry portfolio
    pub industry: String,
    /// Regressor
    pub regressor: String,
    /// Slope on the original scale
    pub coefficient: f64,
}

/// Outcome of [`select_factors`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorSelectionResult {
    /// One entry per industry
    pub industries: Vec<IndustrySelection>,
    /// Every slope, zero or not
    pub coefficients: Vec<SelectedCoefficient>,
}

impl FactorSelectionResult {
    /// Industries with their tuning and selected regressors.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(
            "Elastic-net selection of industry return drivers",
            ["industry", "alpha", "lambda", "CV MSE", "months", "selected"],
        );
        for s in &self.industries {
            table.push_row([
                s.industry.clone(),
                format_number(s.alpha, 2),
                format!("{:.2e}", s.lambda),
                format!("{:.2e}", s.cv_mse),
                s.n_obs.to_string(),
                if s.selected.is_empty() {
                    "none".to_string()
                } else {
                    s.selected.clone()
                },
            ]);
        }
        table
    }
}

/// Regressor names in design-matrix order.
pub fn regressor_names() -> Vec<&'static str> {
    FACTOR_REGRESSORS.iter().chain(PREDICTOR_NAMES.iter()).copied().collect()
}

/// Regressors keyed by month, for months where all of them are finite.
fn regressors_by_month(db: &Database) -> Result<HashMap<NaiveDate, (Vec<f64>, f64)>> {
    let predictors: HashMap<NaiveDate, [f64; 13]> = db
        .load_macro_predictors()?
        .iter()
        .map(|m| (m.month, m.values()))
        .collect();
    Ok(db
        .load_factors(FACTORS_FF3_MONTHLY)?
        .into_iter()
        .filter_map(|f| {
            let values = predictors.get(&f.date)?;
            let mut row = vec![f.mkt_excess, f.smb, f.hml];
            row.extend_from_slice(values);
            row.iter()
                .all(|v| v.is_finite())
                .then_some((f.date, (row, f.rf)))
        })
        .collect())
}

/// Cross-validate and refit the elastic net of one industry.
pub fn select_for_industry(
    industry: &str,
    x: &Array2<f64>,
    y: &Array1<f64>,
    settings: &FactorSelectionSettings,
) -> Result<(IndustrySelection, Vec<SelectedCoefficient>)> {
    let names = regressor_names();
    let smallest_alpha = settings
        .alphas
        .iter()
        .copied()
        .filter(|a| *a > 0.0)
        .fold(1.0, f64::min);
    let lambdas = lambda_path(
        lambda_max(x, y, smallest_alpha),
        settings.n_lambdas,
        settings.min_lambda_ratio,
    );
    let cv = cross_validate(x, y, &settings.alphas, &lambdas, settings.folds)?;
    let model = ElasticNet::fit(x, y, &ElasticNetConfig::new(cv.best.alpha, cv.best.lambda))?;
    debug!(industry, alpha = cv.best.alpha, lambda = cv.best.lambda, "tuned elastic net");

    let coefficients: Vec<SelectedCoefficient> = names
        .iter()
        .zip(model.coefficients.iter())
        .map(|(name, b)| SelectedCoefficient {
            industry: industry.to_string(),
            regressor: (*name).to_string(),
            coefficient: *b,
        })
        .collect();
    let selected: Vec<&str> = coefficients
        .iter()
        .filter(|c| c.coefficient != 0.0)
        .map(|c| c.regressor.as_str())
        .collect();
    let selection = IndustrySelection {
        industry: industry.to_string(),
        alpha: cv.best.alpha,
        lambda: cv.best.lambda,
        cv_mse: cv.best.mse,
        n_obs: y.len(),
        n_selected: model.n_nonzero(),
        selected: selected.join(", "),
    };
    Ok((selection, coefficients))
}

/// Elastic-net regressions of every industry's excess return on the factors
/// and macro predictors of the same month.
pub fn select_factors(db: &Database, settings: &FactorSelectionSettings) -> Result<FactorSelectionResult> {
    require_table(db, INDUSTRIES_FF_MONTHLY, "run `tidyfin download industries` first")?;
    require_table(db, FACTORS_FF3_MONTHLY, "run `tidyfin download ff3` first")?;
    require_table(db, MACRO_PREDICTORS, "run `tidyfin download macro` first")?;

    let industries = db.load_industries()?;
    let regressors = regressors_by_month(db)?;
    let n_regressors = regressor_names().len();

    let mut result = FactorSelectionResult {
        industries: Vec::with_capacity(industries.columns.len()),
        coefficients: Vec::new(),
    };
    for (j, industry) in industries.columns.iter().enumerate() {
        let (rows, y): (Vec<&Vec<f64>>, Vec<f64>) = industries
            .dates
            .iter()
            .zip(&industries.values)
            .filter_map(|(date, values)| {
                let (row, rf) = regressors.get(date)?;
                let ret = values[j]?;
                Some((row, ret - rf))
            })
            .unzip();
        if y.len() < 2 * settings.folds {
            return Err(Error::InsufficientData(format!(
                "{industry} has {} months with factors and predictors, {} folds need at least {}",
                y.len(),
                settings.folds,
                2 * settings.folds
            )));
        }
        let x = Array2::from_shape_fn((y.len(), n_regressors), |(r, c)| rows[r][c]);
        let (selection, coefficients) = select_for_industry(industry, &x, &Array1::from(y), settings)?;
        result.industries.push(selection);
        result.coefficients.extend(coefficients);
    }

    if result.industries.is_empty() {
        return Err(Error::InsufficientData(format!("{INDUSTRIES_FF_MONTHLY} has no industries")));
    }
    info!(industries = result.industries.len(), "selected industry return drivers");
    Ok(result)
}
