//! Portfolio choice: mean-variance on industry portfolios and a parametric
//! policy on the CRSP cross-section.

use super::require_table;
use super::sorts::{SortVariable, lagged_values};
use crate::config::PortfolioChoiceSettings;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use serde::Serialize;
use std::collections::BTreeMap;
use tidyfin_data::Database;
use tidyfin_data::store::tables::{CRSP_MONTHLY, INDUSTRIES_FF_MONTHLY};
use tidyfin_factors::standardize::zscore;
use tidyfin_models::linalg::{column_means, sample_covariance};
use tidyfin_models::portfolio_choice::{FrontierPoint, efficient_frontier, evaluate_policy};
use tidyfin_models::{
    CrossSection, PolicyEvaluation, ThetaOptimization, efficient_weights, minimum_variance_weights, optimize_theta,
};
use tidyfin_output::Table;
use tidyfin_output::table::format_number;
use tracing::{debug, info};

/// Characteristics tilting the parametric policy, lagged one month.
pub const POLICY_CHARACTERISTICS: [SortVariable; 2] = [SortVariable::Size, SortVariable::Momentum];

/// Weights of one industry in both mean-variance portfolios.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetWeight {
    /// Industry portfolio
    pub asset: String,
    /// Weight in the minimum-variance portfolio
    pub minimum_variance: f64,
    /// Weight in the efficient portfolio
    pub efficient: f64,
}

/// Outcome of [`mean_variance`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeanVarianceResult {
    /// Months with a return for every industry
    pub n_months: usize,
    /// Expected return targeted by the efficient portfolio
    pub target: f64,
    /// Per-industry weights
    pub weights: Vec<AssetWeight>,
    /// Mixes of the two portfolios
    pub frontier: Vec<FrontierPoint>,
}

impl MeanVarianceResult {
    /// Weights of both portfolios.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(
            format!(
                "Mean-variance weights ({} months, target {}% per month)",
                self.n_months,
                format_number(100.0 * self.target, 2)
            ),
            ["industry", "minimum variance", "efficient"],
        );
        for w in &self.weights {
            table.push_row([
                w.asset.clone(),
                format_number(w.minimum_variance, 3),
                format_number(w.efficient, 3),
            ]);
        }
        table
    }
}

/// Weight on the efficient portfolio along the traced frontier.
fn frontier_mixes() -> Vec<f64> {
    (-4..=19).map(|i| f64::from(i) / 10.0).collect()
}

/// Minimum-variance and efficient portfolios of the industry portfolios.
///
/// Moments are estimated from months where every industry has a return.
/// The efficient portfolio targets `target_multiple` times the highest mean.
pub fn mean_variance(db: &Database, settings: &PortfolioChoiceSettings) -> Result<MeanVarianceResult> {
    require_table(db, INDUSTRIES_FF_MONTHLY, "run `tidyfin download industries` first")?;
    let industries = db.load_industries()?;
    let complete: Vec<Vec<f64>> = industries
        .values
        .iter()
        .filter_map(|row| row.iter().copied().collect::<Option<Vec<f64>>>())
        .collect();
    let n_assets = industries.columns.len();
    if n_assets < 2 || complete.len() <= n_assets {
        return Err(Error::InsufficientData(format!(
            "{} complete months for {n_assets} industries",
            complete.len()
        )));
    }

    let returns = Array2::from_shape_fn((complete.len(), n_assets), |(t, j)| complete[t][j]);
    let mu = column_means(&returns);
    let sigma = sample_covariance(&returns)?;
    let target = settings.target_multiple * mu.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mvp = minimum_variance_weights(&sigma)?;
    let efficient = efficient_weights(&sigma, &mu, target)?;
    let frontier = efficient_frontier(&sigma, &mu, target, &frontier_mixes())?;
    info!(months = complete.len(), industries = n_assets, "estimated mean-variance portfolios");

    let weights = industries
        .columns
        .iter()
        .zip(mvp.iter().zip(efficient.iter()))
        .map(|(asset, (m, e))| AssetWeight {
            asset: asset.clone(),
            minimum_variance: *m,
            efficient: *e,
        })
        .collect();
    Ok(MeanVarianceResult {
        n_months: complete.len(),
        target,
        weights,
        frontier,
    })
}

/// Performance of one policy, for export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyRow {
    /// Policy name
    pub policy: String,
    /// Average CRRA utility
    pub expected_utility: f64,
    /// Mean monthly excess return
    pub mean_return: f64,
    /// Volatility of monthly excess returns
    pub sd_return: f64,
    /// Monthly Sharpe ratio
    pub sharpe_ratio: f64,
    /// Months evaluated
    pub n_periods: usize,
}

impl PolicyRow {
    fn new(policy: &str, evaluation: &PolicyEvaluation) -> Self {
        Self {
            policy: policy.to_string(),
            expected_utility: evaluation.expected_utility,
            mean_return: evaluation.mean_return,
            sd_return: evaluation.sd_return,
            sharpe_ratio: evaluation.sharpe_ratio,
            n_periods: evaluation.n_periods,
        }
    }
}

/// Outcome of [`parametric_policy`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParametricPolicyResult {
    /// Characteristic names in `theta` order
    pub characteristics: Vec<String>,
    /// Optimal tilts
    pub theta: Vec<f64>,
    /// Value-weighted benchmark, then the optimal policy
    pub policies: Vec<PolicyRow>,
}

impl ParametricPolicyResult {
    /// Tilts followed by the performance of both policies.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(
            "Parametric portfolio policy",
            ["", "utility", "mean (%)", "sd (%)", "Sharpe"],
        );
        for (name, theta) in self.characteristics.iter().zip(&self.theta) {
            table.push_row([
                format!("theta {name}"),
                format_number(*theta, 3),
                String::new(),
                String::new(),
                String::new(),
            ]);
        }
        for p in &self.policies {
            table.push_row([
                p.policy.clone(),
                format_number(p.expected_utility, 4),
                format_number(100.0 * p.mean_return, 2),
                format_number(100.0 * p.sd_return, 2),
                format_number(p.sharpe_ratio, 3),
            ]);
        }
        table
    }
}

/// Monthly cross-sections with standardized lagged characteristics and
/// value weights as the benchmark.
///
/// Stocks need every characteristic, a positive lagged market cap and a
/// finite excess return. Months with fewer than `min_stocks` such stocks are
/// skipped.
pub fn policy_cross_sections(db: &Database, min_stocks: usize) -> Result<Vec<CrossSection>> {
    require_table(db, CRSP_MONTHLY, "run `tidyfin import crsp-monthly` first")?;
    let stocks = db.load_crsp_monthly()?;
    let lagged = POLICY_CHARACTERISTICS
        .iter()
        .map(|v| lagged_values(db, *v, &stocks))
        .collect::<Result<Vec<_>>>()?;

    let mut by_month: BTreeMap<NaiveDate, Vec<(Vec<f64>, f64, f64)>> = BTreeMap::new();
    for s in &stocks {
        if !(s.mktcap_lag > 0.0 && s.ret_excess.is_finite()) {
            continue;
        }
        let Some(values) = lagged
            .iter()
            .map(|l| l.get(&(s.permno, s.month)).copied().filter(|v| v.is_finite()))
            .collect::<Option<Vec<f64>>>()
        else {
            continue;
        };
        by_month
            .entry(s.month)
            .or_default()
            .push((values, s.mktcap_lag, s.ret_excess));
    }

    let k = POLICY_CHARACTERISTICS.len();
    let sections: Vec<CrossSection> = by_month
        .into_iter()
        .filter(|(_, members)| members.len() >= min_stocks)
        .map(|(month, members)| {
            let n = members.len();
            let mut characteristics = Array2::zeros((n, k));
            for j in 0..k {
                let column: Vec<f64> = members.iter().map(|m| m.0[j]).collect();
                for (i, z) in zscore(&column).into_iter().enumerate() {
                    characteristics[[i, j]] = z;
                }
            }
            let total: f64 = members.iter().map(|m| m.1).sum();
            CrossSection {
                month,
                characteristics,
                benchmark: members.iter().map(|m| m.1 / total).collect(),
                returns: members.iter().map(|m| m.2).collect(),
            }
        })
        .collect();
    debug!(months = sections.len(), "built policy cross-sections");
    Ok(sections)
}

/// Tilt value weights towards the characteristics that maximise average
/// CRRA utility and compare with the untilted benchmark.
pub fn parametric_policy(db: &Database, settings: &PortfolioChoiceSettings) -> Result<ParametricPolicyResult> {
    let sections = policy_cross_sections(db, settings.min_stocks)?;
    if sections.len() < 2 {
        return Err(Error::InsufficientData(format!(
            "{} months with at least {} stocks",
            sections.len(),
            settings.min_stocks
        )));
    }

    let config = ThetaOptimization {
        gamma: settings.gamma,
        allow_short_selling: settings.allow_short_selling,
        ..ThetaOptimization::default()
    };
    let zero = Array1::zeros(POLICY_CHARACTERISTICS.len());
    let theta = optimize_theta(&sections, &zero, &config)?;
    let benchmark = evaluate_policy(&zero, &sections, config.gamma, config.allow_short_selling)?;
    let optimal = evaluate_policy(&theta, &sections, config.gamma, config.allow_short_selling)?;
    info!(
        months = sections.len(),
        utility_gain = optimal.expected_utility - benchmark.expected_utility,
        "optimized parametric policy"
    );

    Ok(ParametricPolicyResult {
        characteristics: POLICY_CHARACTERISTICS.iter().map(|v| v.name().to_string()).collect(),
        theta: theta.to_vec(),
        policies: vec![
            PolicyRow::new("value weighted", &benchmark),
            PolicyRow::new("optimal policy", &optimal),
        ],
    })
}
