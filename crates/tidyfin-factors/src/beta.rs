//! Rolling CAPM betas.
//!
//! For every stock and month the market beta is the OLS slope of the
//! stock's excess return on the market excess return over a trailing window
//! of calendar months. Stocks are independent, so the estimation is a
//! parallel map over stocks.
//!
//! Beta > 1: more sensitive than the market
//! Beta < 1: less sensitive than the market

use crate::error::{FactorError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tidyfin_data::dates::{floor_month, month_span};
use tidyfin_data::frame::{date_column, f64_values, required_dates, required_i64};
use tidyfin_data::sources::french::FactorRow;
use tidyfin_data::{StockDay, StockMonth};
use tracing::debug;

/// Rolling window configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetaConfig {
    /// Number of calendar months in the window, including the current one
    pub window_months: i32,
    /// Minimum number of return observations inside the window
    pub min_obs: usize,
}

impl BetaConfig {
    /// Five years of monthly returns, at least four years present.
    pub const fn monthly() -> Self {
        Self {
            window_months: 60,
            min_obs: 48,
        }
    }

    /// Three months of daily returns, at least 50 trading days present.
    pub const fn daily() -> Self {
        Self {
            window_months: 3,
            min_obs: 50,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.window_months < 1 || self.min_obs < 2 {
            return Err(FactorError::InvalidConfig(format!(
                "beta window of {} months with {} observations",
                self.window_months, self.min_obs
            )));
        }
        Ok(())
    }
}

impl Default for BetaConfig {
    fn default() -> Self {
        Self::monthly()
    }
}

/// One return observation used in the beta regression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaObservation {
    /// CRSP permanent number
    pub permno: i64,
    /// Month the observation belongs to (first day)
    pub month: NaiveDate,
    /// Stock excess return
    pub ret_excess: f64,
    /// Market excess return
    pub mkt_excess: f64,
}

/// Estimated beta of one stock at the end of one month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaEstimate {
    /// CRSP permanent number
    pub permno: i64,
    /// Last month of the estimation window
    pub month: NaiveDate,
    /// Slope on the market excess return
    pub beta: f64,
    /// Observations in the window
    pub n_obs: usize,
}

/// Stored row of the `beta` table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaRow {
    /// CRSP permanent number
    pub permno: i64,
    /// Month (first day)
    pub month: NaiveDate,
    /// Beta from monthly returns
    pub beta_monthly: Option<f64>,
    /// Beta from daily returns
    pub beta_daily: Option<f64>,
}

/// OLS slope of `y` on `x` with an intercept.
///
/// Returns `None` when fewer than two points are given or `x` is constant.
pub fn capm_slope(y: &[f64], x: &[f64]) -> Option<f64> {
    let n = y.len().min(x.len());
    if n < 2 {
        return None;
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;
    let (cov, var) = x[..n]
        .iter()
        .zip(&y[..n])
        .fold((0.0, 0.0), |(cov, var), (xi, yi)| {
            let dx = xi - mean_x;
            (cov + dx * (yi - mean_y), var + dx * dx)
        });
    (var > f64::EPSILON * n as f64).then(|| cov / var)
}

/// Rolling betas for the observations of a single stock.
///
/// The window for month `m` holds every observation whose month lies in
/// `(m - window_months, m]`.
pub fn roll_capm_estimation(observations: &[BetaObservation], config: &BetaConfig) -> Vec<BetaEstimate> {
    let Some(first) = observations.first() else {
        return Vec::new();
    };
    let permno = first.permno;
    let mut sorted: Vec<&BetaObservation> = observations.iter().collect();
    sorted.sort_by_key(|o| o.month);

    let mut months: Vec<NaiveDate> = sorted.iter().map(|o| o.month).collect();
    months.dedup();

    let mut estimates = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for month in months {
        while end < sorted.len() && sorted[end].month <= month {
            end += 1;
        }
        while start < end && month_span(sorted[start].month, month) >= config.window_months {
            start += 1;
        }
        let window = &sorted[start..end];
        if window.len() < config.min_obs {
            continue;
        }
        let y: Vec<f64> = window.iter().map(|o| o.ret_excess).collect();
        let x: Vec<f64> = window.iter().map(|o| o.mkt_excess).collect();
        if let Some(beta) = capm_slope(&y, &x) {
            estimates.push(BetaEstimate {
                permno,
                month,
                beta,
                n_obs: window.len(),
            });
        }
    }
    estimates
}

/// Rolling betas for every stock, estimated in parallel.
///
/// Results are sorted by (permno, month).
pub fn estimate_betas(observations: &[BetaObservation], config: &BetaConfig) -> Result<Vec<BetaEstimate>> {
    config.validate()?;

    let mut by_stock: BTreeMap<i64, Vec<BetaObservation>> = BTreeMap::new();
    for obs in observations {
        by_stock.entry(obs.permno).or_default().push(*obs);
    }
    debug!(stocks = by_stock.len(), ?config, "estimating rolling betas");

    let mut estimates: Vec<BetaEstimate> = by_stock
        .par_iter()
        .flat_map_iter(|(_, obs)| roll_capm_estimation(obs, config))
        .collect();
    estimates.sort_by_key(|e| (e.permno, e.month));
    Ok(estimates)
}

/// Pair monthly stock returns with the monthly market excess return.
pub fn monthly_observations(stocks: &[StockMonth], factors: &[FactorRow]) -> Vec<BetaObservation> {
    let market: HashMap<NaiveDate, f64> = factors
        .iter()
        .map(|f| (floor_month(f.date), f.mkt_excess))
        .collect();
    stocks
        .iter()
        .filter_map(|s| {
            Some(BetaObservation {
                permno: s.permno,
                month: s.month,
                ret_excess: s.ret_excess,
                mkt_excess: *market.get(&s.month)?,
            })
        })
        .collect()
}

/// Pair daily stock returns with the daily market excess return.
pub fn daily_observations(days: &[StockDay], factors: &[FactorRow]) -> Vec<BetaObservation> {
    let market: HashMap<NaiveDate, f64> = factors.iter().map(|f| (f.date, f.mkt_excess)).collect();
    days.iter()
        .filter_map(|d| {
            Some(BetaObservation {
                permno: d.permno,
                month: floor_month(d.date),
                ret_excess: d.ret_excess,
                mkt_excess: *market.get(&d.date)?,
            })
        })
        .collect()
}

/// Combine monthly and daily estimates into rows of the `beta` table.
pub fn merge_betas(monthly: &[BetaEstimate], daily: &[BetaEstimate]) -> Vec<BetaRow> {
    fn row<'a>(rows: &'a mut BTreeMap<(i64, NaiveDate), BetaRow>, e: &BetaEstimate) -> &'a mut BetaRow {
        rows.entry((e.permno, e.month)).or_insert(BetaRow {
            permno: e.permno,
            month: e.month,
            beta_monthly: None,
            beta_daily: None,
        })
    }

    let mut rows = BTreeMap::new();
    for e in monthly {
        row(&mut rows, e).beta_monthly = Some(e.beta);
    }
    for e in daily {
        row(&mut rows, e).beta_daily = Some(e.beta);
    }
    rows.into_values().collect()
}

impl BetaRow {
    /// Convert rows into a frame.
    pub fn to_frame(rows: &[Self]) -> Result<DataFrame> {
        let months: Vec<Option<NaiveDate>> = rows.iter().map(|r| Some(r.month)).collect();
        Ok(DataFrame::new(vec![
            Series::new("permno".into(), rows.iter().map(|r| r.permno).collect::<Vec<_>>()).into(),
            date_column("month", &months)?,
            Series::new(
                "beta_monthly".into(),
                rows.iter().map(|r| r.beta_monthly).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "beta_daily".into(),
                rows.iter().map(|r| r.beta_daily).collect::<Vec<_>>(),
            )
            .into(),
        ])?)
    }

    /// Read rows back from a frame.
    pub fn from_frame(df: &DataFrame) -> Result<Vec<Self>> {
        let permno = required_i64(df, "permno")?;
        let month = required_dates(df, "month")?;
        let monthly = f64_values(df, "beta_monthly")?;
        let daily = f64_values(df, "beta_daily")?;
        Ok((0..df.height())
            .map(|i| Self {
                permno: permno[i],
                month: month[i],
                beta_monthly: monthly[i],
                beta_daily: daily[i],
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tidyfin_data::dates::add_months;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
    }

    fn synthetic(permno: i64, beta: f64, months: i32) -> Vec<BetaObservation> {
        (0..months)
            .map(|i| {
                let mkt = ((i * 7 % 11) as f64 - 5.0) / 100.0;
                BetaObservation {
                    permno,
                    month: add_months(start(), i),
                    ret_excess: 0.001 + beta * mkt,
                    mkt_excess: mkt,
                }
            })
            .collect()
    }

    #[test]
    fn test_config_presets() {
        assert_eq!(BetaConfig::default(), BetaConfig::monthly());
        assert_eq!(BetaConfig::monthly().min_obs, 48);
        assert_eq!(BetaConfig::daily().window_months, 3);
    }

    #[test]
    fn test_capm_slope() {
        let x = [0.01, -0.02, 0.03, 0.0];
        let y: Vec<f64> = x.iter().map(|v| 0.5 + 1.5 * v).collect();
        assert_relative_eq!(capm_slope(&y, &x).unwrap(), 1.5, epsilon = 1e-10);
        assert_eq!(capm_slope(&[1.0, 2.0], &[0.3, 0.3]), None);
        assert_eq!(capm_slope(&[1.0], &[0.3]), None);
    }

    #[test]
    fn test_rolling_window_min_obs() {
        let obs = synthetic(1, 1.2, 70);
        let config = BetaConfig::monthly();
        let estimates = roll_capm_estimation(&obs, &config);
        // First estimate once 48 months are available.
        assert_eq!(estimates.len(), 70 - 47);
        assert_eq!(estimates[0].month, add_months(start(), 47));
        assert_eq!(estimates[0].n_obs, 48);
        assert_eq!(estimates.last().unwrap().n_obs, 60);
        for e in &estimates {
            assert_relative_eq!(e.beta, 1.2, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_gap_shrinks_window() {
        let mut obs = synthetic(1, 1.0, 10);
        obs.retain(|o| o.month != add_months(start(), 5));
        let config = BetaConfig {
            window_months: 3,
            min_obs: 3,
        };
        let months: Vec<NaiveDate> = roll_capm_estimation(&obs, &config)
            .iter()
            .map(|e| e.month)
            .collect();
        assert!(!months.contains(&add_months(start(), 5)));
        assert!(!months.contains(&add_months(start(), 6)));
        assert!(!months.contains(&add_months(start(), 7)));
        assert!(months.contains(&add_months(start(), 8)));
    }

    #[test]
    fn test_estimate_betas_parallel_sorted() {
        let mut obs = synthetic(2, 0.8, 60);
        obs.extend(synthetic(1, 1.5, 60));
        let estimates = estimate_betas(&obs, &BetaConfig::monthly()).unwrap();
        assert_eq!(estimates.len(), 2 * 13);
        assert_eq!(estimates[0].permno, 1);
        assert_relative_eq!(estimates[0].beta, 1.5, epsilon = 1e-10);
        assert_relative_eq!(estimates.last().unwrap().beta, 0.8, epsilon = 1e-10);
        assert!(
            estimates
                .windows(2)
                .all(|w| (w[0].permno, w[0].month) < (w[1].permno, w[1].month))
        );
    }

    #[test]
    fn test_invalid_config() {
        let config = BetaConfig {
            window_months: 0,
            min_obs: 10,
        };
        assert!(estimate_betas(&[], &config).is_err());
    }

    #[test]
    fn test_merge_and_frame_roundtrip() {
        let month = start();
        let monthly = vec![BetaEstimate {
            permno: 1,
            month,
            beta: 1.1,
            n_obs: 60,
        }];
        let daily = vec![
            BetaEstimate {
                permno: 1,
                month,
                beta: 0.9,
                n_obs: 61,
            },
            BetaEstimate {
                permno: 2,
                month,
                beta: 0.7,
                n_obs: 55,
            },
        ];
        let rows = merge_betas(&monthly, &daily);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].beta_monthly, Some(1.1));
        assert_eq!(rows[0].beta_daily, Some(0.9));
        assert_eq!(rows[1].beta_monthly, None);

        let df = BetaRow::to_frame(&rows).unwrap();
        assert_eq!(BetaRow::from_frame(&df).unwrap(), rows);
    }
}
