//! Portfolio sorts.
//!
//! Each month stocks are assigned to portfolios by breakpoints of a sorting
//! variable observed before the return month, and portfolio returns are the
//! value- or equal-weighted excess returns of their members.

use crate::error::{FactorError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tidyfin_data::Exchange;
use tracing::debug;

/// How portfolio members are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weighting {
    /// Weights proportional to lagged market capitalisation
    #[default]
    Value,
    /// Equal weights
    Equal,
}

/// Configuration of a univariate sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortConfig {
    /// Number of portfolios
    pub n_portfolios: usize,
    /// Member weighting
    pub weighting: Weighting,
    /// Compute breakpoints from NYSE stocks only
    pub nyse_breakpoints: bool,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            n_portfolios: 10,
            weighting: Weighting::Value,
            nyse_breakpoints: false,
        }
    }
}

/// One stock-month entering a sort.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortObservation {
    /// CRSP permanent number
    pub permno: i64,
    /// Return month
    pub month: NaiveDate,
    /// Sorting variable, known before the return month
    pub sort_value: f64,
    /// Excess return in the month
    pub ret_excess: f64,
    /// Market cap at the end of the previous month
    pub mktcap_lag: f64,
    /// Listing exchange
    pub exchange: Exchange,
}

/// Return of one portfolio in one month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReturn {
    /// Month (first day)
    pub month: NaiveDate,
    /// Portfolio number, 1 holds the lowest values
    pub portfolio: usize,
    /// Weighted excess return
    pub ret_excess: f64,
    /// Number of stocks in the portfolio
    pub n_stocks: usize,
}

/// Monthly return of a long-short strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LongShortReturn {
    /// Month (first day)
    pub month: NaiveDate,
    /// High minus low excess return
    pub ret_excess: f64,
}

/// Quantile of sorted values with linear interpolation between order statistics.
pub fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let position = p * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}

/// Interior breakpoints at the quantiles `1/n, ..., (n-1)/n`.
///
/// Non-finite values are ignored.
pub fn breakpoints(values: &[f64], n: usize) -> Vec<f64> {
    let probabilities: Vec<f64> = (1..n).map(|k| k as f64 / n as f64).collect();
    breakpoints_at(values, &probabilities)
}

/// Breakpoints at arbitrary probabilities.
pub fn breakpoints_at(values: &[f64], probabilities: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    probabilities
        .iter()
        .filter_map(|p| quantile(&sorted, *p))
        .collect()
}

/// Portfolio number for `value` given interior breakpoints.
///
/// Portfolio `k` covers `[b_{k-1}, b_k)`; values below the first breakpoint
/// fall in portfolio 1 and values at or above the last in the top portfolio.
/// Non-finite values belong to no portfolio.
pub fn assign_portfolio(value: f64, interior: &[f64]) -> Option<usize> {
    value
        .is_finite()
        .then(|| 1 + interior.iter().filter(|b| **b <= value).count())
}

/// Member weights summing to one.
///
/// Value weights fall back to equal weights when total market cap is zero.
pub fn member_weights(mktcap_lag: &[f64], weighting: Weighting) -> Vec<f64> {
    let n = mktcap_lag.len();
    if n == 0 {
        return Vec::new();
    }
    let total: f64 = mktcap_lag.iter().map(|m| m.max(0.0)).sum();
    match weighting {
        Weighting::Value if total > 0.0 => mktcap_lag.iter().map(|m| m.max(0.0) / total).collect(),
        _ => vec![1.0 / n as f64; n],
    }
}

/// Weighted excess return of a set of stocks.
pub fn portfolio_return(members: &[&SortObservation], weighting: Weighting) -> Option<f64> {
    if members.is_empty() {
        return None;
    }
    let caps: Vec<f64> = members.iter().map(|m| m.mktcap_lag).collect();
    Some(
        member_weights(&caps, weighting)
            .iter()
            .zip(members)
            .map(|(w, m)| w * m.ret_excess)
            .sum(),
    )
}

fn group_by_month<T, F>(items: &[T], month: F) -> BTreeMap<NaiveDate, Vec<&T>>
where
    F: Fn(&T) -> NaiveDate,
{
    let mut groups: BTreeMap<NaiveDate, Vec<&T>> = BTreeMap::new();
    for item in items {
        groups.entry(month(item)).or_default().push(item);
    }
    groups
}

fn interior_breakpoints<'a, I>(members: I, n: usize, nyse_only: bool) -> Option<Vec<f64>>
where
    I: Iterator<Item = &'a SortObservation>,
{
    let values: Vec<f64> = members
        .filter(|m| !nyse_only || m.exchange == Exchange::Nyse)
        .map(|m| m.sort_value)
        .filter(|v| v.is_finite())
        .collect();
    (values.len() >= n).then(|| breakpoints(&values, n))
}

fn validate_portfolios(n: usize) -> Result<()> {
    if n < 2 {
        return Err(FactorError::InvalidConfig(format!(
            "a sort needs at least two portfolios, got {n}"
        )));
    }
    Ok(())
}

/// Univariate portfolio sort.
///
/// Observations with a non-finite sorting value are dropped. Months with
/// fewer remaining stocks (or NYSE stocks, with NYSE breakpoints) than
/// portfolios are skipped. Results are sorted by (month, portfolio).
pub fn univariate_sort(observations: &[SortObservation], config: &SortConfig) -> Result<Vec<PortfolioReturn>> {
    validate_portfolios(config.n_portfolios)?;

    let mut returns = Vec::new();
    for (month, members) in group_by_month(observations, |o| o.month) {
        let members: Vec<&SortObservation> = members.into_iter().filter(|m| m.sort_value.is_finite()).collect();
        let Some(interior) = interior_breakpoints(
            members.iter().copied(),
            config.n_portfolios,
            config.nyse_breakpoints,
        ) else {
            debug!(%month, stocks = members.len(), "skipping month with too few stocks");
            continue;
        };

        let mut portfolios: BTreeMap<usize, Vec<&SortObservation>> = BTreeMap::new();
        for member in members {
            if let Some(portfolio) = assign_portfolio(member.sort_value, &interior) {
                portfolios.entry(portfolio).or_default().push(member);
            }
        }
        for (portfolio, stocks) in portfolios {
            if let Some(ret_excess) = portfolio_return(&stocks, config.weighting) {
                returns.push(PortfolioReturn {
                    month,
                    portfolio,
                    ret_excess,
                    n_stocks: stocks.len(),
                });
            }
        }
    }
    Ok(returns)
}

/// High-minus-low returns for months in which both legs exist.
pub fn long_short(returns: &[PortfolioReturn], high: usize, low: usize) -> Vec<LongShortReturn> {
    let mut legs: BTreeMap<NaiveDate, (Option<f64>, Option<f64>)> = BTreeMap::new();
    for r in returns {
        let entry = legs.entry(r.month).or_default();
        if r.portfolio == high {
            entry.0 = Some(r.ret_excess);
        }
        if r.portfolio == low {
            entry.1 = Some(r.ret_excess);
        }
    }
    legs.into_iter()
        .filter_map(|(month, (h, l))| {
            Some(LongShortReturn {
                month,
                ret_excess: h? - l?,
            })
        })
        .collect()
}

/// Configuration of a double sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BivariateConfig {
    /// Portfolios on the main variable
    pub n_main: usize,
    /// Groups on the control variable
    pub n_control: usize,
    /// Member weighting
    pub weighting: Weighting,
    /// Compute breakpoints from NYSE stocks only
    pub nyse_breakpoints: bool,
    /// Sort on the main variable within control groups instead of independently
    pub dependent: bool,
}

impl Default for BivariateConfig {
    fn default() -> Self {
        Self {
            n_main: 5,
            n_control: 5,
            weighting: Weighting::Value,
            nyse_breakpoints: false,
            dependent: false,
        }
    }
}

/// One stock-month entering a double sort.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoubleSortObservation {
    /// Observation carrying the main sorting variable
    pub base: SortObservation,
    /// Control variable
    pub control_value: f64,
}

/// Double sort on a main variable and a control variable.
///
/// Main-variable portfolio returns are averaged over the control groups
/// present in a month; `n_stocks` counts members across those groups.
/// Observations with a non-finite main or control value are dropped.
pub fn bivariate_sort(
    observations: &[DoubleSortObservation],
    config: &BivariateConfig,
) -> Result<Vec<PortfolioReturn>> {
    validate_portfolios(config.n_main)?;
    validate_portfolios(config.n_control)?;

    let mut returns = Vec::new();
    for (month, members) in group_by_month(observations, |o| o.base.month) {
        let members: Vec<&DoubleSortObservation> = members
            .into_iter()
            .filter(|m| m.base.sort_value.is_finite() && m.control_value.is_finite())
            .collect();
        let control_obs: Vec<SortObservation> = members
            .iter()
            .map(|m| SortObservation {
                sort_value: m.control_value,
                ..m.base
            })
            .collect();
        let Some(control_interior) =
            interior_breakpoints(control_obs.iter(), config.n_control, config.nyse_breakpoints)
        else {
            continue;
        };
        let main_interior = if config.dependent {
            None
        } else {
            match interior_breakpoints(members.iter().map(|m| &m.base), config.n_main, config.nyse_breakpoints) {
                Some(interior) => Some(interior),
                None => continue,
            }
        };

        let mut groups: BTreeMap<usize, Vec<&SortObservation>> = BTreeMap::new();
        for member in &members {
            if let Some(group) = assign_portfolio(member.control_value, &control_interior) {
                groups.entry(group).or_default().push(&member.base);
            }
        }

        let mut cells: BTreeMap<usize, Vec<(f64, usize)>> = BTreeMap::new();
        for group in groups.values() {
            let interior = match &main_interior {
                Some(interior) => interior.clone(),
                None => match interior_breakpoints(group.iter().copied(), config.n_main, config.nyse_breakpoints) {
                    Some(interior) => interior,
                    None => continue,
                },
            };
            let mut portfolios: BTreeMap<usize, Vec<&SortObservation>> = BTreeMap::new();
            for member in group {
                if let Some(portfolio) = assign_portfolio(member.sort_value, &interior) {
                    portfolios.entry(portfolio).or_default().push(member);
                }
            }
            for (portfolio, stocks) in portfolios {
                if let Some(ret) = portfolio_return(&stocks, config.weighting) {
                    cells.entry(portfolio).or_default().push((ret, stocks.len()));
                }
            }
        }

        for (portfolio, group_returns) in cells {
            let ret_excess =
                group_returns.iter().map(|(r, _)| r).sum::<f64>() / group_returns.len() as f64;
            returns.push(PortfolioReturn {
                month,
                portfolio,
                ret_excess,
                n_stocks: group_returns.iter().map(|(_, n)| n).sum(),
            });
        }
    }
    Ok(returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn month() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    fn obs(permno: i64, sort_value: f64, ret_excess: f64, mktcap_lag: f64) -> SortObservation {
        SortObservation {
            permno,
            month: month(),
            sort_value,
            ret_excess,
            mktcap_lag,
            exchange: Exchange::Nyse,
        }
    }

    #[rstest]
    #[case(0.0, 1.0)]
    #[case(0.5, 3.0)]
    #[case(0.25, 2.0)]
    #[case(0.1, 1.4)]
    #[case(1.0, 5.0)]
    fn test_quantile_interpolation(#[case] p: f64, #[case] expected: f64) {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(quantile(&sorted, p).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_quantile_edge_cases() {
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[1.0], 1.5), None);
        assert_eq!(quantile(&[7.0], 0.3), Some(7.0));
    }

    #[rstest]
    #[case(-10.0, 1)]
    #[case(2.0, 2)]
    #[case(2.5, 2)]
    #[case(3.0, 3)]
    #[case(99.0, 3)]
    fn test_assign_portfolio(#[case] value: f64, #[case] expected: usize) {
        assert_eq!(assign_portfolio(value, &[2.0, 3.0]), Some(expected));
    }

    #[rstest]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(f64::NEG_INFINITY)]
    fn test_non_finite_values_have_no_portfolio(#[case] value: f64) {
        assert_eq!(assign_portfolio(value, &[2.0, 3.0]), None);
    }

    #[test]
    fn test_sorts_drop_non_finite_values() {
        let config = SortConfig {
            n_portfolios: 3,
            weighting: Weighting::Equal,
            nyse_breakpoints: false,
        };
        // Two finite values cannot fill three portfolios.
        let sparse = vec![obs(1, 1.0, 0.01, 1.0), obs(2, f64::NAN, 0.5, 1.0), obs(3, 2.0, 0.02, 1.0)];
        assert!(univariate_sort(&sparse, &config).unwrap().is_empty());

        let observations = vec![
            obs(1, 1.0, 0.01, 1.0),
            obs(2, f64::NAN, 0.5, 1.0),
            obs(3, 2.0, 0.02, 1.0),
            obs(4, 3.0, 0.03, 1.0),
        ];
        let returns = univariate_sort(&observations, &config).unwrap();
        assert_eq!(returns.len(), 3);
        assert_eq!(returns.iter().map(|r| r.n_stocks).sum::<usize>(), 3);
        assert_relative_eq!(returns[0].ret_excess, 0.01);

        let double: Vec<DoubleSortObservation> = observations
            .iter()
            .map(|o| DoubleSortObservation {
                base: *o,
                control_value: if o.permno == 4 { f64::NAN } else { 1.0 },
            })
            .collect();
        let config = BivariateConfig {
            n_main: 2,
            n_control: 2,
            weighting: Weighting::Equal,
            nyse_breakpoints: false,
            dependent: false,
        };
        let returns = bivariate_sort(&double, &config).unwrap();
        assert_eq!(returns.iter().map(|r| r.n_stocks).sum::<usize>(), 2);
    }

    #[test]
    fn test_breakpoints_ignore_nan() {
        let bp = breakpoints(&[4.0, f64::NAN, 1.0, 3.0, 2.0, 5.0], 2);
        assert_eq!(bp, vec![3.0]);
    }

    #[test]
    fn test_member_weights() {
        assert_eq!(member_weights(&[1.0, 3.0], Weighting::Value), vec![0.25, 0.75]);
        assert_eq!(member_weights(&[1.0, 3.0], Weighting::Equal), vec![0.5, 0.5]);
        assert_eq!(member_weights(&[0.0, 0.0], Weighting::Value), vec![0.5, 0.5]);
    }

    #[test]
    fn test_univariate_value_weighted() {
        let observations = vec![
            obs(1, 0.1, 0.01, 100.0),
            obs(2, 0.2, 0.03, 300.0),
            obs(3, 0.9, 0.05, 50.0),
            obs(4, 1.0, 0.07, 50.0),
        ];
        let config = SortConfig {
            n_portfolios: 2,
            ..SortConfig::default()
        };
        let returns = univariate_sort(&observations, &config).unwrap();
        assert_eq!(returns.len(), 2);
        assert_relative_eq!(returns[0].ret_excess, 0.25 * 0.01 + 0.75 * 0.03);
        assert_relative_eq!(returns[1].ret_excess, 0.06);
        assert_eq!(returns[1].n_stocks, 2);

        let ls = long_short(&returns, 2, 1);
        assert_eq!(ls.len(), 1);
        assert_relative_eq!(ls[0].ret_excess, 0.06 - 0.025);
    }

    #[test]
    fn test_nyse_breakpoints_and_sparse_months() {
        let mut observations = vec![
            obs(1, 1.0, 0.0, 1.0),
            obs(2, 2.0, 0.0, 1.0),
            obs(3, 0.5, 0.0, 1.0),
            obs(4, 3.0, 0.0, 1.0),
        ];
        observations[2].exchange = Exchange::Nasdaq;
        observations[3].exchange = Exchange::Nasdaq;
        let config = SortConfig {
            n_portfolios: 2,
            weighting: Weighting::Equal,
            nyse_breakpoints: true,
        };
        let returns = univariate_sort(&observations, &config).unwrap();
        // NYSE median is 1.5: {0.5, 1.0} low, {2.0, 3.0} high.
        assert_eq!(returns[0].n_stocks, 2);
        assert_eq!(returns[1].n_stocks, 2);

        let too_few = vec![obs(1, 1.0, 0.0, 1.0)];
        assert!(univariate_sort(&too_few, &config).unwrap().is_empty());
        assert!(
            univariate_sort(
                &too_few,
                &SortConfig {
                    n_portfolios: 1,
                    ..config
                }
            )
            .is_err()
        );
    }

    #[test]
    fn test_bivariate_independent_and_dependent() {
        let observations: Vec<DoubleSortObservation> = (0..8)
            .map(|i| DoubleSortObservation {
                base: obs(i, (i % 4) as f64, if i % 4 >= 2 { 0.02 } else { 0.0 }, 1.0),
                control_value: if i < 4 { 1.0 } else { 10.0 },
            })
            .collect();
        for dependent in [false, true] {
            let config = BivariateConfig {
                n_main: 2,
                n_control: 2,
                weighting: Weighting::Equal,
                nyse_breakpoints: false,
                dependent,
            };
            let returns = bivariate_sort(&observations, &config).unwrap();
            assert_eq!(returns.len(), 2);
            assert_relative_eq!(returns[0].ret_excess, 0.0);
            assert_relative_eq!(returns[1].ret_excess, 0.02);
            assert_eq!(returns[1].n_stocks, 4);
        }
    }
}
