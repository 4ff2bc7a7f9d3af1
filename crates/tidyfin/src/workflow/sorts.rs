//! Portfolio sorts on lagged characteristics with CAPM performance.

use super::{load_betas, require_table};
use crate::config::Settings;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tidyfin_data::store::tables::{COMPUSTAT, CRSP_MONTHLY, FACTORS_FF3_MONTHLY};
use tidyfin_data::{Database, StockMonth};
use tidyfin_factors::characteristics::{book_to_market, lag_characteristic, log_mktcap, momentum_12_2};
use tidyfin_factors::sorts::{
    BivariateConfig, DoubleSortObservation, SortObservation, bivariate_sort, long_short, univariate_sort,
};
use tidyfin_factors::{CharacteristicValue, PortfolioReturn};
use tidyfin_models::estimate_capm;
use tidyfin_output::Table;
use tidyfin_output::table::format_number;
use tracing::info;

/// Characteristic a sort can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortVariable {
    /// Beta from five years of monthly returns
    BetaMonthly,
    /// Beta from three months of daily returns
    BetaDaily,
    /// Log market capitalisation
    Size,
    /// Book-to-market with Fama-French timing
    BookToMarket,
    /// Cumulative return from t-12 to t-2
    Momentum,
}

impl SortVariable {
    /// All variables.
    pub const ALL: [Self; 5] = [
        Self::BetaMonthly,
        Self::BetaDaily,
        Self::Size,
        Self::BookToMarket,
        Self::Momentum,
    ];

    /// Column-style name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BetaMonthly => "beta_monthly",
            Self::BetaDaily => "beta_daily",
            Self::Size => "log_mktcap",
            Self::BookToMarket => "bm",
            Self::Momentum => "mom_12_2",
        }
    }

    /// Months between observing the value and the sorted return.
    ///
    /// Momentum already skips the most recent month.
    pub const fn lag_months(&self) -> i32 {
        match self {
            Self::Momentum => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for SortVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SortVariable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "beta" | "beta_monthly" => Ok(Self::BetaMonthly),
            "beta_daily" => Ok(Self::BetaDaily),
            "size" | "log_mktcap" | "mktcap" => Ok(Self::Size),
            "bm" | "book_to_market" | "value" => Ok(Self::BookToMarket),
            "mom" | "momentum" | "mom_12_2" => Ok(Self::Momentum),
            other => Err(Error::UnknownVariable(other.to_string())),
        }
    }
}

/// Values of `variable` for every stock-month where it is defined.
pub fn characteristic_values(
    db: &Database,
    variable: SortVariable,
    stocks: &[StockMonth],
) -> Result<Vec<CharacteristicValue>> {
    let values = match variable {
        SortVariable::BetaMonthly | SortVariable::BetaDaily => load_betas(db)?
            .into_iter()
            .filter_map(|row| {
                let beta = if variable == SortVariable::BetaMonthly {
                    row.beta_monthly
                } else {
                    row.beta_daily
                };
                Some(CharacteristicValue {
                    permno: row.permno,
                    month: row.month,
                    value: beta?,
                })
            })
            .collect(),
        SortVariable::Size => stocks
            .iter()
            .filter_map(|s| {
                Some(CharacteristicValue {
                    permno: s.permno,
                    month: s.month,
                    value: log_mktcap(s.mktcap)?,
                })
            })
            .collect(),
        SortVariable::BookToMarket => {
            require_table(db, COMPUSTAT, "run `tidyfin import compustat` first")?;
            book_to_market(stocks, &db.load_compustat()?)
        }
        SortVariable::Momentum => {
            let returns: Vec<(i64, NaiveDate, f64)> = stocks.iter().map(|s| (s.permno, s.month, s.ret)).collect();
            momentum_12_2(&returns)
        }
    };
    Ok(values)
}

/// Lagged values of `variable` keyed by (permno, return month).
pub(crate) fn lagged_values(
    db: &Database,
    variable: SortVariable,
    stocks: &[StockMonth],
) -> Result<HashMap<(i64, NaiveDate), f64>> {
    let values = characteristic_values(db, variable, stocks)?;
    Ok(lag_characteristic(&values, variable.lag_months()))
}

/// Average return and CAPM regression of one portfolio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioPerformance {
    /// Portfolio label (`1` holds the lowest values, `high-low` is the spread)
    pub label: String,
    /// Mean monthly excess return
    pub mean_ret_excess: f64,
    /// CAPM alpha
    pub alpha: f64,
    /// Newey-West t-statistic of alpha
    pub alpha_t: f64,
    /// CAPM beta
    pub beta: f64,
    /// Months with a return
    pub n_months: usize,
}

fn performance(
    label: String,
    series: &[(NaiveDate, f64)],
    market: &HashMap<NaiveDate, f64>,
    lags: usize,
) -> Result<PortfolioPerformance> {
    let (ret, mkt): (Vec<f64>, Vec<f64>) = series
        .iter()
        .filter_map(|(month, r)| Some((*r, *market.get(month)?)))
        .unzip();
    let capm = estimate_capm(&ret, &mkt, Some(lags))?;
    Ok(PortfolioPerformance {
        label,
        mean_ret_excess: ret.iter().sum::<f64>() / ret.len() as f64,
        alpha: capm.alpha,
        alpha_t: capm.alpha_t,
        beta: capm.beta,
        n_months: capm.n_obs,
    })
}

/// Monthly portfolio returns and their performance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortResult {
    /// Sorting variable
    pub variable: SortVariable,
    /// Portfolio returns by (month, portfolio)
    pub returns: Vec<PortfolioReturn>,
    /// Performance of each portfolio followed by the high-minus-low spread
    pub performance: Vec<PortfolioPerformance>,
}

impl SortResult {
    /// Performance as a table in percent.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(
            format!("Portfolios sorted on {}", self.variable),
            ["portfolio", "mean (%)", "alpha (%)", "t(alpha)", "beta", "months"],
        );
        for p in &self.performance {
            table.push_row([
                p.label.clone(),
                format_number(100.0 * p.mean_ret_excess, 3),
                format_number(100.0 * p.alpha, 3),
                format_number(p.alpha_t, 2),
                format_number(p.beta, 3),
                p.n_months.to_string(),
            ]);
        }
        table
    }
}

fn summarise_sort(
    db: &Database,
    variable: SortVariable,
    returns: Vec<PortfolioReturn>,
    n_portfolios: usize,
    lags: usize,
) -> Result<SortResult> {
    if returns.is_empty() {
        return Err(Error::InsufficientData(format!(
            "no month has enough stocks to sort on {variable}"
        )));
    }
    let market: HashMap<NaiveDate, f64> = db
        .load_factors(FACTORS_FF3_MONTHLY)?
        .into_iter()
        .map(|f| (f.date, f.mkt_excess))
        .collect();

    let mut by_portfolio: BTreeMap<usize, Vec<(NaiveDate, f64)>> = BTreeMap::new();
    for r in &returns {
        by_portfolio.entry(r.portfolio).or_default().push((r.month, r.ret_excess));
    }
    let mut rows = by_portfolio
        .into_iter()
        .map(|(portfolio, series)| performance(portfolio.to_string(), &series, &market, lags))
        .collect::<Result<Vec<_>>>()?;

    let spread: Vec<(NaiveDate, f64)> = long_short(&returns, n_portfolios, 1)
        .into_iter()
        .map(|r| (r.month, r.ret_excess))
        .collect();
    rows.push(performance("high-low".to_string(), &spread, &market, lags)?);

    Ok(SortResult {
        variable,
        returns,
        performance: rows,
    })
}

/// Univariate sort on the lagged `variable`.
///
/// Portfolio alphas regress portfolio excess returns on the market excess
/// return of `factors_ff3_monthly` with Newey-West standard errors.
pub fn portfolio_sort(db: &Database, variable: SortVariable, settings: &Settings) -> Result<SortResult> {
    require_table(db, CRSP_MONTHLY, "run `tidyfin import crsp-monthly` first")?;
    require_table(db, FACTORS_FF3_MONTHLY, "run `tidyfin download ff3` first")?;

    let stocks = db.load_crsp_monthly()?;
    let lagged = lagged_values(db, variable, &stocks)?;
    let observations: Vec<SortObservation> = stocks
        .iter()
        .filter_map(|s| {
            Some(SortObservation {
                permno: s.permno,
                month: s.month,
                sort_value: *lagged.get(&(s.permno, s.month))?,
                ret_excess: s.ret_excess,
                mktcap_lag: s.mktcap_lag,
                exchange: s.exchange,
            })
        })
        .collect();
    info!(%variable, observations = observations.len(), "sorting portfolios");

    let config = settings.sorts.sort_config();
    let returns = univariate_sort(&observations, &config)?;
    summarise_sort(db, variable, returns, config.n_portfolios, settings.sorts.nw_lags)
}

/// Double sort on `variable` controlling for `control` in `n_control` groups.
pub fn double_sort(
    db: &Database,
    variable: SortVariable,
    control: SortVariable,
    n_control: usize,
    dependent: bool,
    settings: &Settings,
) -> Result<SortResult> {
    require_table(db, CRSP_MONTHLY, "run `tidyfin import crsp-monthly` first")?;
    require_table(db, FACTORS_FF3_MONTHLY, "run `tidyfin download ff3` first")?;

    let stocks = db.load_crsp_monthly()?;
    let main = lagged_values(db, variable, &stocks)?;
    let controls = lagged_values(db, control, &stocks)?;
    let observations: Vec<DoubleSortObservation> = stocks
        .iter()
        .filter_map(|s| {
            let key = (s.permno, s.month);
            Some(DoubleSortObservation {
                base: SortObservation {
                    permno: s.permno,
                    month: s.month,
                    sort_value: *main.get(&key)?,
                    ret_excess: s.ret_excess,
                    mktcap_lag: s.mktcap_lag,
                    exchange: s.exchange,
                },
                control_value: *controls.get(&key)?,
            })
        })
        .collect();
    info!(%variable, %control, observations = observations.len(), "double sorting portfolios");

    let config = BivariateConfig {
        n_main: settings.sorts.n_portfolios,
        n_control,
        weighting: settings.sorts.weighting,
        nyse_breakpoints: settings.sorts.nyse_breakpoints,
        dependent,
    };
    let returns = bivariate_sort(&observations, &config)?;
    summarise_sort(db, variable, returns, config.n_main, settings.sorts.nw_lags)
}
