//! Firm characteristics.
//!
//! Characteristics are keyed by (permno, month) and only use information
//! available at the end of that month.

use crate::error::{FactorError, Result};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tidyfin_data::dates::add_months;
use tidyfin_data::frame::{date_column, f64_values, required_dates, required_i64};
use tidyfin_data::{FirmYear, StockMonth};

/// A characteristic computed on a stock-month frame.
pub trait Characteristic: Send + Sync {
    /// Output column name.
    fn name(&self) -> &str;

    /// Columns the input frame must provide.
    fn required_columns(&self) -> &[&str];

    /// Compute the characteristic.
    ///
    /// Returns a frame with `permno`, `month` and a column named
    /// [`Characteristic::name`].
    fn compute_scores(&self, data: LazyFrame) -> Result<LazyFrame>;

    /// Check that `df` has every required column, then compute.
    fn compute(&self, df: &DataFrame) -> Result<DataFrame> {
        let names = df.get_column_names();
        if let Some(missing) = self
            .required_columns()
            .iter()
            .find(|c| !names.iter().any(|n| n.as_str() == **c))
        {
            return Err(FactorError::MissingColumn((*missing).to_string()));
        }
        Ok(self.compute_scores(df.clone().lazy())?.collect()?)
    }
}

/// Natural logarithm of market capitalisation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMarketCap {
    /// Use the previous month's market cap instead of the current one
    pub lagged: bool,
}

impl Characteristic for LogMarketCap {
    fn name(&self) -> &str {
        if self.lagged { "log_mktcap_lag" } else { "log_mktcap" }
    }

    fn required_columns(&self) -> &[&str] {
        if self.lagged {
            &["permno", "month", "mktcap_lag"]
        } else {
            &["permno", "month", "mktcap"]
        }
    }

    fn compute_scores(&self, data: LazyFrame) -> Result<LazyFrame> {
        let source = if self.lagged { "mktcap_lag" } else { "mktcap" };
        Ok(data
            .filter(col(source).gt(lit(0.0)))
            .with_columns([col(source)
                .cast(DataType::Float64)
                .apply(
                    |c: Column| {
                        let s = c.as_materialized_series();
                        Ok(Some(s.f64()?.apply_values(f64::ln).into_series().into()))
                    },
                    GetOutput::from_type(DataType::Float64),
                )
                .alias(self.name())])
            .select([col("permno"), col("month"), col(self.name())]))
    }
}

/// Cumulative return over months t-12 to t-2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Momentum;

impl Characteristic for Momentum {
    fn name(&self) -> &str {
        "mom_12_2"
    }

    fn required_columns(&self) -> &[&str] {
        &["permno", "month", "ret"]
    }

    fn compute_scores(&self, data: LazyFrame) -> Result<LazyFrame> {
        let df = data.select([col("permno"), col("month"), col("ret")]).collect()?;
        let permno = required_i64(&df, "permno")?;
        let month = required_dates(&df, "month")?;
        let ret = f64_values(&df, "ret")?;
        let returns: Vec<(i64, NaiveDate, f64)> = (0..df.height())
            .filter_map(|i| Some((permno[i], month[i], ret[i]?)))
            .collect();
        Ok(CharacteristicValue::to_frame(self.name(), &momentum_12_2(&returns))?.lazy())
    }
}

/// Value of a characteristic for one stock in one month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicValue {
    /// CRSP permanent number
    pub permno: i64,
    /// Month (first day)
    pub month: NaiveDate,
    /// Characteristic value
    pub value: f64,
}

impl CharacteristicValue {
    /// Convert values into a frame with `permno`, `month` and `name`.
    pub fn to_frame(name: &str, values: &[Self]) -> Result<DataFrame> {
        let months: Vec<Option<NaiveDate>> = values.iter().map(|v| Some(v.month)).collect();
        Ok(DataFrame::new(vec![
            Series::new("permno".into(), values.iter().map(|v| v.permno).collect::<Vec<_>>())
                .into(),
            date_column("month", &months)?,
            Series::new(name.into(), values.iter().map(|v| v.value).collect::<Vec<_>>()).into(),
        ])?)
    }

    /// Read values of column `name` from a frame with `permno` and `month`.
    pub fn from_frame(name: &str, df: &DataFrame) -> Result<Vec<Self>> {
        let permno = required_i64(df, "permno")?;
        let month = required_dates(df, "month")?;
        let value = f64_values(df, name)?;
        Ok((0..df.height())
            .filter_map(|i| {
                Some(Self {
                    permno: permno[i],
                    month: month[i],
                    value: value[i]?,
                })
            })
            .collect())
    }
}

/// Natural log of a positive market capitalisation.
pub fn log_mktcap(mktcap: f64) -> Option<f64> {
    (mktcap > 0.0).then(|| mktcap.ln())
}

/// Shift values forward by `months`, keyed by (permno, month).
///
/// The value observed at month `t` becomes the lagged value at `t + months`.
/// Stocks that are absent in month `t` have no lagged value at `t + months`.
pub fn lag_characteristic(
    values: &[CharacteristicValue],
    months: i32,
) -> HashMap<(i64, NaiveDate), f64> {
    values
        .iter()
        .map(|v| ((v.permno, add_months(v.month, months)), v.value))
        .collect()
}

/// Momentum: cumulative return from month t-12 to month t-2.
///
/// `returns` holds (permno, month, ret). All eleven returns must be present.
pub fn momentum_12_2(returns: &[(i64, NaiveDate, f64)]) -> Vec<CharacteristicValue> {
    let lookup: HashMap<(i64, NaiveDate), f64> =
        returns.iter().map(|(p, m, r)| ((*p, *m), *r)).collect();

    let mut values: Vec<CharacteristicValue> = returns
        .iter()
        .filter_map(|(permno, month, _)| {
            let gross = (2..=12).try_fold(1.0, |acc, lag| {
                lookup
                    .get(&(*permno, add_months(*month, -lag)))
                    .map(|r| acc * (1.0 + r))
            })?;
            Some(CharacteristicValue {
                permno: *permno,
                month: *month,
                value: gross - 1.0,
            })
        })
        .collect();
    values.sort_by_key(|v| (v.permno, v.month));
    values
}

/// Fiscal year whose book equity is used in `month`.
///
/// Book equity for fiscal years ending in calendar year `y` becomes usable in
/// July of `y + 1` and stays in use until June of `y + 2`.
pub fn book_equity_year(month: NaiveDate) -> i32 {
    if month.month() >= 7 {
        month.year() - 1
    } else {
        month.year() - 2
    }
}

/// Inputs for Fama-French book-to-market ratios.
#[derive(Debug, Default)]
pub struct BookToMarketInputs {
    book_equity: HashMap<(String, i32), f64>,
    market_cap: HashMap<(i64, NaiveDate), f64>,
}

impl BookToMarketInputs {
    /// Index book equity by (gvkey, fiscal year) and market caps by (permno, month).
    pub fn new(stocks: &[StockMonth], firms: &[FirmYear]) -> Self {
        Self {
            book_equity: firms
                .iter()
                .filter_map(|f| Some(((f.gvkey.clone(), f.year), f.be?)))
                .collect(),
            market_cap: stocks
                .iter()
                .map(|s| ((s.permno, s.month), s.mktcap))
                .collect(),
        }
    }

    /// Book equity of fiscal year `year` over the December `year` market cap.
    pub fn ratio(&self, permno: i64, gvkey: &str, year: i32) -> Option<f64> {
        let be = self.book_equity.get(&(gvkey.to_string(), year))?;
        let december = NaiveDate::from_ymd_opt(year, 12, 1)?;
        let me = self.market_cap.get(&(permno, december))?;
        (*me > 0.0).then(|| be / me)
    }
}

/// Book-to-market with Fama-French timing for every linked stock-month.
pub fn book_to_market(stocks: &[StockMonth], firms: &[FirmYear]) -> Vec<CharacteristicValue> {
    let inputs = BookToMarketInputs::new(stocks, firms);
    stocks
        .iter()
        .filter_map(|s| {
            let gvkey = s.gvkey.as_deref()?;
            Some(CharacteristicValue {
                permno: s.permno,
                month: s.month,
                value: inputs.ratio(s.permno, gvkey, book_equity_year(s.month))?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use tidyfin_data::{Exchange, Industry};

    fn ymd(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn stock(permno: i64, month: NaiveDate, mktcap: f64, gvkey: Option<&str>) -> StockMonth {
        StockMonth {
            permno,
            gvkey: gvkey.map(str::to_string),
            month,
            ret: 0.01,
            ret_excess: 0.01,
            mktcap,
            mktcap_lag: mktcap,
            exchange: Exchange::Nyse,
            industry: Industry::Manufacturing,
        }
    }

    #[rstest]
    #[case(ymd(2021, 6), 2019)]
    #[case(ymd(2021, 7), 2020)]
    #[case(ymd(2021, 12), 2020)]
    #[case(ymd(2022, 1), 2020)]
    fn test_book_equity_year(#[case] month: NaiveDate, #[case] expected: i32) {
        assert_eq!(book_equity_year(month), expected);
    }

    #[test]
    fn test_book_to_market_timing() {
        let stocks = vec![
            stock(1, ymd(2019, 12), 200.0, Some("A")),
            stock(1, ymd(2020, 6), 250.0, Some("A")),
            stock(1, ymd(2020, 7), 260.0, Some("A")),
            stock(2, ymd(2020, 7), 50.0, None),
        ];
        let firms = vec![FirmYear {
            gvkey: "A".to_string(),
            datadate: NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
            year: 2019,
            be: Some(100.0),
            op: None,
            inv: None,
            at: None,
        }];
        let bm = book_to_market(&stocks, &firms);
        assert_eq!(bm.len(), 1);
        assert_eq!(bm[0].month, ymd(2020, 7));
        assert_relative_eq!(bm[0].value, 0.5);
    }

    #[test]
    fn test_momentum_requires_full_history() {
        let mut returns: Vec<(i64, NaiveDate, f64)> = (0..13)
            .map(|i| (1, add_months(ymd(2020, 1), i), 0.01))
            .collect();
        returns.push((2, ymd(2021, 1), 0.5));
        let mom = momentum_12_2(&returns);
        assert_eq!(mom.len(), 1);
        assert_eq!(mom[0].month, ymd(2021, 1));
        assert_relative_eq!(mom[0].value, 1.01_f64.powi(11) - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_lag_characteristic() {
        let values = vec![CharacteristicValue {
            permno: 1,
            month: ymd(2020, 1),
            value: 3.0,
        }];
        let lagged = lag_characteristic(&values, 1);
        assert_eq!(lagged.get(&(1, ymd(2020, 2))), Some(&3.0));
        assert_eq!(lagged.get(&(1, ymd(2020, 1))), None);
    }

    #[test]
    fn test_log_mktcap_characteristic() {
        let stocks = vec![
            stock(1, ymd(2020, 1), std::f64::consts::E, None),
            stock(2, ymd(2020, 1), 0.0, None),
        ];
        let df = StockMonth::to_frame(&stocks).unwrap();
        let out = LogMarketCap::default().compute(&df).unwrap();
        let values = CharacteristicValue::from_frame("log_mktcap", &out).unwrap();
        assert_eq!(values.len(), 1);
        assert_relative_eq!(values[0].value, 1.0, epsilon = 1e-12);
        assert_eq!(log_mktcap(-1.0), None);
    }

    #[test]
    fn test_missing_column() {
        let df = DataFrame::new(vec![Series::new("permno".into(), vec![1_i64]).into()]).unwrap();
        assert!(matches!(
            Momentum.compute(&df),
            Err(FactorError::MissingColumn(c)) if c == "month"
        ));
    }

    #[test]
    fn test_momentum_characteristic_frame() {
        let stocks: Vec<StockMonth> = (0..14)
            .map(|i| stock(9, add_months(ymd(2010, 1), i), 1.0, None))
            .collect();
        let out = Momentum.compute(&StockMonth::to_frame(&stocks).unwrap()).unwrap();
        assert_eq!(out.height(), 2);
        assert_eq!(out.get_column_names()[2].as_str(), "mom_12_2");
    }
}
