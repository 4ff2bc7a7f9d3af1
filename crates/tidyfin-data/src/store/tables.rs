//! Canonical tables and typed accessors.
//!
//! Each dataset has one table name shared by every workflow. Saving replaces
//! the table; loading parses dates back from their ISO text form.

use super::Database;
use crate::error::Result;
use crate::panel::{FirmYear, StockDay, StockMonth};
use crate::sources::french::{FactorRow, FrenchTable};
use crate::sources::fred::CpiRow;
use crate::sources::macro_predictors::MacroPredictors;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Fama-French three factors, monthly.
pub const FACTORS_FF3_MONTHLY: &str = "factors_ff3_monthly";
/// Fama-French five factors, monthly.
pub const FACTORS_FF5_MONTHLY: &str = "factors_ff5_monthly";
/// Fama-French three factors, daily.
pub const FACTORS_FF3_DAILY: &str = "factors_ff3_daily";
/// Ten industry portfolios, monthly.
pub const INDUSTRIES_FF_MONTHLY: &str = "industries_ff_monthly";
/// Welch-Goyal macro predictors.
pub const MACRO_PREDICTORS: &str = "macro_predictors";
/// Rescaled consumer price index.
pub const CPI_MONTHLY: &str = "cpi_monthly";
/// Cleaned CRSP monthly panel.
pub const CRSP_MONTHLY: &str = "crsp_monthly";
/// Cleaned CRSP daily panel.
pub const CRSP_DAILY: &str = "crsp_daily";
/// Annual Compustat characteristics.
pub const COMPUSTAT: &str = "compustat";
/// Rolling CAPM betas.
pub const BETA: &str = "beta";

impl Database {
    /// Replace a factor table.
    pub fn save_factors(&self, table: &str, rows: &[FactorRow]) -> Result<usize> {
        self.write_table(table, &FactorRow::to_frame(rows)?)
    }

    /// Load a factor table.
    pub fn load_factors(&self, table: &str) -> Result<Vec<FactorRow>> {
        FactorRow::from_frame(&self.read_table(table)?)
    }

    /// Risk-free rate keyed by the date of a factor table.
    pub fn risk_free_by_date(&self, table: &str) -> Result<HashMap<NaiveDate, f64>> {
        Ok(self
            .load_factors(table)?
            .into_iter()
            .map(|row| (row.date, row.rf))
            .collect())
    }

    /// Replace the industry portfolio returns.
    pub fn save_industries(&self, table: &FrenchTable) -> Result<usize> {
        self.write_table(INDUSTRIES_FF_MONTHLY, &table.to_frame()?)
    }

    /// Load the industry portfolio returns, one column per industry.
    pub fn load_industries(&self) -> Result<FrenchTable> {
        FrenchTable::from_frame(&self.read_table(INDUSTRIES_FF_MONTHLY)?)
    }

    /// Replace the monthly CRSP panel.
    pub fn save_crsp_monthly(&self, rows: &[StockMonth]) -> Result<usize> {
        self.write_table(CRSP_MONTHLY, &StockMonth::to_frame(rows)?)
    }

    /// Load the monthly CRSP panel.
    pub fn load_crsp_monthly(&self) -> Result<Vec<StockMonth>> {
        StockMonth::from_frame(&self.read_table(CRSP_MONTHLY)?)
    }

    /// Replace the daily CRSP panel.
    pub fn save_crsp_daily(&self, rows: &[StockDay]) -> Result<usize> {
        self.write_table(CRSP_DAILY, &StockDay::to_frame(rows)?)
    }

    /// Append a chunk of daily observations.
    pub fn append_crsp_daily(&self, rows: &[StockDay]) -> Result<usize> {
        self.append_table(CRSP_DAILY, &StockDay::to_frame(rows)?)
    }

    /// Load the daily CRSP panel.
    pub fn load_crsp_daily(&self) -> Result<Vec<StockDay>> {
        StockDay::from_frame(&self.read_table(CRSP_DAILY)?)
    }

    /// Replace the Compustat characteristics.
    pub fn save_compustat(&self, rows: &[FirmYear]) -> Result<usize> {
        self.write_table(COMPUSTAT, &FirmYear::to_frame(rows)?)
    }

    /// Load the Compustat characteristics.
    pub fn load_compustat(&self) -> Result<Vec<FirmYear>> {
        FirmYear::from_frame(&self.read_table(COMPUSTAT)?)
    }

    /// Replace the macro predictors.
    pub fn save_macro_predictors(&self, rows: &[MacroPredictors]) -> Result<usize> {
        self.write_table(MACRO_PREDICTORS, &MacroPredictors::to_frame(rows)?)
    }

    /// Load the macro predictors.
    pub fn load_macro_predictors(&self) -> Result<Vec<MacroPredictors>> {
        MacroPredictors::from_frame(&self.read_table(MACRO_PREDICTORS)?)
    }

    /// Replace the CPI table.
    pub fn save_cpi(&self, rows: &[CpiRow]) -> Result<usize> {
        self.write_table(CPI_MONTHLY, &CpiRow::to_frame(rows)?)
    }

    /// Load the CPI table.
    pub fn load_cpi(&self) -> Result<Vec<CpiRow>> {
        CpiRow::from_frame(&self.read_table(CPI_MONTHLY)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::{Exchange, Industry};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_factor_roundtrip_through_sqlite() {
        let db = Database::in_memory().unwrap();
        let rows = vec![
            FactorRow {
                date: ymd(2020, 1, 1),
                mkt_excess: -0.0011,
                smb: -0.0311,
                hml: -0.0625,
                rmw: None,
                cma: None,
                rf: 0.0013,
            },
            FactorRow {
                date: ymd(2020, 2, 1),
                mkt_excess: -0.0813,
                smb: 0.0107,
                hml: -0.038,
                rmw: None,
                cma: None,
                rf: 0.0012,
            },
        ];
        assert_eq!(db.save_factors(FACTORS_FF3_MONTHLY, &rows).unwrap(), 2);
        assert_eq!(db.load_factors(FACTORS_FF3_MONTHLY).unwrap(), rows);

        let rf = db.risk_free_by_date(FACTORS_FF3_MONTHLY).unwrap();
        assert_eq!(rf.get(&ymd(2020, 2, 1)), Some(&0.0012));
    }

    #[test]
    fn test_crsp_daily_append() {
        let db = Database::in_memory().unwrap();
        let chunk = |permno| {
            vec![StockDay {
                permno,
                date: ymd(2021, 3, 1),
                ret_excess: 0.01,
            }]
        };
        db.append_crsp_daily(&chunk(1)).unwrap();
        db.append_crsp_daily(&chunk(2)).unwrap();
        assert_eq!(db.load_crsp_daily().unwrap().len(), 2);

        db.save_crsp_daily(&chunk(3)).unwrap();
        let rows = db.load_crsp_daily().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].permno, 3);
    }

    #[test]
    fn test_crsp_monthly_without_links() {
        let db = Database::in_memory().unwrap();
        let rows = vec![StockMonth {
            permno: 10,
            gvkey: None,
            month: ymd(2020, 1, 1),
            ret: 0.0,
            ret_excess: -0.001,
            mktcap: 1.0,
            mktcap_lag: 1.0,
            exchange: Exchange::Amex,
            industry: Industry::Missing,
        }];
        db.save_crsp_monthly(&rows).unwrap();
        assert_eq!(db.load_crsp_monthly().unwrap(), rows);
    }

    #[test]
    fn test_empty_tables_roundtrip() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.save_crsp_monthly(&[]).unwrap(), 0);
        assert!(db.load_crsp_monthly().unwrap().is_empty());
        assert_eq!(db.save_crsp_daily(&[]).unwrap(), 0);
        assert!(db.load_crsp_daily().unwrap().is_empty());
        assert_eq!(db.save_factors(FACTORS_FF3_MONTHLY, &[]).unwrap(), 0);
        assert!(db.load_factors(FACTORS_FF3_MONTHLY).unwrap().is_empty());
        assert!(db.risk_free_by_date(FACTORS_FF3_MONTHLY).unwrap().is_empty());
        assert_eq!(db.save_compustat(&[]).unwrap(), 0);
        assert!(db.load_compustat().unwrap().is_empty());
        assert_eq!(db.save_macro_predictors(&[]).unwrap(), 0);
        assert!(db.load_macro_predictors().unwrap().is_empty());
        assert_eq!(db.save_cpi(&[]).unwrap(), 0);
        assert!(db.load_cpi().unwrap().is_empty());
    }

    #[test]
    fn test_industries_roundtrip() {
        let db = Database::in_memory().unwrap();
        let table = FrenchTable {
            dates: vec![ymd(2020, 1, 1), ymd(2020, 2, 1)],
            columns: vec!["nodur".to_string(), "hitec".to_string()],
            values: vec![vec![Some(0.01), Some(-0.02)], vec![None, Some(0.03)]],
        };
        assert_eq!(db.save_industries(&table).unwrap(), 2);
        assert_eq!(db.load_industries().unwrap(), table);
    }
}
