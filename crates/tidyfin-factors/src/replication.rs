//! Fama-French size and value factors rebuilt from the stock panels.
//!
//! At the end of each June, stocks are split at the NYSE median of June
//! market capitalisation (small/big) and at the NYSE 30th and 70th
//! percentiles of book-to-market (low/neutral/high). The six intersections
//! are held from July to the following June and value-weighted by lagged
//! market capitalisation.

use crate::characteristics::BookToMarketInputs;
use crate::error::Result;
use crate::sorts::{assign_portfolio, breakpoints_at, member_weights};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tidyfin_data::{Exchange, FirmYear, StockMonth};
use tracing::debug;

/// Replicated factor returns for one month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedFactors {
    /// Month (first day)
    pub month: NaiveDate,
    /// Small minus big
    pub smb: f64,
    /// High minus low
    pub hml: f64,
}

/// Size and value group of a stock, fixed for one formation year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Assignment {
    /// 1 = small, 2 = big
    pub size: usize,
    /// 1 = low, 2 = neutral, 3 = high book-to-market
    pub value: usize,
}

/// Year of the June in which the portfolios held in `month` were formed.
pub fn formation_year(month: NaiveDate) -> i32 {
    if month.month() >= 7 {
        month.year()
    } else {
        month.year() - 1
    }
}

/// Assign stocks to the six size/value portfolios every June.
///
/// Keyed by (permno, formation year).
pub fn june_assignments(stocks: &[StockMonth], firms: &[FirmYear]) -> HashMap<(i64, i32), Assignment> {
    let inputs = BookToMarketInputs::new(stocks, firms);

    let mut junes: BTreeMap<i32, Vec<(i64, f64, f64, bool)>> = BTreeMap::new();
    for stock in stocks.iter().filter(|s| s.month.month() == 6) {
        let Some(gvkey) = stock.gvkey.as_deref() else {
            continue;
        };
        let year = stock.month.year();
        let Some(bm) = inputs.ratio(stock.permno, gvkey, year - 1) else {
            continue;
        };
        junes.entry(year).or_default().push((
            stock.permno,
            stock.mktcap,
            bm,
            stock.exchange == Exchange::Nyse,
        ));
    }

    let mut assignments = HashMap::new();
    for (year, candidates) in junes {
        let nyse_size: Vec<f64> = candidates.iter().filter(|c| c.3).map(|c| c.1).collect();
        let nyse_bm: Vec<f64> = candidates.iter().filter(|c| c.3).map(|c| c.2).collect();
        let size_bp = breakpoints_at(&nyse_size, &[0.5]);
        let bm_bp = breakpoints_at(&nyse_bm, &[0.3, 0.7]);
        if size_bp.len() != 1 || bm_bp.len() != 2 {
            debug!(year, "no NYSE breakpoints, skipping formation year");
            continue;
        }
        for (permno, size, bm, _) in candidates {
            let (Some(size), Some(value)) = (assign_portfolio(size, &size_bp), assign_portfolio(bm, &bm_bp)) else {
                continue;
            };
            assignments.insert((permno, year), Assignment { size, value });
        }
    }
    assignments
}

/// Monthly SMB and HML from the CRSP and Compustat panels.
///
/// Months in which any of the six portfolios is empty are skipped.
pub fn replicate_ff3(stocks: &[StockMonth], firms: &[FirmYear]) -> Result<Vec<ReplicatedFactors>> {
    let assignments = june_assignments(stocks, firms);

    let mut cells: BTreeMap<NaiveDate, BTreeMap<Assignment, Vec<(f64, f64)>>> = BTreeMap::new();
    for stock in stocks {
        if let Some(assignment) = assignments.get(&(stock.permno, formation_year(stock.month))) {
            cells
                .entry(stock.month)
                .or_default()
                .entry(*assignment)
                .or_default()
                .push((stock.ret_excess, stock.mktcap_lag));
        }
    }

    let mut factors = Vec::new();
    for (month, portfolios) in cells {
        if portfolios.len() < 6 {
            continue;
        }
        let ret = |size: usize, value: usize| -> f64 {
            let members = &portfolios[&Assignment { size, value }];
            let caps: Vec<f64> = members.iter().map(|m| m.1).collect();
            member_weights(&caps, crate::sorts::Weighting::Value)
                .iter()
                .zip(members)
                .map(|(w, m)| w * m.0)
                .sum()
        };
        let small = (ret(1, 1) + ret(1, 2) + ret(1, 3)) / 3.0;
        let big = (ret(2, 1) + ret(2, 2) + ret(2, 3)) / 3.0;
        let high = (ret(1, 3) + ret(2, 3)) / 2.0;
        let low = (ret(1, 1) + ret(2, 1)) / 2.0;
        factors.push(ReplicatedFactors {
            month,
            smb: small - big,
            hml: high - low,
        });
    }
    Ok(factors)
}

/// Correlation between replicated and reference factor series on common months.
pub fn replication_correlation(
    replicated: &[(NaiveDate, f64)],
    reference: &[(NaiveDate, f64)],
) -> Option<f64> {
    let reference: HashMap<NaiveDate, f64> = reference.iter().copied().collect();
    let pairs: Vec<(f64, f64)> = replicated
        .iter()
        .filter_map(|(m, x)| Some((*x, *reference.get(m)?)))
        .collect();
    let n = pairs.len() as f64;
    if pairs.len() < 2 {
        return None;
    }
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        sxy += (x - mean_x) * (y - mean_y);
        sxx += (x - mean_x).powi(2);
        syy += (y - mean_y).powi(2);
    }
    (sxx > 0.0 && syy > 0.0).then(|| sxy / (sxx * syy).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tidyfin_data::Industry;

    fn ym(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn stock(permno: i64, month: NaiveDate, mktcap: f64, ret_excess: f64) -> StockMonth {
        StockMonth {
            permno,
            gvkey: Some(format!("G{permno}")),
            month,
            ret: ret_excess,
            ret_excess,
            mktcap,
            mktcap_lag: mktcap,
            exchange: Exchange::Nyse,
            industry: Industry::Services,
        }
    }

    #[test]
    fn test_formation_year() {
        assert_eq!(formation_year(ym(2021, 6)), 2020);
        assert_eq!(formation_year(ym(2021, 7)), 2021);
    }

    #[test]
    fn test_six_portfolios() {
        // Ten stocks: permnos 1-5 small, 6-10 big; book equity rises with permno
        // within each size group so every value bucket is populated.
        let mut stocks = Vec::new();
        let mut firms = Vec::new();
        for permno in 1..=10_i64 {
            let size = if permno <= 5 { 10.0 } else { 100.0 };
            let rank = ((permno - 1) % 5) as f64;
            stocks.push(stock(permno, ym(2019, 12), size, 0.0));
            stocks.push(stock(permno, ym(2020, 6), size, 0.0));
            let ret = if rank >= 3.0 { 0.02 } else { 0.0 } + if permno <= 5 { 0.01 } else { 0.0 };
            stocks.push(stock(permno, ym(2020, 7), size, ret));
            firms.push(FirmYear {
                gvkey: format!("G{permno}"),
                datadate: NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
                year: 2019,
                be: Some(size * (0.2 + 0.3 * rank)),
                op: None,
                inv: None,
                at: None,
            });
        }

        let assignments = june_assignments(&stocks, &firms);
        assert_eq!(assignments.len(), 10);
        assert_eq!(assignments[&(1, 2020)], Assignment { size: 1, value: 1 });
        assert_eq!(assignments[&(10, 2020)], Assignment { size: 2, value: 3 });

        let factors = replicate_ff3(&stocks, &firms).unwrap();
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].month, ym(2020, 7));
        assert_relative_eq!(factors[0].smb, 0.01, epsilon = 1e-12);
        assert_relative_eq!(factors[0].hml, 0.02, epsilon = 1e-12);
    }

    #[test]
    fn test_correlation() {
        let a = vec![(ym(2020, 1), 1.0), (ym(2020, 2), 2.0), (ym(2020, 3), 3.0)];
        let b = vec![(ym(2020, 1), 2.0), (ym(2020, 2), 4.0), (ym(2020, 3), 6.0)];
        assert_relative_eq!(replication_correlation(&a, &b).unwrap(), 1.0, epsilon = 1e-12);
        assert_eq!(replication_correlation(&a[..1], &b), None);
    }
}
