//! Welch-Goyal macroeconomic predictors.
//!
//! The monthly predictor file is published as a public Google Sheet; its CSV
//! export carries the raw series from which the usual equity premium
//! predictors are derived.

use crate::dates::{month_span, parse_yyyymm};
use crate::error::{DataError, Result};
use crate::frame::{date_column, f64_values, required_dates};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

const SHEET_ID: &str = "1bM7vCWd3WOt95Sf9qjLPZjoiafgF_8EG";
const SHEET_NAME: &str = "macro_predictors.xlsx";

/// CSV export URL of the predictor sheet.
pub fn predictors_url() -> String {
    format!("https://docs.google.com/spreadsheets/d/{SHEET_ID}/gviz/tq?tqx=out:csv&sheet={SHEET_NAME}")
}

/// Raw monthly row of the Welch-Goyal file.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawPredictorRow {
    /// Month (first day)
    pub month: NaiveDate,
    /// S&P 500 index level
    pub index: Option<f64>,
    /// Twelve-month dividends
    pub d12: Option<f64>,
    /// Twelve-month earnings
    pub e12: Option<f64>,
    /// Book-to-market of the Dow Jones index
    pub bm: Option<f64>,
    /// Treasury bill rate
    pub tbl: Option<f64>,
    /// AAA corporate bond yield
    pub aaa: Option<f64>,
    /// BAA corporate bond yield
    pub baa: Option<f64>,
    /// Long-term government bond yield
    pub lty: Option<f64>,
    /// Net equity expansion
    pub ntis: Option<f64>,
    /// Risk-free rate
    pub rfree: Option<f64>,
    /// Inflation
    pub infl: Option<f64>,
    /// Long-term government bond return
    pub ltr: Option<f64>,
    /// Stock variance
    pub svar: Option<f64>,
}

/// Derived predictors for one month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroPredictors {
    /// Month (first day)
    pub month: NaiveDate,
    /// Next month's log equity premium including dividends
    pub rp_div: f64,
    /// Dividend-price ratio (log)
    pub dp: f64,
    /// Dividend yield (log, lagged price)
    pub dy: f64,
    /// Earnings-price ratio (log)
    pub ep: f64,
    /// Dividend payout ratio (log)
    pub de: f64,
    /// Stock variance
    pub svar: f64,
    /// Book-to-market
    pub bm: f64,
    /// Net equity expansion
    pub ntis: f64,
    /// Treasury bill rate
    pub tbl: f64,
    /// Long-term yield
    pub lty: f64,
    /// Long-term rate of return
    pub ltr: f64,
    /// Term spread
    pub tms: f64,
    /// Default yield spread
    pub dfy: f64,
    /// Inflation
    pub infl: f64,
}

/// Predictor names in frame column order.
pub const PREDICTOR_NAMES: [&str; 13] = [
    "dp", "dy", "ep", "de", "svar", "bm", "ntis", "tbl", "lty", "ltr", "tms", "dfy", "infl",
];

impl MacroPredictors {
    /// Predictor values in [`PREDICTOR_NAMES`] order.
    pub const fn values(&self) -> [f64; 13] {
        [
            self.dp, self.dy, self.ep, self.de, self.svar, self.bm, self.ntis, self.tbl, self.lty,
            self.ltr, self.tms, self.dfy, self.infl,
        ]
    }

    /// Convert rows to a frame.
    pub fn to_frame(rows: &[Self]) -> Result<DataFrame> {
        let months: Vec<Option<NaiveDate>> = rows.iter().map(|r| Some(r.month)).collect();
        let mut columns = vec![
            date_column("month", &months)?,
            Series::new("rp_div".into(), rows.iter().map(|r| r.rp_div).collect::<Vec<_>>())
                .into(),
        ];
        for (j, name) in PREDICTOR_NAMES.iter().enumerate() {
            let values: Vec<f64> = rows.iter().map(|r| r.values()[j]).collect();
            columns.push(Series::new((*name).into(), values).into());
        }
        Ok(DataFrame::new(columns)?)
    }

    /// Read rows back from a frame.
    pub fn from_frame(df: &DataFrame) -> Result<Vec<Self>> {
        let months = required_dates(df, "month")?;
        let rp_div = f64_values(df, "rp_div")?;
        let predictors = PREDICTOR_NAMES
            .iter()
            .map(|name| f64_values(df, name))
            .collect::<Result<Vec<_>>>()?;

        Ok((0..df.height())
            .filter_map(|i| {
                let v = |j: usize| predictors[j][i];
                Some(Self {
                    month: months[i],
                    rp_div: rp_div[i]?,
                    dp: v(0)?,
                    dy: v(1)?,
                    ep: v(2)?,
                    de: v(3)?,
                    svar: v(4)?,
                    bm: v(5)?,
                    ntis: v(6)?,
                    tbl: v(7)?,
                    lty: v(8)?,
                    ltr: v(9)?,
                    tms: v(10)?,
                    dfy: v(11)?,
                    infl: v(12)?,
                })
            })
            .collect())
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("na") {
        return None;
    }
    cleaned.parse().ok()
}

/// Parse the CSV export of the predictor sheet.
pub fn parse_predictors_csv(text: &str) -> Result<Vec<RawPredictorRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h == name);
    let month_idx = position("yyyymm")
        .ok_or_else(|| DataError::Parse("Predictor file lacks yyyymm column".to_string()))?;
    let lookup = |record: &csv::StringRecord, name: &str| {
        position(name)
            .and_then(|j| record.get(j))
            .and_then(parse_number)
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(code) = record.get(month_idx) else {
            continue;
        };
        // Codes sometimes arrive as floats from the spreadsheet export.
        let code = code.split('.').next().unwrap_or_default();
        rows.push(RawPredictorRow {
            month: parse_yyyymm(code)?,
            index: lookup(&record, "Index"),
            d12: lookup(&record, "D12"),
            e12: lookup(&record, "E12"),
            bm: lookup(&record, "b/m"),
            tbl: lookup(&record, "tbl"),
            aaa: lookup(&record, "AAA"),
            baa: lookup(&record, "BAA"),
            lty: lookup(&record, "lty"),
            ntis: lookup(&record, "ntis"),
            rfree: lookup(&record, "Rfree"),
            infl: lookup(&record, "infl"),
            ltr: lookup(&record, "ltr"),
            svar: lookup(&record, "svar"),
        });
    }
    rows.sort_by_key(|r| r.month);
    Ok(rows)
}

/// Derive the predictors for months in `start..=end`.
///
/// Lagged and leading values are taken from the adjacent calendar month;
/// rows with any missing input are dropped.
pub fn compute_predictors(
    raw: &[RawPredictorRow],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<MacroPredictors> {
    let adjacent = |a: &RawPredictorRow, b: &RawPredictorRow| month_span(a.month, b.month) == 1;

    raw.iter()
        .enumerate()
        .filter(|(_, row)| row.month >= start && row.month <= end)
        .filter_map(|(i, row)| {
            let previous = i
                .checked_sub(1)
                .map(|j| &raw[j])
                .filter(|p| adjacent(p, row));
            let next = raw.get(i + 1).filter(|n| adjacent(row, n));

            let index = row.index?;
            let d12 = row.d12?;
            let e12 = row.e12?;
            let index_div = index + d12;
            let next = next?;
            let next_index_div = next.index? + next.d12?;
            let log_return = next_index_div.ln() - index_div.ln();
            let rp_div = log_return - (1.0 + next.rfree?).ln();

            let tbl = row.tbl?;
            let lty = row.lty?;
            Some(MacroPredictors {
                month: row.month,
                rp_div,
                dp: d12.ln() - index.ln(),
                dy: d12.ln() - previous?.index?.ln(),
                ep: e12.ln() - index.ln(),
                de: d12.ln() - e12.ln(),
                svar: row.svar?,
                bm: row.bm?,
                ntis: row.ntis?,
                tbl,
                lty,
                ltr: row.ltr?,
                tms: lty - tbl,
                dfy: row.baa? - row.aaa?,
                infl: row.infl?,
            })
            .filter(|p| p.values().iter().all(|v| v.is_finite()) && p.rp_div.is_finite())
        })
        .collect()
}

/// Download the raw predictor file.
pub async fn fetch_predictors(client: &reqwest::Client) -> Result<Vec<RawPredictorRow>> {
    let url = predictors_url();
    debug!(%url, "downloading macro predictors");
    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(DataError::Http {
            status: response.status().as_u16(),
            url,
        });
    }
    parse_predictors_csv(&response.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const CSV: &str = r#""yyyymm","Index","D12","E12","b/m","tbl","AAA","BAA","lty","ntis","Rfree","infl","ltr","corpr","svar","csp","CRSP_SPvw","CRSP_SPvwx"
"200001","1,394.46","16.77","48.32","0.16","0.0532","0.0778","0.0833","0.0669","0.0105","0.0041","0.0030","-0.0022","-0.0074","0.0034","NA","-0.0504","-0.0510"
"200002","1,366.42","16.73","49.21","0.16","0.0555","0.0768","0.0829","0.0652","0.0098","0.0043","0.0059","0.0258","0.0114","0.0028","NA","-0.0152","-0.0164"
"200003","1,498.58","16.71","50.08","0.15","0.0569","0.0772","0.0837","0.0610","0.0093","0.0047","0.0082","0.0299","0.0128","0.0066","NA","0.0968","0.0953"
"#;

    #[test]
    fn test_parse_predictors_csv() {
        let rows = parse_predictors_csv(CSV).unwrap();
        assert_eq!(rows.len(), 3);
        assert_relative_eq!(rows[0].index.unwrap(), 1394.46);
        assert_eq!(rows[1].month, NaiveDate::from_ymd_opt(2000, 2, 1).unwrap());
        assert_relative_eq!(rows[2].bm.unwrap(), 0.15);
    }

    #[test]
    fn test_compute_predictors_uses_neighbours() {
        let rows = parse_predictors_csv(CSV).unwrap();
        let start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2000, 12, 1).unwrap();
        let predictors = compute_predictors(&rows, start, end);

        // January lacks a lagged index, March lacks a lead.
        assert_eq!(predictors.len(), 1);
        let feb = predictors[0];
        assert_eq!(feb.month, NaiveDate::from_ymd_opt(2000, 2, 1).unwrap());
        assert_relative_eq!(feb.dp, 16.73_f64.ln() - 1366.42_f64.ln());
        assert_relative_eq!(feb.dy, 16.73_f64.ln() - 1394.46_f64.ln());
        assert_relative_eq!(feb.tms, 0.0652 - 0.0555, epsilon = 1e-12);
        assert_relative_eq!(feb.dfy, 0.0829 - 0.0768, epsilon = 1e-12);
        let expected_rp =
            (1498.58_f64 + 16.71).ln() - (1366.42_f64 + 16.73).ln() - 1.0047_f64.ln();
        assert_relative_eq!(feb.rp_div, expected_rp, epsilon = 1e-12);

        let frame = MacroPredictors::to_frame(&predictors).unwrap();
        assert_eq!(frame.width(), 15);
        assert_eq!(MacroPredictors::from_frame(&frame).unwrap(), predictors);
    }

    #[test]
    fn test_gap_breaks_lags() {
        let mut rows = parse_predictors_csv(CSV).unwrap();
        rows[0].month = NaiveDate::from_ymd_opt(1999, 11, 1).unwrap();
        let start = NaiveDate::from_ymd_opt(1999, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2000, 12, 1).unwrap();
        assert!(compute_predictors(&rows, start, end).is_empty());
    }
}
