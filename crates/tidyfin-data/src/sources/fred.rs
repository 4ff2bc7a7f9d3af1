//! Federal Reserve Economic Data (FRED) series.
//!
//! Series are downloaded from the public `fredgraph.csv` endpoint, which
//! needs no API key. Missing observations are encoded as `.`.

use crate::dates::{floor_month, parse_date};
use crate::error::{DataError, Result};
use crate::frame::{date_column, f64_values, required_dates};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

const FRED_GRAPH_URL: &str = "https://fred.stlouisfed.org/graph/fredgraph.csv";

/// Consumer price index, all urban consumers, not seasonally adjusted.
pub const CPI_SERIES: &str = "CPIAUCNS";

/// A single dated observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FredObservation {
    /// Observation date
    pub date: NaiveDate,
    /// Observed value
    pub value: f64,
}

/// Monthly CPI rescaled so that the last month of the sample equals one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpiRow {
    /// Month (first day)
    pub month: NaiveDate,
    /// Price level relative to the final month
    pub cpi: f64,
}

/// Parse a `fredgraph.csv` export.
///
/// The first column is the date and the second the series value; rows
/// whose value is `.` or empty are skipped.
pub fn parse_fred_csv(text: &str) -> Result<Vec<FredObservation>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut observations = Vec::new();
    for record in reader.records() {
        let record = record?;
        let (Some(date), Some(value)) = (record.get(0), record.get(1)) else {
            continue;
        };
        if value.is_empty() || value == "." {
            continue;
        }
        let value: f64 = value
            .parse()
            .map_err(|e| DataError::Parse(format!("Bad FRED value {value:?}: {e}")))?;
        observations.push(FredObservation {
            date: parse_date(date)?,
            value,
        });
    }
    Ok(observations)
}

/// Restrict observations to `start..=end` and rescale by the last value.
pub fn cpi_index(observations: &[FredObservation], start: NaiveDate, end: NaiveDate) -> Vec<CpiRow> {
    let in_sample: Vec<&FredObservation> = observations
        .iter()
        .filter(|o| o.date >= start && o.date <= end)
        .collect();
    let Some(last) = in_sample.iter().max_by_key(|o| o.date).map(|o| o.value) else {
        return Vec::new();
    };
    let mut rows: Vec<CpiRow> = in_sample
        .iter()
        .map(|o| CpiRow {
            month: floor_month(o.date),
            cpi: o.value / last,
        })
        .collect();
    rows.sort_by_key(|r| r.month);
    rows
}

impl CpiRow {
    /// Convert rows to a frame (`month`, `cpi`).
    pub fn to_frame(rows: &[Self]) -> Result<DataFrame> {
        let months: Vec<Option<NaiveDate>> = rows.iter().map(|r| Some(r.month)).collect();
        Ok(DataFrame::new(vec![
            date_column("month", &months)?,
            Series::new("cpi".into(), rows.iter().map(|r| r.cpi).collect::<Vec<_>>()).into(),
        ])?)
    }

    /// Read rows back from a frame.
    pub fn from_frame(df: &DataFrame) -> Result<Vec<Self>> {
        let months = required_dates(df, "month")?;
        let cpi = f64_values(df, "cpi")?;
        Ok(months
            .into_iter()
            .zip(cpi)
            .filter_map(|(month, cpi)| Some(Self { month, cpi: cpi? }))
            .collect())
    }
}

/// Client for FRED graph exports.
#[derive(Debug, Clone, Default)]
pub struct FredClient {
    client: reqwest::Client,
}

impl FredClient {
    /// Create a client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Download a series.
    pub async fn fetch_series(&self, series: &str) -> Result<Vec<FredObservation>> {
        if series.is_empty() || !series.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DataError::InvalidSymbol(series.to_string()));
        }
        let url = format!("{FRED_GRAPH_URL}?id={series}");
        debug!(%url, "downloading FRED series");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(DataError::Http {
                status: response.status().as_u16(),
                url,
            });
        }
        parse_fred_csv(&response.text().await?)
    }
}
