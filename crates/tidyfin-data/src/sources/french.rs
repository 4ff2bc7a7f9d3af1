//! Kenneth French data library.
//!
//! The library publishes each dataset as a zipped CSV whose first table holds
//! the monthly (`YYYYMM`) or daily (`YYYYMMDD`) series, followed by annual
//! tables that are not used here. Values are percentages.

use crate::dates::{parse_yyyymm, parse_yyyymmdd};
use crate::error::{DataError, Result};
use crate::frame::{date_column, f64_values, optional_f64_values, required_dates};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use tracing::{debug, info};

const BASE_URL: &str = "https://mba.tuck.dartmouth.edu/pages/faculty/ken.french/ftp";

/// Datasets used by the workflows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrenchDataset {
    /// Fama-French 3 factors, monthly
    Ff3Monthly,
    /// Fama-French 5 factors (2x3), monthly
    Ff5Monthly,
    /// Fama-French 3 factors, daily
    Ff3Daily,
    /// Fama-French 5 factors (2x3), daily
    Ff5Daily,
    /// 10 industry portfolios, monthly
    Industries10Monthly,
    /// Any other file name in the library (without the `_CSV.zip` suffix)
    Other(String),
}

impl FrenchDataset {
    /// File name stem in the library.
    pub fn file_stem(&self) -> &str {
        match self {
            Self::Ff3Monthly => "F-F_Research_Data_Factors",
            Self::Ff5Monthly => "F-F_Research_Data_5_Factors_2x3",
            Self::Ff3Daily => "F-F_Research_Data_Factors_daily",
            Self::Ff5Daily => "F-F_Research_Data_5_Factors_2x3_daily",
            Self::Industries10Monthly => "10_Industry_Portfolios",
            Self::Other(name) => name,
        }
    }

    /// Download URL of the zipped CSV.
    pub fn url(&self) -> String {
        format!("{BASE_URL}/{}_CSV.zip", self.file_stem())
    }
}

/// First table of a library CSV file.
#[derive(Debug, Clone, PartialEq)]
pub struct FrenchTable {
    /// Observation dates (first of month for monthly files)
    pub dates: Vec<NaiveDate>,
    /// Normalised column names
    pub columns: Vec<String>,
    /// Row-major values, already converted from percent to decimals
    pub values: Vec<Vec<Option<f64>>>,
}

impl FrenchTable {
    /// Keep rows with `start <= date <= end`.
    pub fn filter_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        let keep: Vec<bool> = self
            .dates
            .iter()
            .map(|d| *d >= start && *d <= end)
            .collect();
        let mut flags = keep.iter();
        self.dates.retain(|_| *flags.next().unwrap_or(&false));
        let mut flags = keep.iter();
        self.values.retain(|_| *flags.next().unwrap_or(&false));
        self
    }

    /// Index of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Convert into a frame with a `date` column followed by the series.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let dates: Vec<Option<NaiveDate>> = self.dates.iter().copied().map(Some).collect();
        let mut columns = vec![date_column("date", &dates)?];
        for (j, name) in self.columns.iter().enumerate() {
            let values: Vec<Option<f64>> = self.values.iter().map(|row| row[j]).collect();
            columns.push(Series::new(name.as_str().into(), values).into());
        }
        Ok(DataFrame::new(columns)?)
    }

    /// Read a table back from a frame written by [`FrenchTable::to_frame`].
    ///
    /// Every column other than `date` is a series.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let dates = required_dates(df, "date")?;
        let columns: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|c| c.as_str() != "date")
            .map(|c| c.to_string())
            .collect();
        let series = columns
            .iter()
            .map(|c| f64_values(df, c))
            .collect::<Result<Vec<_>>>()?;
        let values = (0..df.height())
            .map(|i| series.iter().map(|s| s[i]).collect())
            .collect();
        Ok(Self {
            dates,
            columns,
            values,
        })
    }
}

/// Normalise a library column header (`Mkt-RF` becomes `mkt_excess`).
fn normalise_column(raw: &str) -> String {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("Mkt-RF") {
        return "mkt_excess".to_string();
    }
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    mapped.trim_matches('_').to_string()
}

fn parse_date_code(code: &str) -> Option<NaiveDate> {
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match code.len() {
        6 => parse_yyyymm(code).ok(),
        8 => parse_yyyymmdd(code).ok(),
        _ => None,
    }
}

/// Parse the first table of a library CSV file.
pub fn parse_french_csv(text: &str) -> Result<FrenchTable> {
    let mut lines = text.lines();

    let header = lines
        .by_ref()
        .find(|line| line.trim_start().starts_with(','))
        .ok_or_else(|| DataError::Parse("No header row found in French data file".to_string()))?;
    let columns: Vec<String> = header.split(',').skip(1).map(normalise_column).collect();

    let mut dates = Vec::new();
    let mut values = Vec::new();
    for line in lines {
        let mut fields = line.split(',');
        let code = fields.next().unwrap_or_default().trim();
        let Some(date) = parse_date_code(code) else {
            if dates.is_empty() && code.is_empty() {
                continue;
            }
            break;
        };
        let row: Vec<Option<f64>> = fields
            .map(|field| {
                let field = field.trim();
                field
                    .parse::<f64>()
                    .map_err(|e| DataError::Parse(format!("Bad value {field:?} on {code}: {e}")))
                    .map(|v| (v > -99.99 + 1e-9).then_some(v / 100.0))
            })
            .collect::<Result<_>>()?;
        if row.len() != columns.len() {
            return Err(DataError::Parse(format!(
                "Row {code} has {} values, header has {}",
                row.len(),
                columns.len()
            )));
        }
        dates.push(date);
        values.push(row);
    }

    if dates.is_empty() {
        return Err(DataError::MissingData {
            dataset: "French data library".to_string(),
            reason: "No dated rows after the header".to_string(),
        });
    }

    Ok(FrenchTable {
        dates,
        columns,
        values,
    })
}

/// One observation of the Fama-French factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorRow {
    /// Month (first day) or trading day
    pub date: NaiveDate,
    /// Market excess return
    pub mkt_excess: f64,
    /// Small minus big
    pub smb: f64,
    /// High minus low
    pub hml: f64,
    /// Robust minus weak (five-factor files only)
    pub rmw: Option<f64>,
    /// Conservative minus aggressive (five-factor files only)
    pub cma: Option<f64>,
    /// Risk-free rate
    pub rf: f64,
}

impl FactorRow {
    /// Extract factor rows from a parsed table, skipping incomplete rows.
    pub fn from_table(table: &FrenchTable) -> Result<Vec<Self>> {
        let index = |name: &str| {
            table.column_index(name).ok_or_else(|| DataError::MissingData {
                dataset: "French factors".to_string(),
                reason: format!("column {name} not found"),
            })
        };
        let (mkt, smb, hml, rf) = (
            index("mkt_excess")?,
            index("smb")?,
            index("hml")?,
            index("rf")?,
        );
        let rmw = table.column_index("rmw");
        let cma = table.column_index("cma");

        Ok(table
            .dates
            .iter()
            .zip(&table.values)
            .filter_map(|(date, row)| {
                Some(Self {
                    date: *date,
                    mkt_excess: row[mkt]?,
                    smb: row[smb]?,
                    hml: row[hml]?,
                    rmw: rmw.and_then(|j| row[j]),
                    cma: cma.and_then(|j| row[j]),
                    rf: row[rf]?,
                })
            })
            .collect())
    }

    /// Convert rows into a frame (`date`, factors, `rf`).
    pub fn to_frame(rows: &[Self]) -> Result<DataFrame> {
        let dates: Vec<Option<NaiveDate>> = rows.iter().map(|r| Some(r.date)).collect();
        let mut columns = vec![
            date_column("date", &dates)?,
            Series::new(
                "mkt_excess".into(),
                rows.iter().map(|r| r.mkt_excess).collect::<Vec<_>>(),
            )
            .into(),
            Series::new("smb".into(), rows.iter().map(|r| r.smb).collect::<Vec<_>>()).into(),
            Series::new("hml".into(), rows.iter().map(|r| r.hml).collect::<Vec<_>>()).into(),
        ];
        if rows.iter().any(|r| r.rmw.is_some() || r.cma.is_some()) {
            columns.push(
                Series::new("rmw".into(), rows.iter().map(|r| r.rmw).collect::<Vec<_>>()).into(),
            );
            columns.push(
                Series::new("cma".into(), rows.iter().map(|r| r.cma).collect::<Vec<_>>()).into(),
            );
        }
        columns.push(Series::new("rf".into(), rows.iter().map(|r| r.rf).collect::<Vec<_>>()).into());
        Ok(DataFrame::new(columns)?)
    }

    /// Read rows back from a frame written by [`FactorRow::to_frame`].
    pub fn from_frame(df: &DataFrame) -> Result<Vec<Self>> {
        let dates = required_dates(df, "date")?;
        let mkt = f64_values(df, "mkt_excess")?;
        let smb = f64_values(df, "smb")?;
        let hml = f64_values(df, "hml")?;
        let rmw = optional_f64_values(df, "rmw")?;
        let cma = optional_f64_values(df, "cma")?;
        let rf = f64_values(df, "rf")?;

        Ok((0..df.height())
            .filter_map(|i| {
                Some(Self {
                    date: dates[i],
                    mkt_excess: mkt[i]?,
                    smb: smb[i]?,
                    hml: hml[i]?,
                    rmw: rmw[i],
                    cma: cma[i],
                    rf: rf[i]?,
                })
            })
            .collect())
    }
}

/// Client for the Kenneth French data library.
#[derive(Debug, Clone, Default)]
pub struct FrenchLibrary {
    client: reqwest::Client,
}

impl FrenchLibrary {
    /// Create a client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Download and parse the first table of a dataset.
    pub async fn fetch(&self, dataset: &FrenchDataset) -> Result<FrenchTable> {
        let url = dataset.url();
        debug!(%url, "downloading French dataset");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(DataError::Http {
                status: response.status().as_u16(),
                url,
            });
        }
        let bytes = response.bytes().await?;
        let text = unzip_first_entry(&bytes)?;
        let table = parse_french_csv(&text)?;
        info!(
            dataset = dataset.file_stem(),
            rows = table.dates.len(),
            "parsed French dataset"
        );
        Ok(table)
    }
}

/// Read the first file of a zip archive as (lossy) UTF-8.
pub fn unzip_first_entry(bytes: &[u8]) -> Result<String> {
    let mut archive = ::zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut file = archive.by_index(0)?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}
