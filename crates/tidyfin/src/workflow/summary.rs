//! Summary statistics of stored tables.

use super::require_table;
use crate::error::{Error, Result};
use chrono::NaiveDate;
use polars::prelude::{DataFrame, DataType, NamedFrom, Series};
use std::collections::HashMap;
use tidyfin_data::Database;
use tidyfin_data::frame::{date_values, f64_values};
use tidyfin_data::store::tables::{CPI_MONTHLY, CRSP_MONTHLY};
use tidyfin_output::{SummaryTable, Table, summarise_frame};

const IDENTIFIERS: [&str; 3] = ["permno", "gvkey", "year"];

/// Distribution of `columns` of `table`.
///
/// With no columns, every numeric column other than identifiers is summarised.
/// `crsp_monthly` gains `mktcap_real` once `cpi_monthly` is stored.
pub fn summarise_table(db: &Database, table: &str, columns: &[String]) -> Result<SummaryTable> {
    require_table(db, table, "see `tidyfin info` for the available tables")?;
    let mut df = db.read_table(table)?;
    if table == CRSP_MONTHLY && db.has_table(CPI_MONTHLY)? {
        let real = real_mktcap(db, &df)?;
        df.with_column(Series::new("mktcap_real".into(), real))?;
    }

    let columns: Vec<String> = if columns.is_empty() {
        df.get_columns()
            .iter()
            .filter(|c| {
                matches!(
                    c.dtype(),
                    DataType::Float64 | DataType::Float32 | DataType::Int64 | DataType::Int32
                ) && !IDENTIFIERS.contains(&c.name().as_str())
            })
            .map(|c| c.name().to_string())
            .collect()
    } else {
        columns.to_vec()
    };
    if columns.is_empty() {
        return Err(Error::InsufficientData(format!("{table} has no numeric columns")));
    }

    let names: Vec<&str> = columns.iter().map(String::as_str).collect();
    Ok(summarise_frame(&df, &names)?.with_title(table))
}

/// Market cap in prices of the last CPI month; `None` where the month has no CPI.
fn real_mktcap(db: &Database, df: &DataFrame) -> Result<Vec<Option<f64>>> {
    let cpi: HashMap<NaiveDate, f64> = db.load_cpi()?.into_iter().map(|r| (r.month, r.cpi)).collect();
    let months = date_values(df, "month")?;
    let mktcap = f64_values(df, "mktcap")?;
    Ok(months
        .into_iter()
        .zip(mktcap)
        .map(|(month, mktcap)| Some(mktcap? / cpi.get(&month?)?))
        .collect())
}

/// Row counts of every table and the file size.
pub fn database_table(db: &Database) -> Result<Table> {
    let stats = db.stats()?;
    let mut table = Table::new(
        format!(
            "Database: {} tables, {} rows, {:.1} MB",
            stats.tables.len(),
            stats.total_rows(),
            stats.size_bytes as f64 / 1_048_576.0
        ),
        ["table", "rows"],
    );
    for t in &stats.tables {
        table.push_row([t.name.clone(), t.rows.to_string()]);
    }
    Ok(table)
}
