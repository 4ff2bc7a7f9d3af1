//! Conversions between polars frames and typed column vectors.
//!
//! Typed records (`StockMonth`, `FactorRow`, ...) are converted to frames at
//! the storage boundary. Dates are stored physically as days since the Unix
//! epoch and exposed as `NaiveDate`.

use crate::dates::parse_date;
use crate::error::{DataError, Result};
use chrono::NaiveDate;
use polars::prelude::*;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Build a `Date` column from optional dates.
pub fn date_column(name: &str, dates: &[Option<NaiveDate>]) -> Result<Column> {
    let epoch = epoch();
    let days: Vec<Option<i32>> = dates
        .iter()
        .map(|d| d.map(|d| (d - epoch).num_days() as i32))
        .collect();
    let series = Series::new(name.into(), days).cast(&DataType::Date)?;
    Ok(series.into())
}

/// Build a `Date` column from dates that are always present.
pub fn required_date_column(name: &str, dates: &[NaiveDate]) -> Result<Column> {
    let dates: Vec<Option<NaiveDate>> = dates.iter().copied().map(Some).collect();
    date_column(name, &dates)
}

/// Extract a column as `f64` values, casting integers.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Extract a column as `i64` values.
pub fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

/// Extract a column as owned strings.
pub fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Extract a column as dates.
///
/// Accepts `Date` columns as well as ISO strings as stored in SQLite.
pub fn date_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    let column = df.column(name)?;
    match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| v.map(parse_date).transpose())
            .collect(),
        DataType::Date => {
            let epoch = epoch();
            let days = column.cast(&DataType::Int32)?;
            Ok(days
                .i32()?
                .into_iter()
                .map(|d| d.map(|d| epoch + chrono::Duration::days(i64::from(d))))
                .collect())
        }
        _ if column.null_count() == column.len() => Ok(vec![None; column.len()]),
        other => Err(DataError::Parse(format!(
            "Column {name} has type {other}, expected a date"
        ))),
    }
}

/// Extract a date column that must not contain nulls.
pub fn required_dates(df: &DataFrame, name: &str) -> Result<Vec<NaiveDate>> {
    date_values(df, name)?
        .into_iter()
        .map(|d| d.ok_or_else(|| DataError::Parse(format!("Null value in column {name}"))))
        .collect()
}

/// Extract an integer column that must not contain nulls.
pub fn required_i64(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    i64_values(df, name)?
        .into_iter()
        .map(|v| v.ok_or_else(|| DataError::Parse(format!("Null value in column {name}"))))
        .collect()
}

/// Look up an optional float column, returning all-null values when absent.
pub fn optional_f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    if df.get_column_names().iter().any(|c| c.as_str() == name) {
        f64_values(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_column_roundtrip() {
        let dates = vec![
            Some(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()),
            None,
            Some(NaiveDate::from_ymd_opt(1960, 1, 1).unwrap()),
        ];
        let df = DataFrame::new(vec![date_column("date", &dates).unwrap()]).unwrap();
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
        assert_eq!(date_values(&df, "date").unwrap(), dates);
    }

    #[test]
    fn test_string_dates() {
        let df = DataFrame::new(vec![
            Series::new("month".into(), vec![Some("2020-01-01"), None]).into(),
        ])
        .unwrap();
        let values = date_values(&df, "month").unwrap();
        assert_eq!(values[0], NaiveDate::from_ymd_opt(2020, 1, 1));
        assert_eq!(values[1], None);
        assert!(required_dates(&df, "month").is_err());
    }

    #[test]
    fn test_null_and_empty_date_columns() {
        let df = DataFrame::new(vec![
            Series::new("month".into(), vec![None::<f64>, None]).into(),
            Series::new("ret".into(), vec![Some(0.01), None]).into(),
        ])
        .unwrap();
        assert_eq!(date_values(&df, "month").unwrap(), vec![None, None]);
        assert!(date_values(&df, "ret").is_err());

        let empty = DataFrame::new(vec![Series::new("month".into(), Vec::<f64>::new()).into()]).unwrap();
        assert!(date_values(&empty, "month").unwrap().is_empty());
    }

    #[test]
    fn test_numeric_values() {
        let df = DataFrame::new(vec![
            Series::new("permno".into(), vec![10001_i64, 10002]).into(),
            Series::new("ret".into(), vec![Some(0.01), None]).into(),
        ])
        .unwrap();
        assert_eq!(required_i64(&df, "permno").unwrap(), vec![10001, 10002]);
        assert_eq!(f64_values(&df, "permno").unwrap(), vec![Some(10001.0), Some(10002.0)]);
        assert_eq!(f64_values(&df, "ret").unwrap(), vec![Some(0.01), None]);
        assert_eq!(optional_f64_values(&df, "rmw").unwrap(), vec![None, None]);
        assert!(f64_values(&df, "missing").is_err());
    }
}
