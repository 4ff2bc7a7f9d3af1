//! Month arithmetic.
//!
//! Monthly data is keyed by the first day of the calendar month throughout
//! the workspace, so every monthly date passes through [`floor_month`].

use crate::error::{DataError, Result};
use chrono::{Datelike, Months, NaiveDate};

/// First day of the month containing `date`.
pub fn floor_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Shift a date by `months` calendar months (negative moves backwards).
///
/// The day of month is clamped to the target month's length.
pub fn add_months(date: NaiveDate, months: i32) -> NaiveDate {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months.unsigned_abs()))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.unwrap_or(date)
}

/// Number of calendar months from `from` to `to`.
pub fn month_span(from: NaiveDate, to: NaiveDate) -> i32 {
    (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32
}

/// Parse a `YYYYMM` code into the first day of that month.
pub fn parse_yyyymm(code: &str) -> Result<NaiveDate> {
    let code = code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(DataError::Parse(format!("Invalid YYYYMM code: {code}")));
    }
    let year: i32 = code[..4]
        .parse()
        .map_err(|_| DataError::Parse(format!("Invalid year in {code}")))?;
    let month: u32 = code[4..]
        .parse()
        .map_err(|_| DataError::Parse(format!("Invalid month in {code}")))?;
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| DataError::Parse(format!("Invalid YYYYMM code: {code}")))
}

/// Parse a `YYYYMMDD` code.
pub fn parse_yyyymmdd(code: &str) -> Result<NaiveDate> {
    let code = code.trim();
    NaiveDate::parse_from_str(code, "%Y%m%d")
        .map_err(|e| DataError::Parse(format!("Invalid YYYYMMDD code {code}: {e}")))
}

/// Parse the date spellings found in provider files.
///
/// Accepts `YYYY-MM-DD`, `YYYYMMDD`, `YYYY-MM` and `YYYYMM`.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    match value.len() {
        10 => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|e| DataError::Parse(format!("Invalid date {value}: {e}"))),
        8 => parse_yyyymmdd(value),
        7 => parse_yyyymm(&value.replace('-', "")),
        6 => parse_yyyymm(value),
        _ => Err(DataError::Parse(format!("Unrecognised date: {value}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_floor_month() {
        assert_eq!(floor_month(ymd(2023, 5, 31)), ymd(2023, 5, 1));
        assert_eq!(floor_month(ymd(2023, 5, 1)), ymd(2023, 5, 1));
    }

    #[rstest]
    #[case(ymd(2023, 1, 1), 1, ymd(2023, 2, 1))]
    #[case(ymd(2023, 1, 1), -1, ymd(2022, 12, 1))]
    #[case(ymd(2023, 1, 31), 1, ymd(2023, 2, 28))]
    #[case(ymd(2023, 6, 1), 18, ymd(2024, 12, 1))]
    fn test_add_months(#[case] date: NaiveDate, #[case] n: i32, #[case] expected: NaiveDate) {
        assert_eq!(add_months(date, n), expected);
    }

    #[test]
    fn test_month_span() {
        assert_eq!(month_span(ymd(2020, 11, 1), ymd(2021, 2, 1)), 3);
        assert_eq!(month_span(ymd(2021, 2, 1), ymd(2020, 11, 1)), -3);
        assert_eq!(month_span(ymd(2021, 2, 1), ymd(2021, 2, 20)), 0);
    }

    #[rstest]
    #[case("2023-04-28", ymd(2023, 4, 28))]
    #[case("20230428", ymd(2023, 4, 28))]
    #[case("2023-04", ymd(2023, 4, 1))]
    #[case("202304", ymd(2023, 4, 1))]
    fn test_parse_date(#[case] raw: &str, #[case] expected: NaiveDate) {
        assert_eq!(parse_date(raw).unwrap(), expected);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_yyyymm("202313").is_err());
        assert!(parse_yyyymm("2023").is_err());
        assert!(parse_date("yesterday").is_err());
    }
}
