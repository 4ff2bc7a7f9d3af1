//! Distribution statistics of variables.
//!
//! Mean, standard deviation, extremes and the 5/25/50/75/95 % quantiles of
//! each variable, with missing and non-finite values dropped.

use crate::table::{Table, format_number};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Summary of one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// Variable name
    pub variable: String,
    /// Arithmetic mean
    pub mean: f64,
    /// Sample standard deviation
    pub sd: f64,
    /// Minimum
    pub min: f64,
    /// 5 % quantile
    pub q05: f64,
    /// 25 % quantile
    pub q25: f64,
    /// Median
    pub q50: f64,
    /// 75 % quantile
    pub q75: f64,
    /// 95 % quantile
    pub q95: f64,
    /// Maximum
    pub max: f64,
    /// Non-missing observations
    pub n: usize,
}

/// Linearly interpolated quantile of sorted data.
fn sorted_quantile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let position = p * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

/// Summarise the finite values of a variable.
pub fn summarise(variable: impl Into<String>, values: &[f64]) -> SummaryStatistics {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let mean = if n > 0 { sorted.iter().sum::<f64>() / n as f64 } else { f64::NAN };
    let sd = if n > 1 {
        (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    } else {
        f64::NAN
    };
    SummaryStatistics {
        variable: variable.into(),
        mean,
        sd,
        min: sorted.first().copied().unwrap_or(f64::NAN),
        q05: sorted_quantile(&sorted, 0.05),
        q25: sorted_quantile(&sorted, 0.25),
        q50: sorted_quantile(&sorted, 0.50),
        q75: sorted_quantile(&sorted, 0.75),
        q95: sorted_quantile(&sorted, 0.95),
        max: sorted.last().copied().unwrap_or(f64::NAN),
        n,
    }
}

/// Summaries of the named numeric columns of a frame.
pub fn summarise_frame(df: &DataFrame, columns: &[&str]) -> PolarsResult<SummaryTable> {
    let mut rows = Vec::with_capacity(columns.len());
    for name in columns {
        let series = df.column(name)?.cast(&DataType::Float64)?;
        let values: Vec<f64> = series.f64()?.into_iter().flatten().collect();
        rows.push(summarise(*name, &values));
    }
    Ok(SummaryTable {
        title: String::new(),
        rows,
    })
}

/// Summaries of several variables.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SummaryTable {
    /// Table title
    pub title: String,
    /// One row per variable
    pub rows: Vec<SummaryStatistics>,
}

impl SummaryTable {
    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Lay the statistics out as a [`Table`] with `decimals` places.
    pub fn to_table(&self, decimals: usize) -> Table {
        let mut table = Table::new(
            self.title.clone(),
            ["variable", "mean", "sd", "min", "q05", "q25", "q50", "q75", "q95", "max", "n"],
        );
        for s in &self.rows {
            let mut cells = vec![s.variable.clone()];
            cells.extend(
                [s.mean, s.sd, s.min, s.q05, s.q25, s.q50, s.q75, s.q95, s.max]
                    .iter()
                    .map(|v| format_number(*v, decimals)),
            );
            cells.push(s.n.to_string());
            table.push_row(cells);
        }
        table
    }

    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        self.to_table(3).to_ascii_table()
    }

    /// Format as Markdown.
    pub fn to_markdown(&self) -> String {
        self.to_table(3).to_markdown()
    }
}

impl fmt::Display for SummaryTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ascii_table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_summarise() {
        let values: Vec<f64> = (1..=101).map(f64::from).collect();
        let s = summarise("x", &values);
        assert_eq!(s.n, 101);
        assert_relative_eq!(s.mean, 51.0);
        assert_relative_eq!(s.min, 1.0);
        assert_relative_eq!(s.q05, 6.0);
        assert_relative_eq!(s.q25, 26.0);
        assert_relative_eq!(s.q50, 51.0);
        assert_relative_eq!(s.q95, 96.0);
        assert_relative_eq!(s.max, 101.0);
    }

    #[test]
    fn test_interpolation_and_missing() {
        let s = summarise("x", &[4.0, f64::NAN, 1.0, 2.0, 3.0]);
        assert_eq!(s.n, 4);
        assert_relative_eq!(s.q50, 2.5);
        assert_relative_eq!(s.q25, 1.75);
        assert_relative_eq!(s.sd, (5.0_f64 / 3.0).sqrt(), epsilon = 1e-12);

        let empty = summarise("y", &[]);
        assert_eq!(empty.n, 0);
        assert!(empty.mean.is_nan());
    }

    #[test]
    fn test_frame_summary_with_nulls() {
        let df = DataFrame::new(vec![
            Series::new("ret".into(), vec![Some(0.01), None, Some(0.03)]).into(),
            Series::new("n".into(), vec![1_i64, 2, 3]).into(),
        ])
        .unwrap();
        let table = summarise_frame(&df, &["ret", "n"]).unwrap().with_title("Sample");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].n, 2);
        assert_relative_eq!(table.rows[0].mean, 0.02, epsilon = 1e-12);
        assert_relative_eq!(table.rows[1].q50, 2.0);
        assert!(table.to_ascii_table().contains("Sample"));
        assert!(table.to_markdown().contains("| ret |"));
        assert!(summarise_frame(&df, &["missing"]).is_err());
    }
}
