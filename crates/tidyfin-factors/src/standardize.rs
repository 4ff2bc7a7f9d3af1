//! Winsorizing and cross-sectional standardization.

use crate::error::Result;
use crate::sorts::breakpoints_at;
use polars::prelude::*;

/// Clip values at the `cut` and `1 - cut` quantiles.
///
/// `cut` must lie in `[0, 0.5)`; other values return the input unchanged.
pub fn winsorize(values: &[f64], cut: f64) -> Vec<f64> {
    if !(0.0..0.5).contains(&cut) || values.is_empty() {
        return values.to_vec();
    }
    let bounds = breakpoints_at(values, &[cut, 1.0 - cut]);
    let [lower, upper] = bounds[..] else {
        return values.to_vec();
    };
    values.iter().map(|v| v.clamp(lower, upper)).collect()
}

/// Standardize to mean zero and unit sample standard deviation.
///
/// A constant or single-value input yields zeros.
pub fn zscore(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let sd = var.sqrt();
    if sd <= f64::EPSILON {
        return vec![0.0; n];
    }
    values.iter().map(|v| (v - mean) / sd).collect()
}

/// Cross-sectionally standardize `column` within each `group` (usually the month).
///
/// Adds `{column}_z` to the frame.
pub fn standardize_by(data: LazyFrame, column: &str, group: &str) -> LazyFrame {
    let mean = col(column).mean().over([col(group)]);
    let std = col(column).std(1).over([col(group)]);
    data.with_columns([((col(column) - mean) / std).alias(format!("{column}_z"))])
}

/// Eager version of [`standardize_by`].
pub fn standardize_frame(df: &DataFrame, column: &str, group: &str) -> Result<DataFrame> {
    Ok(standardize_by(df.clone().lazy(), column, group).collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tidyfin_data::frame::f64_values;

    #[test]
    fn test_winsorize() {
        let values: Vec<f64> = (0..=100).map(f64::from).collect();
        let clipped = winsorize(&values, 0.05);
        assert_relative_eq!(clipped[0], 5.0);
        assert_relative_eq!(clipped[100], 95.0);
        assert_relative_eq!(clipped[50], 50.0);
        assert_eq!(winsorize(&values, 0.7), values);
    }

    #[test]
    fn test_zscore() {
        let z = zscore(&[1.0, 2.0, 3.0]);
        assert_relative_eq!(z[0], -1.0);
        assert_relative_eq!(z[2], 1.0);
        assert_eq!(zscore(&[4.0, 4.0]), vec![0.0, 0.0]);
        assert_eq!(zscore(&[4.0]), vec![0.0]);
    }

    #[test]
    fn test_standardize_by_month() {
        let df = DataFrame::new(vec![
            Series::new("month".into(), vec!["a", "a", "a", "b", "b"]).into(),
            Series::new("x".into(), vec![1.0, 2.0, 3.0, 10.0, 20.0]).into(),
        ])
        .unwrap();
        let out = standardize_frame(&df, "x", "month").unwrap();
        assert_eq!(out.width(), 3);
        let z = f64_values(&out, "x_z").unwrap();
        assert_relative_eq!(z[0].unwrap(), -1.0, epsilon = 1e-12);
        assert_relative_eq!(z[1].unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(z[4].unwrap(), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
    }
}
