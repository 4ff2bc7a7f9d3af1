//! Ordinary least squares with a choice of coefficient covariance.

use crate::error::{ModelError, Result};
use crate::linalg::{add_intercept, invert};
use crate::newey_west::{hac_coefficient_covariance, optimal_lags};
use ndarray::{Array1, Array2, Axis};
use std::collections::HashMap;

/// Cluster identifiers, one per observation.
#[derive(Debug, Clone, PartialEq)]
pub enum Clusters {
    /// One-way clustering
    One(Vec<i64>),
    /// Two-way clustering (Cameron, Gelbach & Miller 2011)
    Two(Vec<i64>, Vec<i64>),
}

/// How the coefficient covariance matrix is estimated.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CovarianceType {
    /// Homoskedastic `s² (X'X)^{-1}`
    #[default]
    Classical,
    /// Heteroskedasticity-robust HC1
    White,
    /// Newey-West HAC; `None` picks the lag length automatically
    NeweyWest {
        /// Lag length
        lags: Option<usize>,
    },
    /// Cluster-robust
    Clustered(Clusters),
}

/// Result of an OLS fit.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Coefficients; the intercept comes first when requested
    pub coefficients: Array1<f64>,
    /// Standard errors
    pub std_errors: Array1<f64>,
    /// t-statistics
    pub t_stats: Array1<f64>,
    /// Coefficient covariance
    pub covariance: Array2<f64>,
    /// Coefficient of determination
    pub r_squared: f64,
    /// Adjusted R²
    pub adj_r_squared: f64,
    /// Residuals
    pub residuals: Array1<f64>,
    /// Fitted values
    pub fitted: Array1<f64>,
    /// Number of observations
    pub n_obs: usize,
    /// Number of estimated coefficients
    pub n_params: usize,
    /// Residual degrees of freedom, net of absorbed fixed effects
    pub df_resid: usize,
}

impl OlsFit {
    /// Coefficient at `index`.
    pub fn coefficient(&self, index: usize) -> Option<f64> {
        self.coefficients.get(index).copied()
    }
}

/// Regress `y` on `x`, optionally with an intercept.
pub fn ols(y: &Array1<f64>, x: &Array2<f64>, intercept: bool, covariance: &CovarianceType) -> Result<OlsFit> {
    ols_absorbed(y, x, intercept, covariance, 0)
}

/// OLS on data from which `absorbed` fixed-effect parameters were already
/// partialled out.
///
/// The absorbed parameters reduce the residual degrees of freedom for
/// classical and White errors. Cluster-robust errors ignore them, which is
/// correct when the fixed effects are nested within the clusters.
pub fn ols_absorbed(
    y: &Array1<f64>,
    x: &Array2<f64>,
    intercept: bool,
    covariance: &CovarianceType,
    absorbed: usize,
) -> Result<OlsFit> {
    let n = y.len();
    if x.nrows() != n {
        return Err(ModelError::DimensionMismatch {
            expected: n,
            actual: x.nrows(),
        });
    }
    let design = if intercept { add_intercept(x) } else { x.to_owned() };
    let k = design.ncols();
    if n <= k + absorbed {
        return Err(ModelError::InsufficientData {
            required: k + absorbed + 1,
            actual: n,
        });
    }
    let df_resid = n - k - absorbed;

    let xtx_inv = invert(&design.t().dot(&design))?;
    let coefficients = xtx_inv.dot(&design.t().dot(y));
    let fitted = design.dot(&coefficients);
    let residuals = y - &fitted;
    let ssr = residuals.dot(&residuals);

    let cov = match covariance {
        CovarianceType::Classical => &xtx_inv * (ssr / df_resid as f64),
        CovarianceType::White => {
            let scores = &design * &residuals.view().insert_axis(Axis(1));
            let meat = scores.t().dot(&scores);
            xtx_inv.dot(&meat).dot(&xtx_inv) * (n as f64 / df_resid as f64)
        }
        CovarianceType::NeweyWest { lags } => {
            let lags = lags.unwrap_or_else(|| optimal_lags(n));
            hac_coefficient_covariance(&design, &residuals, &xtx_inv, lags)?
        }
        CovarianceType::Clustered(clusters) => clustered_covariance(&design, &residuals, &xtx_inv, clusters)?,
    };

    let std_errors = cov.diag().mapv(|v| v.max(0.0).sqrt());
    let t_stats = ndarray::Zip::from(&coefficients)
        .and(&std_errors)
        .map_collect(|b, se| if *se > 0.0 { b / se } else { f64::NAN });

    let centered = intercept || absorbed > 0;
    let sst = if centered {
        let mean = y.mean().unwrap_or(0.0);
        y.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
    } else {
        y.dot(y)
    };
    let r_squared = if sst > 0.0 { 1.0 - ssr / sst } else { 0.0 };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_resid as f64;

    Ok(OlsFit {
        coefficients,
        std_errors,
        t_stats,
        covariance: cov,
        r_squared,
        adj_r_squared,
        residuals,
        fitted,
        n_obs: n,
        n_params: k,
        df_resid,
    })
}

fn clustered_covariance(
    design: &Array2<f64>,
    residuals: &Array1<f64>,
    xtx_inv: &Array2<f64>,
    clusters: &Clusters,
) -> Result<Array2<f64>> {
    let n = design.nrows();
    let k = design.ncols();
    let one_way = |groups: &[i64]| -> Result<Array2<f64>> {
        if groups.len() != n {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                actual: groups.len(),
            });
        }
        let (meat, n_groups) = cluster_meat(design, residuals, groups);
        if n_groups < 2 {
            return Err(ModelError::InsufficientData {
                required: 2,
                actual: n_groups,
            });
        }
        let g = n_groups as f64;
        let factor = g / (g - 1.0) * (n as f64 - 1.0) / (n - k) as f64;
        Ok(xtx_inv.dot(&meat).dot(xtx_inv) * factor)
    };

    match clusters {
        Clusters::One(groups) => one_way(groups),
        Clusters::Two(first, second) => {
            if first.len() != second.len() {
                return Err(ModelError::DimensionMismatch {
                    expected: first.len(),
                    actual: second.len(),
                });
            }
            let mut ids: HashMap<(i64, i64), i64> = HashMap::new();
            let intersection: Vec<i64> = first
                .iter()
                .zip(second)
                .map(|(a, b)| {
                    let next = ids.len() as i64;
                    *ids.entry((*a, *b)).or_insert(next)
                })
                .collect();
            Ok(one_way(first)? + one_way(second)? - one_way(&intersection)?)
        }
    }
}

/// Sum over clusters of the outer products of the summed scores.
fn cluster_meat(design: &Array2<f64>, residuals: &Array1<f64>, groups: &[i64]) -> (Array2<f64>, usize) {
    let k = design.ncols();
    let mut sums: HashMap<i64, Array1<f64>> = HashMap::new();
    for (i, group) in groups.iter().enumerate() {
        let score = &design.row(i) * residuals[i];
        *sums.entry(*group).or_insert_with(|| Array1::zeros(k)) += &score;
    }
    let mut meat = Array2::<f64>::zeros((k, k));
    for score in sums.values() {
        let column = score.view().insert_axis(Axis(1));
        meat += &column.dot(&column.t());
    }
    (meat, sums.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rstest::rstest;

    fn sample() -> (Array1<f64>, Array2<f64>) {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]];
        let y = array![2.1, 3.9, 6.2, 7.8, 10.1, 12.0];
        (y, x)
    }

    #[test]
    fn test_exact_fit() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = x.column(0).mapv(|v| 1.0 + 2.0 * v);
        let fit = ols(&y, &x, true, &CovarianceType::Classical).unwrap();
        assert_relative_eq!(fit.coefficients[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(fit.coefficients[1], 2.0, epsilon = 1e-10);
        assert_relative_eq!(fit.r_squared, 1.0, epsilon = 1e-10);
        assert_eq!(fit.n_params, 2);
        assert_eq!(fit.df_resid, 2);
    }

    #[test]
    fn test_classical_standard_error() {
        let (y, x) = sample();
        let fit = ols(&y, &x, true, &CovarianceType::Classical).unwrap();
        // Slope SE = sqrt(s² / Sxx) with Sxx = 17.5
        let s2 = fit.residuals.dot(&fit.residuals) / 4.0;
        assert_relative_eq!(fit.std_errors[1], (s2 / 17.5).sqrt(), epsilon = 1e-10);
        assert_relative_eq!(fit.t_stats[1], fit.coefficients[1] / fit.std_errors[1]);
        assert!(fit.adj_r_squared < fit.r_squared);
    }

    #[rstest]
    #[case(CovarianceType::White)]
    #[case(CovarianceType::NeweyWest { lags: Some(2) })]
    #[case(CovarianceType::NeweyWest { lags: None })]
    #[case(CovarianceType::Clustered(Clusters::One(vec![1, 1, 2, 2, 3, 3])))]
    #[case(CovarianceType::Clustered(Clusters::Two(vec![1, 1, 2, 2, 3, 3], vec![1, 2, 1, 2, 1, 2])))]
    fn test_robust_estimators_keep_coefficients(#[case] covariance: CovarianceType) {
        let (y, x) = sample();
        let classical = ols(&y, &x, true, &CovarianceType::Classical).unwrap();
        let robust = ols(&y, &x, true, &covariance).unwrap();
        assert_relative_eq!(classical.coefficients[1], robust.coefficients[1], epsilon = 1e-12);
        assert!(robust.std_errors.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_one_cluster_per_observation_matches_white_up_to_df() {
        let (y, x) = sample();
        let white = ols(&y, &x, true, &CovarianceType::White).unwrap();
        let clustered = ols(
            &y,
            &x,
            true,
            &CovarianceType::Clustered(Clusters::One((0..6).collect())),
        )
        .unwrap();
        // HC1 uses n/(n-k); clustering uses G/(G-1)·(n-1)/(n-k) with G = n.
        assert_relative_eq!(white.covariance[[1, 1]], clustered.covariance[[1, 1]], epsilon = 1e-12);
    }

    #[test]
    fn test_errors() {
        let (y, x) = sample();
        let collinear = ndarray::concatenate![Axis(1), x, x];
        assert!(matches!(
            ols(&y, &collinear, true, &CovarianceType::Classical),
            Err(ModelError::Singular)
        ));
        assert!(matches!(
            ols(&y.slice(ndarray::s![..2]).to_owned(), &x.slice(ndarray::s![..2, ..]).to_owned(), true, &CovarianceType::Classical),
            Err(ModelError::InsufficientData { .. })
        ));
        let bad = CovarianceType::Clustered(Clusters::One(vec![1; 6]));
        assert!(ols(&y, &x, true, &bad).is_err());
    }
}
