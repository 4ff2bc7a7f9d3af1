//! Elastic-net regression (ridge, lasso and everything in between).
//!
//! Minimises
//! ```text
//! 1/(2n) ||y - b0 - X b||² + λ [ (1-α)/2 ||b||² + α ||b||_1 ]
//! ```
//! by cyclic coordinate descent on standardized regressors (Friedman,
//! Hastie & Tibshirani 2010). The intercept is not penalized and the
//! coefficients are reported on the original scale.

use crate::error::{ModelError, Result};
use crate::linalg::column_means;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Elastic-net settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElasticNetConfig {
    /// Mixing weight: 0 = ridge, 1 = lasso
    pub alpha: f64,
    /// Penalty strength
    pub lambda: f64,
    /// Maximum full sweeps over the coefficients
    pub max_iterations: usize,
    /// Stop when no standardized coefficient moves more than this
    pub tolerance: f64,
}

impl Default for ElasticNetConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            lambda: 0.0,
            max_iterations: 10_000,
            tolerance: 1e-8,
        }
    }
}

impl ElasticNetConfig {
    /// Config with the given mixing weight and penalty.
    pub fn new(alpha: f64, lambda: f64) -> Self {
        Self {
            alpha,
            lambda,
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ModelError::InvalidParameter(format!("alpha must lie in [0, 1], got {}", self.alpha)));
        }
        if self.lambda.is_nan() || self.lambda < 0.0 {
            return Err(ModelError::InvalidParameter(format!("lambda must be non-negative, got {}", self.lambda)));
        }
        Ok(())
    }
}

/// A fitted elastic net.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticNet {
    /// Unpenalized intercept
    pub intercept: f64,
    /// Slopes on the original scale
    pub coefficients: Array1<f64>,
    /// Mixing weight used
    pub alpha: f64,
    /// Penalty used
    pub lambda: f64,
    /// Sweeps until convergence
    pub iterations: usize,
}

/// Column means and population standard deviations.
fn scale(x: &Array2<f64>) -> (Array1<f64>, Array1<f64>) {
    let means = column_means(x);
    let n = x.nrows().max(1) as f64;
    let sds = (x - &means)
        .mapv(|v| v * v)
        .sum_axis(Axis(0))
        .mapv(|s| (s / n).sqrt());
    (means, sds)
}

fn standardize(x: &Array2<f64>, means: &Array1<f64>, sds: &Array1<f64>) -> Array2<f64> {
    let safe = sds.mapv(|s| if s > 0.0 { s } else { 1.0 });
    let mut xs = (x - means) / &safe;
    for (j, sd) in sds.iter().enumerate() {
        if *sd <= 0.0 {
            xs.column_mut(j).fill(0.0);
        }
    }
    xs
}

fn soft_threshold(z: f64, gamma: f64) -> f64 {
    if z > gamma {
        z - gamma
    } else if z < -gamma {
        z + gamma
    } else {
        0.0
    }
}

impl ElasticNet {
    /// Fit on `x` (n × p) and `y` (n).
    pub fn fit(x: &Array2<f64>, y: &Array1<f64>, config: &ElasticNetConfig) -> Result<Self> {
        config.validate()?;
        let (n, p) = x.dim();
        if y.len() != n {
            return Err(ModelError::DimensionMismatch { expected: n, actual: y.len() });
        }
        if n < 2 {
            return Err(ModelError::InsufficientData { required: 2, actual: n });
        }

        let (means, sds) = scale(x);
        let xs = standardize(x, &means, &sds);
        let y_mean = y.mean().unwrap_or(0.0);
        let mut residual = y - y_mean;
        let mut beta = Array1::<f64>::zeros(p);

        let l1 = config.lambda * config.alpha;
        let l2 = config.lambda * (1.0 - config.alpha);
        let nf = n as f64;
        let mut iterations = 0;
        let mut converged = p == 0;
        while !converged && iterations < config.max_iterations {
            iterations += 1;
            let mut max_change = 0.0_f64;
            for j in 0..p {
                if sds[j] <= 0.0 {
                    continue;
                }
                let column = xs.column(j);
                let rho = column.dot(&residual) / nf + beta[j];
                let updated = soft_threshold(rho, l1) / (1.0 + l2);
                let delta = updated - beta[j];
                if delta != 0.0 {
                    residual.scaled_add(-delta, &column);
                    beta[j] = updated;
                    max_change = max_change.max(delta.abs());
                }
            }
            converged = max_change < config.tolerance;
        }
        if !converged {
            warn!(
                iterations,
                lambda = config.lambda,
                alpha = config.alpha,
                "coordinate descent did not converge"
            );
        }

        let coefficients = ndarray::Zip::from(&beta)
            .and(&sds)
            .map_collect(|b, sd| if *sd > 0.0 { b / sd } else { 0.0 });
        let intercept = y_mean - means.dot(&coefficients);
        Ok(Self {
            intercept,
            coefficients,
            alpha: config.alpha,
            lambda: config.lambda,
            iterations,
        })
    }

    /// Predictions for new rows.
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }

    /// Number of non-zero slopes.
    pub fn n_nonzero(&self) -> usize {
        self.coefficients.iter().filter(|b| **b != 0.0).count()
    }
}

/// Smallest penalty at which every slope is zero.
///
/// For ridge (`alpha = 0`) the lasso value at `alpha = 0.001` is used, as
/// glmnet does.
pub fn lambda_max(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> f64 {
    let n = x.nrows().max(1) as f64;
    let (means, sds) = scale(x);
    let xs = standardize(x, &means, &sds);
    let centered = y - y.mean().unwrap_or(0.0);
    let largest = xs
        .t()
        .dot(&centered)
        .iter()
        .fold(0.0_f64, |m, v| m.max(v.abs()));
    largest / n / alpha.max(1e-3)
}

/// `n` penalties from `lambda_max` down to `lambda_max * min_ratio`,
/// evenly spaced on the log scale.
pub fn lambda_path(lambda_max: f64, n: usize, min_ratio: f64) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lambda_max],
        _ => {
            let step = min_ratio.ln() / (n - 1) as f64;
            (0..n).map(|i| lambda_max * (step * i as f64).exp()).collect()
        }
    }
}

/// Mean squared error between two equally long series.
pub fn mean_squared_error(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    let n = actual.len().max(1) as f64;
    (actual - predicted).mapv(|e| e * e).sum() / n
}

/// Cross-validated error of one grid point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CvPoint {
    /// Mixing weight
    pub alpha: f64,
    /// Penalty
    pub lambda: f64,
    /// Mean squared error averaged over folds
    pub mse: f64,
}

/// Outcome of [`cross_validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvResult {
    /// Grid point with the lowest error
    pub best: CvPoint,
    /// Every evaluated grid point
    pub grid: Vec<CvPoint>,
}

/// Contiguous fold boundaries `[start, end)`; keeps the time order intact.
pub fn fold_bounds(n: usize, folds: usize) -> Vec<(usize, usize)> {
    (0..folds).map(|f| (f * n / folds, (f + 1) * n / folds)).collect()
}

fn rows(x: &Array2<f64>, y: &Array1<f64>, keep: impl Fn(usize) -> bool) -> (Array2<f64>, Array1<f64>) {
    let index: Vec<usize> = (0..y.len()).filter(|i| keep(*i)).collect();
    (x.select(Axis(0), &index), y.select(Axis(0), &index))
}

/// k-fold cross validation over an (alpha, lambda) grid.
///
/// Grid points are evaluated in parallel.
pub fn cross_validate(
    x: &Array2<f64>,
    y: &Array1<f64>,
    alphas: &[f64],
    lambdas: &[f64],
    folds: usize,
) -> Result<CvResult> {
    let n = y.len();
    if folds < 2 || folds > n {
        return Err(ModelError::InvalidParameter(format!("cannot split {n} rows into {folds} folds")));
    }
    if alphas.is_empty() || lambdas.is_empty() {
        return Err(ModelError::InvalidParameter("empty tuning grid".to_string()));
    }

    let splits: Vec<_> = fold_bounds(n, folds)
        .into_iter()
        .map(|(start, end)| {
            let train = rows(x, y, |i| i < start || i >= end);
            let test = rows(x, y, |i| i >= start && i < end);
            (train, test)
        })
        .collect();

    let grid_points: Vec<(f64, f64)> = alphas
        .iter()
        .flat_map(|a| lambdas.iter().map(move |l| (*a, *l)))
        .collect();

    let grid = grid_points
        .par_iter()
        .map(|&(alpha, lambda)| -> Result<CvPoint> {
            let config = ElasticNetConfig::new(alpha, lambda);
            let mut total = 0.0;
            for ((train_x, train_y), (test_x, test_y)) in &splits {
                let model = ElasticNet::fit(train_x, train_y, &config)?;
                total += mean_squared_error(test_y, &model.predict(test_x));
            }
            Ok(CvPoint {
                alpha,
                lambda,
                mse: total / splits.len() as f64,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let best = grid
        .iter()
        .copied()
        .min_by(|a, b| a.mse.total_cmp(&b.mse))
        .ok_or_else(|| ModelError::InvalidParameter("empty tuning grid".to_string()))?;
    debug!(alpha = best.alpha, lambda = best.lambda, mse = best.mse, "cross validation");
    Ok(CvResult { best, grid })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ols::{CovarianceType, ols};
    use approx::assert_relative_eq;
    use rstest::rstest;

    /// y depends on the first two of four regressors.
    fn data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 4), |(i, j)| (((i * (j + 3) + j * 7) % 13) as f64 - 6.0) / 3.0);
        let y = Array1::from_shape_fn(n, |i| {
            1.0 + 2.0 * x[[i, 0]] - 1.0 * x[[i, 1]] + if i % 2 == 0 { 0.1 } else { -0.1 }
        });
        (x, y)
    }

    #[test]
    fn test_zero_penalty_is_ols() {
        let (x, y) = data(60);
        let net = ElasticNet::fit(&x, &y, &ElasticNetConfig::new(1.0, 0.0)).unwrap();
        let fit = ols(&y, &x, true, &CovarianceType::Classical).unwrap();
        assert_relative_eq!(net.intercept, fit.coefficients[0], epsilon = 1e-5);
        for j in 0..4 {
            assert_relative_eq!(net.coefficients[j], fit.coefficients[j + 1], epsilon = 1e-5);
        }
    }

    #[rstest]
    #[case(1.0)]
    #[case(0.5)]
    fn test_lambda_max_zeroes_slopes(#[case] alpha: f64) {
        let (x, y) = data(60);
        let lmax = lambda_max(&x, &y, alpha);
        let net = ElasticNet::fit(&x, &y, &ElasticNetConfig::new(alpha, lmax * 1.0001)).unwrap();
        assert_eq!(net.n_nonzero(), 0);
        assert_relative_eq!(net.intercept, y.mean().unwrap(), epsilon = 1e-12);
        let below = ElasticNet::fit(&x, &y, &ElasticNetConfig::new(alpha, lmax * 0.9)).unwrap();
        assert!(below.n_nonzero() > 0);
    }

    #[test]
    fn test_ridge_shrinks() {
        let (x, y) = data(60);
        let small = ElasticNet::fit(&x, &y, &ElasticNetConfig::new(0.0, 0.01)).unwrap();
        let large = ElasticNet::fit(&x, &y, &ElasticNetConfig::new(0.0, 10.0)).unwrap();
        let norm = |b: &Array1<f64>| b.dot(b);
        assert!(norm(&large.coefficients) < norm(&small.coefficients));
        assert_eq!(large.n_nonzero(), 4);
    }

    #[test]
    fn test_lambda_path() {
        let path = lambda_path(1.0, 5, 1e-4);
        assert_eq!(path.len(), 5);
        assert_relative_eq!(path[0], 1.0);
        assert_relative_eq!(path[2], 1e-2, epsilon = 1e-12);
        assert_relative_eq!(path[4], 1e-4, epsilon = 1e-12);
        assert!(lambda_path(1.0, 0, 0.1).is_empty());
    }

    #[test]
    fn test_cross_validation_prefers_small_penalty() {
        let (x, y) = data(80);
        let lmax = lambda_max(&x, &y, 1.0);
        let lambdas = lambda_path(lmax, 8, 1e-3);
        let cv = cross_validate(&x, &y, &[0.0, 1.0], &lambdas, 5).unwrap();
        assert_eq!(cv.grid.len(), 16);
        assert!(cv.best.lambda < lmax * 0.1);
        assert!(cv.best.mse < 0.1);
        assert_eq!(fold_bounds(10, 3), vec![(0, 3), (3, 6), (6, 10)]);
    }

    #[test]
    fn test_invalid_config() {
        let (x, y) = data(10);
        assert!(ElasticNet::fit(&x, &y, &ElasticNetConfig::new(1.5, 0.1)).is_err());
        assert!(ElasticNet::fit(&x, &y, &ElasticNetConfig::new(0.5, -1.0)).is_err());
        assert!(cross_validate(&x, &y, &[1.0], &[0.1], 1).is_err());
    }
}
