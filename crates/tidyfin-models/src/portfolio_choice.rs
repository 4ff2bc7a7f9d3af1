//! Mean-variance portfolios and parametric portfolio policies.
//!
//! The parametric policy of Brandt, Santa-Clara & Valkanov (2009) tilts a
//! benchmark portfolio towards stocks with favourable characteristics:
//! ```text
//! w_i,t = w̄_i,t + θ' x_i,t / N_t
//! ```
//! where `x_i,t` are cross-sectionally standardized characteristics. `θ`
//! is chosen to maximise the average CRRA utility of the portfolio return.

use crate::error::{ModelError, Result};
use crate::linalg::invert;
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

fn check_square(sigma: &Array2<f64>, mu_len: Option<usize>) -> Result<()> {
    let n = sigma.nrows();
    if n == 0 {
        return Err(ModelError::InsufficientData { required: 1, actual: 0 });
    }
    if sigma.ncols() != n {
        return Err(ModelError::DimensionMismatch {
            expected: n,
            actual: sigma.ncols(),
        });
    }
    if let Some(len) = mu_len
        && len != n
    {
        return Err(ModelError::DimensionMismatch { expected: n, actual: len });
    }
    Ok(())
}

/// Minimum-variance weights `Σ⁻¹1 / 1'Σ⁻¹1`.
pub fn minimum_variance_weights(sigma: &Array2<f64>) -> Result<Array1<f64>> {
    check_square(sigma, None)?;
    let raw = invert(sigma)?.dot(&Array1::ones(sigma.nrows()));
    let total = raw.sum();
    Ok(raw / total)
}

/// Fully invested weights with the lowest variance for expected return
/// `target`.
pub fn efficient_weights(sigma: &Array2<f64>, mu: &Array1<f64>, target: f64) -> Result<Array1<f64>> {
    check_square(sigma, Some(mu.len()))?;
    let inv = invert(sigma)?;
    let ones = Array1::<f64>::ones(mu.len());
    let inv_ones = inv.dot(&ones);
    let inv_mu = inv.dot(mu);
    let c = ones.dot(&inv_ones);
    let d = ones.dot(&inv_mu);
    let e = mu.dot(&inv_mu);
    let denominator = e - d * d / c;
    if denominator.abs() <= f64::EPSILON {
        return Err(ModelError::Singular);
    }
    let lambda_tilde = 2.0 * (target - d / c) / denominator;
    let mvp = &inv_ones / c;
    Ok(mvp + (&inv_mu - &(&inv_ones * (d / c))) * (lambda_tilde / 2.0))
}

/// One point on the efficient frontier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    /// Weight on the efficient portfolio; the rest is in the minimum-variance portfolio
    pub a: f64,
    /// Expected return
    pub mean: f64,
    /// Volatility
    pub sd: f64,
}

/// Efficient frontier traced by combining the minimum-variance portfolio
/// with the efficient portfolio for `target` (two-fund separation).
pub fn efficient_frontier(sigma: &Array2<f64>, mu: &Array1<f64>, target: f64, a_values: &[f64]) -> Result<Vec<FrontierPoint>> {
    let mvp = minimum_variance_weights(sigma)?;
    let efficient = efficient_weights(sigma, mu, target)?;
    Ok(a_values
        .iter()
        .map(|&a| {
            let w = &efficient * a + &mvp * (1.0 - a);
            FrontierPoint {
                a,
                mean: w.dot(mu),
                sd: w.dot(&sigma.dot(&w)).max(0.0).sqrt(),
            }
        })
        .collect())
}

/// The cross-section of stocks in one month.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossSection {
    /// Month
    pub month: NaiveDate,
    /// Standardized characteristics, one row per stock
    pub characteristics: Array2<f64>,
    /// Benchmark weights (usually value weights)
    pub benchmark: Array1<f64>,
    /// Realized returns over the holding period
    pub returns: Array1<f64>,
}

impl CrossSection {
    fn validate(&self, n_characteristics: usize) -> Result<()> {
        let n = self.returns.len();
        if self.characteristics.nrows() != n || self.benchmark.len() != n {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                actual: self.characteristics.nrows().min(self.benchmark.len()),
            });
        }
        if self.characteristics.ncols() != n_characteristics {
            return Err(ModelError::DimensionMismatch {
                expected: n_characteristics,
                actual: self.characteristics.ncols(),
            });
        }
        if n == 0 {
            return Err(ModelError::InsufficientData { required: 1, actual: 0 });
        }
        Ok(())
    }
}

/// Policy weights `w̄ + θ'x / N`.
///
/// Without short selling, negative weights are set to zero and the rest
/// renormalised to sum to one.
pub fn compute_portfolio_weights(
    theta: &Array1<f64>,
    characteristics: &Array2<f64>,
    benchmark: &Array1<f64>,
    allow_short_selling: bool,
) -> Result<Array1<f64>> {
    if characteristics.ncols() != theta.len() {
        return Err(ModelError::DimensionMismatch {
            expected: theta.len(),
            actual: characteristics.ncols(),
        });
    }
    if characteristics.nrows() != benchmark.len() {
        return Err(ModelError::DimensionMismatch {
            expected: benchmark.len(),
            actual: characteristics.nrows(),
        });
    }
    let n = benchmark.len() as f64;
    let mut weights = benchmark + &(characteristics.dot(theta) / n);
    if !allow_short_selling {
        weights.mapv_inplace(|w| w.max(0.0));
        let total = weights.sum();
        if total <= 0.0 {
            return Err(ModelError::InvalidParameter(
                "policy leaves no positive weight".to_string(),
            ));
        }
        weights /= total;
    }
    Ok(weights)
}

/// CRRA utility of a gross return `1 + r` with relative risk aversion `gamma`.
pub fn crra_utility(r: f64, gamma: f64) -> f64 {
    let gross = 1.0 + r;
    if (gamma - 1.0).abs() < 1e-12 {
        gross.ln()
    } else {
        gross.powf(1.0 - gamma) / (1.0 - gamma)
    }
}

/// Performance of a policy over all months.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    /// Average CRRA utility
    pub expected_utility: f64,
    /// Average portfolio return
    pub mean_return: f64,
    /// Standard deviation of portfolio returns
    pub sd_return: f64,
    /// Mean over standard deviation
    pub sharpe_ratio: f64,
    /// Months evaluated
    pub n_periods: usize,
}

/// Portfolio returns of the policy, one per cross-section.
pub fn policy_returns(
    theta: &Array1<f64>,
    sections: &[CrossSection],
    allow_short_selling: bool,
) -> Result<Vec<f64>> {
    sections
        .iter()
        .map(|s| {
            s.validate(theta.len())?;
            let w = compute_portfolio_weights(theta, &s.characteristics, &s.benchmark, allow_short_selling)?;
            Ok(w.dot(&s.returns))
        })
        .collect()
}

/// Evaluate a policy by its realized portfolio returns.
pub fn evaluate_policy(
    theta: &Array1<f64>,
    sections: &[CrossSection],
    gamma: f64,
    allow_short_selling: bool,
) -> Result<PolicyEvaluation> {
    let returns = policy_returns(theta, sections, allow_short_selling)?;
    let t = returns.len();
    if t == 0 {
        return Err(ModelError::InsufficientData { required: 1, actual: 0 });
    }
    let mean = returns.iter().sum::<f64>() / t as f64;
    let sd = if t > 1 {
        (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (t - 1) as f64).sqrt()
    } else {
        0.0
    };
    Ok(PolicyEvaluation {
        expected_utility: returns.iter().map(|r| crra_utility(*r, gamma)).sum::<f64>() / t as f64,
        mean_return: mean,
        sd_return: sd,
        sharpe_ratio: if sd > 0.0 { mean / sd } else { f64::NAN },
        n_periods: t,
    })
}

/// Settings for [`optimize_theta`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThetaOptimization {
    /// Relative risk aversion
    pub gamma: f64,
    /// Initial step length of the ascent
    pub step: f64,
    /// Finite-difference increment for the gradient
    pub epsilon: f64,
    /// Maximum ascent iterations
    pub max_iterations: usize,
    /// Stop once the utility gain of an iteration falls below this
    pub tolerance: f64,
    /// Allow negative weights
    pub allow_short_selling: bool,
}

impl Default for ThetaOptimization {
    fn default() -> Self {
        Self {
            gamma: 5.0,
            step: 10.0,
            epsilon: 1e-6,
            max_iterations: 500,
            tolerance: 1e-12,
            allow_short_selling: true,
        }
    }
}

/// Maximise average CRRA utility over `θ` by gradient ascent with
/// central-difference gradients and a backtracking step.
pub fn optimize_theta(sections: &[CrossSection], initial: &Array1<f64>, config: &ThetaOptimization) -> Result<Array1<f64>> {
    let objective = |theta: &Array1<f64>| -> Result<f64> {
        Ok(evaluate_policy(theta, sections, config.gamma, config.allow_short_selling)?.expected_utility)
    };

    let mut theta = initial.clone();
    let mut value = objective(&theta)?;
    let mut step = config.step;
    for iteration in 0..config.max_iterations {
        let mut gradient = Array1::<f64>::zeros(theta.len());
        for j in 0..theta.len() {
            let mut up = theta.clone();
            let mut down = theta.clone();
            up[j] += config.epsilon;
            down[j] -= config.epsilon;
            gradient[j] = (objective(&up)? - objective(&down)?) / (2.0 * config.epsilon);
        }
        if gradient.iter().all(|g| g.abs() < f64::EPSILON) {
            break;
        }

        let mut improved = None;
        while step > 1e-12 {
            let candidate = &theta + &(&gradient * step);
            // Candidates that wipe out every long position are not feasible
            if let Ok(candidate_value) = objective(&candidate)
                && candidate_value > value
            {
                improved = Some((candidate, candidate_value));
                break;
            }
            step /= 2.0;
        }
        let Some((candidate, candidate_value)) = improved else {
            break;
        };
        let gain = candidate_value - value;
        theta = candidate;
        value = candidate_value;
        step *= 2.0;
        if gain < config.tolerance {
            debug!(iteration, "theta optimisation converged");
            break;
        }
    }
    Ok(theta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_minimum_variance_diagonal() {
        let sigma = array![[0.04, 0.0], [0.0, 0.01]];
        let w = minimum_variance_weights(&sigma).unwrap();
        assert_relative_eq!(w[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(w[1], 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_efficient_weights_hit_target() {
        let sigma = array![[0.04, 0.006, 0.0], [0.006, 0.09, 0.01], [0.0, 0.01, 0.02]];
        let mu = array![0.01, 0.015, 0.006];
        let w = efficient_weights(&sigma, &mu, 0.02).unwrap();
        assert_relative_eq!(w.sum(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(w.dot(&mu), 0.02, epsilon = 1e-12);

        let frontier = efficient_frontier(&sigma, &mu, 0.02, &[0.0, 0.5, 1.0, 1.5]).unwrap();
        assert_eq!(frontier.len(), 4);
        assert!(frontier.windows(2).all(|p| p[1].mean > p[0].mean));
        assert!(frontier.windows(2).all(|p| p[1].sd > p[0].sd));
    }

    #[test]
    fn test_dimension_errors() {
        assert!(minimum_variance_weights(&Array2::zeros((2, 3))).is_err());
        assert!(efficient_weights(&Array2::eye(2), &array![0.1], 0.1).is_err());
        assert!(compute_portfolio_weights(&array![1.0, 2.0], &Array2::zeros((3, 1)), &Array1::ones(3), true).is_err());
    }

    #[test]
    fn test_policy_weights() {
        let x = array![[1.0], [0.0], [-1.0]];
        let benchmark = array![0.5, 0.3, 0.2];
        let w = compute_portfolio_weights(&array![0.0], &x, &benchmark, true).unwrap();
        assert_eq!(w, benchmark);

        let tilted = compute_portfolio_weights(&array![0.9], &x, &benchmark, true).unwrap();
        assert_relative_eq!(tilted[0], 0.8, epsilon = 1e-12);
        assert_relative_eq!(tilted[2], -0.1, epsilon = 1e-12);
        assert_relative_eq!(tilted.sum(), 1.0, epsilon = 1e-12);

        let long_only = compute_portfolio_weights(&array![0.9], &x, &benchmark, false).unwrap();
        assert_relative_eq!(long_only[2], 0.0);
        assert_relative_eq!(long_only.sum(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(long_only[0], 0.8 / 1.1, epsilon = 1e-12);
    }

    #[test]
    fn test_crra_utility() {
        assert_relative_eq!(crra_utility(0.0, 5.0), -0.25);
        assert_relative_eq!(crra_utility(0.1, 1.0), 1.1_f64.ln());
        assert!(crra_utility(0.02, 5.0) > crra_utility(0.01, 5.0));
    }

    fn sections() -> Vec<CrossSection> {
        // High-x stocks earn 1% more in two of three months and 1% less otherwise.
        (1..=24)
            .map(|m| {
                let market = if m % 2 == 0 { 0.01 } else { -0.005 };
                let spread = if m % 3 == 0 { -0.01 } else { 0.01 };
                let x = array![[1.0], [0.0], [-1.0]];
                CrossSection {
                    month: NaiveDate::from_ymd_opt(2000 + (m - 1) / 12, ((m - 1) % 12 + 1) as u32, 1).unwrap(),
                    returns: x.column(0).mapv(|v| market + spread * v),
                    characteristics: x,
                    benchmark: array![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
                }
            })
            .collect()
    }

    #[test]
    fn test_optimize_theta_tilts_towards_signal() {
        let data = sections();
        let start = array![0.0];
        let base = evaluate_policy(&start, &data, 5.0, true).unwrap();
        let theta = optimize_theta(&data, &start, &ThetaOptimization::default()).unwrap();
        let optimised = evaluate_policy(&theta, &data, 5.0, true).unwrap();
        assert!(theta[0] > 0.0);
        assert!(optimised.expected_utility > base.expected_utility);
        assert!(optimised.mean_return > base.mean_return);
        assert_eq!(optimised.n_periods, 24);
    }
}
