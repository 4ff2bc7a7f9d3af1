//! Option pricing with machine learning.
//!
//! Simulates call prices from the Black-Scholes formula with observation
//! noise over a grid of contract parameters and fits a penalized
//! polynomial regression that learns the pricing function.

use crate::error::{ModelError, Result};
use crate::penalized::{ElasticNet, ElasticNetConfig, mean_squared_error};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Error function (Abramowitz & Stegun 7.1.26, absolute error below 1.5e-7).
pub fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Parameters of a European call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    /// Spot price
    pub spot: f64,
    /// Strike
    pub strike: f64,
    /// Risk-free rate (continuous)
    pub rate: f64,
    /// Time to maturity in years
    pub maturity: f64,
    /// Volatility
    pub volatility: f64,
}

impl OptionContract {
    /// Regressor vector `[S, K, r, T, σ]`.
    pub fn features(&self) -> [f64; 5] {
        [self.spot, self.strike, self.rate, self.maturity, self.volatility]
    }
}

/// Black-Scholes price of a European call.
///
/// Expired contracts are worth their intrinsic value; without volatility
/// the price is the discounted forward payoff.
pub fn black_scholes_call(contract: &OptionContract) -> f64 {
    let OptionContract {
        spot: s,
        strike: k,
        rate: r,
        maturity: t,
        volatility: sigma,
    } = *contract;
    if t <= 0.0 {
        return (s - k).max(0.0);
    }
    if sigma <= 0.0 {
        return (s - k * (-r * t).exp()).max(0.0);
    }
    let sqrt_t = t.sqrt();
    let d1 = ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / (sigma * sqrt_t);
    let d2 = d1 - sigma * sqrt_t;
    s * normal_cdf(d1) - k * (-r * t).exp() * normal_cdf(d2)
}

/// Axis values of the simulation grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationGrid {
    /// Spot prices
    pub spot: Vec<f64>,
    /// Strikes
    pub strike: Vec<f64>,
    /// Risk-free rates
    pub rate: Vec<f64>,
    /// Maturities in years
    pub maturity: Vec<f64>,
    /// Volatilities
    pub volatility: Vec<f64>,
}

fn steps(start: f64, end: f64, step: f64) -> Vec<f64> {
    let n = ((end - start) / step + 1e-9).floor() as usize;
    (0..=n).map(|i| start + step * i as f64).collect()
}

impl Default for SimulationGrid {
    /// S ∈ 40..60, K ∈ 20..90, r ∈ 0..5 %, T ∈ 3 months..2 years monthly,
    /// σ ∈ 0.1..0.8.
    fn default() -> Self {
        Self {
            spot: steps(40.0, 60.0, 1.0),
            strike: steps(20.0, 90.0, 1.0),
            rate: steps(0.0, 0.05, 0.01),
            maturity: steps(3.0, 24.0, 1.0).into_iter().map(|m| m / 12.0).collect(),
            volatility: steps(0.1, 0.8, 0.1),
        }
    }
}

impl SimulationGrid {
    /// Number of contracts in the full cross product.
    pub fn len(&self) -> usize {
        self.spot.len() * self.strike.len() * self.rate.len() * self.maturity.len() * self.volatility.len()
    }

    /// Whether any axis is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All contracts in the grid.
    pub fn contracts(&self) -> Vec<OptionContract> {
        let mut out = Vec::with_capacity(self.len());
        for &spot in &self.spot {
            for &strike in &self.strike {
                for &rate in &self.rate {
                    for &maturity in &self.maturity {
                        for &volatility in &self.volatility {
                            out.push(OptionContract {
                                spot,
                                strike,
                                rate,
                                maturity,
                                volatility,
                            });
                        }
                    }
                }
            }
        }
        out
    }
}

/// A simulated contract with its model and observed price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatedOption {
    /// Contract terms
    pub contract: OptionContract,
    /// Black-Scholes price
    pub black_scholes: f64,
    /// Black-Scholes price plus Gaussian noise
    pub observed: f64,
}

fn standard_normal(rng: &mut StdRng) -> f64 {
    // Box-Muller; u1 in (0, 1] keeps the logarithm finite
    let u1 = 1.0 - rng.r#gen::<f64>();
    let u2 = rng.r#gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Price every contract of `grid` and add noise with standard deviation
/// `noise_sd`. The same seed reproduces the same prices.
pub fn simulate_options(grid: &SimulationGrid, noise_sd: f64, seed: u64) -> Vec<SimulatedOption> {
    let mut rng = StdRng::seed_from_u64(seed);
    grid.contracts()
        .into_iter()
        .map(|contract| {
            let black_scholes = black_scholes_call(&contract);
            SimulatedOption {
                contract,
                black_scholes,
                observed: black_scholes + noise_sd * standard_normal(&mut rng),
            }
        })
        .collect()
}

/// Nondecreasing index tuples of length `d` over `p` columns.
fn monomials(p: usize, d: usize) -> Vec<Vec<usize>> {
    let mut out: Vec<Vec<usize>> = vec![Vec::new()];
    for _ in 0..d {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                let start = prefix.last().copied().unwrap_or(0);
                (start..p).map(move |j| {
                    let mut next = prefix.clone();
                    next.push(j);
                    next
                })
            })
            .collect();
    }
    out
}

/// All monomials of the columns up to `degree` (interactions included,
/// no constant), ordered by degree.
pub fn polynomial_features(x: &Array2<f64>, degree: usize) -> Array2<f64> {
    let terms: Vec<Vec<usize>> = (1..=degree).flat_map(|d| monomials(x.ncols(), d)).collect();
    Array2::from_shape_fn((x.nrows(), terms.len()), |(i, t)| {
        terms[t].iter().map(|&j| x[[i, j]]).product()
    })
}

/// Shuffle row indices with `seed` and split off `test_share` of them.
///
/// Returns `(train, test)`.
pub fn train_test_split(n: usize, test_share: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(0.0..1.0).contains(&test_share) {
        return Err(ModelError::InvalidParameter(format!(
            "test share must lie in [0, 1), got {test_share}"
        )));
    }
    let mut index: Vec<usize> = (0..n).collect();
    index.shuffle(&mut StdRng::seed_from_u64(seed));
    let n_test = (n as f64 * test_share).round() as usize;
    let test = index.split_off(n - n_test);
    Ok((index, test))
}

/// Root mean squared error.
pub fn rmse(actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    mean_squared_error(actual, predicted).sqrt()
}

fn design(contracts: &[OptionContract]) -> Array2<f64> {
    Array2::from_shape_fn((contracts.len(), 5), |(i, j)| contracts[i].features()[j])
}

/// Elastic net on polynomial features of the contract terms.
#[derive(Debug, Clone)]
pub struct OptionPricer {
    /// Polynomial degree
    pub degree: usize,
    /// Fitted model
    pub model: ElasticNet,
}

impl OptionPricer {
    /// Fit on observed prices.
    pub fn fit(options: &[SimulatedOption], degree: usize, config: &ElasticNetConfig) -> Result<Self> {
        if degree == 0 {
            return Err(ModelError::InvalidParameter("degree must be positive".to_string()));
        }
        let contracts: Vec<OptionContract> = options.iter().map(|o| o.contract).collect();
        let x = polynomial_features(&design(&contracts), degree);
        let y = Array1::from_iter(options.iter().map(|o| o.observed));
        let model = ElasticNet::fit(&x, &y, config)?;
        info!(
            n_train = options.len(),
            n_features = x.ncols(),
            nonzero = model.n_nonzero(),
            "fitted option pricer"
        );
        Ok(Self { degree, model })
    }

    /// Predicted prices.
    pub fn predict(&self, contracts: &[OptionContract]) -> Array1<f64> {
        self.model.predict(&polynomial_features(&design(contracts), self.degree))
    }

    /// Out-of-sample RMSE against the noise-free Black-Scholes prices.
    pub fn evaluate(&self, options: &[SimulatedOption]) -> f64 {
        let contracts: Vec<OptionContract> = options.iter().map(|o| o.contract).collect();
        let actual = Array1::from_iter(options.iter().map(|o| o.black_scholes));
        rmse(&actual, &self.predict(&contracts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn call(spot: f64, strike: f64, rate: f64, maturity: f64, volatility: f64) -> OptionContract {
        OptionContract {
            spot,
            strike,
            rate,
            maturity,
            volatility,
        }
    }

    #[test]
    fn test_normal_cdf() {
        assert_relative_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-7);
        assert_relative_eq!(normal_cdf(1.96), 0.975, epsilon = 1e-4);
        assert_relative_eq!(normal_cdf(-1.0) + normal_cdf(1.0), 1.0, epsilon = 1e-7);
    }

    #[test]
    fn test_black_scholes() {
        assert_relative_eq!(black_scholes_call(&call(100.0, 100.0, 0.05, 1.0, 0.2)), 10.4506, epsilon = 1e-3);
        assert_relative_eq!(black_scholes_call(&call(50.0, 40.0, 0.0, 0.0, 0.3)), 10.0);
        assert_relative_eq!(black_scholes_call(&call(50.0, 60.0, 0.0, 1.0, 0.0)), 0.0);
        // Put-call parity bound: C >= S - K e^{-rT}
        let c = call(60.0, 20.0, 0.05, 2.0, 0.1);
        assert!(black_scholes_call(&c) >= 60.0 - 20.0 * (-0.1_f64).exp() - 1e-9);
    }

    #[test]
    fn test_default_grid() {
        let grid = SimulationGrid::default();
        assert_eq!(grid.spot.len(), 21);
        assert_eq!(grid.strike.len(), 71);
        assert_eq!(grid.rate.len(), 6);
        assert_eq!(grid.maturity.len(), 22);
        assert_eq!(grid.volatility.len(), 8);
        assert_relative_eq!(grid.maturity[0], 0.25);
        assert_relative_eq!(grid.maturity[21], 2.0);
    }

    #[test]
    fn test_simulation_is_reproducible() {
        let grid = SimulationGrid {
            spot: vec![40.0, 50.0],
            strike: vec![45.0],
            rate: vec![0.01],
            maturity: vec![0.5, 1.0],
            volatility: vec![0.2],
        };
        let a = simulate_options(&grid, 0.15, 7);
        let b = simulate_options(&grid, 0.15, 7);
        assert_eq!(a.len(), 4);
        assert_eq!(a, b);
        assert!(a.iter().any(|o| o.observed != o.black_scholes));
        let clean = simulate_options(&grid, 0.0, 7);
        assert!(clean.iter().all(|o| o.observed == o.black_scholes));
    }

    #[test]
    fn test_polynomial_features() {
        let x = array![[2.0, 3.0]];
        let features = polynomial_features(&x, 2);
        // x1, x2, x1², x1·x2, x2²
        assert_eq!(features.row(0).to_vec(), vec![2.0, 3.0, 4.0, 6.0, 9.0]);
        assert_eq!(polynomial_features(&Array2::zeros((1, 5)), 3).ncols(), 55);
    }

    #[test]
    fn test_train_test_split() {
        let (train, test) = train_test_split(100, 0.2, 1).unwrap();
        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);
        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
        assert_eq!(train_test_split(100, 0.2, 1).unwrap().1, test);
        assert!(train_test_split(10, 1.0, 1).is_err());
    }

    #[test]
    fn test_pricer_beats_naive_benchmark() {
        let grid = SimulationGrid {
            spot: steps(40.0, 60.0, 5.0),
            strike: steps(20.0, 90.0, 10.0),
            rate: vec![0.0, 0.03],
            maturity: vec![0.25, 1.0, 2.0],
            volatility: vec![0.2, 0.5],
        };
        let options = simulate_options(&grid, 0.15, 42);
        let (train, test) = train_test_split(options.len(), 0.2, 42).unwrap();
        let train: Vec<SimulatedOption> = train.iter().map(|&i| options[i]).collect();
        let test: Vec<SimulatedOption> = test.iter().map(|&i| options[i]).collect();

        let pricer = OptionPricer::fit(&train, 2, &ElasticNetConfig::new(0.0, 1e-4)).unwrap();
        let error = pricer.evaluate(&test);
        let mean_price = train.iter().map(|o| o.observed).sum::<f64>() / train.len() as f64;
        let naive = rmse(
            &Array1::from_iter(test.iter().map(|o| o.black_scholes)),
            &Array1::from_elem(test.len(), mean_price),
        );
        assert!(error < naive);
    }
}
