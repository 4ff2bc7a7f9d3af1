//! Machine-learning option pricing on simulated contracts.

use crate::config::OptionPricingSettings;
use crate::error::{Error, Result};
use ndarray::Array1;
use serde::Serialize;
use tidyfin_models::options::{SimulatedOption, rmse, train_test_split};
use tidyfin_models::{ElasticNetConfig, OptionPricer, simulate_options};
use tidyfin_output::Table;
use tidyfin_output::table::format_number;
use tracing::info;

/// Fit quality of the option pricer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptionPricingResult {
    /// Contracts used for fitting
    pub n_train: usize,
    /// Contracts held out
    pub n_test: usize,
    /// Polynomial degree
    pub degree: usize,
    /// Polynomial terms with a nonzero slope
    pub n_nonzero: usize,
    /// In-sample RMSE against Black-Scholes prices
    pub train_rmse: f64,
    /// Out-of-sample RMSE against Black-Scholes prices
    pub test_rmse: f64,
    /// Out-of-sample RMSE of the noisy observed prices themselves
    pub noise_rmse: f64,
}

impl OptionPricingResult {
    /// Errors as a two-column table.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new("Elastic-net option pricing", ["statistic", "value"]);
        table.push_row(["training contracts".to_string(), self.n_train.to_string()]);
        table.push_row(["test contracts".to_string(), self.n_test.to_string()]);
        table.push_row(["polynomial degree".to_string(), self.degree.to_string()]);
        table.push_row(["nonzero terms".to_string(), self.n_nonzero.to_string()]);
        table.push_row(["RMSE train".to_string(), format_number(self.train_rmse, 4)]);
        table.push_row(["RMSE test".to_string(), format_number(self.test_rmse, 4)]);
        table.push_row(["RMSE of observed prices".to_string(), format_number(self.noise_rmse, 4)]);
        table
    }
}

fn pick(options: &[SimulatedOption], index: &[usize]) -> Vec<SimulatedOption> {
    index.iter().map(|&i| options[i]).collect()
}

/// Simulate noisy prices, fit the pricer on a training split and measure
/// how closely it recovers Black-Scholes prices on held-out contracts.
pub fn price_options(settings: &OptionPricingSettings) -> Result<OptionPricingResult> {
    let options = simulate_options(&settings.grid, settings.noise_sd, settings.seed);
    let (train_index, test_index) = train_test_split(options.len(), settings.test_share, settings.seed)?;
    if train_index.len() < 2 || test_index.is_empty() {
        return Err(Error::InsufficientData(format!(
            "{} simulated contracts leave {} for training and {} for testing",
            options.len(),
            train_index.len(),
            test_index.len()
        )));
    }
    let train = pick(&options, &train_index);
    let test = pick(&options, &test_index);

    let config = ElasticNetConfig::new(settings.alpha, settings.lambda);
    let pricer = OptionPricer::fit(&train, settings.degree, &config)?;
    let noise_rmse = rmse(
        &Array1::from_iter(test.iter().map(|o| o.black_scholes)),
        &Array1::from_iter(test.iter().map(|o| o.observed)),
    );
    let result = OptionPricingResult {
        n_train: train.len(),
        n_test: test.len(),
        degree: settings.degree,
        n_nonzero: pricer.model.n_nonzero(),
        train_rmse: pricer.evaluate(&train),
        test_rmse: pricer.evaluate(&test),
        noise_rmse,
    };
    info!(
        contracts = options.len(),
        test_rmse = result.test_rmse,
        "priced simulated options"
    );
    Ok(result)
}
