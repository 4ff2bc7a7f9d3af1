//! Estimators working together on synthetic asset-pricing data.

use approx::assert_relative_eq;
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use tidyfin_models::options::polynomial_features;
use tidyfin_models::{
    ClusterBy, CovarianceType, CrossSectionObservation, ElasticNetConfig, FamaMacBethConfig, FixedEffects,
    OptionPricer, PanelConfig, PanelObservation, SimulationGrid, cross_validate, estimate_capm, estimate_panel,
    fama_macbeth, lambda_max, lambda_path, ols, simulate_options,
};

fn month(i: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2010 + (i / 12) as i32, i % 12 + 1, 1).unwrap()
}

fn market(i: u32) -> f64 {
    ((i * 11 % 19) as f64 - 9.0) / 150.0
}

/// Stock returns whose alpha is zero and whose betas are 0.5, 1.0, ..., 2.5.
fn stock_returns(n_months: u32) -> Vec<(f64, Vec<f64>)> {
    (1..=5)
        .map(|s| {
            let beta = 0.5 * s as f64;
            let returns = (0..n_months)
                .map(|i| beta * market(i) + if (i + s) % 2 == 0 { 0.002 } else { -0.002 })
                .collect();
            (beta, returns)
        })
        .collect()
}

#[test]
fn test_capm_then_fama_macbeth() {
    let n_months = 60;
    let mkt: Vec<f64> = (0..n_months).map(market).collect();
    let stocks = stock_returns(n_months);

    let mut observations = Vec::new();
    for (true_beta, returns) in &stocks {
        let capm = estimate_capm(returns, &mkt, Some(6)).unwrap();
        assert_relative_eq!(capm.beta, *true_beta, epsilon = 0.02);
        assert!(capm.alpha.abs() < 0.002);

        for (i, r) in returns.iter().enumerate() {
            observations.push(CrossSectionObservation {
                period: month(i as u32),
                y: *r,
                x: vec![capm.beta],
            });
        }
    }

    let result = fama_macbeth(&observations, &["beta"], &FamaMacBethConfig::default()).unwrap();
    assert_eq!(result.periods.len(), n_months as usize);
    let premium = result.premium("beta").unwrap();
    let mean_market = mkt.iter().sum::<f64>() / mkt.len() as f64;
    assert_relative_eq!(premium.estimate, mean_market, epsilon = 0.002);
}

#[test]
fn test_pooled_ols_matches_panel_without_effects() {
    let mut rows = Vec::new();
    for entity in 0..10_i64 {
        for time in 0..8_i64 {
            let x = ((entity * 5 + time * 3) % 11) as f64;
            rows.push(PanelObservation {
                entity,
                time,
                y: 1.0 + 0.3 * x + if (entity + time) % 2 == 0 { 0.1 } else { -0.1 },
                x: vec![x],
            });
        }
    }
    let config = PanelConfig {
        fixed_effects: FixedEffects::None,
        cluster: ClusterBy::None,
        ..Default::default()
    };
    let panel = estimate_panel(&rows, &["x"], &config).unwrap();
    let y = Array1::from_iter(rows.iter().map(|r| r.y));
    let x = Array2::from_shape_fn((rows.len(), 1), |(i, _)| rows[i].x[0]);
    let direct = ols(&y, &x, true, &CovarianceType::Classical).unwrap();
    assert_relative_eq!(panel.coefficient("x").unwrap().0, direct.coefficients[1], epsilon = 1e-12);
    assert_relative_eq!(panel.coefficient("x").unwrap().1, direct.std_errors[1], epsilon = 1e-12);
}

#[test]
fn test_option_pricer_with_cross_validated_penalty() {
    let grid = SimulationGrid {
        spot: vec![40.0, 45.0, 50.0, 55.0, 60.0],
        strike: vec![30.0, 40.0, 50.0, 60.0, 70.0],
        rate: vec![0.0, 0.02, 0.04],
        maturity: vec![0.25, 0.5, 1.0, 2.0],
        volatility: vec![0.2, 0.4, 0.6],
    };
    let options = simulate_options(&grid, 0.15, 2024);
    assert_eq!(options.len(), grid.len());

    let raw = Array2::from_shape_fn((options.len(), 5), |(i, j)| options[i].contract.features()[j]);
    let x = polynomial_features(&raw, 2);
    let y = Array1::from_iter(options.iter().map(|o| o.observed));
    let lambdas = lambda_path(lambda_max(&x, &y, 1.0), 6, 1e-4);
    let cv = cross_validate(&x, &y, &[0.0, 0.5, 1.0], &lambdas, 5).unwrap();
    assert_eq!(cv.grid.len(), 18);

    let pricer = OptionPricer::fit(&options, 2, &ElasticNetConfig::new(cv.best.alpha, cv.best.lambda)).unwrap();
    let prices: Vec<f64> = options.iter().map(|o| o.black_scholes).collect();
    let mean = prices.iter().sum::<f64>() / prices.len() as f64;
    let sd = (prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / prices.len() as f64).sqrt();
    assert!(pricer.evaluate(&options) < 0.5 * sd);
}
