//! Betas estimated from a synthetic panel feed a beta-sorted portfolio.

use approx::assert_relative_eq;
use chrono::NaiveDate;
use tidyfin_data::dates::add_months;
use tidyfin_data::sources::french::FactorRow;
use tidyfin_data::{Exchange, Industry, StockMonth};
use tidyfin_factors::beta::{BetaConfig, estimate_betas, monthly_observations};
use tidyfin_factors::characteristics::lag_characteristic;
use tidyfin_factors::sorts::{SortConfig, SortObservation, Weighting, long_short, univariate_sort};
use tidyfin_factors::CharacteristicValue;

fn market(i: i32) -> f64 {
    (((i * 13) % 17) as f64 - 8.0) / 200.0
}

fn panel(n_months: i32) -> (Vec<StockMonth>, Vec<FactorRow>) {
    let start = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    let factors = (0..n_months)
        .map(|i| FactorRow {
            date: add_months(start, i),
            mkt_excess: market(i),
            smb: 0.0,
            hml: 0.0,
            rmw: None,
            cma: None,
            rf: 0.001,
        })
        .collect();
    let mut stocks = Vec::new();
    for permno in 1..=6_i64 {
        let beta = 0.5 * permno as f64;
        for i in 0..n_months {
            stocks.push(StockMonth {
                permno,
                gvkey: None,
                month: add_months(start, i),
                ret: 0.0,
                ret_excess: beta * market(i),
                mktcap: 100.0,
                mktcap_lag: 100.0,
                exchange: Exchange::Nyse,
                industry: Industry::Manufacturing,
            });
        }
    }
    (stocks, factors)
}

#[test]
fn test_betas_recovered_and_sorted() {
    let (stocks, factors) = panel(62);
    let observations = monthly_observations(&stocks, &factors);
    let betas = estimate_betas(&observations, &BetaConfig::monthly()).unwrap();
    assert_eq!(betas.len(), 6 * (62 - 47));
    for estimate in &betas {
        assert_relative_eq!(estimate.beta, 0.5 * estimate.permno as f64, epsilon = 1e-9);
    }

    let values: Vec<CharacteristicValue> = betas
        .iter()
        .map(|b| CharacteristicValue {
            permno: b.permno,
            month: b.month,
            value: b.beta,
        })
        .collect();
    let lagged = lag_characteristic(&values, 1);
    let sort_obs: Vec<SortObservation> = stocks
        .iter()
        .filter_map(|s| {
            Some(SortObservation {
                permno: s.permno,
                month: s.month,
                sort_value: *lagged.get(&(s.permno, s.month))?,
                ret_excess: s.ret_excess,
                mktcap_lag: s.mktcap_lag,
                exchange: s.exchange,
            })
        })
        .collect();

    let config = SortConfig {
        n_portfolios: 3,
        weighting: Weighting::Equal,
        nyse_breakpoints: true,
    };
    let returns = univariate_sort(&sort_obs, &config).unwrap();
    assert!(returns.iter().all(|r| r.n_stocks == 2));

    // High-beta minus low-beta earns two units of beta times the market.
    for ls in long_short(&returns, 3, 1) {
        let i = tidyfin_data::dates::month_span(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(), ls.month);
        assert_relative_eq!(ls.ret_excess, 2.0 * market(i), epsilon = 1e-9);
    }
}
