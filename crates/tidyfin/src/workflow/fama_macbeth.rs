//! Fama-MacBeth risk premia of beta, size and book-to-market.

use super::require_table;
use super::sorts::{SortVariable, lagged_values};
use crate::config::Settings;
use crate::error::Result;
use tidyfin_data::Database;
use tidyfin_data::store::tables::CRSP_MONTHLY;
use tidyfin_models::{CrossSectionObservation, FamaMacBethResult, fama_macbeth};
use tidyfin_output::Table;
use tidyfin_output::table::format_number;
use tracing::info;

/// Regressors in column order.
pub const FAMA_MACBETH_REGRESSORS: [&str; 3] = ["beta", "log_mktcap", "bm"];

/// Regress monthly excess returns on last month's beta, log size and
/// book-to-market, then average the slopes over time.
///
/// Only stock-months with all three characteristics enter the cross-sections.
pub fn characteristic_premia(db: &Database, settings: &Settings) -> Result<FamaMacBethResult> {
    require_table(db, CRSP_MONTHLY, "run `tidyfin import crsp-monthly` first")?;
    let stocks = db.load_crsp_monthly()?;
    let characteristics = [
        lagged_values(db, SortVariable::BetaMonthly, &stocks)?,
        lagged_values(db, SortVariable::Size, &stocks)?,
        lagged_values(db, SortVariable::BookToMarket, &stocks)?,
    ];

    let observations: Vec<CrossSectionObservation> = stocks
        .iter()
        .filter_map(|s| {
            let key = (s.permno, s.month);
            let x = characteristics
                .iter()
                .map(|values| values.get(&key).copied())
                .collect::<Option<Vec<f64>>>()?;
            Some(CrossSectionObservation {
                period: s.month,
                y: s.ret_excess,
                x,
            })
        })
        .collect();
    info!(observations = observations.len(), "running Fama-MacBeth regressions");

    Ok(fama_macbeth(
        &observations,
        &FAMA_MACBETH_REGRESSORS,
        &settings.fama_macbeth.config(),
    )?)
}

/// Risk premia with plain and Newey-West t-statistics.
pub fn premia_table(result: &FamaMacBethResult) -> Table {
    let mut table = Table::new(
        format!("Fama-MacBeth risk premia ({} months)", result.periods.len()),
        ["factor", "estimate", "t-stat", "t-stat (NW)"],
    );
    for premium in &result.premia {
        table.push_row([
            premium.name.clone(),
            format_number(premium.estimate, 4),
            format_number(premium.t_stat, 2),
            format_number(premium.t_stat_nw, 2),
        ]);
    }
    table
}
