//! Rolling CAPM betas from monthly and daily returns.

use super::require_table;
use crate::config::Settings;
use crate::error::Result;
use serde::Serialize;
use tidyfin_data::Database;
use tidyfin_data::store::tables::{BETA, CRSP_DAILY, CRSP_MONTHLY, FACTORS_FF3_DAILY, FACTORS_FF3_MONTHLY};
use tidyfin_factors::beta::{daily_observations, merge_betas, monthly_observations};
use tidyfin_factors::{BetaRow, estimate_betas};
use tracing::info;

/// Number of estimates written to the `beta` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BetaSummary {
    /// Stock-months with a monthly-window beta
    pub monthly: usize,
    /// Stock-months with a daily-window beta
    pub daily: usize,
    /// Rows written
    pub rows: usize,
}

/// Estimate betas and replace the `beta` table.
///
/// Daily betas are estimated only when `crsp_daily` and `factors_ff3_daily`
/// exist; otherwise the `beta_daily` column stays empty.
pub fn estimate_beta_table(db: &Database, settings: &Settings) -> Result<BetaSummary> {
    require_table(db, CRSP_MONTHLY, "run `tidyfin import crsp-monthly` first")?;
    require_table(db, FACTORS_FF3_MONTHLY, "run `tidyfin download ff3` first")?;

    let stocks = db.load_crsp_monthly()?;
    let factors = db.load_factors(FACTORS_FF3_MONTHLY)?;
    let monthly = estimate_betas(&monthly_observations(&stocks, &factors), &settings.betas.monthly)?;
    info!(estimates = monthly.len(), "estimated monthly betas");

    let daily = if db.has_table(CRSP_DAILY)? && db.has_table(FACTORS_FF3_DAILY)? {
        let days = db.load_crsp_daily()?;
        let factors = db.load_factors(FACTORS_FF3_DAILY)?;
        let daily = estimate_betas(&daily_observations(&days, &factors), &settings.betas.daily)?;
        info!(estimates = daily.len(), "estimated daily betas");
        daily
    } else {
        info!("no daily data, skipping daily betas");
        Vec::new()
    };

    let rows = merge_betas(&monthly, &daily);
    let written = db.write_table(BETA, &BetaRow::to_frame(&rows)?)?;
    Ok(BetaSummary {
        monthly: monthly.len(),
        daily: daily.len(),
        rows: written,
    })
}

/// Load the `beta` table.
pub fn load_betas(db: &Database) -> Result<Vec<BetaRow>> {
    require_table(db, BETA, "run `tidyfin betas` first")?;
    Ok(BetaRow::from_frame(&db.read_table(BETA)?)?)
}
