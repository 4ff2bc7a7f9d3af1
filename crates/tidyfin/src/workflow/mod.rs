//! Research workflows over the local database.
//!
//! Each workflow reads the canonical tables written by the download and
//! import steps, runs one analysis and returns typed results that render as
//! [`Table`](tidyfin_output::Table)s.

pub mod betas;
pub mod did;
pub mod factor_selection;
pub mod fama_macbeth;
pub mod option_pricing;
pub mod portfolio_choice;
pub mod predictive;
pub mod prepare;
pub mod replication;
pub mod sorts;
pub mod summary;

pub use betas::{BetaSummary, estimate_beta_table, load_betas};
pub use did::{DidResult, PanelRecord, did_from_file, difference_in_differences};
pub use factor_selection::{FactorSelectionResult, IndustrySelection, select_factors};
pub use fama_macbeth::{FAMA_MACBETH_REGRESSORS, characteristic_premia, premia_table};
pub use option_pricing::{OptionPricingResult, price_options};
pub use portfolio_choice::{MeanVarianceResult, ParametricPolicyResult, mean_variance, parametric_policy};
pub use predictive::{PredictiveRegression, predictive_regressions, predictive_table};
pub use prepare::{ImportSummary, import_compustat, import_crsp_daily, import_crsp_monthly};
pub use replication::{ReplicationResult, replicate_fama_french};
pub use sorts::{
    PortfolioPerformance, SortResult, SortVariable, characteristic_values, double_sort, portfolio_sort,
};
pub use summary::{database_table, summarise_table};

use crate::config::Settings;
use crate::error::{Error, Result};
use tidyfin_data::Database;
use tracing::info;

/// Open (creating if needed) the configured database.
pub fn open_database(settings: &Settings) -> Result<Database> {
    let path = settings.database_path()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    info!(path = %path.display(), "opening database");
    Ok(Database::open(&path)?)
}

/// Fail with a hint unless `table` exists.
pub(crate) fn require_table(db: &Database, table: &str, hint: &'static str) -> Result<()> {
    if db.has_table(table)? {
        Ok(())
    } else {
        Err(Error::MissingTable {
            table: table.to_string(),
            hint,
        })
    }
}
