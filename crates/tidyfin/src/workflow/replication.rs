//! Replicate SMB and HML and compare them with the published factors.

use super::require_table;
use crate::error::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tidyfin_data::Database;
use tidyfin_data::store::tables::{COMPUSTAT, CRSP_MONTHLY, FACTORS_FF3_MONTHLY};
use tidyfin_factors::replication::{ReplicatedFactors, replicate_ff3, replication_correlation};
use tidyfin_output::Table;
use tidyfin_output::table::format_number;
use tracing::info;

/// Replicated factors and their correlation with Kenneth French's series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplicationResult {
    /// Monthly replicated factors
    pub factors: Vec<ReplicatedFactors>,
    /// Correlation of replicated and published SMB
    pub smb_correlation: Option<f64>,
    /// Correlation of replicated and published HML
    pub hml_correlation: Option<f64>,
}

impl ReplicationResult {
    /// Correlations as a table.
    pub fn to_table(&self) -> Table {
        let correlation = |c: Option<f64>| c.map_or_else(|| "NA".to_string(), |c| format_number(c, 3));
        Table::new(
            format!("Fama-French replication ({} months)", self.factors.len()),
            ["factor", "correlation"],
        )
        .with_row(["smb".to_string(), correlation(self.smb_correlation)])
        .with_row(["hml".to_string(), correlation(self.hml_correlation)])
    }
}

/// Form the six size/value portfolios each June and correlate the
/// resulting SMB and HML with `factors_ff3_monthly`.
pub fn replicate_fama_french(db: &Database) -> Result<ReplicationResult> {
    require_table(db, CRSP_MONTHLY, "run `tidyfin import crsp-monthly --links <ccm.csv>` first")?;
    require_table(db, COMPUSTAT, "run `tidyfin import compustat` first")?;
    require_table(db, FACTORS_FF3_MONTHLY, "run `tidyfin download ff3` first")?;

    let stocks = db.load_crsp_monthly()?;
    let firms = db.load_compustat()?;
    let factors = replicate_ff3(&stocks, &firms)?;
    let published = db.load_factors(FACTORS_FF3_MONTHLY)?;

    let series = |f: fn(&ReplicatedFactors) -> f64| -> Vec<(NaiveDate, f64)> {
        factors.iter().map(|r| (r.month, f(r))).collect()
    };
    let smb: Vec<(NaiveDate, f64)> = published.iter().map(|r| (r.date, r.smb)).collect();
    let hml: Vec<(NaiveDate, f64)> = published.iter().map(|r| (r.date, r.hml)).collect();
    let smb_correlation = replication_correlation(&series(|r| r.smb), &smb);
    let hml_correlation = replication_correlation(&series(|r| r.hml), &hml);
    info!(months = factors.len(), ?smb_correlation, ?hml_correlation, "replicated Fama-French factors");

    Ok(ReplicationResult {
        factors,
        smb_correlation,
        hml_correlation,
    })
}
