//! Build the CRSP and Compustat tables from WRDS CSV extracts.

use super::require_table;
use crate::config::SamplePeriod;
use crate::error::Result;
use serde::Serialize;
use std::path::Path;
use tidyfin_data::Database;
use tidyfin_data::panel::{build_compustat, build_crsp_daily, build_crsp_monthly};
use tidyfin_data::sources::extracts::{
    CcmLinkRecord, CompustatRecord, CrspDailyRecord, CrspMonthlyRecord, read_csv_file,
};
use tidyfin_data::store::tables::{COMPUSTAT, CRSP_DAILY, CRSP_MONTHLY, FACTORS_FF3_DAILY, FACTORS_FF3_MONTHLY};
use tracing::info;

/// Rows read from an extract and rows written to the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Target table
    pub table: &'static str,
    /// Rows in the extract
    pub raw_rows: usize,
    /// Rows written
    pub rows: usize,
}

/// Clean a CRSP monthly extract into `crsp_monthly`.
///
/// Excess returns use the risk-free rate of `factors_ff3_monthly`. With a
/// CCM link file, observations carry the linked `gvkey`.
pub fn import_crsp_monthly(
    db: &Database,
    extract: &Path,
    links: Option<&Path>,
    sample: &SamplePeriod,
) -> Result<ImportSummary> {
    require_table(db, FACTORS_FF3_MONTHLY, "run `tidyfin download ff3` first")?;
    let raw: Vec<CrspMonthlyRecord> = read_csv_file(extract)?;
    let links = links.map(read_csv_file::<CcmLinkRecord, _>).transpose()?;
    let rf = db.risk_free_by_date(FACTORS_FF3_MONTHLY)?;

    let mut panel = build_crsp_monthly(&raw, &rf, links.as_deref())?;
    panel.retain(|row| sample.contains(row.month));
    let rows = db.save_crsp_monthly(&panel)?;
    info!(raw = raw.len(), rows, linked = links.is_some(), "imported CRSP monthly");
    Ok(ImportSummary {
        table: CRSP_MONTHLY,
        raw_rows: raw.len(),
        rows,
    })
}

/// Clean a CRSP daily extract into `crsp_daily`.
///
/// With `append` the rows are added to the existing table, so large
/// extracts can be imported in chunks.
pub fn import_crsp_daily(db: &Database, extract: &Path, sample: &SamplePeriod, append: bool) -> Result<ImportSummary> {
    require_table(db, FACTORS_FF3_DAILY, "run `tidyfin download ff3-daily` first")?;
    let raw: Vec<CrspDailyRecord> = read_csv_file(extract)?;
    let rf = db.risk_free_by_date(FACTORS_FF3_DAILY)?;

    let mut panel = build_crsp_daily(&raw, &rf)?;
    panel.retain(|row| sample.contains(row.date));
    let rows = if append && db.has_table(CRSP_DAILY)? {
        db.append_crsp_daily(&panel)?
    } else {
        db.save_crsp_daily(&panel)?
    };
    info!(raw = raw.len(), rows, append, "imported CRSP daily");
    Ok(ImportSummary {
        table: CRSP_DAILY,
        raw_rows: raw.len(),
        rows,
    })
}

/// Build annual accounting characteristics into `compustat`.
pub fn import_compustat(db: &Database, extract: &Path) -> Result<ImportSummary> {
    let raw: Vec<CompustatRecord> = read_csv_file(extract)?;
    let firms = build_compustat(&raw)?;
    let rows = db.save_compustat(&firms)?;
    info!(raw = raw.len(), rows, "imported Compustat");
    Ok(ImportSummary {
        table: COMPUSTAT,
        raw_rows: raw.len(),
        rows,
    })
}
