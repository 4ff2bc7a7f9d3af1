//! WRDS CSV extracts (CRSP, Compustat, CRSP-Compustat links).
//!
//! WRDS access is credentialed, so these datasets enter the database from
//! CSV files exported with the WRDS web query tool or SQL. Header names are
//! matched case-insensitively. Empty and non-numeric fields (CRSP uses
//! letter codes for missing returns) become `None`.

use crate::error::Result;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Row of a CRSP monthly stock file extract.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CrspMonthlyRecord {
    /// Permanent security identifier
    pub permno: i64,
    /// Observation date
    pub date: String,
    /// Holding period return
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub ret: Option<f64>,
    /// Shares outstanding in thousands
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub shrout: Option<f64>,
    /// Price or bid/ask average (negative when no trade)
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub altprc: Option<f64>,
    /// Exchange code
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub exchcd: Option<i64>,
    /// Standard industrial classification code
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub siccd: Option<i64>,
}

/// Row of a CRSP daily stock file extract.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CrspDailyRecord {
    /// Permanent security identifier
    pub permno: i64,
    /// Trading day
    pub date: String,
    /// Daily return
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub ret: Option<f64>,
}

/// Row of a Compustat annual fundamentals extract.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[allow(missing_docs)]
pub struct CompustatRecord {
    /// Global company key
    pub gvkey: String,
    /// Fiscal period end
    pub datadate: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub seq: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub ceq: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub at: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub lt: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub txditc: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub txdb: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub itcb: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub pstkrv: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub pstkl: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub pstk: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub capx: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub oancf: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub sale: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub cogs: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub xint: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub xsga: Option<f64>,
}

/// Row of the CRSP-Compustat merged link table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CcmLinkRecord {
    /// Global company key
    pub gvkey: String,
    /// Permanent security identifier (`lpermno` in WRDS)
    #[serde(alias = "lpermno")]
    pub permno: i64,
    /// Link type (LU, LC, ...)
    #[serde(default)]
    pub linktype: Option<String>,
    /// Primary link marker (P, C, ...)
    #[serde(default)]
    pub linkprim: Option<String>,
    /// First valid date of the link
    pub linkdt: String,
    /// Last valid date of the link; empty or `E` means still active
    #[serde(default)]
    pub linkenddt: Option<String>,
}

/// Deserialize all rows of a CSV extract.
pub fn read_records<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers: csv::StringRecord = csv_reader
        .headers()?
        .iter()
        .map(str::to_ascii_lowercase)
        .collect();
    csv_reader.set_headers(headers);

    let records = csv_reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, csv::Error>>()?;
    Ok(records)
}

/// Deserialize a CSV extract from disk.
pub fn read_csv_file<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<Vec<T>> {
    let path = path.as_ref();
    let records: Vec<T> = read_records(File::open(path)?)?;
    debug!(path = %path.display(), rows = records.len(), "read CSV extract");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crsp_monthly_with_letter_codes() {
        let csv = "PERMNO,DATE,RET,SHROUT,ALTPRC,EXCHCD,SICCD\n\
                   10001,2020-01-31,0.05,1000,-12.5,1,6020\n\
                   10001,2020-02-28,C,1000,13,1,\n";
        let rows: Vec<CrspMonthlyRecord> = read_records(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ret, Some(0.05));
        assert_eq!(rows[0].altprc, Some(-12.5));
        assert_eq!(rows[1].ret, None);
        assert_eq!(rows[1].siccd, None);
    }

    #[test]
    fn test_compustat_missing_fields() {
        let csv = "gvkey,datadate,seq,ceq,at,lt\n001004,2019-05-31,,900,2000,1100\n";
        let rows: Vec<CompustatRecord> = read_records(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].gvkey, "001004");
        assert_eq!(rows[0].seq, None);
        assert_eq!(rows[0].ceq, Some(900.0));
        assert_eq!(rows[0].txditc, None);
    }

    #[test]
    fn test_ccm_links_alias() {
        let csv = "gvkey,lpermno,linktype,linkprim,linkdt,linkenddt\n001004,54594,LU,P,1972-04-24,E\n";
        let rows: Vec<CcmLinkRecord> = read_records(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].permno, 54594);
        assert_eq!(rows[0].linkenddt.as_deref(), Some("E"));
    }
}
