//! End-to-end tests: parse provider files, build panels, store and reload.

use chrono::NaiveDate;
use tidyfin_data::sources::extracts::{CrspMonthlyRecord, read_records};
use tidyfin_data::sources::french::{FactorRow, parse_french_csv};
use tidyfin_data::store::tables::{CRSP_MONTHLY, FACTORS_FF3_MONTHLY};
use tidyfin_data::{Database, DataError, panel};

const FACTORS: &str = "
,Mkt-RF,SMB,HML,RF
202001,   -0.11,   -3.11,   -6.25,    0.13
202002,   -8.13,    1.07,   -3.80,    0.12
202003,  -13.39,   -5.19,  -13.88,    0.13
";

const CRSP: &str = "permno,date,ret,shrout,altprc,exchcd,siccd
10001,2020-01-31,0.010,2000,10.0,1,2834
10001,2020-02-28,-0.050,2000,9.5,1,2834
10001,2020-03-31,-0.200,2000,7.6,1,2834
10002,2020-01-31,0.030,500,-40.0,3,7372
10002,2020-02-28,B,500,41.0,3,7372
10002,2020-03-31,-0.100,500,36.9,3,7372
";

fn temp_db_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("tidyfin-{name}-{}.sqlite", std::process::id()))
}

#[test]
fn test_monthly_pipeline() {
    let db = Database::in_memory().unwrap();

    let factors = FactorRow::from_table(&parse_french_csv(FACTORS).unwrap()).unwrap();
    db.save_factors(FACTORS_FF3_MONTHLY, &factors).unwrap();
    let rf = db.risk_free_by_date(FACTORS_FF3_MONTHLY).unwrap();
    assert_eq!(rf.len(), 3);

    let raw: Vec<CrspMonthlyRecord> = read_records(CRSP.as_bytes()).unwrap();
    let monthly = panel::build_crsp_monthly(&raw, &rf, None).unwrap();
    // January has no lagged market cap; 10002 has no February return.
    assert_eq!(monthly.len(), 3);
    assert!(
        monthly
            .iter()
            .all(|r| r.month >= NaiveDate::from_ymd_opt(2020, 2, 1).unwrap())
    );

    db.save_crsp_monthly(&monthly).unwrap();
    assert_eq!(db.row_count(CRSP_MONTHLY).unwrap(), 3);
    assert_eq!(db.load_crsp_monthly().unwrap(), monthly);

    let nasdaq = db
        .query("SELECT permno FROM crsp_monthly WHERE exchange = 'NASDAQ'")
        .unwrap();
    assert_eq!(nasdaq.height(), 1);
}

#[test]
fn test_file_database_stats_and_vacuum() {
    let path = temp_db_path("stats");
    let _ = std::fs::remove_file(&path);
    {
        let db = Database::open(&path).unwrap();
        let factors = FactorRow::from_table(&parse_french_csv(FACTORS).unwrap()).unwrap();
        db.save_factors(FACTORS_FF3_MONTHLY, &factors).unwrap();

        let stats = db.stats().unwrap();
        assert!(stats.size_bytes > 0);
        assert_eq!(stats.total_rows(), 3);

        db.drop_table(FACTORS_FF3_MONTHLY).unwrap();
        db.vacuum().unwrap();
        assert!(!db.has_table(FACTORS_FF3_MONTHLY).unwrap());
    }
    let reopened = Database::open(&path).unwrap();
    assert!(matches!(
        reopened.read_table(FACTORS_FF3_MONTHLY),
        Err(DataError::UnknownTable(_))
    ));
    let _ = std::fs::remove_file(&path);
}
