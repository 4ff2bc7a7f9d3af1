//! Summaries exported to disk and collected into a report.

use polars::prelude::*;
use tidyfin_output::{ExportFormat, Exporter, ReportBuilder, export_records, summarise, summarise_frame};

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("tidyfin-output-{}-{name}", std::process::id()))
}

#[test]
fn test_summary_export_and_report() {
    let df = DataFrame::new(vec![
        Series::new("ret_excess".into(), vec![0.01, -0.02, 0.03, 0.0, 0.015]).into(),
        Series::new("mktcap".into(), vec![120.0, 80.0, 1500.0, 45.0, 300.0]).into(),
    ])
    .unwrap();

    let table = summarise_frame(&df, &["ret_excess", "mktcap"]).unwrap().with_title("CRSP monthly");
    let ascii = table.to_ascii_table();
    assert!(ascii.contains("CRSP monthly"));
    assert!(ascii.contains("ret_excess"));
    assert!(ascii.contains("mktcap"));

    let csv_path = temp_path("summary.csv");
    export_records(&table.rows, &csv_path).unwrap();
    let written = std::fs::read_to_string(&csv_path).unwrap();
    assert!(written.starts_with("variable,mean,sd,min,q05,q25,q50,q75,q95,max,n"));
    assert_eq!(written.lines().count(), 3);
    std::fs::remove_file(&csv_path).unwrap();

    let report = ReportBuilder::new()
        .title("Summary")
        .section("crsp_monthly", &table)
        .unwrap()
        .build();
    let json_path = temp_path("report.json");
    report.write_json(&json_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(parsed["sections"][0]["contents"]["rows"][1]["variable"], "mktcap");
    std::fs::remove_file(&json_path).unwrap();
}

#[test]
fn test_single_summary_json() {
    let stats = vec![summarise("beta", &[0.8, 1.0, 1.2])];
    let json = stats.export_to_string(ExportFormat::Json).unwrap();
    assert!(json.contains("\"variable\":\"beta\""));
    assert!(json.contains("\"n\":3"));
}
