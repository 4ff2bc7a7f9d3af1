#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/tidyfin/tidyfin/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod report;
pub mod summary;
pub mod table;

pub use export::{ExportError, ExportFormat, Exporter, export_records};
pub use report::{Report, ReportBuilder, ReportError, ReportSection};
pub use summary::{SummaryStatistics, SummaryTable, summarise, summarise_frame};
pub use table::{Alignment, Table};
