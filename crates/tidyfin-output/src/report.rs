//! JSON reports of workflow results.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One named part of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    /// Section name
    pub name: String,
    /// Section contents
    pub contents: serde_json::Value,
}

/// A report of one or more analyses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Report title.
    pub title: String,

    /// Report generation timestamp.
    pub timestamp: DateTime<Utc>,

    /// First month of the sample, if known.
    pub start: Option<NaiveDate>,

    /// Last month of the sample, if known.
    pub end: Option<NaiveDate>,

    /// Sections in insertion order.
    pub sections: Vec<ReportSection>,
}

impl Report {
    /// Create a new report.
    pub fn new(title: String, sections: Vec<ReportSection>) -> Self {
        Self {
            title,
            timestamp: Utc::now(),
            start: None,
            end: None,
            sections,
        }
    }

    /// Look up a section by name.
    pub fn section(&self, name: &str) -> Option<&serde_json::Value> {
        self.sections.iter().find(|s| s.name == name).map(|s| &s.contents)
    }

    /// Convert report to JSON string.
    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON report to `path`.
    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Builder for creating reports.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    title: Option<String>,
    period: Option<(NaiveDate, NaiveDate)>,
    sections: Vec<ReportSection>,
}

impl ReportBuilder {
    /// Create a new report builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the sample period.
    pub const fn period(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.period = Some((start, end));
        self
    }

    /// Add a section from any serializable value.
    pub fn section<T: Serialize + ?Sized>(mut self, name: impl Into<String>, contents: &T) -> Result<Self, ReportError> {
        self.sections.push(ReportSection {
            name: name.into(),
            contents: serde_json::to_value(contents)?,
        });
        Ok(self)
    }

    /// Build the report.
    pub fn build(self) -> Report {
        let mut report = Report::new(self.title.unwrap_or_else(|| "tidyfin report".to_string()), self.sections);
        if let Some((start, end)) = self.period {
            report.start = Some(start);
            report.end = Some(end);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_builder() {
        let start = NaiveDate::from_ymd_opt(1964, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let report = ReportBuilder::new()
            .title("Beta sorts")
            .period(start, end)
            .section("alphas", &[0.001, 0.002])
            .unwrap()
            .section("n_months", &720)
            .unwrap()
            .build();

        assert_eq!(report.title, "Beta sorts");
        assert_eq!(report.start, Some(start));
        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.section("n_months"), Some(&serde_json::json!(720)));
        assert!(report.section("missing").is_none());

        let json = report.to_json().unwrap();
        assert!(json.contains("\"alphas\""));
        assert!(json.contains("1964-01-01"));
    }

    #[test]
    fn test_default_title() {
        let report = ReportBuilder::new().build();
        assert_eq!(report.title, "tidyfin report");
        assert!(report.start.is_none());
    }
}
