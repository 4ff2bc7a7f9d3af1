//! Difference-in-differences and event studies on a user-supplied panel.
//!
//! The panel is a CSV file with columns `entity`, `time`, `y` and
//! `event_time`. `event_time` is the period in which an entity is treated
//! and stays empty for never-treated entities, so both the static design
//! (`treated` = has an event, `post` = `time >= event_time`) and the dynamic
//! event study read the same file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tidyfin_data::sources::extracts::read_csv_file;
use tidyfin_models::did::EventObservation;
use tidyfin_models::{DidObservation, EventCoefficient, EventStudyConfig, estimate_did, event_study};
use tidyfin_output::Table;
use tidyfin_output::table::format_number;
use tracing::info;

/// One entity-period row of a panel file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PanelRecord {
    /// Entity identifier
    pub entity: i64,
    /// Period identifier
    pub time: i64,
    /// Outcome; rows without one are dropped
    pub y: Option<f64>,
    /// Treatment period, empty for never-treated entities
    #[serde(default)]
    pub event_time: Option<i64>,
}

/// Static and dynamic treatment effects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DidResult {
    /// Observations used
    pub n_obs: usize,
    /// Distinct entities
    pub n_entities: usize,
    /// Entities with an event
    pub n_treated: usize,
    /// Coefficient on treated × post
    pub estimate: f64,
    /// Its clustered standard error
    pub std_error: f64,
    /// Its t-statistic
    pub t_stat: f64,
    /// Effects by period relative to the event
    pub event: Vec<EventCoefficient>,
}

impl DidResult {
    /// Static estimate followed by the event-study coefficients.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new(
            format!(
                "Difference-in-differences ({} entities, {} treated, {} observations)",
                self.n_entities, self.n_treated, self.n_obs
            ),
            ["term", "estimate", "std. error", "t-stat"],
        );
        table.push_row([
            "treated x post".to_string(),
            format_number(self.estimate, 4),
            format_number(self.std_error, 4),
            format_number(self.t_stat, 2),
        ]);
        for c in &self.event {
            let t = if c.std_error > 0.0 {
                format_number(c.estimate / c.std_error, 2)
            } else {
                "ref".to_string()
            };
            table.push_row([
                format!("period {:+}", c.relative_period),
                format_number(c.estimate, 4),
                format_number(c.std_error, 4),
                t,
            ]);
        }
        table
    }
}

/// Two-way fixed effects DiD and event study, clustered as in `config`.
pub fn difference_in_differences(records: &[PanelRecord], config: &EventStudyConfig) -> Result<DidResult> {
    let usable: Vec<(&PanelRecord, f64)> = records
        .iter()
        .filter_map(|r| r.y.filter(|y| y.is_finite()).map(|y| (r, y)))
        .collect();
    let entities: HashSet<i64> = usable.iter().map(|(r, _)| r.entity).collect();
    let treated: HashSet<i64> = usable
        .iter()
        .filter(|(r, _)| r.event_time.is_some())
        .map(|(r, _)| r.entity)
        .collect();
    if treated.is_empty() || treated.len() == entities.len() {
        return Err(Error::InsufficientData(format!(
            "{} of {} entities are treated; need both treated and control entities",
            treated.len(),
            entities.len()
        )));
    }

    let static_panel: Vec<DidObservation> = usable
        .iter()
        .map(|(r, y)| DidObservation {
            entity: r.entity,
            time: r.time,
            y: *y,
            treated: r.event_time.is_some(),
            post: r.event_time.is_some_and(|e| r.time >= e),
            controls: Vec::new(),
        })
        .collect();
    let did = estimate_did(&static_panel, &[], config.cluster)?;

    let dynamic_panel: Vec<EventObservation> = usable
        .iter()
        .map(|(r, y)| EventObservation {
            entity: r.entity,
            time: r.time,
            y: *y,
            event_time: r.event_time,
        })
        .collect();
    let event = event_study(&dynamic_panel, config)?;
    info!(
        obs = usable.len(),
        entities = entities.len(),
        treated = treated.len(),
        estimate = did.estimate,
        "estimated difference-in-differences"
    );

    Ok(DidResult {
        n_obs: usable.len(),
        n_entities: entities.len(),
        n_treated: treated.len(),
        estimate: did.estimate,
        std_error: did.std_error,
        t_stat: did.t_stat,
        event,
    })
}

/// Read a panel file and run [`difference_in_differences`].
pub fn did_from_file(path: &Path, config: &EventStudyConfig) -> Result<DidResult> {
    let records: Vec<PanelRecord> = read_csv_file(path)?;
    difference_in_differences(&records, config)
}
