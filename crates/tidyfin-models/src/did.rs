//! Difference-in-differences with two-way fixed effects.

use crate::error::{ModelError, Result};
use crate::panel::{ClusterBy, FixedEffects, PanelConfig, PanelFit, PanelObservation, estimate_panel};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name of the treatment regressor in the fitted model.
pub const TREATMENT: &str = "treated_post";

/// One entity-period observation for a DiD regression.
#[derive(Debug, Clone, PartialEq)]
pub struct DidObservation {
    /// Entity identifier
    pub entity: i64,
    /// Period identifier
    pub time: i64,
    /// Outcome
    pub y: f64,
    /// Entity belongs to the treatment group
    pub treated: bool,
    /// Period lies after the event
    pub post: bool,
    /// Additional controls
    pub controls: Vec<f64>,
}

/// Treatment effect from a DiD regression.
#[derive(Debug, Clone)]
pub struct DidEstimate {
    /// Coefficient on treated × post
    pub estimate: f64,
    /// Standard error
    pub std_error: f64,
    /// t-statistic
    pub t_stat: f64,
    /// Full regression
    pub fit: PanelFit,
}

/// Estimate `y ~ treated×post + controls | entity + time`.
///
/// The main effects of `treated` and `post` are absorbed by the entity and
/// time effects.
pub fn estimate_did(observations: &[DidObservation], control_names: &[&str], cluster: ClusterBy) -> Result<DidEstimate> {
    let panel: Vec<PanelObservation> = observations
        .iter()
        .map(|o| {
            let mut x = Vec::with_capacity(o.controls.len() + 1);
            x.push(if o.treated && o.post { 1.0 } else { 0.0 });
            x.extend_from_slice(&o.controls);
            PanelObservation {
                entity: o.entity,
                time: o.time,
                y: o.y,
                x,
            }
        })
        .collect();

    let mut names = vec![TREATMENT];
    names.extend_from_slice(control_names);
    let config = PanelConfig {
        fixed_effects: FixedEffects::TwoWay,
        cluster,
        ..Default::default()
    };
    let fit = estimate_panel(&panel, &names, &config)?;
    let (estimate, std_error) = fit
        .coefficient(TREATMENT)
        .ok_or_else(|| ModelError::InvalidParameter(format!("{TREATMENT} missing from fit")))?;
    Ok(DidEstimate {
        estimate,
        std_error,
        t_stat: estimate / std_error,
        fit,
    })
}

/// Observation for an event study.
#[derive(Debug, Clone, PartialEq)]
pub struct EventObservation {
    /// Entity identifier
    pub entity: i64,
    /// Period identifier
    pub time: i64,
    /// Outcome
    pub y: f64,
    /// Period in which the entity is treated; `None` for never-treated
    pub event_time: Option<i64>,
}

/// Event window settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStudyConfig {
    /// Periods before the event with their own dummy; earlier ones are binned
    pub leads: i64,
    /// Periods after the event with their own dummy; later ones are binned
    pub lags: i64,
    /// Clustering of the standard errors
    pub cluster: ClusterBy,
}

impl Default for EventStudyConfig {
    fn default() -> Self {
        Self {
            leads: 4,
            lags: 4,
            cluster: ClusterBy::Entity,
        }
    }
}

/// Effect at one period relative to the event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventCoefficient {
    /// Periods since the event; `-1` is the reference
    pub relative_period: i64,
    /// Estimate (zero for the reference period)
    pub estimate: f64,
    /// Standard error (zero for the reference period)
    pub std_error: f64,
}

/// Dynamic treatment effects around the event, relative to period `-1`.
pub fn event_study(observations: &[EventObservation], config: &EventStudyConfig) -> Result<Vec<EventCoefficient>> {
    if config.leads < 1 || config.lags < 0 {
        return Err(ModelError::InvalidParameter(format!(
            "event window needs leads >= 1 and lags >= 0, got {} and {}",
            config.leads, config.lags
        )));
    }
    let periods: Vec<i64> = (-config.leads..=config.lags).filter(|r| *r != -1).collect();
    let labels: Vec<String> = periods.iter().map(|r| format!("rel_{r}")).collect();

    let mut seen = HashSet::new();
    let panel: Vec<PanelObservation> = observations
        .iter()
        .map(|o| {
            let mut x = vec![0.0; periods.len()];
            if let Some(event) = o.event_time {
                seen.insert(o.entity);
                let relative = (o.time - event).clamp(-config.leads, config.lags);
                if let Some(i) = periods.iter().position(|r| *r == relative) {
                    x[i] = 1.0;
                }
            }
            PanelObservation {
                entity: o.entity,
                time: o.time,
                y: o.y,
                x,
            }
        })
        .collect();
    if seen.is_empty() {
        return Err(ModelError::InvalidParameter("no treated entities".to_string()));
    }

    let names: Vec<&str> = labels.iter().map(String::as_str).collect();
    let panel_config = PanelConfig {
        fixed_effects: FixedEffects::TwoWay,
        cluster: config.cluster,
        ..Default::default()
    };
    let fit = estimate_panel(&panel, &names, &panel_config)?;

    let mut out: Vec<EventCoefficient> = periods
        .iter()
        .zip(&labels)
        .filter_map(|(r, label)| {
            let (estimate, std_error) = fit.coefficient(label)?;
            Some(EventCoefficient {
                relative_period: *r,
                estimate,
                std_error,
            })
        })
        .collect();
    out.push(EventCoefficient {
        relative_period: -1,
        estimate: 0.0,
        std_error: 0.0,
    });
    out.sort_by_key(|c| c.relative_period);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn noise(entity: i64, time: i64) -> f64 {
        match (entity * 7 + time * 3) % 4 {
            0 => 0.02,
            1 => -0.01,
            2 => 0.01,
            _ => -0.02,
        }
    }

    #[test]
    fn test_did_recovers_effect() {
        let mut obs = Vec::new();
        for entity in 0..20_i64 {
            for time in 0..10_i64 {
                let treated = entity < 10;
                let post = time >= 5;
                let effect = if treated && post { 1.5 } else { 0.0 };
                obs.push(DidObservation {
                    entity,
                    time,
                    y: 0.3 * entity as f64 + 0.1 * time as f64 + effect + noise(entity, time),
                    treated,
                    post,
                    controls: vec![],
                });
            }
        }
        let est = estimate_did(&obs, &[], ClusterBy::Entity).unwrap();
        assert_relative_eq!(est.estimate, 1.5, epsilon = 0.05);
        assert!(est.t_stat > 10.0);
        assert_eq!(est.fit.names, vec![TREATMENT]);
    }

    #[test]
    fn test_event_study_profile() {
        let mut obs = Vec::new();
        for entity in 0..20_i64 {
            let event_time = (entity < 10).then_some(5);
            for time in 0..10_i64 {
                let effect = match event_time {
                    Some(e) if time >= e => 1.0 + 0.1 * (time - e) as f64,
                    _ => 0.0,
                };
                obs.push(EventObservation {
                    entity,
                    time,
                    y: 0.2 * entity as f64 + 0.05 * time as f64 + effect + noise(entity, time),
                    event_time,
                });
            }
        }
        let coefficients = event_study(&obs, &EventStudyConfig::default()).unwrap();
        assert_eq!(coefficients.len(), 9);
        let at = |r: i64| coefficients.iter().find(|c| c.relative_period == r).unwrap().estimate;
        assert_relative_eq!(at(-1), 0.0);
        assert_relative_eq!(at(-3), 0.0, epsilon = 0.05);
        assert_relative_eq!(at(0), 1.0, epsilon = 0.05);
        assert_relative_eq!(at(2), 1.2, epsilon = 0.05);
    }

    #[test]
    fn test_event_study_needs_treated() {
        let obs = vec![EventObservation {
            entity: 1,
            time: 1,
            y: 0.0,
            event_time: None,
        }];
        assert!(event_study(&obs, &EventStudyConfig::default()).is_err());
        let config = EventStudyConfig {
            leads: 0,
            ..Default::default()
        };
        assert!(event_study(&obs, &config).is_err());
    }
}
