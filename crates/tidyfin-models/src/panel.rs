//! Fixed-effects panel regressions with clustered standard errors.
//!
//! Fixed effects are absorbed by the within transformation. For two-way
//! effects on unbalanced panels the entity and time demeaning steps are
//! alternated until the data stop changing (method of alternating
//! projections), which yields the same slopes as a regression on the full
//! set of dummies. Two-way effects absorb `entities + periods - groups`
//! degrees of freedom, where `groups` counts the connected components of the
//! graph linking each entity to the periods it is observed in.

use crate::error::{ModelError, Result};
use crate::ols::{Clusters, CovarianceType, OlsFit, ols_absorbed};
use ndarray::{Array1, Array2, Axis};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Which fixed effects to absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FixedEffects {
    /// Pooled OLS with an intercept
    #[default]
    None,
    /// One effect per entity (firm)
    Entity,
    /// One effect per period
    Time,
    /// Entity and period effects
    TwoWay,
}

/// Dimension(s) along which errors are clustered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterBy {
    /// Homoskedastic errors
    None,
    /// Heteroskedasticity-robust errors without clustering
    Robust,
    /// Cluster by entity
    #[default]
    Entity,
    /// Cluster by period
    Time,
    /// Two-way clustering by entity and period
    TwoWay,
}

/// Panel regression settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelConfig {
    /// Absorbed fixed effects
    pub fixed_effects: FixedEffects,
    /// Clustering of the standard errors
    pub cluster: ClusterBy,
    /// Iteration cap for the alternating projections
    pub max_iterations: usize,
    /// Convergence threshold on the largest change in a sweep
    pub tolerance: f64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            fixed_effects: FixedEffects::None,
            cluster: ClusterBy::Entity,
            max_iterations: 1_000,
            tolerance: 1e-10,
        }
    }
}

/// One entity-period observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelObservation {
    /// Entity identifier (permno, gvkey code, ...)
    pub entity: i64,
    /// Period identifier (e.g. year or months since epoch)
    pub time: i64,
    /// Dependent variable
    pub y: f64,
    /// Regressors
    pub x: Vec<f64>,
}

/// Fitted panel regression.
#[derive(Debug, Clone)]
pub struct PanelFit {
    /// Coefficient names, aligned with `fit.coefficients`
    pub names: Vec<String>,
    /// Underlying OLS fit on the transformed data
    pub fit: OlsFit,
    /// Distinct entities
    pub n_entities: usize,
    /// Distinct periods
    pub n_periods: usize,
    /// Connected entity-period components (1 for a connected panel)
    pub n_groups: usize,
}

impl PanelFit {
    /// Estimate and standard error of a named coefficient.
    pub fn coefficient(&self, name: &str) -> Option<(f64, f64)> {
        let i = self.names.iter().position(|n| n == name)?;
        Some((self.fit.coefficients[i], self.fit.std_errors[i]))
    }
}

/// Dense group codes `0..G` for arbitrary identifiers.
fn encode(ids: impl Iterator<Item = i64>) -> (Vec<usize>, usize) {
    let mut codes: HashMap<i64, usize> = HashMap::new();
    let encoded = ids
        .map(|id| {
            let next = codes.len();
            *codes.entry(id).or_insert(next)
        })
        .collect();
    (encoded, codes.len())
}

/// Connected components of the bipartite entity-period graph.
fn connected_groups(entities: &[usize], n_entities: usize, times: &[usize], n_periods: usize) -> usize {
    fn root(parent: &mut [usize], mut node: usize) -> usize {
        while parent[node] != node {
            parent[node] = parent[parent[node]];
            node = parent[node];
        }
        node
    }

    let mut parent: Vec<usize> = (0..n_entities + n_periods).collect();
    let mut groups = n_entities + n_periods;
    for (&entity, &time) in entities.iter().zip(times) {
        let a = root(&mut parent, entity);
        let b = root(&mut parent, n_entities + time);
        if a != b {
            parent[a] = b;
            groups -= 1;
        }
    }
    groups
}

/// Subtract group means from every column; returns the largest adjustment.
fn demean(data: &mut Array2<f64>, groups: &[usize], n_groups: usize) -> f64 {
    let mut largest = 0.0_f64;
    for mut column in data.axis_iter_mut(Axis(1)) {
        let mut sums = vec![0.0; n_groups];
        let mut counts = vec![0usize; n_groups];
        for (value, &g) in column.iter().zip(groups) {
            sums[g] += value;
            counts[g] += 1;
        }
        for (value, &g) in column.iter_mut().zip(groups) {
            let mean = sums[g] / counts[g] as f64;
            largest = largest.max(mean.abs());
            *value -= mean;
        }
    }
    largest
}

/// Apply the within transformation in place.
///
/// `data` holds the dependent variable and regressors as columns.
pub fn within_transform(
    data: &mut Array2<f64>,
    entities: &[usize],
    n_entities: usize,
    times: &[usize],
    n_periods: usize,
    config: &PanelConfig,
) {
    match config.fixed_effects {
        FixedEffects::None => {}
        FixedEffects::Entity => {
            demean(data, entities, n_entities);
        }
        FixedEffects::Time => {
            demean(data, times, n_periods);
        }
        FixedEffects::TwoWay => {
            for iteration in 0..config.max_iterations {
                let a = demean(data, entities, n_entities);
                let b = demean(data, times, n_periods);
                if a.max(b) < config.tolerance {
                    debug!(iterations = iteration + 1, "within transformation converged");
                    return;
                }
            }
            warn!(
                max_iterations = config.max_iterations,
                "alternating projections did not converge"
            );
        }
    }
}

/// Estimate a panel regression of `y` on `x` with the configured fixed
/// effects and clustering.
///
/// Observations with a non-finite value are dropped.
pub fn estimate_panel(observations: &[PanelObservation], names: &[&str], config: &PanelConfig) -> Result<PanelFit> {
    let k = names.len();
    let mut rows = Vec::with_capacity(observations.len());
    for obs in observations {
        if obs.x.len() != k {
            return Err(ModelError::DimensionMismatch {
                expected: k,
                actual: obs.x.len(),
            });
        }
        if obs.y.is_finite() && obs.x.iter().all(|v| v.is_finite()) {
            rows.push(obs);
        }
    }
    let n = rows.len();

    let (entities, n_entities) = encode(rows.iter().map(|r| r.entity));
    let (times, n_periods) = encode(rows.iter().map(|r| r.time));

    let mut data = Array2::<f64>::zeros((n, k + 1));
    for (i, row) in rows.iter().enumerate() {
        data[[i, 0]] = row.y;
        for (j, value) in row.x.iter().enumerate() {
            data[[i, j + 1]] = *value;
        }
    }
    within_transform(&mut data, &entities, n_entities, &times, n_periods, config);

    let n_groups = connected_groups(&entities, n_entities, &times, n_periods);
    let (intercept, absorbed) = match config.fixed_effects {
        FixedEffects::None => (true, 0),
        FixedEffects::Entity => (false, n_entities),
        FixedEffects::Time => (false, n_periods),
        FixedEffects::TwoWay => (false, (n_entities + n_periods).saturating_sub(n_groups)),
    };
    if config.fixed_effects == FixedEffects::TwoWay && n_groups > 1 {
        debug!(n_groups, "panel splits into disconnected groups");
    }

    let entity_ids = || rows.iter().map(|r| r.entity).collect::<Vec<_>>();
    let time_ids = || rows.iter().map(|r| r.time).collect::<Vec<_>>();
    let covariance = match config.cluster {
        ClusterBy::None => CovarianceType::Classical,
        ClusterBy::Robust => CovarianceType::White,
        ClusterBy::Entity => CovarianceType::Clustered(Clusters::One(entity_ids())),
        ClusterBy::Time => CovarianceType::Clustered(Clusters::One(time_ids())),
        ClusterBy::TwoWay => CovarianceType::Clustered(Clusters::Two(entity_ids(), time_ids())),
    };

    let y: Array1<f64> = data.column(0).to_owned();
    let x = data.slice(ndarray::s![.., 1..]).to_owned();
    let fit = ols_absorbed(&y, &x, intercept, &covariance, absorbed)?;

    let mut labels: Vec<String> = names.iter().map(|s| s.to_string()).collect();
    if intercept {
        labels.insert(0, "intercept".to_string());
    }
    Ok(PanelFit {
        names: labels,
        fit,
        n_entities,
        n_periods,
        n_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ols::ols;
    use approx::assert_relative_eq;

    /// Unbalanced panel with entity and time effects and a true slope of 0.5.
    fn panel(balanced: bool) -> Vec<PanelObservation> {
        let mut out = Vec::new();
        for entity in 0..8_i64 {
            for time in 0..6_i64 {
                if !balanced && (entity + time) % 5 == 0 {
                    continue;
                }
                let x = ((entity * 3 + time * 5) % 7) as f64 + 0.1 * entity as f64;
                let noise = if (entity + 2 * time) % 3 == 0 { 0.05 } else { -0.025 };
                out.push(PanelObservation {
                    entity,
                    time,
                    y: 2.0 * entity as f64 - 0.7 * time as f64 + 0.5 * x + noise,
                    x: vec![x],
                });
            }
        }
        out
    }

    fn dummies(obs: &[PanelObservation], two_way: bool) -> (Array1<f64>, Array2<f64>) {
        let n_time_dummies = if two_way { 5 } else { 0 };
        let mut x = Array2::<f64>::zeros((obs.len(), 1 + 8 + n_time_dummies));
        for (i, o) in obs.iter().enumerate() {
            x[[i, 0]] = o.x[0];
            x[[i, 1 + o.entity as usize]] = 1.0;
            if two_way && o.time > 0 {
                x[[i, 8 + o.time as usize]] = 1.0;
            }
        }
        (Array1::from_iter(obs.iter().map(|o| o.y)), x)
    }

    #[test]
    fn test_entity_effects_match_dummy_regression() {
        let obs = panel(false);
        let config = PanelConfig {
            fixed_effects: FixedEffects::Entity,
            cluster: ClusterBy::None,
            ..Default::default()
        };
        let within = estimate_panel(&obs, &["x"], &config).unwrap();
        let (y, x) = dummies(&obs, false);
        let lsdv = ols(&y, &x, false, &CovarianceType::Classical).unwrap();
        assert_eq!(within.names, vec!["x"]);
        assert_relative_eq!(within.fit.coefficients[0], lsdv.coefficients[0], epsilon = 1e-9);
        assert_relative_eq!(within.fit.std_errors[0], lsdv.std_errors[0], epsilon = 1e-9);
        assert_eq!(within.n_entities, 8);
    }

    #[test]
    fn test_two_way_effects_on_unbalanced_panel() {
        let obs = panel(false);
        let config = PanelConfig {
            fixed_effects: FixedEffects::TwoWay,
            cluster: ClusterBy::None,
            ..Default::default()
        };
        let within = estimate_panel(&obs, &["x"], &config).unwrap();
        let (y, x) = dummies(&obs, true);
        let lsdv = ols(&y, &x, false, &CovarianceType::Classical).unwrap();
        assert_relative_eq!(within.fit.coefficients[0], lsdv.coefficients[0], epsilon = 1e-7);
        assert_relative_eq!(within.fit.std_errors[0], lsdv.std_errors[0], epsilon = 1e-7);
        assert_relative_eq!(within.coefficient("x").unwrap().0, 0.5, epsilon = 0.05);
    }

    #[test]
    fn test_two_way_effects_on_disconnected_panel() {
        // Entities 0-3 only in periods 0-2, entities 4-7 only in periods 3-5.
        let obs: Vec<PanelObservation> = panel(true)
            .into_iter()
            .filter(|o| (o.entity < 4) == (o.time < 3))
            .collect();
        let config = PanelConfig {
            fixed_effects: FixedEffects::TwoWay,
            cluster: ClusterBy::None,
            ..Default::default()
        };
        let within = estimate_panel(&obs, &["x"], &config).unwrap();
        assert_eq!(within.n_groups, 2);

        // Full-rank dummies drop one period per component.
        let mut x = Array2::<f64>::zeros((obs.len(), 1 + 8 + 4));
        for (i, o) in obs.iter().enumerate() {
            x[[i, 0]] = o.x[0];
            x[[i, 1 + o.entity as usize]] = 1.0;
            match o.time {
                1 | 2 => x[[i, 8 + o.time as usize]] = 1.0,
                4 | 5 => x[[i, 7 + o.time as usize]] = 1.0,
                _ => {}
            }
        }
        let y = Array1::from_iter(obs.iter().map(|o| o.y));
        let lsdv = ols(&y, &x, false, &CovarianceType::Classical).unwrap();
        assert_relative_eq!(within.fit.coefficients[0], lsdv.coefficients[0], epsilon = 1e-7);
        assert_relative_eq!(within.fit.std_errors[0], lsdv.std_errors[0], epsilon = 1e-7);
    }

    #[test]
    fn test_connected_groups() {
        assert_eq!(connected_groups(&[0, 0, 1], 2, &[0, 1, 1], 2), 1);
        assert_eq!(connected_groups(&[0, 1], 2, &[0, 1], 2), 2);
        assert_eq!(connected_groups(&[], 0, &[], 0), 0);
    }

    #[test]
    fn test_clustered_errors() {
        let obs = panel(true);
        for cluster in [ClusterBy::Entity, ClusterBy::Time, ClusterBy::TwoWay, ClusterBy::Robust] {
            let config = PanelConfig {
                fixed_effects: FixedEffects::TwoWay,
                cluster,
                ..Default::default()
            };
            let fit = estimate_panel(&obs, &["x"], &config).unwrap();
            assert!(fit.fit.std_errors[0].is_finite());
            assert!(fit.fit.std_errors[0] >= 0.0);
        }
    }

    #[test]
    fn test_pooled_has_intercept() {
        let fit = estimate_panel(&panel(true), &["x"], &PanelConfig::default()).unwrap();
        assert_eq!(fit.names, vec!["intercept", "x"]);
        assert_eq!(fit.n_periods, 6);
        assert_eq!(fit.n_groups, 1);
        assert!(fit.coefficient("missing").is_none());
    }
}
