// THEORY:
// `AnalysisConfig` is the single knob panel of a run. Every field has a default so
// a JSON file only needs to name what it changes, and the whole struct is checked
// by `validate` before any snapshot is touched: a bad configuration is a fatal
// error, never a half-finished run.
//
// Lengths are in metres (arc length for angular distances), times in seconds and
// speeds in metres per second.

use crate::core_modules::case_reader::SnapshotEntry;
use crate::core_modules::collision_detector::{CollisionClassifier, EnergyHeuristic};
use crate::core_modules::front_extractor::DetectionMetric;
use crate::core_modules::geometry::DomainKind;
use crate::core_modules::heuristics::PhysicsHeuristics;
use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Relative slack when thinning entries by `interval`, so that written times such
/// as 1e-05, 2e-05, 3e-05 are not dropped by rounding.
const INTERVAL_SLACK: f64 = 1e-9;

/// Which snapshots of a source are analysed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRange {
    pub start: f64,
    /// Inclusive. `None` means "until the last snapshot".
    pub end: Option<f64>,
    /// Minimum spacing between analysed snapshots. `None` keeps every one.
    pub interval: Option<f64>,
}

/// Early-stop limits. Hitting one yields a truncated but valid result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budget {
    pub max_steps: Option<usize>,
    pub wall_clock_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Field whose value or gradient is thresholded.
    pub detection_field: String,
    /// Fields whose per-front peaks are recorded. May include `detection_field`.
    pub tracked_fields: Vec<String>,
    pub metric: DetectionMetric,
    /// Strict lower bound on the detection metric (K for value, K/m for gradient).
    pub threshold: f64,
    /// Maximum distance between neighbouring points of one front.
    pub cluster_radius: f64,
    /// Maximum centre displacement between steps for a front to keep its id.
    pub tracking_tolerance: f64,
    /// Centre distance below which two fronts are colliding.
    pub collision_tolerance: f64,
    /// Clusters with fewer points are discarded as noise.
    pub min_cluster_size: usize,
    pub domain: DomainKind,
    pub time_range: TimeRange,
    pub collision: CollisionClassifier,
    pub energy: EnergyHeuristic,
    /// Strength, per-step energy, collision spikes and performance estimates.
    pub heuristics: PhysicsHeuristics,
    pub budget: Budget,
    /// Worker tasks for the per-step phase; defaults to the number of CPUs.
    pub workers: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            detection_field: "T".to_string(),
            tracked_fields: vec!["T".to_string(), "p".to_string()],
            metric: DetectionMetric::Gradient,
            threshold: 1.0e8,
            cluster_radius: 0.005,
            tracking_tolerance: 0.005,
            collision_tolerance: 0.002,
            min_cluster_size: 3,
            domain: DomainKind::Polar2d,
            time_range: TimeRange::default(),
            collision: CollisionClassifier::default(),
            energy: EnergyHeuristic::default(),
            heuristics: PhysicsHeuristics::default(),
            budget: Budget::default(),
            workers: None,
        }
    }
}

impl AnalysisConfig {
    /// Settings matched to `SyntheticConfig::default()`: temperature-value
    /// detection, and a collision tolerance wide enough to see two fronts
    /// approach before their clusters merge.
    pub fn demonstration() -> Self {
        Self {
            metric: DetectionMetric::Value,
            threshold: 2500.0,
            collision_tolerance: 0.02,
            ..Self::default()
        }
    }

    /// Reads a JSON configuration file; missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::Configuration(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| AnalysisError::Configuration(format!("cannot parse {}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        let positive = |name: &str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(AnalysisError::Configuration(format!("{name} must be a positive finite number, got {value}")))
            }
        };

        if self.detection_field.trim().is_empty() {
            return Err(AnalysisError::Configuration("detection_field must name a field".into()));
        }
        positive("threshold", self.threshold)?;
        positive("cluster_radius", self.cluster_radius)?;
        positive("tracking_tolerance", self.tracking_tolerance)?;
        positive("collision_tolerance", self.collision_tolerance)?;
        if self.min_cluster_size == 0 {
            return Err(AnalysisError::Configuration("min_cluster_size must be at least 1".into()));
        }

        let range = &self.time_range;
        if !range.start.is_finite() {
            return Err(AnalysisError::Configuration(format!("time_range.start must be finite, got {}", range.start)));
        }
        if let Some(end) = range.end {
            if !end.is_finite() || end < range.start {
                return Err(AnalysisError::Configuration(format!(
                    "time_range.end ({end}) must be finite and not before time_range.start ({})",
                    range.start
                )));
            }
        }
        if let Some(interval) = range.interval {
            positive("time_range.interval", interval)?;
        }

        if self.budget.max_steps == Some(0) {
            return Err(AnalysisError::Configuration("budget.max_steps must be at least 1".into()));
        }
        if self.budget.wall_clock_ms == Some(0) {
            return Err(AnalysisError::Configuration("budget.wall_clock_ms must be at least 1".into()));
        }
        if self.workers == Some(0) {
            return Err(AnalysisError::Configuration("workers must be at least 1".into()));
        }

        positive("energy.scale", self.energy.scale)?;
        let heuristics = &self.heuristics;
        positive("heuristics.strength.ambient", heuristics.strength.ambient)?;
        positive("heuristics.step_energy.scale", heuristics.step_energy.scale)?;
        positive("heuristics.spikes.pressure_factor", heuristics.spikes.pressure_factor)?;
        positive("heuristics.spikes.temperature_factor", heuristics.spikes.temperature_factor)?;
        positive("heuristics.performance.annular_area", heuristics.performance.annular_area)?;
        positive("heuristics.performance.gravity", heuristics.performance.gravity)?;
        if let Some(mass_flow_rate) = heuristics.performance.mass_flow_rate {
            positive("heuristics.performance.mass_flow_rate", mass_flow_rate)?;
        }
        Ok(())
    }

    /// Entries inside the time range, thinned to the configured interval, in order.
    pub fn select_entries(&self, entries: &[SnapshotEntry]) -> Vec<SnapshotEntry> {
        let range = &self.time_range;
        let mut selected: Vec<SnapshotEntry> = Vec::new();
        for entry in entries {
            if entry.time < range.start || range.end.is_some_and(|end| entry.time > end) {
                continue;
            }
            if let (Some(interval), Some(last)) = (range.interval, selected.last()) {
                if entry.time - last.time < interval * (1.0 - INTERVAL_SLACK) {
                    continue;
                }
            }
            selected.push(entry.clone());
        }
        selected
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Peak fields to load in addition to the detection field: the tracked ones
    /// plus whatever the heuristics read.
    pub fn fields_to_load(&self) -> Vec<String> {
        let mut fields = self.tracked_fields.clone();
        let extra = std::iter::once(self.energy.field.as_str()).chain(self.heuristics.fields());
        for field in extra {
            if !field.is_empty() && !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(times: &[f64]) -> Vec<SnapshotEntry> {
        times
            .iter()
            .enumerate()
            .map(|(index, &time)| SnapshotEntry { index, time, label: time.to_string() })
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
        assert!(AnalysisConfig::demonstration().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_numbers() {
        for broken in [
            AnalysisConfig { threshold: 0.0, ..AnalysisConfig::default() },
            AnalysisConfig { cluster_radius: -1.0, ..AnalysisConfig::default() },
            AnalysisConfig { tracking_tolerance: f64::NAN, ..AnalysisConfig::default() },
            AnalysisConfig { collision_tolerance: 0.0, ..AnalysisConfig::default() },
            AnalysisConfig { min_cluster_size: 0, ..AnalysisConfig::default() },
        ] {
            assert!(matches!(broken.validate(), Err(AnalysisError::Configuration(_))));
        }
    }

    #[test]
    fn rejects_inverted_or_empty_time_range() {
        let mut config = AnalysisConfig::default();
        config.time_range = TimeRange { start: 1.0, end: Some(0.5), interval: None };
        assert!(config.validate().is_err());
        config.time_range = TimeRange { start: 0.0, end: None, interval: Some(0.0) };
        assert!(config.validate().is_err());
        config.time_range = TimeRange { start: 0.5, end: Some(0.5), interval: None };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn selects_range_and_interval() {
        let all = entries(&[0.0, 1e-5, 2e-5, 3e-5, 4e-5, 5e-5]);
        let config = AnalysisConfig {
            time_range: TimeRange { start: 1e-5, end: Some(4e-5), interval: Some(2e-5) },
            ..AnalysisConfig::default()
        };
        let times: Vec<f64> = config.select_entries(&all).iter().map(|e| e.time).collect();
        assert_eq!(times, vec![1e-5, 3e-5]);
        assert_eq!(config.select_entries(&all)[1].index, 3);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AnalysisConfig =
            serde_json::from_str(r#"{ "metric": "value", "threshold": 2500, "time_range": { "start": 0.001 } }"#)
                .unwrap();
        assert_eq!(config.metric, DetectionMetric::Value);
        assert_eq!(config.threshold, 2500.0);
        assert_eq!(config.time_range.start, 0.001);
        assert_eq!(config.cluster_radius, 0.005);
        assert_eq!(config.tracked_fields, vec!["T", "p"]);
        assert_eq!(config.heuristics.performance.annular_area, 0.01);
    }

    #[test]
    fn worker_count_defaults_to_cpus() {
        assert_eq!(AnalysisConfig::default().worker_count(), num_cpus::get().max(1));
        assert_eq!(AnalysisConfig { workers: Some(3), ..AnalysisConfig::default() }.worker_count(), 3);
    }

    #[test]
    fn rejects_broken_heuristics() {
        let mut config = AnalysisConfig::default();
        config.heuristics.strength.ambient = 0.0;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.heuristics.performance.mass_flow_rate = Some(-1.0);
        assert!(config.validate().is_err());
        config.heuristics.performance.mass_flow_rate = Some(0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn heuristic_fields_are_loaded_once() {
        let mut config = AnalysisConfig { tracked_fields: vec!["T".into()], ..AnalysisConfig::default() };
        config.heuristics.oscillation_field = "rho".into();
        assert_eq!(config.fields_to_load(), vec!["T", "p", "rho"]);
    }
}
