// THEORY:
// The `aggregator` module is the final, run-level analysis layer. The tracker and
// collision detector describe individual fronts; this module describes the
// *system*: how many fronts the combustor sustains, how fast they travel and how
// steady that behaviour is over the analysed window.
//
// Key architectural principles:
// 1.  **Per-Step Summary**: `SystemSnapshot` freezes the tracked state of one step
//     together with a few derived quantities (pattern, system frequency, spacing
//     irregularity, heuristic energy and pressure oscillation) so the history is
//     self-describing.
// 2.  **One Fold Over History**: `aggregate` walks the finished history once.
// 3.  **Total Functions**: Every statistic is defined for an empty history or a
//     history without fronts. Nothing divides by zero and nothing returns NaN.

use crate::core_modules::collision_detector::{CollisionEvent, CollisionKind};
use crate::core_modules::geometry::normalize_angle;
use crate::core_modules::heuristics::{PerformanceEstimate, PerformanceHeuristic, StepEnergyHeuristic};
use crate::core_modules::tracker::{Front, FrontId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::fmt;

/// Operating mode inferred from a front count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternLabel {
    None,
    Single,
    Double,
    Triple,
    Multiple,
}

impl PatternLabel {
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => Self::None,
            1 => Self::Single,
            2 => Self::Double,
            3 => Self::Triple,
            _ => Self::Multiple,
        }
    }

    /// Label for a mean count, rounded half away from zero.
    pub fn from_average(avg: f64) -> Self {
        if avg.is_finite() && avg > 0.0 { Self::from_count(avg.round() as usize) } else { Self::None }
    }
}

impl fmt::Display for PatternLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Single => "single",
            Self::Double => "double",
            Self::Triple => "triple",
            Self::Multiple => "multiple",
        };
        f.write_str(label)
    }
}

/// The tracked state of the system at one analysed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// Position of the step in the source's time-ordered entries.
    pub step_index: usize,
    pub time: f64,
    /// Active fronts after tracking.
    pub fronts: Vec<Front>,
    pub active_count: usize,
    pub pattern: PatternLabel,
    /// Ids retired at this step.
    pub retired: Vec<FrontId>,
    /// Mean active speed over the mean circumference, in Hz.
    pub system_frequency: f64,
    /// 0 when the fronts are evenly spaced around the annulus.
    pub spacing_irregularity: f64,
    /// Heuristic, see `StepEnergyHeuristic`.
    pub total_energy: f64,
    /// RMS spread of the pressure field over the whole snapshot, when loaded.
    pub pressure_oscillation: Option<f64>,
}

impl SystemSnapshot {
    pub fn new(step_index: usize, time: f64, fronts: Vec<Front>, retired: Vec<FrontId>) -> Self {
        let active: Vec<&Front> = fronts.iter().filter(|f| f.active).collect();
        let active_count = active.len();
        Self {
            step_index,
            time,
            active_count,
            pattern: PatternLabel::from_count(active_count),
            retired,
            system_frequency: system_frequency(&active),
            spacing_irregularity: spacing_irregularity(&active),
            total_energy: 0.0,
            pressure_oscillation: None,
            fronts,
        }
    }

    /// Attaches the field-derived measures of this step.
    pub fn with_measures(mut self, energy: &StepEnergyHeuristic, pressure_oscillation: Option<f64>) -> Self {
        let total_energy = energy.total(self.active_fronts());
        self.total_energy = total_energy;
        self.pressure_oscillation = pressure_oscillation;
        self
    }

    pub fn active_fronts(&self) -> impl Iterator<Item = &Front> {
        self.fronts.iter().filter(|f| f.active)
    }
}

/// `mean speed / (2π · mean radius)`, or 0 without fronts or radius.
fn system_frequency(active: &[&Front]) -> f64 {
    if active.is_empty() {
        return 0.0;
    }
    let n = active.len() as f64;
    let speed = active.iter().map(|f| f.speed).sum::<f64>() / n;
    let radius = active.iter().map(|f| f.shape.mean_radius).sum::<f64>() / n;
    if radius > 0.0 { speed / (TAU * radius) } else { 0.0 }
}

fn spacing_irregularity(active: &[&Front]) -> f64 {
    if active.len() < 2 {
        return 0.0;
    }
    let mut angles: Vec<f64> = active.iter().map(|f| normalize_angle(f.shape.center_angle)).collect();
    angles.sort_by(f64::total_cmp);

    let n = angles.len();
    let uniform = TAU / n as f64;
    // Sorted angles in [0, 2π): consecutive gaps are non-negative and only the
    // last one wraps back to the first front.
    let deviation: f64 = (0..n)
        .map(|i| {
            let gap = if i + 1 < n { angles[i + 1] - angles[i] } else { angles[0] + TAU - angles[i] };
            (gap - uniform).abs()
        })
        .sum();
    deviation / n as f64 / uniform
}

/// Number of collisions reported for one id pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCollisions {
    pub fronts: (FrontId, FrontId),
    pub count: usize,
}

/// Run-level statistics over the whole analysed history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatistics {
    pub steps: usize,
    pub avg_count: f64,
    pub avg_speed: f64,
    /// `exp(-variance(active_count))`, in `(0, 1]`. Floored at the smallest
    /// positive `f64` instead of underflowing to 0 for huge variances.
    pub stability: f64,
    pub count_std_dev: f64,
    pub min_count: usize,
    pub max_count: usize,
    pub pattern: PatternLabel,
    pub collision_count: usize,
    /// Collisions per unit simulated time.
    pub collision_frequency: f64,
    pub collisions_by_kind: BTreeMap<CollisionKind, usize>,
    pub collision_pairs: Vec<PairCollisions>,
    pub mean_system_frequency: f64,
    /// Mean of the per-step heuristic energy.
    pub mean_total_energy: f64,
    /// Largest heuristic pressure spike over all collisions, 0 without any.
    pub peak_pressure_spike: f64,
    /// Heuristic thrust and specific impulse, see `PerformanceHeuristic`.
    pub performance: PerformanceEstimate,
}

/// Folds the history and its collision events into run-level statistics.
pub fn aggregate(
    history: &[SystemSnapshot],
    collisions: &[CollisionEvent],
    performance: &PerformanceHeuristic,
) -> SystemStatistics {
    let steps = history.len();
    let counts: Vec<f64> = history.iter().map(|s| s.active_count as f64).collect();

    let avg_count = mean(&counts);
    let variance = if counts.is_empty() {
        0.0
    } else {
        counts.iter().map(|c| (c - avg_count).powi(2)).sum::<f64>() / counts.len() as f64
    };

    let speeds: Vec<f64> = history.iter().flat_map(|s| s.active_fronts().map(|f| f.speed)).collect();
    let frequencies: Vec<f64> =
        history.iter().filter(|s| s.active_count > 0).map(|s| s.system_frequency).collect();

    let span = match (history.first(), history.last()) {
        (Some(first), Some(last)) => last.time - first.time,
        _ => 0.0,
    };
    let collision_frequency = if span > 0.0 { collisions.len() as f64 / span } else { 0.0 };

    let mut collisions_by_kind = BTreeMap::new();
    let mut pairs: BTreeMap<(FrontId, FrontId), usize> = BTreeMap::new();
    for event in collisions {
        *collisions_by_kind.entry(event.kind).or_insert(0) += 1;
        *pairs.entry(event.involved_front_ids).or_insert(0) += 1;
    }

    SystemStatistics {
        steps,
        avg_count,
        avg_speed: mean(&speeds),
        stability: (-variance).exp().max(f64::MIN_POSITIVE),
        count_std_dev: variance.sqrt(),
        min_count: history.iter().map(|s| s.active_count).min().unwrap_or(0),
        max_count: history.iter().map(|s| s.active_count).max().unwrap_or(0),
        pattern: PatternLabel::from_average(avg_count),
        collision_count: collisions.len(),
        collision_frequency,
        collisions_by_kind,
        collision_pairs: pairs.into_iter().map(|(fronts, count)| PairCollisions { fronts, count }).collect(),
        mean_system_frequency: mean(&frequencies),
        mean_total_energy: mean(&history.iter().map(|s| s.total_energy).collect::<Vec<_>>()),
        peak_pressure_spike: collisions.iter().map(|c| c.pressure_spike).fold(0.0, f64::max),
        performance: performance.estimate(history),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() { 0.0 } else { values.iter().sum::<f64>() / values.len() as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::front_builder::DetectedFront;
    use crate::core_modules::geometry::Coordinate;

    fn front(id: FrontId, theta: f64, speed: f64) -> Front {
        Front {
            id,
            detection_time: 0.0,
            observed_at: 0.0,
            shape: DetectedFront {
                coordinates: vec![Coordinate::polar(0.065, theta)],
                mean_radius: 0.065,
                center_angle: theta,
                angular_span: 0.0,
                mean_axial: 0.0,
                axial_span: 0.0,
                peak_values: BTreeMap::new(),
                strength: None,
            },
            speed,
            age: 1,
            active: true,
        }
    }

    fn summary(history: &[SystemSnapshot], collisions: &[CollisionEvent]) -> SystemStatistics {
        aggregate(history, collisions, &PerformanceHeuristic::default())
    }

    fn history(counts: &[usize]) -> Vec<SystemSnapshot> {
        counts
            .iter()
            .enumerate()
            .map(|(step, &n)| {
                let fronts = (0..n).map(|i| front(i as FrontId + 1, i as f64, 1000.0)).collect();
                SystemSnapshot::new(step, step as f64 * 1e-5, fronts, Vec::new())
            })
            .collect()
    }

    #[test]
    fn empty_history_is_well_defined() {
        let stats = summary(&[], &[]);
        assert_eq!(stats.avg_count, 0.0);
        assert_eq!(stats.avg_speed, 0.0);
        assert_eq!(stats.stability, 1.0);
        assert_eq!(stats.pattern, PatternLabel::None);
        assert_eq!(stats.collision_frequency, 0.0);
    }

    #[test]
    fn frontless_history_is_well_defined() {
        let stats = summary(&history(&[0, 0, 0]), &[]);
        assert_eq!(stats.avg_count, 0.0);
        assert!(stats.stability.is_finite());
        assert_eq!(stats.stability, 1.0);
        assert_eq!(stats.mean_system_frequency, 0.0);
    }

    #[test]
    fn stability_is_one_for_constant_count_and_drops_with_variance() {
        let constant = summary(&history(&[2, 2, 2, 2]), &[]);
        let mild = summary(&history(&[2, 3, 2, 3]), &[]);
        let wild = summary(&history(&[1, 4, 1, 4]), &[]);
        assert_eq!(constant.stability, 1.0);
        assert!(mild.stability < constant.stability);
        assert!(wild.stability < mild.stability);
        assert!(wild.stability > 0.0);
        assert_eq!(mild.min_count, 2);
        assert_eq!(mild.max_count, 3);
    }

    #[test]
    fn pattern_follows_rounded_average() {
        assert_eq!(summary(&history(&[1, 1, 2]), &[]).pattern, PatternLabel::Single);
        assert_eq!(summary(&history(&[3, 3, 3]), &[]).pattern, PatternLabel::Triple);
        assert_eq!(summary(&history(&[5, 6]), &[]).pattern, PatternLabel::Multiple);
        assert_eq!(PatternLabel::Double.to_string(), "double");
    }

    #[test]
    fn evenly_spaced_fronts_have_zero_irregularity() {
        let fronts = vec![front(1, 0.0, 2000.0), front(2, TAU / 3.0, 2000.0), front(3, 2.0 * TAU / 3.0, 2000.0)];
        let snapshot = SystemSnapshot::new(0, 0.0, fronts, Vec::new());
        assert!(snapshot.spacing_irregularity < 1e-9);
        assert!((snapshot.system_frequency - 2000.0 / (TAU * 0.065)).abs() < 1e-6);

        let bunched = vec![front(1, 0.0, 0.0), front(2, 0.1, 0.0)];
        assert!(SystemSnapshot::new(0, 0.0, bunched, Vec::new()).spacing_irregularity > 0.9);
    }

    #[test]
    fn collisions_are_counted_per_kind_and_pair() {
        let event = |a: FrontId, b: FrontId, kind| CollisionEvent {
            time: 0.0,
            step_index: 0,
            location: Coordinate::default(),
            involved_front_ids: (a, b),
            kind,
            separation: 0.0,
            estimated_energy_release: 0.0,
            pressure_spike: 1.0e6 * a as f64,
            temperature_spike: 0.0,
        };
        let events = vec![
            event(1, 2, CollisionKind::HeadOn),
            event(1, 2, CollisionKind::HeadOn),
            event(2, 3, CollisionKind::Merging),
        ];
        let stats = summary(&history(&[2, 2, 2]), &events);
        assert_eq!(stats.collision_count, 3);
        assert_eq!(stats.collisions_by_kind[&CollisionKind::HeadOn], 2);
        assert_eq!(stats.collision_pairs[0], PairCollisions { fronts: (1, 2), count: 2 });
        assert!((stats.collision_frequency - 3.0 / 2e-5).abs() < 1e-3);
        assert_eq!(stats.peak_pressure_spike, 2.0e6);
    }

    #[test]
    fn coincident_fronts_only_wrap_once() {
        let stacked = vec![front(1, 1.0, 0.0), front(2, 1.0, 0.0), front(3, 1.0, 0.0)];
        let snapshot = SystemSnapshot::new(0, 0.0, stacked, Vec::new());
        assert!((snapshot.spacing_irregularity - 4.0 / 3.0).abs() < 1e-12);

        let pair = vec![front(1, 2.0, 0.0), front(2, 2.0, 0.0)];
        assert!((SystemSnapshot::new(0, 0.0, pair, Vec::new()).spacing_irregularity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn stability_stays_positive_for_huge_variance() {
        let mut counts = vec![0; 10];
        counts.extend(vec![60; 10]);
        let stats = summary(&history(&counts), &[]);
        assert!(stats.stability > 0.0);
        assert!(stats.stability <= f64::MIN_POSITIVE);
    }

    #[test]
    fn measures_feed_energy_and_performance() {
        let mut hot = front(1, 0.0, 2000.0);
        hot.shape.peak_values.insert("p".to_string(), 2.0e6);
        hot.shape.peak_values.insert("T".to_string(), 3000.0);
        let busy = SystemSnapshot::new(0, 0.0, vec![hot], Vec::new())
            .with_measures(&StepEnergyHeuristic::default(), Some(4.0e5));
        let quiet = SystemSnapshot::new(1, 1e-5, Vec::new(), Vec::new())
            .with_measures(&StepEnergyHeuristic::default(), None);
        assert!((busy.total_energy - 6.0e6).abs() < 1e-6);
        assert_eq!(busy.pressure_oscillation, Some(4.0e5));
        assert_eq!(quiet.total_energy, 0.0);

        let stats = summary(&[busy, quiet], &[]);
        assert!((stats.mean_total_energy - 3.0e6).abs() < 1e-6);
        assert!((stats.performance.thrust - 1.0e4).abs() < 1e-6);
        assert_eq!(stats.performance.specific_impulse, None);
    }
}
