// THEORY:
// The `CollisionDetector` turns the continuous "these two fronts are close" signal
// into discrete events: it compares the current state with the previous one and
// reports only transitions.
//
// Key architectural principles:
// 1.  **Rising Edge Only**: A pair of ids produces an event on the first snapshot
//     in which it is closer than the collision tolerance. While it stays close no
//     further events are emitted; once it separates, a later approach is a new
//     event.
// 2.  **Stateless Between Calls**: The previous snapshot carries all the memory
//     needed, so the detector itself can be shared freely.
// 3.  **Explicit Heuristics**: The collision classification thresholds and the
//     energy-release estimate are configuration, not buried constants. The energy
//     figure is a heuristic proxy (a scaled mean of the two fronts' peak values of
//     one field), not a first-principles energy balance. The pressure and
//     temperature spikes come from `SpikeHeuristic` in the same spirit.

use crate::core_modules::geometry::{Coordinate, DomainMetric, circular_midpoint};
use crate::core_modules::heuristics::SpikeHeuristic;
use crate::core_modules::tracker::{Front, FrontId};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use tracing::debug;

/// How two fronts met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionKind {
    /// Similar speeds approaching from well separated angles.
    HeadOn,
    /// Strongly differing speeds.
    Oblique,
    /// Anything else: a front catching up with or absorbing another.
    Merging,
}

impl CollisionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::HeadOn => "head-on",
            Self::Oblique => "oblique",
            Self::Merging => "merging",
        }
    }
}

/// Speed/angle thresholds used to classify collisions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionClassifier {
    /// Speed differences below this count as "similar" (m/s).
    pub head_on_max_speed_delta: f64,
    /// Speed differences above this make a collision oblique (m/s).
    pub oblique_min_speed_delta: f64,
    /// Angular separation a head-on collision must exceed (rad).
    pub head_on_min_separation: f64,
}

impl Default for CollisionClassifier {
    fn default() -> Self {
        Self { head_on_max_speed_delta: 100.0, oblique_min_speed_delta: 300.0, head_on_min_separation: FRAC_PI_2 }
    }
}

impl CollisionClassifier {
    pub fn classify(&self, speed_delta: f64, separation: f64) -> CollisionKind {
        if speed_delta < self.head_on_max_speed_delta && separation > self.head_on_min_separation {
            CollisionKind::HeadOn
        } else if speed_delta > self.oblique_min_speed_delta {
            CollisionKind::Oblique
        } else {
            CollisionKind::Merging
        }
    }
}

/// Heuristic energy-release estimate: `scale · mean(peak_a, peak_b)` of `field`.
///
/// This is a proxy with explicit assumptions, not a physical computation: it
/// assumes the released energy scales linearly with the peak intensity of the
/// chosen field (pressure by default) in the two colliding fronts. Fronts missing
/// the field contribute nothing; if neither has it the estimate is 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyHeuristic {
    pub field: String,
    pub scale: f64,
}

impl Default for EnergyHeuristic {
    fn default() -> Self {
        Self { field: "p".to_string(), scale: 1.0 }
    }
}

impl EnergyHeuristic {
    pub fn estimate(&self, a: &Front, b: &Front) -> f64 {
        let peaks: Vec<f64> = [a, b].iter().filter_map(|f| f.shape.peak(&self.field)).collect();
        if peaks.is_empty() {
            return 0.0;
        }
        self.scale * peaks.iter().sum::<f64>() / peaks.len() as f64
    }
}

/// A detected non-colliding → colliding transition between two tracked fronts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionEvent {
    pub time: f64,
    pub step_index: usize,
    /// Midpoint between the two fronts' centres.
    pub location: Coordinate,
    /// The two ids, smaller first.
    pub involved_front_ids: (FrontId, FrontId),
    pub kind: CollisionKind,
    /// Centre-to-centre distance at detection.
    pub separation: f64,
    /// Heuristic, see `EnergyHeuristic`.
    pub estimated_energy_release: f64,
    /// Heuristic, see `SpikeHeuristic`.
    pub pressure_spike: f64,
    pub temperature_spike: f64,
}

/// Finds new collisions between the active fronts of consecutive snapshots.
#[derive(Debug, Clone)]
pub struct CollisionDetector<M: DomainMetric> {
    metric: M,
    tolerance: f64,
    classifier: CollisionClassifier,
    energy: EnergyHeuristic,
    spikes: SpikeHeuristic,
}

impl<M: DomainMetric> CollisionDetector<M> {
    pub fn new(metric: M, tolerance: f64, classifier: CollisionClassifier, energy: EnergyHeuristic) -> Self {
        Self { metric, tolerance, classifier, energy, spikes: SpikeHeuristic::default() }
    }

    pub fn with_spikes(mut self, spikes: SpikeHeuristic) -> Self {
        self.spikes = spikes;
        self
    }

    fn colliding(&self, a: &Front, b: &Front) -> bool {
        self.metric.distance(&a.center(), &b.center()) < self.tolerance
    }

    /// Reports every id pair that is colliding in `current` but was not colliding
    /// (or did not exist) in `previous`.
    pub fn detect(
        &self,
        step_index: usize,
        time: f64,
        current: &[Front],
        previous: Option<&[Front]>,
    ) -> Vec<CollisionEvent> {
        let active: Vec<&Front> = current.iter().filter(|f| f.active).collect();
        let mut events = Vec::new();

        for (i, a) in active.iter().enumerate() {
            for b in active.iter().skip(i + 1) {
                let separation = self.metric.distance(&a.center(), &b.center());
                if separation >= self.tolerance {
                    continue;
                }
                if self.was_colliding(previous, a.id, b.id) {
                    continue;
                }

                let (first, second) = if a.id <= b.id { (*a, *b) } else { (*b, *a) };
                let kind = self.classifier.classify(
                    (first.speed - second.speed).abs(),
                    self.metric.angular_separation(&first.center(), &second.center()),
                );
                let location = Coordinate {
                    r: (first.shape.mean_radius + second.shape.mean_radius) / 2.0,
                    theta: circular_midpoint(first.shape.center_angle, second.shape.center_angle),
                    z: (first.shape.mean_axial + second.shape.mean_axial) / 2.0,
                };
                let (pressure_spike, temperature_spike) = self.spikes.spikes(first, second);
                debug!(a = first.id, b = second.id, time, kind = kind.label(), "collision");

                events.push(CollisionEvent {
                    time,
                    step_index,
                    location,
                    involved_front_ids: (first.id, second.id),
                    kind,
                    separation,
                    estimated_energy_release: self.energy.estimate(first, second),
                    pressure_spike,
                    temperature_spike,
                });
            }
        }

        events
    }

    fn was_colliding(&self, previous: Option<&[Front]>, a: FrontId, b: FrontId) -> bool {
        let Some(previous) = previous else { return false };
        let find = |id: FrontId| previous.iter().find(|f| f.id == id && f.active);
        match (find(a), find(b)) {
            (Some(pa), Some(pb)) => self.colliding(pa, pb),
            _ => false,
        }
    }
}
