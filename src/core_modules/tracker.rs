// THEORY:
// The `tracker` module is the heart of the behavioural layer. It adds object
// permanence: it takes the stateless `DetectedFront`s of one snapshot and
// associates them with the fronts it was following in the previous snapshot.
//
// This module solves the "data association problem" for detonation fronts.
//
// Key architectural principles:
// 1.  **Object Persistence**: A `Front` is a `DetectedFront` plus an identity that
//     survives across snapshots, its birth time, its observation count and its
//     propagation speed.
// 2.  **One-to-One Matching**: Every (current, previous) pair within the tracking
//     tolerance is a candidate; candidates are claimed greedily in order of
//     increasing distance, so no previous front is inherited twice and the
//     nearest pairs always win.
// 3.  **Lifecycle Management**:
//     - **Birth**: an unmatched current front receives a freshly allocated id.
//     - **Tracking**: a matched front inherits the id and gets a speed estimate
//       from the wrap-aware displacement of its centre.
//     - **Retirement**: a previous front with no match is retired on the spot.
//       Retired ids are never matched again and the allocator never reuses them.
// 4.  **Run-Scoped Ids**: The id counter is a value owned by one analysis run,
//     so independent runs never interfere and tests are deterministic.

use crate::core_modules::front_builder::DetectedFront;
use crate::core_modules::geometry::{Coordinate, DomainMetric};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub type FrontId = u64;

/// Hands out front ids for a single analysis run. Ids start at 1 and only grow.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next_id: FrontId,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next_id: 1 }
    }

    pub fn allocate(&mut self) -> FrontId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next_id - 1
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A front that is being tracked across snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Front {
    /// Stable for the front's whole lifetime, never reused.
    pub id: FrontId,
    /// Time of the snapshot in which this front was first detected.
    pub detection_time: f64,
    /// Time of the snapshot this state belongs to.
    pub observed_at: f64,
    #[serde(flatten)]
    pub shape: DetectedFront,
    /// Propagation speed from the last two observations; 0 until a second one exists.
    pub speed: f64,
    /// Number of snapshots this front has been observed in.
    pub age: u32,
    pub active: bool,
}

impl Front {
    fn born(id: FrontId, time: f64, shape: DetectedFront) -> Self {
        Self { id, detection_time: time, observed_at: time, shape, speed: 0.0, age: 1, active: true }
    }

    fn succeed(previous: &Front, time: f64, shape: DetectedFront, speed: f64) -> Self {
        Self {
            id: previous.id,
            detection_time: previous.detection_time,
            observed_at: time,
            shape,
            speed,
            age: previous.age + 1,
            active: true,
        }
    }

    pub fn center(&self) -> Coordinate {
        self.shape.center()
    }
}

/// The result of associating one snapshot's detections with the previous fronts.
#[derive(Debug, Clone, Default)]
pub struct TrackingOutcome {
    /// Active fronts for the current snapshot, in detection order.
    pub fronts: Vec<Front>,
    /// Previous fronts that found no match, now marked inactive.
    pub retired: Vec<Front>,
}

/// Associates `current` detections with `previous` fronts.
///
/// Only active previous fronts are considered. `elapsed` is the time between the
/// two snapshots; when it is not positive the previous speed is carried over.
pub fn associate<M: DomainMetric>(
    previous: &[Front],
    current: Vec<DetectedFront>,
    time: f64,
    elapsed: f64,
    tolerance: f64,
    metric: &M,
    ids: &mut IdAllocator,
) -> TrackingOutcome {
    let centers: Vec<Coordinate> = current.iter().map(DetectedFront::center).collect();

    // --- 1. Candidate pairs within tolerance ---
    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for (ci, center) in centers.iter().enumerate() {
        for (pi, prev) in previous.iter().enumerate() {
            if !prev.active {
                continue;
            }
            let distance = metric.distance(center, &prev.center());
            if distance <= tolerance {
                candidates.push((distance, ci, pi));
            }
        }
    }
    candidates.sort_by(|a, b| {
        a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)).then_with(|| a.2.cmp(&b.2))
    });

    // --- 2. Greedy one-to-one claiming, nearest first ---
    let mut match_for_current: Vec<Option<(usize, f64)>> = vec![None; current.len()];
    let mut claimed = vec![false; previous.len()];
    for (distance, ci, pi) in candidates {
        if match_for_current[ci].is_some() || claimed[pi] {
            continue;
        }
        match_for_current[ci] = Some((pi, distance));
        claimed[pi] = true;
    }

    // --- 3. Birth and succession ---
    let fronts: Vec<Front> = current
        .into_iter()
        .zip(match_for_current)
        .map(|(shape, matched)| match matched {
            Some((pi, displacement)) => {
                let prev = &previous[pi];
                let speed = if elapsed > 0.0 { displacement / elapsed } else { prev.speed };
                Front::succeed(prev, time, shape, speed)
            }
            None => {
                let id = ids.allocate();
                debug!(id, time, "front detected");
                Front::born(id, time, shape)
            }
        })
        .collect();

    // --- 4. Retirement ---
    let retired: Vec<Front> = previous
        .iter()
        .zip(&claimed)
        .filter(|(prev, claimed)| prev.active && !**claimed)
        .map(|(prev, _)| {
            debug!(id = prev.id, time, "front retired");
            Front { active: false, ..prev.clone() }
        })
        .collect();

    TrackingOutcome { fronts, retired }
}

/// Keeps the previous step's fronts and the run's id allocator between calls.
pub struct FrontTracker<M: DomainMetric> {
    metric: M,
    tolerance: f64,
    ids: IdAllocator,
    active: Vec<Front>,
    last_time: Option<f64>,
}

impl<M: DomainMetric> FrontTracker<M> {
    pub fn new(metric: M, tolerance: f64) -> Self {
        Self { metric, tolerance, ids: IdAllocator::new(), active: Vec::new(), last_time: None }
    }

    /// Updates the tracker with the detections of the snapshot taken at `time`.
    pub fn update(&mut self, time: f64, detected: Vec<DetectedFront>) -> TrackingOutcome {
        let elapsed = self.last_time.map(|last| time - last).unwrap_or(0.0);
        let outcome = associate(&self.active, detected, time, elapsed, self.tolerance, &self.metric, &mut self.ids);
        self.active = outcome.fronts.clone();
        self.last_time = Some(time);
        outcome
    }

    pub fn active_fronts(&self) -> &[Front] {
        &self.active
    }

    pub fn ids_issued(&self) -> u64 {
        self.ids.issued()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::Polar2D;
    use std::collections::BTreeMap;

    fn detected(r: f64, theta: f64) -> DetectedFront {
        DetectedFront {
            coordinates: vec![Coordinate::polar(r, theta)],
            mean_radius: r,
            center_angle: theta,
            angular_span: 0.0,
            mean_axial: 0.0,
            axial_span: 0.0,
            peak_values: BTreeMap::new(),
            strength: None,
        }
    }

    #[test]
    fn small_displacement_keeps_identity() {
        let mut tracker = FrontTracker::new(Polar2D, 0.05);
        let first = tracker.update(0.0, vec![detected(0.065, 0.0)]);
        let second = tracker.update(1e-5, vec![detected(0.065, 0.1)]);
        assert_eq!(first.fronts[0].id, second.fronts[0].id);
        assert_eq!(second.fronts[0].age, 2);
        assert_eq!(second.fronts[0].detection_time, 0.0);
        // 0.065 m * 0.1 rad over 10 µs.
        assert!((second.fronts[0].speed - 650.0).abs() < 1e-6);
        assert!(second.retired.is_empty());
    }

    #[test]
    fn first_observation_has_zero_speed() {
        let mut tracker = FrontTracker::new(Polar2D, 0.05);
        let outcome = tracker.update(0.0, vec![detected(0.065, 1.0)]);
        assert_eq!(outcome.fronts[0].speed, 0.0);
        assert_eq!(outcome.fronts[0].id, 1);
    }

    #[test]
    fn large_displacement_gets_new_id_and_retires_old() {
        let mut tracker = FrontTracker::new(Polar2D, 0.005);
        let first = tracker.update(0.0, vec![detected(0.065, 0.0)]);
        let second = tracker.update(1e-5, vec![detected(0.065, 1.0)]);
        assert_ne!(first.fronts[0].id, second.fronts[0].id);
        assert_eq!(second.retired.len(), 1);
        assert_eq!(second.retired[0].id, first.fronts[0].id);
        assert!(!second.retired[0].active);
    }

    #[test]
    fn retired_ids_never_return() {
        let mut tracker = FrontTracker::new(Polar2D, 0.05);
        let born = tracker.update(0.0, vec![detected(0.065, 0.0)]).fronts[0].id;
        let gap = tracker.update(1e-5, Vec::new());
        assert_eq!(gap.retired[0].id, born);
        let back = tracker.update(2e-5, vec![detected(0.065, 0.0)]);
        assert_ne!(back.fronts[0].id, born);
        assert_eq!(tracker.ids_issued(), 2);
    }

    #[test]
    fn matching_is_one_to_one() {
        let mut tracker = FrontTracker::new(Polar2D, 0.05);
        let first = tracker.update(0.0, vec![detected(0.065, 1.0)]);
        // Two detections equally close to the single previous front.
        let second = tracker.update(1e-5, vec![detected(0.065, 0.9), detected(0.065, 1.1)]);
        let inherited: Vec<_> = second.fronts.iter().filter(|f| f.id == first.fronts[0].id).collect();
        assert_eq!(inherited.len(), 1);
        assert_eq!(second.fronts.len(), 2);
        assert_ne!(second.fronts[0].id, second.fronts[1].id);
    }

    #[test]
    fn nearest_pairs_win_across_the_wrap() {
        let mut tracker = FrontTracker::new(Polar2D, 0.05);
        let first = tracker.update(0.0, vec![detected(0.065, 6.25), detected(0.065, 3.0)]);
        let second = tracker.update(1e-5, vec![detected(0.065, 3.05), detected(0.065, 0.02)]);
        assert_eq!(second.fronts[0].id, first.fronts[1].id);
        assert_eq!(second.fronts[1].id, first.fronts[0].id);
    }
}
