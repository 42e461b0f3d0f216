// THEORY:
// The `FrontBuilder` turns one cluster of candidate points into a `DetectedFront`:
// a stateless summary of one region in one snapshot. It has no identity yet; identity is the tracker's
// job.
//
// Key architectural principles:
// 1.  **Noise Rejection**: Clusters smaller than the configured minimum never
//     become fronts.
// 2.  **Wrap-Aware Extent**: The angular span is the smallest arc containing every
//     member, and the centre angle is that arc's midpoint, so a front straddling
//     θ = 0 is centred near 0 instead of near π.
// 3.  **Peak Signature**: For every tracked field the maximum value among the
//     members is recorded, looked up in the snapshot by sample index.

use crate::core_modules::front_extractor::CandidatePoint;
use crate::core_modules::geometry::{Coordinate, normalize_angle, smallest_arc};
use crate::core_modules::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A spatially coherent front detected in a single snapshot. Not persistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFront {
    /// Member positions, in the clusterer's canonical order.
    pub coordinates: Vec<Coordinate>,
    pub mean_radius: f64,
    /// Midpoint of the smallest arc containing every member.
    pub center_angle: f64,
    /// Width of that arc, in radians.
    pub angular_span: f64,
    pub mean_axial: f64,
    pub axial_span: f64,
    /// Maximum sampled value among members, per tracked field.
    pub peak_values: BTreeMap<String, f64>,
    /// Heuristic peak-to-ambient ratio, see `StrengthHeuristic`.
    #[serde(default)]
    pub strength: Option<f64>,
}

impl DetectedFront {
    /// The representative position used for tracking and collision tests.
    pub fn center(&self) -> Coordinate {
        Coordinate { r: self.mean_radius, theta: self.center_angle, z: self.mean_axial }
    }

    pub fn point_count(&self) -> usize {
        self.coordinates.len()
    }

    pub fn peak(&self, field: &str) -> Option<f64> {
        self.peak_values.get(field).copied()
    }
}

/// Reduces a cluster to a front, or `None` if it is smaller than `min_points`.
///
/// `snapshot` supplies the peak lookups for `tracked_fields`; a field missing from
/// the snapshot is simply left out of `peak_values`.
pub fn build_front(
    cluster: &[CandidatePoint],
    min_points: usize,
    snapshot: &Snapshot,
    tracked_fields: &[String],
) -> Option<DetectedFront> {
    if cluster.is_empty() || cluster.len() < min_points {
        return None;
    }

    let count = cluster.len() as f64;
    let mean_radius = cluster.iter().map(|p| p.coordinate.r).sum::<f64>() / count;
    let mean_axial = cluster.iter().map(|p| p.coordinate.z).sum::<f64>() / count;

    let angles: Vec<f64> = cluster.iter().map(|p| p.coordinate.theta).collect();
    let (arc_start, angular_span) = smallest_arc(&angles);
    let center_angle = normalize_angle(arc_start + angular_span / 2.0);

    let (z_min, z_max) = cluster
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.coordinate.z), hi.max(p.coordinate.z)));

    let mut peak_values = BTreeMap::new();
    for field in tracked_fields {
        let Some(values) = snapshot.field(field) else { continue };
        let peak = cluster
            .iter()
            .filter_map(|p| values.get(p.sample_index).copied())
            .filter(|v| !v.is_nan())
            .fold(f64::NEG_INFINITY, f64::max);
        if peak.is_finite() {
            peak_values.insert(field.clone(), peak);
        }
    }

    Some(DetectedFront {
        coordinates: cluster.iter().map(|p| p.coordinate).collect(),
        mean_radius,
        center_angle,
        angular_span,
        mean_axial,
        axial_span: z_max - z_min,
        peak_values,
        strength: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn cluster(thetas: &[f64]) -> (Vec<CandidatePoint>, Snapshot) {
        let coords: Vec<Coordinate> = thetas.iter().map(|t| Coordinate::polar(0.065, *t)).collect();
        let temps: Vec<f64> = (0..thetas.len()).map(|i| 2800.0 + 100.0 * i as f64).collect();
        let pressures: Vec<f64> = (0..thetas.len()).map(|i| 3.0e6 - 1.0e5 * i as f64).collect();
        let snapshot = Snapshot::new(0.0, coords.clone())
            .with_field("T", temps.clone())
            .unwrap()
            .with_field("p", pressures)
            .unwrap();
        let points = coords
            .iter()
            .zip(&temps)
            .enumerate()
            .map(|(i, (c, t))| CandidatePoint { sample_index: i, coordinate: *c, value: *t, metric: *t })
            .collect();
        (points, snapshot)
    }

    fn fields() -> Vec<String> {
        vec!["T".to_string(), "p".to_string(), "U".to_string()]
    }

    #[test]
    fn small_clusters_are_noise() {
        let (points, snapshot) = cluster(&[0.1, 0.2]);
        assert!(build_front(&points, 3, &snapshot, &fields()).is_none());
        assert!(build_front(&points, 2, &snapshot, &fields()).is_some());
    }

    #[test]
    fn summarizes_position_and_peaks() {
        let (points, snapshot) = cluster(&[1.0, 1.1, 1.2, 1.3]);
        let front = build_front(&points, 1, &snapshot, &fields()).unwrap();
        assert!((front.mean_radius - 0.065).abs() < 1e-12);
        assert!((front.angular_span - 0.3).abs() < 1e-9);
        assert!((front.center_angle - 1.15).abs() < 1e-9);
        assert_eq!(front.peak("T"), Some(3100.0));
        assert_eq!(front.peak("p"), Some(3.0e6));
        // Fields absent from the snapshot are skipped.
        assert_eq!(front.peak("U"), None);
        assert_eq!(front.point_count(), 4);
    }

    #[test]
    fn span_and_center_wrap_around_zero() {
        let (points, snapshot) = cluster(&[TAU - 0.1, 0.0, 0.1]);
        let front = build_front(&points, 1, &snapshot, &fields()).unwrap();
        assert!((front.angular_span - 0.2).abs() < 1e-9);
        let center = front.center_angle;
        assert!(center < 1e-9 || TAU - center < 1e-9, "center {center}");
    }
}
