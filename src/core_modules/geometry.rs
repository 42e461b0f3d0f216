// THEORY:
// The `geometry` module is the foundation every other layer measures with. The
// combustor is an annulus (2D) or an annular cylinder (3D), so positions are
// naturally polar: a radius, an angle around the axis and, in 3D, an axial
// height. The angle is periodic, which is the single most important fact in the
// whole crate: two samples at 0.01 rad and 2π - 0.01 rad sit next to each other,
// not on opposite sides of the chamber.
//
// Key architectural principles:
// 1.  **Normalized Angles**: Every stored angle is normalized to `[0, 2π)`. Every
//     angular *difference* is wrapped into `(-π, π]` before it is used.
// 2.  **Distance as a Strategy**: The `DomainMetric` trait is the only place that
//     knows how to turn two coordinates into a distance. The clusterer, tracker and
//     collision detector are generic over it, so the 2D and 3D pipelines share one
//     implementation instead of being copies of each other.
// 3.  **Symmetry**: The arc-length term uses the mean of the two radii, so
//     `d(a, b) == d(b, a)` holds exactly.

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// A position in the annular domain. `z` is zero for planar (2D) data.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    /// Radial distance from the combustor axis.
    pub r: f64,
    /// Angular position, always in `[0, 2π)`.
    pub theta: f64,
    /// Axial position.
    #[serde(default)]
    pub z: f64,
}

impl Coordinate {
    /// Builds a planar coordinate, normalizing the angle.
    pub fn polar(r: f64, theta: f64) -> Self {
        Self { r, theta: normalize_angle(theta), z: 0.0 }
    }

    /// Builds a cylindrical coordinate, normalizing the angle.
    pub fn cylindrical(r: f64, theta: f64, z: f64) -> Self {
        Self { r, theta: normalize_angle(theta), z }
    }
}

/// Maps any angle into `[0, 2π)`.
pub fn normalize_angle(theta: f64) -> f64 {
    if !theta.is_finite() {
        return 0.0;
    }
    let wrapped = theta.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if wrapped >= TAU { 0.0 } else { wrapped }
}

/// Maps an angular difference into `(-π, π]`.
pub fn wrap_angle(delta: f64) -> f64 {
    if !delta.is_finite() {
        return 0.0;
    }
    let shifted = (delta + PI).rem_euclid(TAU) - PI;
    if shifted <= -PI { shifted + TAU } else { shifted }
}

/// Signed shortest angular difference `b - a`, in `(-π, π]`.
pub fn angular_difference(a: f64, b: f64) -> f64 {
    wrap_angle(b - a)
}

/// Converts a Cartesian position to `(r, θ, z)`.
pub fn cartesian_to_cylindrical(x: f64, y: f64, z: f64) -> Coordinate {
    Coordinate::cylindrical(x.hypot(y), y.atan2(x), z)
}

/// Returns `(start, span)` of the smallest arc containing every angle.
///
/// The arc starts at `start` and runs counter-clockwise for `span` radians; it is
/// the complement of the largest empty gap between circularly adjacent angles.
/// An empty input yields `(0, 0)`.
pub fn smallest_arc(angles: &[f64]) -> (f64, f64) {
    let mut sorted: Vec<f64> = angles.iter().map(|a| normalize_angle(*a)).collect();
    if sorted.is_empty() {
        return (0.0, 0.0);
    }
    sorted.sort_by(f64::total_cmp);

    // The gap that wraps past 2π back to the first angle.
    let first = sorted[0];
    let last = sorted[sorted.len() - 1];
    let mut largest_gap = TAU - (last - first);
    let mut start = first;

    for pair in sorted.windows(2) {
        let gap = pair[1] - pair[0];
        if gap > largest_gap {
            largest_gap = gap;
            start = pair[1];
        }
    }

    let span = (TAU - largest_gap).max(0.0);
    (start, span)
}

/// Midpoint of the short arc between two angles.
pub fn circular_midpoint(a: f64, b: f64) -> f64 {
    normalize_angle(a + angular_difference(a, b) / 2.0)
}

/// Selects which distance strategy the pipeline runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    /// Radial/angular annulus.
    #[default]
    Polar2d,
    /// Radial/angular/axial annular cylinder.
    Cylindrical3d,
}

/// A periodic-aware distance strategy over the combustor domain.
pub trait DomainMetric: Send + Sync + Clone + 'static {
    /// Human readable name, recorded in the analysis result.
    fn name(&self) -> &'static str;

    /// Whether the axial coordinate participates in distances and gradients.
    fn is_axial(&self) -> bool;

    /// Distance between two coordinates. Must be symmetric and wrap the angle.
    fn distance(&self, a: &Coordinate, b: &Coordinate) -> f64;

    /// Unsigned angular separation of two coordinates, in `[0, π]`.
    fn angular_separation(&self, a: &Coordinate, b: &Coordinate) -> f64 {
        angular_difference(a.theta, b.theta).abs()
    }
}

/// `sqrt(Δr² + (r̄·Δθ)²)` on the annulus.
#[derive(Debug, Clone, Copy, Default)]
pub struct Polar2D;

impl DomainMetric for Polar2D {
    fn name(&self) -> &'static str {
        "polar-2d"
    }

    fn is_axial(&self) -> bool {
        false
    }

    fn distance(&self, a: &Coordinate, b: &Coordinate) -> f64 {
        let dr = a.r - b.r;
        let mean_r = (a.r + b.r) / 2.0;
        let arc = mean_r * angular_difference(a.theta, b.theta);
        (dr * dr + arc * arc).sqrt()
    }
}

/// `sqrt(Δr² + (r̄·Δθ)² + Δz²)` on the annular cylinder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cylindrical3D;

impl DomainMetric for Cylindrical3D {
    fn name(&self) -> &'static str {
        "cylindrical-3d"
    }

    fn is_axial(&self) -> bool {
        true
    }

    fn distance(&self, a: &Coordinate, b: &Coordinate) -> f64 {
        let planar = Polar2D.distance(a, b);
        let dz = a.z - b.z;
        (planar * planar + dz * dz).sqrt()
    }
}
