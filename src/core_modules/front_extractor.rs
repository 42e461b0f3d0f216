// THEORY:
// The `FrontExtractor` is the first analysis layer: it decides, sample by
// sample, whether a location is "interesting" in this snapshot. A detonation front
// is a thin region where temperature (or pressure) jumps by an order of magnitude,
// so either the raw value or the magnitude of its spatial gradient is compared
// against a threshold.
//
// Key architectural principles:
// 1.  **Stateless**: One snapshot in, a list of candidate points out. No memory
//     of earlier steps, which is what lets the per-step phase run in parallel.
// 2.  **Strict Threshold**: A point is a candidate only if its metric is strictly
//     greater than the threshold.
// 3.  **Empty is Valid**: A quiet field produces an empty list, not an error.
// 4.  **Lattice-Aware Gradient**: Central differences between lattice neighbours,
//     one-sided at radial/axial boundaries, wrapping around the annulus when the
//     angular axis covers the full circle.

use crate::core_modules::geometry::{Coordinate, angular_difference};
use crate::core_modules::snapshot::{Snapshot, SnapshotError, StructuredGrid};
use serde::{Deserialize, Serialize};

/// What is compared against the detection threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMetric {
    /// The sampled field value itself.
    Value,
    /// The magnitude of the field's spatial gradient.
    #[default]
    Gradient,
}

/// A sample that passed the threshold but has not been clustered yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePoint {
    /// Index of the sample in the snapshot, used to look up other fields later.
    pub sample_index: usize,
    pub coordinate: Coordinate,
    /// The detection field's raw value at this sample.
    pub value: f64,
    /// The metric that was compared against the threshold.
    pub metric: f64,
}

/// Returns every sample whose detection metric is strictly above `threshold`.
pub fn extract_candidates(
    snapshot: &Snapshot,
    field: &str,
    metric: DetectionMetric,
    threshold: f64,
    axial: bool,
) -> Result<Vec<CandidatePoint>, SnapshotError> {
    let values = snapshot.require_field(field)?;
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let metrics: Vec<f64> = match metric {
        DetectionMetric::Value => values.to_vec(),
        DetectionMetric::Gradient => {
            let grid = StructuredGrid::infer(&snapshot.coordinates, axial)?;
            gradient_magnitude(&grid, values)
        }
    };

    Ok(snapshot
        .coordinates
        .iter()
        .zip(values.iter().zip(&metrics))
        .enumerate()
        .filter(|(_, (_, (_, m)))| **m > threshold)
        .map(|(sample_index, (coordinate, (value, m)))| CandidatePoint {
            sample_index,
            coordinate: *coordinate,
            value: *value,
            metric: *m,
        })
        .collect())
}

/// Gradient magnitude `sqrt((∂f/∂r)² + (1/r · ∂f/∂θ)² + (∂f/∂z)²)` at every sample,
/// indexed like the snapshot's samples.
pub fn gradient_magnitude(grid: &StructuredGrid, values: &[f64]) -> Vec<f64> {
    let (nr, nt, nz) = grid.dims();
    let mut magnitudes = vec![0.0; values.len()];

    for ir in 0..nr {
        let radius = grid.radial.positions[ir];
        for it in 0..nt {
            for iz in 0..nz {
                let d_r = axis_derivative(nr, ir, &grid.radial.positions, |i| {
                    values[grid.sample_at(i, it, iz)]
                });
                let d_theta = angular_derivative(grid, it, |i| values[grid.sample_at(ir, i, iz)]);
                let d_z = axis_derivative(nz, iz, &grid.axial.positions, |i| {
                    values[grid.sample_at(ir, it, i)]
                });

                // Angular derivative is per radian; scale to per unit arc length.
                let d_arc = if radius > 0.0 { d_theta / radius } else { 0.0 };
                magnitudes[grid.sample_at(ir, it, iz)] = (d_r * d_r + d_arc * d_arc + d_z * d_z).sqrt();
            }
        }
    }

    magnitudes
}

/// Finite difference along a non-periodic axis: central inside, one-sided at
/// either end, zero for a single-line axis.
fn axis_derivative(n: usize, i: usize, positions: &[f64], f: impl Fn(usize) -> f64) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let (lo, hi) = match i {
        0 => (0, 1),
        _ if i == n - 1 => (n - 2, n - 1),
        _ => (i - 1, i + 1),
    };
    let spacing = positions[hi] - positions[lo];
    if spacing.abs() < f64::EPSILON {
        return 0.0;
    }
    (f(hi) - f(lo)) / spacing
}

/// Finite difference around the annulus. Wraps when the grid is periodic,
/// otherwise behaves like any bounded axis.
fn angular_derivative(grid: &StructuredGrid, i: usize, f: impl Fn(usize) -> f64) -> f64 {
    let n = grid.angular.len();
    let positions = &grid.angular.positions;
    if n < 2 {
        return 0.0;
    }
    if !grid.angular.periodic {
        return axis_derivative(n, i, positions, f);
    }

    let prev = (i + n - 1) % n;
    let next = (i + 1) % n;
    // Forward arc from prev to next, always positive for an ascending lattice.
    let spacing = angular_difference(positions[prev], positions[i]).abs()
        + angular_difference(positions[i], positions[next]).abs();
    if spacing < f64::EPSILON {
        return 0.0;
    }
    (f(next) - f(prev)) / spacing
}
