// THEORY:
// The `snapshot` module holds the raw material of the analysis: one timestamped
// sample of every monitored field over the domain. It is a "dumb" data container;
// it knows how to validate itself and how to recover the lattice its samples were
// taken on, nothing more.
//
// Simulation output usually arrives as a flat list of cell centres with one value
// per cell. Gradient-based detection needs neighbours, so `StructuredGrid::infer`
// snaps the cell centres back onto a `(radial, angular, axial)` lattice. A mesh
// that does not form such a lattice cannot be differentiated and is reported as
// a recoverable per-step error.

use crate::core_modules::geometry::{Coordinate, normalize_angle};
use std::collections::BTreeMap;
use std::f64::consts::TAU;
use thiserror::Error;

/// Relative tolerance (fraction of an axis' extent) used when snapping samples
/// onto lattice lines.
const GRID_SNAP_TOLERANCE: f64 = 1e-4;

/// Everything that can go wrong while reading or preparing one step.
/// None of these abort a run; the step is skipped and recorded as a gap.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("field `{0}` is not present in this snapshot")]
    MissingField(String),
    #[error("malformed data in {path}: {reason}")]
    Malformed { path: String, reason: String },
    #[error("field `{field}` has {found} values but the mesh has {expected} cells")]
    LengthMismatch { field: String, expected: usize, found: usize },
    #[error("samples do not form a structured radial/angular grid: {0}")]
    Unstructured(String),
}

/// A single timestamped full-domain sample of the monitored fields.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub time: f64,
    pub coordinates: Vec<Coordinate>,
    pub fields: BTreeMap<String, Vec<f64>>,
}

impl Snapshot {
    pub fn new(time: f64, coordinates: Vec<Coordinate>) -> Self {
        Self { time, coordinates, fields: BTreeMap::new() }
    }

    /// Adds a field, rejecting it if it does not have one value per coordinate.
    pub fn with_field(mut self, name: &str, values: Vec<f64>) -> Result<Self, SnapshotError> {
        self.insert_field(name, values)?;
        Ok(self)
    }

    pub fn insert_field(&mut self, name: &str, values: Vec<f64>) -> Result<(), SnapshotError> {
        if values.len() != self.coordinates.len() {
            return Err(SnapshotError::LengthMismatch {
                field: name.to_string(),
                expected: self.coordinates.len(),
                found: values.len(),
            });
        }
        self.fields.insert(name.to_string(), values);
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&[f64]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    pub fn require_field(&self, name: &str) -> Result<&[f64], SnapshotError> {
        self.field(name).ok_or_else(|| SnapshotError::MissingField(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

/// One lattice axis: the snapped line positions, in ascending order.
#[derive(Debug, Clone)]
pub struct GridAxis {
    pub positions: Vec<f64>,
    /// Whether the last line is adjacent to the first one (full angular coverage).
    pub periodic: bool,
}

impl GridAxis {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// The `(radial, angular, axial)` lattice recovered from a snapshot's samples.
#[derive(Debug, Clone)]
pub struct StructuredGrid {
    pub radial: GridAxis,
    pub angular: GridAxis,
    pub axial: GridAxis,
    /// `cells[(ir * n_theta + it) * n_z + iz]` is the sample index at that node.
    cells: Vec<usize>,
}

impl StructuredGrid {
    /// Snaps every coordinate onto lattice lines and checks that each node is
    /// occupied exactly once. With `axial == false` the z coordinate is ignored.
    pub fn infer(coordinates: &[Coordinate], axial: bool) -> Result<Self, SnapshotError> {
        if coordinates.is_empty() {
            return Ok(Self {
                radial: GridAxis { positions: Vec::new(), periodic: false },
                angular: GridAxis { positions: Vec::new(), periodic: false },
                axial: GridAxis { positions: Vec::new(), periodic: false },
                cells: Vec::new(),
            });
        }

        let radii: Vec<f64> = coordinates.iter().map(|c| c.r).collect();
        let angles: Vec<f64> = coordinates.iter().map(|c| normalize_angle(c.theta)).collect();
        let heights: Vec<f64> = if axial {
            coordinates.iter().map(|c| c.z).collect()
        } else {
            vec![0.0; coordinates.len()]
        };

        let radial = GridAxis { positions: snap_lines(&radii, None), periodic: false };
        let angular_lines = snap_lines(&angles, Some(TAU));
        let angular = GridAxis { periodic: covers_full_circle(&angular_lines), positions: angular_lines };
        let axial_axis = GridAxis { positions: snap_lines(&heights, None), periodic: false };

        let (nr, nt, nz) = (radial.len(), angular.len(), axial_axis.len());
        if nr * nt * nz != coordinates.len() {
            return Err(SnapshotError::Unstructured(format!(
                "{} samples cannot fill a {nr}x{nt}x{nz} lattice",
                coordinates.len()
            )));
        }

        let mut cells = vec![usize::MAX; coordinates.len()];
        for (sample, ((r, t), z)) in radii.iter().zip(&angles).zip(&heights).enumerate() {
            let ir = nearest_line(&radial.positions, *r, None);
            let it = nearest_line(&angular.positions, *t, Some(TAU));
            let iz = nearest_line(&axial_axis.positions, *z, None);
            let node = (ir * nt + it) * nz + iz;
            if cells[node] != usize::MAX {
                return Err(SnapshotError::Unstructured(format!(
                    "samples {} and {sample} share lattice node ({ir}, {it}, {iz})",
                    cells[node]
                )));
            }
            cells[node] = sample;
        }

        Ok(Self { radial, angular, axial: axial_axis, cells })
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.radial.len(), self.angular.len(), self.axial.len())
    }

    /// Sample index stored at lattice node `(ir, it, iz)`.
    pub fn sample_at(&self, ir: usize, it: usize, iz: usize) -> usize {
        let (_, nt, nz) = self.dims();
        self.cells[(ir * nt + it) * nz + iz]
    }
}

/// Groups sorted values whose spread stays within the snapping tolerance and
/// returns one representative (the group mean) per group. With a `period`, a
/// trailing group that lies within tolerance of `first + period` is folded into
/// the first group.
fn snap_lines(values: &[f64], period: Option<f64>) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let extent = period.unwrap_or_else(|| sorted[sorted.len() - 1] - sorted[0]);
    let tolerance = (extent.abs() * GRID_SNAP_TOLERANCE).max(1e-12);

    let mut groups: Vec<(f64, f64, usize)> = Vec::new(); // (anchor, sum, count)
    for v in sorted {
        match groups.last_mut() {
            Some((anchor, sum, count)) if v - *anchor <= tolerance => {
                *sum += v;
                *count += 1;
            }
            _ => groups.push((v, v, 1)),
        }
    }

    if let Some(period) = period {
        if groups.len() > 1 && groups[0].0 + period - groups[groups.len() - 1].0 <= tolerance {
            if let Some((_, last_sum, last_count)) = groups.pop() {
                groups[0].1 += last_sum - period * last_count as f64;
                groups[0].2 += last_count;
            }
        }
    }

    groups
        .into_iter()
        .map(|(_, sum, count)| {
            let mean = sum / count as f64;
            match period {
                // Only a folded first line can dip below zero, and only by less
                // than the tolerance.
                Some(_) if mean < 0.0 => 0.0,
                Some(_) => normalize_angle(mean),
                None => mean,
            }
        })
        .collect()
}

fn nearest_line(lines: &[f64], value: f64, period: Option<f64>) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, line) in lines.iter().enumerate() {
        let mut d = (value - line).abs();
        if let Some(p) = period {
            d = d.min(p - d);
        }
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

/// True when the angular lines are evenly spread around the whole circle, so the
/// wrap gap between the last and the first line is an ordinary cell spacing.
fn covers_full_circle(lines: &[f64]) -> bool {
    if lines.len() < 3 {
        return false;
    }
    let mut sorted = lines.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mean_spacing = (sorted[sorted.len() - 1] - sorted[0]) / (sorted.len() - 1) as f64;
    let wrap_gap = TAU - (sorted[sorted.len() - 1] - sorted[0]);
    (wrap_gap - mean_spacing).abs() <= 0.5 * mean_spacing
}
