//! Builders for throw-away case directories in the ASCII layout `FoamCase` reads.

#![allow(dead_code)]

use rde_wave_tracker::core_modules::geometry::angular_difference;
use std::f64::consts::TAU;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const HEADER: &str = "FoamFile\n{\n    version     2.0;\n    format      ascii;\n    class       volScalarField;\n}\n\n";

/// A polar lattice of `radii × angular_cells` cell centres, angle-major within
/// each radius, with the first angular line at θ = 0.
pub struct Lattice {
    pub radii: Vec<f64>,
    pub angular_cells: usize,
}

impl Lattice {
    pub fn new(radii: &[f64], angular_cells: usize) -> Self {
        Self { radii: radii.to_vec(), angular_cells }
    }

    pub fn cells(&self) -> Vec<(f64, f64)> {
        let mut cells = Vec::new();
        for &r in &self.radii {
            for it in 0..self.angular_cells {
                cells.push((r, TAU * it as f64 / self.angular_cells as f64));
            }
        }
        cells
    }
}

pub struct CaseBuilder {
    pub dir: TempDir,
    lattice: Lattice,
}

impl CaseBuilder {
    pub fn new(lattice: Lattice) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let builder = Self { dir, lattice };
        builder.write("system/controlDict", "application     rhoCentralFoam;\nendTime         0.001;\n");

        let centres: Vec<String> = builder
            .lattice
            .cells()
            .iter()
            .map(|(r, theta)| format!("({} {} 0)", r * theta.cos(), r * theta.sin()))
            .collect();
        builder.write(
            "constant/C",
            &format!(
                "{HEADER}internalField   nonuniform List<vector>\n{}\n(\n{}\n)\n;\n",
                centres.len(),
                centres.join("\n")
            ),
        );
        builder
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.dir.path().join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(path, content).expect("write file");
    }

    /// Writes `field` for time directory `time` from a function of `(r, θ)`.
    pub fn field(&self, time: &str, field: &str, f: impl Fn(f64, f64) -> f64) -> &Self {
        let values: Vec<String> = self.lattice.cells().iter().map(|&(r, t)| f(r, t).to_string()).collect();
        self.write(
            &format!("{time}/{field}"),
            &format!(
                "{HEADER}dimensions      [0 0 0 1 0 0 0];\n\ninternalField   nonuniform List<scalar>\n{}\n(\n{}\n)\n;\n\nboundaryField\n{{\n}}\n",
                values.len(),
                values.join("\n")
            ),
        );
        self
    }

    /// Writes a `T` field that is hot within `half_width` radians of any centre.
    pub fn hot_spots(&self, time: &str, centres: &[f64], half_width: f64) -> &Self {
        self.field(time, "T", |_, theta| {
            if centres.iter().any(|c| angular_difference(*c, theta).abs() < half_width) { 3000.0 } else { 300.0 }
        })
    }
}
