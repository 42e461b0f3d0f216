// THEORY:
// The `case_reader` module is the boundary between the analysis and whatever
// produced the data. Everything upstream of the extractor sees only the
// `SnapshotSource` trait: an ordered list of timestamped entries and a way to load
// one of them. Two implementations exist, and they are deliberately distinct
// types: `FoamCase` reads recorded simulation output, while
// `synthetic::SyntheticRotatingFronts` fabricates a labelled demonstration. A
// recorded case that is missing or broken never turns into synthetic data.
//
// `FoamCase` understands the ASCII layout written by OpenFOAM:
//
//   case/
//     system/controlDict        <- must exist, proves this is a case
//     constant/C                <- cell centres (or <time>/C, or 0/C)
//     0.0001/T, 0.0001/p, ...   <- one directory per written time
//
// Opening checks only the case itself; every per-step problem (missing file,
// truncated list, wrong length) surfaces later from `load` as a recoverable
// `SnapshotError`.

use crate::core_modules::geometry::{Coordinate, cartesian_to_cylindrical};
use crate::core_modules::snapshot::{Snapshot, SnapshotError};
use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

/// One loadable step of a source, in time order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Position in the source's full, time-ordered entry list.
    pub index: usize,
    pub time: f64,
    /// Source-specific name, e.g. the time directory.
    pub label: String,
}

/// Where the analysed data came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DataProvenance {
    /// Read from simulation output on disk.
    Recorded { case_directory: String },
    /// Generated for demonstration. Not measured data.
    Synthetic { description: String },
}

impl DataProvenance {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Synthetic { .. })
    }
}

/// A time-ordered sequence of field snapshots.
pub trait SnapshotSource: Send + Sync + 'static {
    fn label(&self) -> String;

    fn provenance(&self) -> DataProvenance;

    /// All entries, ascending in time.
    fn entries(&self) -> &[SnapshotEntry];

    /// Loads one entry. `required` must be present; `optional` fields are loaded
    /// when they exist and silently skipped otherwise.
    fn load(&self, entry: &SnapshotEntry, required: &str, optional: &[String]) -> Result<Snapshot, SnapshotError>;
}

/// An OpenFOAM-style case directory with ASCII field output.
#[derive(Debug)]
pub struct FoamCase {
    root: PathBuf,
    entries: Vec<SnapshotEntry>,
    shared_centres: OnceLock<Result<Vec<Coordinate>, (String, String)>>,
}

impl FoamCase {
    /// Opens a case, failing fast if the directory or its `system/controlDict`
    /// is missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let root = path.as_ref().to_path_buf();
        let shown = root.display().to_string();

        if !root.is_dir() {
            return Err(AnalysisError::input_not_found(shown, "directory does not exist"));
        }
        if !root.join("system").join("controlDict").is_file() {
            return Err(AnalysisError::input_not_found(
                shown,
                "system/controlDict is missing, so this is not a valid simulation case",
            ));
        }

        let listing = fs::read_dir(&root)
            .map_err(|e| AnalysisError::input_not_found(shown.clone(), format!("cannot list directory: {e}")))?;

        let mut times: Vec<(f64, String)> = listing
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let time = name.parse::<f64>().ok().filter(|t| t.is_finite())?;
                Some((time, name))
            })
            .collect();
        times.sort_by(|a, b| a.0.total_cmp(&b.0));

        let entries = times
            .into_iter()
            .enumerate()
            .map(|(index, (time, label))| SnapshotEntry { index, time, label })
            .collect::<Vec<_>>();

        info!(case = %shown, time_directories = entries.len(), "opened case");
        Ok(Self { root, entries, shared_centres: OnceLock::new() })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cell centres for one time directory: its own `C`, else the shared one.
    fn cell_centres(&self, entry: &SnapshotEntry) -> Result<Vec<Coordinate>, SnapshotError> {
        let own = self.root.join(&entry.label).join("C");
        if own.is_file() {
            return read_cell_centres(&own);
        }

        let shared = self.shared_centres.get_or_init(|| {
            let candidate = [self.root.join("constant").join("C"), self.root.join("0").join("C")]
                .into_iter()
                .find(|p| p.is_file());
            match candidate {
                Some(path) => {
                    debug!(path = %path.display(), "loading shared cell centres");
                    read_cell_centres(&path).map_err(|e| (path.display().to_string(), e.to_string()))
                }
                None => Err((
                    self.root.display().to_string(),
                    "no cell centre file (C) in the time directory, constant/ or 0/".to_string(),
                )),
            }
        });

        shared.clone().map_err(|(path, reason)| SnapshotError::Malformed { path, reason })
    }
}

impl SnapshotSource for FoamCase {
    fn label(&self) -> String {
        self.root.display().to_string()
    }

    fn provenance(&self) -> DataProvenance {
        DataProvenance::Recorded { case_directory: self.label() }
    }

    fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    fn load(&self, entry: &SnapshotEntry, required: &str, optional: &[String]) -> Result<Snapshot, SnapshotError> {
        let coordinates = self.cell_centres(entry)?;
        let cells = coordinates.len();
        let dir = self.root.join(&entry.label);
        let mut snapshot = Snapshot::new(entry.time, coordinates);

        let required_path = dir.join(required);
        if !required_path.is_file() {
            return Err(SnapshotError::MissingField(required.to_string()));
        }
        snapshot.insert_field(required, read_scalar_field(&required_path, cells)?)?;

        for name in optional.iter().filter(|name| name.as_str() != required) {
            let path = dir.join(name);
            if path.is_file() {
                snapshot.insert_field(name, read_scalar_field(&path, cells)?)?;
            }
        }

        Ok(snapshot)
    }
}

/// Reads a `volVectorField`-style file of Cartesian cell centres.
pub fn read_cell_centres(path: &Path) -> Result<Vec<Coordinate>, SnapshotError> {
    let text = read(path)?;
    let values = parse_internal_field(&text, 3, None).map_err(|reason| malformed(path, reason))?;
    Ok(values.chunks_exact(3).map(|v| cartesian_to_cylindrical(v[0], v[1], v[2])).collect())
}

/// Reads a `volScalarField`-style file. A `uniform` field is expanded to `cells` values.
pub fn read_scalar_field(path: &Path, cells: usize) -> Result<Vec<f64>, SnapshotError> {
    let text = read(path)?;
    parse_internal_field(&text, 1, Some(cells)).map_err(|reason| malformed(path, reason))
}

fn read(path: &Path) -> Result<String, SnapshotError> {
    fs::read_to_string(path).map_err(|source| SnapshotError::Io { path: path.display().to_string(), source })
}

fn malformed(path: &Path, reason: String) -> SnapshotError {
    SnapshotError::Malformed { path: path.display().to_string(), reason }
}

/// Extracts the flattened values of an `internalField` entry.
///
/// Accepted forms:
/// - `internalField uniform 300;` / `internalField uniform (0 0 1);` (needs `cells`)
/// - `internalField nonuniform List<scalar> N ( v0 v1 ... );`
/// - `internalField nonuniform List<vector> N ( (x y z) ... );`
/// - `internalField nonuniform List<scalar> N{v};`
fn parse_internal_field(text: &str, components: usize, cells: Option<usize>) -> Result<Vec<f64>, String> {
    let start = text.find("internalField").ok_or("no internalField entry")?;
    let rest = text[start + "internalField".len()..].trim_start();

    if let Some(value) = rest.strip_prefix("uniform") {
        let end = value.find(';').ok_or("unterminated uniform value")?;
        let single = parse_numbers(&value[..end])?;
        if single.len() != components {
            return Err(format!("expected {components} component(s), found {}", single.len()));
        }
        let cells = cells.ok_or("a uniform field does not define the cell count")?;
        return Ok(single.iter().copied().cycle().take(cells * components).collect());
    }

    let rest = rest.strip_prefix("nonuniform").ok_or("internalField is neither uniform nor nonuniform")?;
    let rest = rest.trim_start();
    let rest = match rest.strip_prefix("List<") {
        Some(typed) => &typed[typed.find('>').ok_or("unterminated List type")? + 1..],
        None => rest,
    };
    let rest = rest.trim_start();

    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let count: usize = rest[..digits].parse().map_err(|_| "missing list length".to_string())?;
    let body = rest[digits..].trim_start();

    let values = if let Some(compact) = body.strip_prefix('{') {
        let end = compact.find('}').ok_or("unterminated compact list")?;
        let single = parse_numbers(&compact[..end])?;
        single.iter().copied().cycle().take(count * single.len()).collect()
    } else {
        let body = body.strip_prefix('(').ok_or("list body does not start with '('")?;
        let close = matching_paren(body).ok_or("list body is not closed")?;
        parse_numbers(&body[..close])?
    };

    if values.len() != count * components {
        return Err(format!(
            "list declares {count} entries of {components} component(s) but holds {} number(s)",
            values.len()
        ));
    }
    Ok(values)
}

/// Index of the `)` closing a list whose `(` was already consumed.
fn matching_paren(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => return Some(i),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn parse_numbers(text: &str) -> Result<Vec<f64>, String> {
    text.split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .filter(|token| !token.is_empty())
        .map(|token| token.parse::<f64>().map_err(|_| format!("`{token}` is not a number")))
        .collect()
}
