// THEORY:
// Errors are split by blast radius. `SnapshotError` (in `core_modules::snapshot`)
// covers everything that can go wrong with a single step; those are caught by the
// pipeline, logged, and recorded as gaps. `AnalysisError` is what callers see:
// only a missing case, a bad configuration or a broken worker pool abort a run.
// `SnapshotParse` exists so a gap can travel through the same channels as the
// fatal variants, but the pipeline never returns it from `analyze`.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("case not found at `{path}`: {reason}")]
    InputNotFound { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("step {step} (t = {time}) could not be read: {reason}")]
    SnapshotParse { step: usize, time: f64, reason: String },

    #[error("worker pool failure: {0}")]
    WorkerPool(String),
}

impl AnalysisError {
    pub fn input_not_found(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InputNotFound { path: path.into(), reason: reason.into() }
    }

    /// Stable machine-readable name, used in tool responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputNotFound { .. } => "input_not_found",
            Self::Configuration(_) => "configuration_error",
            Self::SnapshotParse { .. } => "snapshot_parse_error",
            Self::WorkerPool(_) => "internal_error",
        }
    }

    /// Suggested next action for a human.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::InputNotFound { .. } => {
                "Check the case directory path, and run the simulation first so the case contains system/controlDict and time directories."
            }
            Self::Configuration(_) => {
                "Use positive, finite values for threshold, cluster radius and tolerances, and a time range whose end is not before its start."
            }
            Self::SnapshotParse { .. } => {
                "Re-export the affected time step in ASCII format, or narrow the time range to skip it."
            }
            Self::WorkerPool(_) => "Retry the analysis; if it keeps failing, run with fewer workers.",
        }
    }

    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SnapshotParse { .. })
    }
}

/// Serializable form of a fatal error, as returned to remote callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    pub suggestion: &'static str,
}

impl From<&AnalysisError> for ErrorReport {
    fn from(err: &AnalysisError) -> Self {
        Self { kind: err.kind(), message: err.to_string(), suggestion: err.suggestion() }
    }
}
