// THEORY:
// The `pipeline` module is the final, top-level API of the analysis engine. It
// wires the per-step worker pool to the stateful layers and returns one
// serializable `AnalysisResult` per run.
//
// The run has two phases:
// 1.  **Per-Step Detection** (parallel, `parallel_pipeline.rs`): every selected
//     snapshot is loaded and reduced to `DetectedFront`s independently.
// 2.  **Sequential Interpretation** (`FrontPipeline`): the ordered detections are
//     fed through the tracker and the collision detector one step at a time, and
//     the history is folded into system statistics at the end.
//
// A step whose data cannot be read becomes a `StepGap` and the run continues from
// the last good step. Only a missing case, an invalid configuration or a broken
// worker pool abort a run. Early stops (step budget, wall-clock deadline,
// cancellation) still produce a valid result, marked as truncated.

use crate::config::AnalysisConfig;
use crate::core_modules::case_reader::{FoamCase, SnapshotEntry, SnapshotSource};
use crate::core_modules::collision_detector::CollisionDetector;
use crate::core_modules::geometry::{Coordinate, Cylindrical3D, DomainKind, DomainMetric, Polar2D};
use crate::core_modules::heuristics::{PerformanceHeuristic, StepEnergyHeuristic};
use crate::core_modules::synthetic::{SyntheticConfig, SyntheticRotatingFronts};
use crate::core_modules::tracker::FrontTracker;
use crate::error::AnalysisError;
use crate::parallel_pipeline::{DetectionSettings, StepDetections, run_detection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::aggregator::{PatternLabel, SystemSnapshot, SystemStatistics, aggregate};
pub use crate::core_modules::case_reader::DataProvenance;
pub use crate::core_modules::collision_detector::{CollisionEvent, CollisionKind};
pub use crate::core_modules::tracker::{Front, FrontId};
pub use crate::parallel_pipeline::{CancelHandle, TruncationReason};

/// A selected step that could not be analysed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepGap {
    pub step_index: usize,
    pub time: f64,
    pub label: String,
    pub reason: String,
}

/// The lifetime of one front id over the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontTrack {
    pub id: FrontId,
    pub born_at: f64,
    pub last_seen: f64,
    /// Time of the step in which the front was retired, if it was.
    pub retired_at: Option<f64>,
    pub observations: u32,
    /// Centre of the front at every observation.
    pub path: Vec<Coordinate>,
    pub peak_speed: f64,
}

/// What one sequential step produced.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub snapshot: SystemSnapshot,
    pub new_collisions: Vec<CollisionEvent>,
}

/// The complete, serializable output of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Case directory or synthetic source description.
    pub case: String,
    pub provenance: DataProvenance,
    pub domain: String,
    /// One entry per analysed step, in time order.
    pub snapshots: Vec<SystemSnapshot>,
    pub collisions: Vec<CollisionEvent>,
    pub statistics: SystemStatistics,
    /// Every front id issued during the run, ascending.
    pub fronts: Vec<FrontTrack>,
    pub gaps: Vec<StepGap>,
    pub truncated: Option<TruncationReason>,
    /// Steps inside the configured time range.
    pub steps_considered: usize,
    /// Steps that produced a snapshot.
    pub steps_analyzed: usize,
}

impl AnalysisResult {
    pub fn avg_count(&self) -> f64 {
        self.statistics.avg_count
    }

    pub fn avg_speed(&self) -> f64 {
        self.statistics.avg_speed
    }

    pub fn stability(&self) -> f64 {
        self.statistics.stability
    }

    pub fn is_synthetic(&self) -> bool {
        self.provenance.is_synthetic()
    }
}

/// The sequential, stateful half of the analysis. Owns the tracker (and with it
/// the run's id allocator), the collision detector and the growing history.
pub struct FrontPipeline<M: DomainMetric> {
    tracker: FrontTracker<M>,
    collision_detector: CollisionDetector<M>,
    step_energy: StepEnergyHeuristic,
    performance: PerformanceHeuristic,
    domain: &'static str,
    history: Vec<SystemSnapshot>,
    collisions: Vec<CollisionEvent>,
    tracks: BTreeMap<FrontId, FrontTrack>,
    gaps: Vec<StepGap>,
}

impl<M: DomainMetric> FrontPipeline<M> {
    pub fn new(metric: M, config: &AnalysisConfig) -> Self {
        Self {
            tracker: FrontTracker::new(metric.clone(), config.tracking_tolerance),
            collision_detector: CollisionDetector::new(
                metric.clone(),
                config.collision_tolerance,
                config.collision,
                config.energy.clone(),
            )
            .with_spikes(config.heuristics.spikes.clone()),
            step_energy: config.heuristics.step_energy.clone(),
            performance: config.heuristics.performance.clone(),
            domain: metric.name(),
            history: Vec::new(),
            collisions: Vec::new(),
            tracks: BTreeMap::new(),
            gaps: Vec::new(),
        }
    }

    /// Tracks the detections of one step and reports new collisions. A bare
    /// `Vec<DetectedFront>` is accepted as detections without field measures.
    pub fn process_step(&mut self, step_index: usize, time: f64, detected: impl Into<StepDetections>) -> StepReport {
        let detected = detected.into();

        // Stage 1: Identity
        let outcome = self.tracker.update(time, detected.fronts);

        // Stage 2: Lifetimes
        for front in &outcome.fronts {
            let track = self.tracks.entry(front.id).or_insert_with(|| FrontTrack {
                id: front.id,
                born_at: front.detection_time,
                last_seen: time,
                retired_at: None,
                observations: 0,
                path: Vec::new(),
                peak_speed: 0.0,
            });
            track.last_seen = time;
            track.observations = front.age;
            track.path.push(front.center());
            track.peak_speed = track.peak_speed.max(front.speed);
        }
        for retired in &outcome.retired {
            if let Some(track) = self.tracks.get_mut(&retired.id) {
                track.retired_at = Some(time);
            }
        }

        // Stage 3: Rising-edge collisions against the last analysed step
        let previous = self.history.last().map(|s| s.fronts.as_slice());
        let new_collisions = self.collision_detector.detect(step_index, time, &outcome.fronts, previous);

        let retired_ids = outcome.retired.iter().map(|f| f.id).collect();
        let snapshot = SystemSnapshot::new(step_index, time, outcome.fronts, retired_ids)
            .with_measures(&self.step_energy, detected.pressure_oscillation);
        info!(
            step = step_index,
            time,
            active = snapshot.active_count,
            collisions = new_collisions.len(),
            "step analysed"
        );

        self.collisions.extend(new_collisions.iter().cloned());
        self.history.push(snapshot.clone());
        StepReport { snapshot, new_collisions }
    }

    /// Records a step that could not be analysed. Tracking resumes from the last
    /// analysed step.
    pub fn record_gap(&mut self, entry: &SnapshotEntry, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(step = entry.index, time = entry.time, %reason, "skipping step");
        self.gaps.push(StepGap { step_index: entry.index, time: entry.time, label: entry.label.clone(), reason });
    }

    pub fn history(&self) -> &[SystemSnapshot] {
        &self.history
    }

    pub fn collisions(&self) -> &[CollisionEvent] {
        &self.collisions
    }

    pub fn active_fronts(&self) -> &[Front] {
        self.tracker.active_fronts()
    }

    /// Aggregates the history into the final result.
    pub fn finish(
        self,
        case: String,
        provenance: DataProvenance,
        truncated: Option<TruncationReason>,
        steps_considered: usize,
    ) -> AnalysisResult {
        let statistics = aggregate(&self.history, &self.collisions, &self.performance);
        AnalysisResult {
            case,
            provenance,
            domain: self.domain.to_string(),
            steps_analyzed: self.history.len(),
            snapshots: self.history,
            collisions: self.collisions,
            statistics,
            fronts: self.tracks.into_values().collect(),
            gaps: self.gaps,
            truncated,
            steps_considered,
        }
    }
}

/// Analyses every selected snapshot of `source`.
pub async fn analyze(
    source: Arc<dyn SnapshotSource>,
    config: &AnalysisConfig,
    cancel: &CancelHandle,
) -> Result<AnalysisResult, AnalysisError> {
    config.validate()?;
    match config.domain {
        DomainKind::Polar2d => analyze_with(Polar2D, source, config, cancel).await,
        DomainKind::Cylindrical3d => analyze_with(Cylindrical3D, source, config, cancel).await,
    }
}

/// Opens a recorded case and analyses it.
pub async fn analyze_case(path: impl AsRef<Path>, config: &AnalysisConfig) -> Result<AnalysisResult, AnalysisError> {
    config.validate()?;
    let case = FoamCase::open(path)?;
    analyze(Arc::new(case), config, &CancelHandle::new()).await
}

/// Generates a labelled synthetic demonstration and analyses it.
pub async fn analyze_synthetic(
    synthetic: SyntheticConfig,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, AnalysisError> {
    synthetic.validate()?;
    let source = SyntheticRotatingFronts::new(synthetic);
    analyze(Arc::new(source), config, &CancelHandle::new()).await
}

async fn analyze_with<M: DomainMetric>(
    metric: M,
    source: Arc<dyn SnapshotSource>,
    config: &AnalysisConfig,
    cancel: &CancelHandle,
) -> Result<AnalysisResult, AnalysisError> {
    let started = Instant::now();
    let deadline = config.budget.wall_clock_ms.map(|ms| started + Duration::from_millis(ms));

    let mut selected = config.select_entries(source.entries());
    let steps_considered = selected.len();
    let mut truncated = None;
    if let Some(max_steps) = config.budget.max_steps {
        if selected.len() > max_steps {
            selected.truncate(max_steps);
            truncated = Some(TruncationReason::StepBudget);
        }
    }

    let case = source.label();
    let provenance = source.provenance();
    info!(
        case = %case,
        domain = metric.name(),
        steps = selected.len(),
        synthetic = provenance.is_synthetic(),
        "analysis started"
    );

    let settings = DetectionSettings::from_config(metric.clone(), config);
    let run = run_detection(source, selected, settings, config.worker_count(), deadline, cancel).await?;
    if run.truncation.is_some() {
        truncated = run.truncation;
    }

    let mut pipeline = FrontPipeline::new(metric, config);
    for step in run.steps {
        match step.detections {
            Ok(detections) => {
                pipeline.process_step(step.entry.index, step.entry.time, detections);
            }
            Err(err) => {
                let gap = AnalysisError::SnapshotParse { step: step.entry.index, time: step.entry.time, reason: err.to_string() };
                pipeline.record_gap(&step.entry, gap.to_string());
            }
        }
    }

    let result = pipeline.finish(case, provenance, truncated, steps_considered);
    info!(
        analysed = result.steps_analyzed,
        gaps = result.gaps.len(),
        collisions = result.collisions.len(),
        avg_count = result.statistics.avg_count,
        stability = result.statistics.stability,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "analysis finished"
    );
    Ok(result)
}
