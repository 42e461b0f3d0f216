// THEORY:
// The per-step half of the analysis (load → extract → cluster → build) never looks
// at any other step, so it runs on a pool of workers. The stateful half (track →
// collide → aggregate) stays in `pipeline.rs` and consumes the results strictly in
// step order.
//
// Key architectural principles:
// 1.  **Dispatcher + Workers**: One dispatcher task hands incoming step tasks to
//     the workers round-robin over per-worker channels. Each task carries a
//     oneshot sender for its own answer, so results can be awaited in step order
//     whatever order the workers finish in.
// 2.  **Blocking Work Off the Runtime**: Reading files and clustering are CPU and
//     IO bound, so each step runs inside `spawn_blocking`.
// 3.  **Ordered Prefix on Early Stop**: Results are awaited in step order. When the
//     caller cancels or the wall-clock budget expires, whatever contiguous prefix
//     has completed is returned together with the reason. Later steps may have
//     finished too, but they cannot be tracked without the ones before them.
// 4.  **Write-Once Hand-Over**: The only thing crossing into the sequential phase
//     is the ordered `Vec<StepOutcome>`.

use crate::config::AnalysisConfig;
use crate::core_modules::case_reader::{SnapshotEntry, SnapshotSource};
use crate::core_modules::front_builder::{DetectedFront, build_front};
use crate::core_modules::front_extractor::{DetectionMetric, extract_candidates};
use crate::core_modules::geometry::DomainMetric;
use crate::core_modules::heuristics::{StrengthHeuristic, field_oscillation};
use crate::core_modules::point_clusterer::point_clusterer::cluster_points;
use crate::core_modules::snapshot::SnapshotError;
use crate::error::AnalysisError;
use futures::StreamExt;
use futures::stream::FuturesOrdered;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Everything the per-step phase needs, detached from the full configuration.
#[derive(Debug, Clone)]
pub struct DetectionSettings<M: DomainMetric> {
    pub metric: M,
    pub detection_field: String,
    pub fields: Vec<String>,
    pub detection_metric: DetectionMetric,
    pub threshold: f64,
    pub cluster_radius: f64,
    pub min_cluster_size: usize,
    pub strength: StrengthHeuristic,
    pub oscillation_field: String,
}

impl<M: DomainMetric> DetectionSettings<M> {
    pub fn from_config(metric: M, config: &AnalysisConfig) -> Self {
        Self {
            metric,
            detection_field: config.detection_field.clone(),
            fields: config.fields_to_load(),
            detection_metric: config.metric,
            threshold: config.threshold,
            cluster_radius: config.cluster_radius,
            min_cluster_size: config.min_cluster_size,
            strength: config.heuristics.strength.clone(),
            oscillation_field: config.heuristics.oscillation_field.clone(),
        }
    }
}

/// The fronts found in one step, before tracking.
#[derive(Debug, Clone, Default)]
pub struct StepDetections {
    pub fronts: Vec<DetectedFront>,
    pub candidate_count: usize,
    pub cluster_count: usize,
    /// RMS spread of the oscillation field across the snapshot, if it was loaded.
    pub pressure_oscillation: Option<f64>,
}

impl From<Vec<DetectedFront>> for StepDetections {
    fn from(fronts: Vec<DetectedFront>) -> Self {
        Self { fronts, ..Self::default() }
    }
}

/// The per-step result handed to the sequential phase.
#[derive(Debug)]
pub struct StepOutcome {
    pub entry: SnapshotEntry,
    pub detections: Result<StepDetections, SnapshotError>,
}

/// Loads one snapshot and reduces it to detected fronts.
pub fn detect_step<M: DomainMetric>(
    source: &dyn SnapshotSource,
    entry: &SnapshotEntry,
    settings: &DetectionSettings<M>,
) -> Result<StepDetections, SnapshotError> {
    let snapshot = source.load(entry, &settings.detection_field, &settings.fields)?;
    let candidates = extract_candidates(
        &snapshot,
        &settings.detection_field,
        settings.detection_metric,
        settings.threshold,
        settings.metric.is_axial(),
    )?;
    let clusters = cluster_points(&candidates, settings.cluster_radius, &settings.metric);
    let fronts: Vec<DetectedFront> = clusters
        .iter()
        .filter_map(|cluster| build_front(cluster, settings.min_cluster_size, &snapshot, &settings.fields))
        .map(|mut front| {
            front.strength = settings.strength.strength(&front);
            front
        })
        .collect();
    let pressure_oscillation = snapshot.field(&settings.oscillation_field).and_then(field_oscillation);

    debug!(
        step = entry.index,
        candidates = candidates.len(),
        clusters = clusters.len(),
        fronts = fronts.len(),
        "step detected"
    );
    Ok(StepDetections {
        fronts,
        candidate_count: candidates.len(),
        cluster_count: clusters.len(),
        pressure_oscillation,
    })
}

/// Why a run stopped before analysing every selected step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    StepBudget,
    Deadline,
    Cancelled,
}

/// Requests early termination of a running analysis. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender: Arc::new(sender) }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StepTask {
    pub entry: SnapshotEntry,
    pub result_sender: oneshot::Sender<StepOutcome>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<StepTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
    dispatcher: tokio::task::JoinHandle<()>,
}

impl WorkerPool {
    /// Spawns `size` workers on the current tokio runtime.
    pub fn new<M: DomainMetric>(source: Arc<dyn SnapshotSource>, settings: DetectionSettings<M>, size: usize) -> Self {
        let size = size.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<StepTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| mpsc::unbounded_channel::<StepTask>()).unzip();

        let dispatcher = tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if worker_senders[worker_idx].send(task).is_err() {
                    warn!(worker = worker_idx, "worker channel closed, dropping task");
                }
                worker_idx = (worker_idx + 1) % worker_senders.len();
            }
        });

        let workers = worker_receivers
            .into_iter()
            .map(|mut worker_receiver| {
                let worker_source = Arc::clone(&source);
                let worker_settings = settings.clone();
                tokio::spawn(async move {
                    while let Some(task) = worker_receiver.recv().await {
                        let source = Arc::clone(&worker_source);
                        let settings = worker_settings.clone();
                        let entry = task.entry.clone();
                        let blocking =
                            tokio::task::spawn_blocking(move || detect_step(source.as_ref(), &entry, &settings)).await;

                        // A panicking step closes its oneshot without an answer.
                        if let Ok(detections) = blocking {
                            let _ = task.result_sender.send(StepOutcome { entry: task.entry, detections });
                        }
                    }
                })
            })
            .collect();

        Self { task_sender, workers, dispatcher }
    }

    /// Queues one step; the answer arrives on the returned receiver.
    pub fn submit(&self, entry: SnapshotEntry) -> Result<oneshot::Receiver<StepOutcome>, AnalysisError> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.task_sender
            .send(StepTask { entry, result_sender })
            .map_err(|_| AnalysisError::WorkerPool("failed to send task to worker pool".into()))?;
        Ok(result_receiver)
    }

    pub async fn process_step(&self, entry: SnapshotEntry) -> Result<StepOutcome, AnalysisError> {
        let index = entry.index;
        self.submit(entry)?
            .await
            .map_err(|_| AnalysisError::WorkerPool(format!("worker failed while processing step {index}")))
    }

    /// Stops the dispatcher and every worker. Blocking work already running is
    /// left to finish; its result is discarded.
    pub fn shutdown(self) {
        self.dispatcher.abort();
        for worker in self.workers {
            worker.abort();
        }
    }
}

/// The ordered, possibly truncated output of the per-step phase.
#[derive(Debug)]
pub struct DetectionRun {
    pub steps: Vec<StepOutcome>,
    pub truncation: Option<TruncationReason>,
}

/// Runs the per-step phase over `entries` and returns the completed prefix.
pub async fn run_detection<M: DomainMetric>(
    source: Arc<dyn SnapshotSource>,
    entries: Vec<SnapshotEntry>,
    settings: DetectionSettings<M>,
    workers: usize,
    deadline: Option<Instant>,
    cancel: &CancelHandle,
) -> Result<DetectionRun, AnalysisError> {
    let pool = WorkerPool::new(source, settings, workers);
    let receivers = entries.into_iter().map(|entry| pool.submit(entry)).collect::<Result<Vec<_>, _>>()?;

    let mut cancel_receiver = cancel.subscribe();
    let cancelled = async move {
        if cancel_receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let expired = async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(cancelled);
    tokio::pin!(expired);

    let mut steps = Vec::with_capacity(receivers.len());
    let mut pending: FuturesOrdered<oneshot::Receiver<StepOutcome>> = receivers.into_iter().collect();
    let mut truncation = None;
    loop {
        tokio::select! {
            biased;
            _ = &mut cancelled => {
                truncation = Some(TruncationReason::Cancelled);
                break;
            }
            _ = &mut expired => {
                truncation = Some(TruncationReason::Deadline);
                break;
            }
            next = pending.next() => {
                let Some(outcome) = next else { break };
                let outcome = outcome.map_err(|_| {
                    AnalysisError::WorkerPool(format!("worker failed before step {} completed", steps.len()))
                })?;
                steps.push(outcome);
            }
        }
    }

    if let Some(reason) = truncation {
        warn!(?reason, completed = steps.len(), "per-step phase stopped early");
    }
    pool.shutdown();
    Ok(DetectionRun { steps, truncation })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::case_reader::DataProvenance;
    use crate::core_modules::geometry::Polar2D;
    use crate::core_modules::snapshot::Snapshot;
    use crate::core_modules::synthetic::{SyntheticConfig, SyntheticRotatingFronts};
    use std::time::Duration;

    fn settings() -> DetectionSettings<Polar2D> {
        DetectionSettings::from_config(Polar2D, &AnalysisConfig::demonstration())
    }

    fn synthetic(steps: usize) -> Arc<dyn SnapshotSource> {
        Arc::new(SyntheticRotatingFronts::new(SyntheticConfig { steps, ..SyntheticConfig::default() }))
    }

    /// Every load takes `delay`, to make early stops observable.
    struct SlowSource {
        entries: Vec<SnapshotEntry>,
        delay: Duration,
    }

    impl SnapshotSource for SlowSource {
        fn label(&self) -> String {
            "slow".into()
        }

        fn provenance(&self) -> DataProvenance {
            DataProvenance::Synthetic { description: "test".into() }
        }

        fn entries(&self) -> &[SnapshotEntry] {
            &self.entries
        }

        fn load(&self, entry: &SnapshotEntry, required: &str, _: &[String]) -> Result<Snapshot, SnapshotError> {
            std::thread::sleep(self.delay);
            Snapshot::new(entry.time, Vec::new()).with_field(required, Vec::new())
        }
    }

    #[test]
    fn detect_step_finds_synthetic_fronts() {
        let source = synthetic(1);
        let entry = source.entries()[0].clone();
        let detections = detect_step(source.as_ref(), &entry, &settings()).unwrap();
        assert_eq!(detections.fronts.len(), 2);
        assert!(detections.candidate_count >= detections.fronts.len());
        for front in &detections.fronts {
            let strength = front.strength.unwrap();
            assert!(strength > 8.3 && strength <= 10.0, "strength {strength}");
        }
        assert!(detections.pressure_oscillation.is_some_and(|rms| rms > 0.0));
    }

    #[tokio::test]
    async fn results_come_back_in_step_order() {
        let source = synthetic(12);
        let entries = source.entries().to_vec();
        let run = run_detection(source, entries, settings(), 4, None, &CancelHandle::new()).await.unwrap();
        assert!(run.truncation.is_none());
        let indices: Vec<usize> = run.steps.iter().map(|s| s.entry.index).collect();
        assert_eq!(indices, (0..12).collect::<Vec<_>>());
        assert!(run.steps.iter().all(|s| s.detections.is_ok()));
    }

    #[tokio::test]
    async fn worker_pool_answers_single_requests() {
        let source = synthetic(3);
        let entry = source.entries()[2].clone();
        let pool = WorkerPool::new(source, settings(), 2);
        let outcome = pool.process_step(entry).await.unwrap();
        assert_eq!(outcome.entry.index, 2);
        pool.shutdown();
    }

    #[tokio::test]
    async fn cancelled_before_start_returns_empty_prefix() {
        let source = synthetic(5);
        let entries = source.entries().to_vec();
        let cancel = CancelHandle::new();
        cancel.cancel();
        let run = run_detection(source, entries, settings(), 2, None, &cancel).await.unwrap();
        assert_eq!(run.truncation, Some(TruncationReason::Cancelled));
        assert!(run.steps.is_empty());
    }

    #[tokio::test]
    async fn deadline_keeps_completed_prefix() {
        let entries: Vec<SnapshotEntry> = (0..20)
            .map(|index| SnapshotEntry { index, time: index as f64, label: index.to_string() })
            .collect();
        let source: Arc<dyn SnapshotSource> =
            Arc::new(SlowSource { entries: entries.clone(), delay: Duration::from_millis(50) });
        let deadline = Instant::now() + Duration::from_millis(120);
        let run = run_detection(source, entries, settings(), 1, Some(deadline), &CancelHandle::new()).await.unwrap();
        assert_eq!(run.truncation, Some(TruncationReason::Deadline));
        assert!(run.steps.len() < 20);
        for (i, step) in run.steps.iter().enumerate() {
            assert_eq!(step.entry.index, i);
        }
    }
}
