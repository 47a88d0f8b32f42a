//! In-memory tracking backend using `DashMap`.
//!
//! Implements the same [`TrackingClient`] contract as the REST backend so the
//! resolver and the prediction handler can be exercised without a network
//! service. Data is lost when the process exits.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{
    ExperimentRecord, MetricRecord, ModelArtifact, RunOrder, RunRecord, RunSearch, RunStatus,
    TrackingClient,
};
use crate::{Error, Result};

/// In-memory tracking store.
///
/// ## Design
///
/// Experiments and runs live in `DashMap`s keyed by ID for O(1) lookups.
/// A name index makes experiment creation check-and-insert atomic.
/// Metrics are appended per run, so concurrent requests logging into the same
/// run never contend on a global lock.
#[derive(Debug, Default)]
pub struct MemoryTracking {
    experiments: DashMap<String, ExperimentRecord>,
    experiment_names: DashMap<String, String>,
    runs: DashMap<String, RunRecord>,
    metrics: DashMap<String, Vec<MetricRecord>>,
    artifacts: DashMap<(String, String), Vec<u8>>,
    next_experiment_id: AtomicU64,
    reject_metrics: AtomicBool,
}

impl MemoryTracking {
    /// Create a new empty tracking store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the store is empty (no experiments, runs, or metrics).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty() && self.runs.is_empty() && self.metric_count() == 0
    }

    /// Get the number of experiments in the store.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Get the number of runs in the store.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Get the number of metric points across all runs.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.iter().map(|entry| entry.value().len()).sum()
    }

    /// Add an experiment to the store, replacing any with the same name.
    pub fn add_experiment(&self, experiment: ExperimentRecord) {
        let id = experiment.experiment_id().to_string();
        self.experiment_names
            .insert(experiment.name().to_string(), id.clone());
        self.experiments.insert(id, experiment);
    }

    /// Add a run to the store.
    pub fn add_run(&self, run: RunRecord) {
        self.runs.insert(run.run_id().to_string(), run);
    }

    /// Get a run by ID.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<RunRecord> {
        self.runs.get(run_id).map(|run| run.value().clone())
    }

    /// Store artifact bytes under a run.
    pub fn put_artifact(&self, run_id: &str, path: &str, bytes: Vec<u8>) {
        self.artifacts
            .insert((run_id.to_string(), path.to_string()), bytes);
    }

    /// Make every subsequent `log_metric` call fail, to exercise error paths.
    pub fn reject_metrics(&self, reject: bool) {
        self.reject_metrics.store(reject, Ordering::SeqCst);
    }

    /// Get metrics for a specific run and key, ordered by step.
    #[must_use]
    pub fn get_metrics_for_run(&self, run_id: &str, key: &str) -> Vec<MetricRecord> {
        let mut metrics: Vec<MetricRecord> = self
            .metrics
            .get(run_id)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|m| m.key() == key)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Stable sort keeps insertion order within a step
        metrics.sort_by_key(MetricRecord::step);

        metrics
    }
}

impl TrackingClient for MemoryTracking {
    async fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        let Some(id) = self.experiment_names.get(name).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        Ok(self.experiments.get(&id).map(|entry| entry.value().clone()))
    }

    async fn create_experiment(&self, name: &str) -> Result<ExperimentRecord> {
        match self.experiment_names.entry(name.to_string()) {
            Entry::Occupied(_) => Err(Error::Tracking(format!(
                "RESOURCE_ALREADY_EXISTS: experiment '{name}' already exists"
            ))),
            Entry::Vacant(slot) => {
                // Skip IDs already taken by seeded experiments
                let id = loop {
                    let candidate = self
                        .next_experiment_id
                        .fetch_add(1, Ordering::SeqCst)
                        .to_string();
                    if !self.experiments.contains_key(&candidate) {
                        break candidate;
                    }
                };
                let experiment = ExperimentRecord::new(id.clone(), name);
                self.experiments.insert(id.clone(), experiment.clone());
                slot.insert(id);
                Ok(experiment)
            }
        }
    }

    async fn search_runs(&self, search: &RunSearch) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .iter()
            .filter(|entry| entry.value().experiment_id() == search.experiment_id)
            .map(|entry| entry.value().clone())
            .collect();

        // Runs without a start time sort as oldest; run_id breaks ties so the
        // order never depends on map iteration order.
        runs.sort_by(|a, b| {
            a.start_time()
                .cmp(&b.start_time())
                .then_with(|| a.run_id().cmp(b.run_id()))
        });
        if search.order == RunOrder::StartTimeDesc {
            runs.reverse();
        }
        runs.truncate(search.max_results);

        Ok(runs)
    }

    async fn download_artifact(&self, run_id: &str, path: &str) -> Result<ModelArtifact> {
        let key = (run_id.to_string(), path.to_string());
        self.artifacts
            .get(&key)
            .map(|bytes| ModelArtifact::new(run_id, path, bytes.value().clone()))
            .ok_or_else(|| {
                Error::Tracking(format!(
                    "RESOURCE_DOES_NOT_EXIST: artifact '{path}' not found for run {run_id}"
                ))
            })
    }

    async fn log_metric(&self, metric: &MetricRecord) -> Result<()> {
        if self.reject_metrics.load(Ordering::SeqCst) {
            return Err(Error::Tracking("metric logging rejected".to_string()));
        }
        if !self.runs.contains_key(metric.run_id()) {
            return Err(Error::Tracking(format!(
                "RESOURCE_DOES_NOT_EXIST: run {} not found",
                metric.run_id()
            )));
        }
        self.metrics
            .entry(metric.run_id().to_string())
            .or_default()
            .push(metric.clone());
        Ok(())
    }

    async fn set_run_status(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let mut run = self.runs.get_mut(run_id).ok_or_else(|| {
            Error::Tracking(format!("RESOURCE_DOES_NOT_EXIST: run {run_id} not found"))
        })?;
        run.set_status(status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_store_default() {
        let store = MemoryTracking::new();
        assert!(store.is_empty());
        assert_eq!(store.experiment_count(), 0);
        assert_eq!(store.run_count(), 0);
        assert_eq!(store.metric_count(), 0);
    }

    #[tokio::test]
    async fn test_search_runs_latest_first() {
        let store = MemoryTracking::new();
        let now = Utc::now();
        for (id, age_minutes) in [("old", 30), ("newest", 1), ("middle", 10)] {
            store.add_run(
                RunRecord::builder(id, "0")
                    .start_time(Some(now - Duration::minutes(age_minutes)))
                    .build(),
            );
        }
        store.add_run(RunRecord::builder("other-exp", "1").start_time(Some(now)).build());

        let latest = store.search_runs(&RunSearch::latest("0")).await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].run_id(), "newest");

        let all = store
            .search_runs(&RunSearch {
                experiment_id: "0".to_string(),
                order: RunOrder::StartTimeAsc,
                max_results: 10,
            })
            .await
            .unwrap();
        let ids: Vec<&str> = all.iter().map(RunRecord::run_id).collect();
        assert_eq!(ids, ["old", "middle", "newest"]);
    }

    #[tokio::test]
    async fn test_create_experiment_rejects_duplicate() {
        let store = MemoryTracking::new();
        store.create_experiment("dup").await.unwrap();
        assert!(store.create_experiment("dup").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_set_experiment_creates_one() {
        let store = std::sync::Arc::new(MemoryTracking::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = std::sync::Arc::clone(&store);
                tokio::spawn(async move { store.set_experiment("shared").await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            if let Ok(experiment) = handle.await.unwrap() {
                ids.push(experiment.experiment_id().to_string());
            }
        }

        assert_eq!(store.experiment_count(), 1);
        assert!(!ids.is_empty());
        assert!(ids.iter().all(|id| id == &ids[0]));
    }

    #[tokio::test]
    async fn test_created_id_skips_seeded_id() {
        let store = MemoryTracking::new();
        store.add_experiment(ExperimentRecord::new("0", "seeded"));

        let created = store.create_experiment("fresh").await.unwrap();

        assert_ne!(created.experiment_id(), "0");
        assert_eq!(store.experiment_count(), 2);
        assert_eq!(
            store.get_experiment_by_name("seeded").await.unwrap().unwrap().experiment_id(),
            "0"
        );
    }

    #[tokio::test]
    async fn test_log_metric_requires_known_run() {
        let store = MemoryTracking::new();
        let metric = MetricRecord::new("missing", "prediction", 0, 1.0);
        assert!(store.log_metric(&metric).await.is_err());
    }

    #[tokio::test]
    async fn test_download_missing_artifact() {
        let store = MemoryTracking::new();
        let err = store
            .download_artifact("run-1", "model/model.onnx")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("RESOURCE_DOES_NOT_EXIST"));
    }
}
