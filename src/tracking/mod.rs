//! Tracking service integration
//!
//! The tracking service is an external collaborator: it owns experiments,
//! runs, model artifacts and logged metrics. This module narrows it to the
//! handful of calls the server needs, behind the [`TrackingClient`] trait.
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N)
//!                              │
//!                              ├──< MetricRecord (N)
//!                              └──< ModelArtifact (N)
//! ```
//!
//! ## Backends
//!
//! - [`HttpTracking`]: MLflow-compatible REST API over `reqwest`
//! - [`MemoryTracking`]: in-process `DashMap` store, for tests and demos
//!
//! ## Usage
//!
//! ```rust
//! use model_serving::tracking::{MemoryTracking, RunSearch, TrackingClient};
//!
//! # async fn example() -> model_serving::Result<()> {
//! let tracking = MemoryTracking::new();
//! let experiment = tracking.set_experiment("Fashion MNIST Classification").await?;
//!
//! let runs = tracking
//!     .search_runs(&RunSearch::latest(experiment.experiment_id()))
//!     .await?;
//! assert!(runs.is_empty());
//! # Ok(())
//! # }
//! ```

mod artifact;
mod experiment_record;
mod http;
mod memory;
mod metric_record;
mod run_record;

pub use artifact::ModelArtifact;
pub use experiment_record::{ExperimentRecord, ExperimentRecordBuilder, LIFECYCLE_DELETED};
pub use http::HttpTracking;
pub use memory::MemoryTracking;
pub use metric_record::MetricRecord;
pub use run_record::{RunRecord, RunRecordBuilder, RunStatus};

use crate::{Error, Result};
use std::future::Future;
use tracing::warn;

/// Ordering applied to run searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOrder {
    /// Most recently started first
    StartTimeDesc,
    /// Oldest first
    StartTimeAsc,
}

impl RunOrder {
    /// `order_by` clause understood by the REST API.
    #[must_use]
    pub const fn as_order_by(self) -> &'static str {
        match self {
            Self::StartTimeDesc => "attributes.start_time DESC",
            Self::StartTimeAsc => "attributes.start_time ASC",
        }
    }
}

/// Parameters for a run search within one experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSearch {
    /// Experiment to search
    pub experiment_id: String,
    /// Result ordering
    pub order: RunOrder,
    /// Maximum number of runs returned
    pub max_results: usize,
}

impl RunSearch {
    /// The single most recently started run of an experiment.
    #[must_use]
    pub fn latest(experiment_id: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            order: RunOrder::StartTimeDesc,
            max_results: 1,
        }
    }
}

/// Narrow interface to the tracking service.
///
/// Implementations must be shareable across request handlers; none of the
/// calls are retried.
pub trait TrackingClient: Send + Sync {
    /// Look up an experiment by exact name.
    ///
    /// Returns `None` if no experiment has that name.
    fn get_experiment_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<ExperimentRecord>>> + Send;

    /// Create a new experiment and return it.
    fn create_experiment(&self, name: &str)
        -> impl Future<Output = Result<ExperimentRecord>> + Send;

    /// List runs of an experiment in the requested order, at most
    /// `max_results` of them.
    fn search_runs(&self, search: &RunSearch)
        -> impl Future<Output = Result<Vec<RunRecord>>> + Send;

    /// Download an artifact of a run by its relative path.
    fn download_artifact(
        &self,
        run_id: &str,
        path: &str,
    ) -> impl Future<Output = Result<ModelArtifact>> + Send;

    /// Append a metric point to a run.
    fn log_metric(&self, metric: &MetricRecord) -> impl Future<Output = Result<()>> + Send;

    /// Update the status of a run.
    fn set_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Attach to an experiment by name, creating it if it does not exist.
    ///
    /// A soft-deleted experiment is an error; it must be restored or removed
    /// before it can be attached to again.
    fn set_experiment(&self, name: &str) -> impl Future<Output = Result<ExperimentRecord>> + Send {
        async move {
            match self.get_experiment_by_name(name).await? {
                Some(experiment) if experiment.is_deleted() => Err(Error::Tracking(format!(
                    "cannot set a deleted experiment '{name}' as the active experiment \
                     (id {})",
                    experiment.experiment_id()
                ))),
                Some(experiment) => Ok(experiment),
                None => self.create_experiment(name).await,
            }
        }
    }
}

/// A resumed run that metrics are logged into.
///
/// Resuming marks the run `RUNNING`; [`ActiveRun::end`] closes it again.
/// Every prediction opens and closes one of these around its metric write.
#[derive(Debug)]
pub struct ActiveRun<'a, T: TrackingClient> {
    client: &'a T,
    run_id: &'a str,
}

impl<'a, T: TrackingClient> ActiveRun<'a, T> {
    /// Resume an existing run. No new run is created.
    ///
    /// # Errors
    ///
    /// Returns error if the status update is rejected by the tracking service.
    pub async fn resume(client: &'a T, run_id: &'a str) -> Result<Self> {
        client.set_run_status(run_id, RunStatus::Running).await?;
        Ok(Self { client, run_id })
    }

    /// Run ID this scope writes to.
    #[must_use]
    pub const fn run_id(&self) -> &str {
        self.run_id
    }

    /// Log one metric point at the given step.
    ///
    /// # Errors
    ///
    /// Returns error if the tracking service rejects the write.
    pub async fn log_metric(&self, key: &str, value: f64, step: u64) -> Result<()> {
        let metric = MetricRecord::new(self.run_id, key, step, value);
        self.client.log_metric(&metric).await
    }

    /// Close the scope with the given terminal status.
    ///
    /// # Errors
    ///
    /// Returns error if the status update is rejected by the tracking service.
    pub async fn end(self, status: RunStatus) -> Result<()> {
        self.client.set_run_status(self.run_id, status).await
    }
}

/// Log a single metric inside its own resume/end scope.
///
/// A failed write still closes the run, as `FAILED`, and the write error is
/// what gets returned.
///
/// # Errors
///
/// Returns error if resuming, logging or closing the run fails.
pub async fn log_metric_in_run<T: TrackingClient>(
    client: &T,
    run_id: &str,
    key: &str,
    value: f64,
) -> Result<()> {
    let run = ActiveRun::resume(client, run_id).await?;
    match run.log_metric(key, value, 0).await {
        Ok(()) => run.end(RunStatus::Finished).await,
        Err(err) => {
            if let Err(end_err) = run.end(RunStatus::Failed).await {
                warn!(run_id, error = %end_err, "failed to close run after metric error");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_search() {
        let search = RunSearch::latest("3");
        assert_eq!(search.experiment_id, "3");
        assert_eq!(search.max_results, 1);
        assert_eq!(search.order.as_order_by(), "attributes.start_time DESC");
    }

    #[tokio::test]
    async fn test_set_experiment_creates_once() {
        let tracking = MemoryTracking::new();
        let first = tracking.set_experiment("mnist").await.unwrap();
        let second = tracking.set_experiment("mnist").await.unwrap();

        assert_eq!(first.experiment_id(), second.experiment_id());
        assert_eq!(tracking.experiment_count(), 1);
    }

    #[tokio::test]
    async fn test_log_metric_in_run_resumes_and_finishes() {
        let tracking = MemoryTracking::new();
        let experiment = tracking.set_experiment("mnist").await.unwrap();
        tracking.add_run(RunRecord::builder("run-1", experiment.experiment_id()).build());

        log_metric_in_run(&tracking, "run-1", "prediction", 4.0)
            .await
            .unwrap();

        let metrics = tracking.get_metrics_for_run("run-1", "prediction");
        assert_eq!(metrics.len(), 1);
        assert!((metrics[0].value() - 4.0).abs() < f64::EPSILON);
        assert_eq!(
            tracking.get_run("run-1").unwrap().status(),
            RunStatus::Finished
        );
        assert_eq!(tracking.run_count(), 1);
    }

    #[tokio::test]
    async fn test_log_metric_in_run_marks_failed_on_write_error() {
        let tracking = MemoryTracking::new();
        tracking.add_run(RunRecord::builder("run-1", "0").build());
        tracking.reject_metrics(true);

        let result = log_metric_in_run(&tracking, "run-1", "prediction", 1.0).await;

        assert!(matches!(result, Err(crate::Error::Tracking(_))));
        assert_eq!(tracking.get_run("run-1").unwrap().status(), RunStatus::Failed);
        assert_eq!(tracking.metric_count(), 0);
    }
}
