//! Startup model resolution: experiment name → latest run → classifier.

use tracing::{debug, info};

use super::Classifier;
use crate::tracking::{ExperimentRecord, ModelArtifact, RunRecord, RunSearch, TrackingClient};
use crate::{Error, Result};

/// Artifact path of the model inside a run, relative to its artifact root.
pub const DEFAULT_ARTIFACT_PATH: &str = "model/model.onnx";

/// Everything resolved at startup: the run being served and its model.
#[derive(Debug)]
pub struct ResolvedModel<C> {
    /// Experiment the run belongs to
    pub experiment: ExperimentRecord,
    /// Most recently started run of the experiment
    pub run: RunRecord,
    /// `sha256:<hex>` digest of the loaded artifact
    pub artifact_digest: String,
    /// Loaded model
    pub classifier: C,
}

impl<C> ResolvedModel<C> {
    /// ID of the run whose model is served.
    #[must_use]
    pub fn run_id(&self) -> &str {
        self.run.run_id()
    }
}

/// Resolves the model to serve from the tracking service.
///
/// # Example
///
/// ```rust
/// use model_serving::model::ModelResolver;
/// use model_serving::tracking::MemoryTracking;
/// use model_serving::Error;
///
/// # async fn example() {
/// let tracking = MemoryTracking::new();
/// let resolver = ModelResolver::new("Fashion MNIST Classification");
///
/// // A fresh experiment has no runs, so there is nothing to serve.
/// let err = resolver.resolve_run(&tracking).await.unwrap_err();
/// assert!(matches!(err, Error::NoRuns { .. }));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ModelResolver {
    experiment_name: String,
    artifact_path: String,
}

impl ModelResolver {
    /// Resolver for the named experiment, using [`DEFAULT_ARTIFACT_PATH`].
    #[must_use]
    pub fn new(experiment_name: impl Into<String>) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            artifact_path: DEFAULT_ARTIFACT_PATH.to_string(),
        }
    }

    /// Override the artifact path inside the run.
    #[must_use]
    pub fn artifact_path(mut self, path: impl Into<String>) -> Self {
        self.artifact_path = path.into();
        self
    }

    /// Experiment name this resolver looks up.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Attach to the experiment (creating it if needed) and pick its most
    /// recently started run.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoRuns` if the experiment has no runs, or
    /// `Error::Tracking` if the tracking service fails.
    pub async fn resolve_run<T: TrackingClient>(
        &self,
        tracking: &T,
    ) -> Result<(ExperimentRecord, RunRecord)> {
        let experiment = tracking.set_experiment(&self.experiment_name).await?;
        debug!(
            experiment_id = experiment.experiment_id(),
            name = experiment.name(),
            "experiment attached"
        );

        let run = tracking
            .search_runs(&RunSearch::latest(experiment.experiment_id()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoRuns {
                experiment: self.experiment_name.clone(),
            })?;

        Ok((experiment, run))
    }

    /// Resolve the latest run and load its artifact with `load`.
    ///
    /// # Errors
    ///
    /// Propagates `resolve_run` errors, artifact download failures, and
    /// whatever `load` returns.
    pub async fn resolve_with<T, C, F>(&self, tracking: &T, load: F) -> Result<ResolvedModel<C>>
    where
        T: TrackingClient,
        C: Classifier,
        F: FnOnce(&ModelArtifact) -> Result<C>,
    {
        let (experiment, run) = self.resolve_run(tracking).await?;
        let artifact = tracking
            .download_artifact(run.run_id(), &self.artifact_path)
            .await?;
        let classifier = load(&artifact)?;

        info!(
            run_id = run.run_id(),
            experiment_id = experiment.experiment_id(),
            start_time = ?run.start_time(),
            digest = artifact.digest(),
            size_bytes = artifact.size_bytes(),
            "Loaded model from run {}",
            run.run_id()
        );

        Ok(ResolvedModel {
            experiment,
            run,
            artifact_digest: artifact.digest().to_string(),
            classifier,
        })
    }

    /// Resolve the latest run and load its ONNX model.
    ///
    /// # Errors
    ///
    /// See [`ModelResolver::resolve_with`].
    #[cfg(feature = "onnx")]
    pub async fn resolve<T: TrackingClient>(
        &self,
        tracking: &T,
    ) -> Result<ResolvedModel<super::OnnxClassifier>> {
        self.resolve_with(tracking, super::OnnxClassifier::from_artifact)
            .await
    }
}
