//! MLflow-compatible REST backend.
//!
//! Endpoints used (all relative to the tracking URI):
//!
//! | call                    | method | path                                        |
//! |-------------------------|--------|---------------------------------------------|
//! | experiment by name      | GET    | `/api/2.0/mlflow/experiments/get-by-name`   |
//! | create experiment       | POST   | `/api/2.0/mlflow/experiments/create`        |
//! | search runs             | POST   | `/api/2.0/mlflow/runs/search`               |
//! | log metric              | POST   | `/api/2.0/mlflow/runs/log-metric`           |
//! | update run status       | POST   | `/api/2.0/mlflow/runs/update`               |
//! | download artifact       | GET    | `/get-artifact`                             |

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    ExperimentRecord, MetricRecord, ModelArtifact, RunRecord, RunSearch, RunStatus,
    TrackingClient,
};
use crate::{Error, Result};

const API_PREFIX: &str = "api/2.0/mlflow";
const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

/// REST client for a remote tracking server.
///
/// Cheap to clone; the underlying `reqwest::Client` pools connections.
#[derive(Debug, Clone)]
pub struct HttpTracking {
    client: Client,
    base_url: String,
}

impl HttpTracking {
    /// Create a client for the tracking server at `tracking_uri`
    /// (e.g. `http://localhost:5000`).
    #[must_use]
    pub fn new(tracking_uri: impl Into<String>) -> Self {
        Self::with_client(Client::new(), tracking_uri)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: Client, tracking_uri: impl Into<String>) -> Self {
        let base_url = tracking_uri.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Tracking server base URL, without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{API_PREFIX}/{endpoint}", self.base_url)
    }

    async fn post_json<B: Serialize + Sync>(&self, endpoint: &str, body: &B) -> Result<Response> {
        let url = self.api_url(endpoint);
        debug!(%url, "tracking POST");
        let response = self.client.post(&url).json(body).send().await?;
        check_status(response).await
    }
}

/// Turn non-success responses into `Error::Tracking`, keeping the API's
/// `error_code` when the body carries one.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ApiError>(&text).map_or(text, |err| {
        format!("{}: {}", err.error_code, err.message)
    });
    Err(Error::Tracking(format!("HTTP {status}: {detail}")))
}

fn from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}

// ----------------------------------------------------------------------------
// Wire types
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ExperimentWire {
    experiment_id: String,
    name: String,
    #[serde(default)]
    lifecycle_stage: Option<String>,
    #[serde(default)]
    creation_time: Option<i64>,
}

impl From<ExperimentWire> for ExperimentRecord {
    fn from(wire: ExperimentWire) -> Self {
        Self::builder(wire.experiment_id, wire.name)
            .lifecycle_stage(wire.lifecycle_stage.unwrap_or_else(|| "active".to_string()))
            .created_at(from_millis(wire.creation_time))
            .build()
    }
}

#[derive(Debug, Deserialize)]
struct GetExperimentResponse {
    experiment: ExperimentWire,
}

#[derive(Debug, Serialize)]
struct CreateExperimentRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Serialize)]
struct SearchRunsRequest<'a> {
    experiment_ids: [&'a str; 1],
    order_by: [&'static str; 1],
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchRunsResponse {
    #[serde(default)]
    runs: Vec<RunWire>,
}

#[derive(Debug, Deserialize)]
struct RunWire {
    info: RunInfoWire,
}

#[derive(Debug, Deserialize)]
struct RunInfoWire {
    run_id: String,
    experiment_id: String,
    status: RunStatus,
    #[serde(default)]
    start_time: Option<i64>,
    #[serde(default)]
    end_time: Option<i64>,
}

impl From<RunWire> for RunRecord {
    fn from(wire: RunWire) -> Self {
        let info = wire.info;
        Self::builder(info.run_id, info.experiment_id)
            .status(info.status)
            .start_time(from_millis(info.start_time))
            .end_time(from_millis(info.end_time))
            .build()
    }
}

#[derive(Debug, Serialize)]
struct LogMetricRequest<'a> {
    run_id: &'a str,
    key: &'a str,
    value: f64,
    timestamp: i64,
    step: u64,
}

#[derive(Debug, Serialize)]
struct UpdateRunRequest<'a> {
    run_id: &'a str,
    status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<i64>,
}

// ----------------------------------------------------------------------------
// TrackingClient
// ----------------------------------------------------------------------------

impl TrackingClient for HttpTracking {
    async fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        let url = self.api_url("experiments/get-by-name");
        debug!(%url, experiment = name, "tracking GET");
        let response = self
            .client
            .get(&url)
            .query(&[("experiment_name", name)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            let text = response.text().await.unwrap_or_default();
            let missing = serde_json::from_str::<ApiError>(&text)
                .map(|err| err.error_code == RESOURCE_DOES_NOT_EXIST)
                .unwrap_or(false);
            if missing {
                return Ok(None);
            }
            return Err(Error::Tracking(format!("HTTP 404: {text}")));
        }

        let body: GetExperimentResponse = check_status(response).await?.json().await?;
        Ok(Some(body.experiment.into()))
    }

    async fn create_experiment(&self, name: &str) -> Result<ExperimentRecord> {
        let body: CreateExperimentResponse = self
            .post_json("experiments/create", &CreateExperimentRequest { name })
            .await?
            .json()
            .await?;
        Ok(ExperimentRecord::new(body.experiment_id, name))
    }

    async fn search_runs(&self, search: &RunSearch) -> Result<Vec<RunRecord>> {
        let request = SearchRunsRequest {
            experiment_ids: [search.experiment_id.as_str()],
            order_by: [search.order.as_order_by()],
            max_results: search.max_results,
        };
        let body: SearchRunsResponse = self
            .post_json("runs/search", &request)
            .await?
            .json()
            .await?;
        Ok(body.runs.into_iter().map(RunRecord::from).collect())
    }

    async fn download_artifact(&self, run_id: &str, path: &str) -> Result<ModelArtifact> {
        let url = format!("{}/get-artifact", self.base_url);
        debug!(%url, run_id, path, "tracking artifact GET");
        let response = self
            .client
            .get(&url)
            .query(&[("run_uuid", run_id), ("run_id", run_id), ("path", path)])
            .send()
            .await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(ModelArtifact::new(run_id, path, bytes.to_vec()))
    }

    async fn log_metric(&self, metric: &MetricRecord) -> Result<()> {
        let request = LogMetricRequest {
            run_id: metric.run_id(),
            key: metric.key(),
            value: metric.value(),
            timestamp: metric.timestamp_millis(),
            step: metric.step(),
        };
        self.post_json("runs/log-metric", &request).await?;
        Ok(())
    }

    async fn set_run_status(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let request = UpdateRunRequest {
            run_id,
            status,
            end_time: status
                .is_terminated()
                .then(|| Utc::now().timestamp_millis()),
        };
        self.post_json("runs/update", &request).await?;
        Ok(())
    }
}
