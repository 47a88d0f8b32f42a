//! HTTP surface: `POST /predict` and `GET /health`
//!
//! The router is built around an immutable [`ServingContext`] resolved once at
//! startup. Request-time errors never escape as panics; every [`Error`] is
//! rendered as a JSON body with a status code and a machine-readable `kind`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::classify::Prediction;
use crate::model::{Classifier, ResolvedModel};
use crate::preprocess::preprocess_image;
use crate::tracking::{log_metric_in_run, TrackingClient};
use crate::{Error, Result};

/// Multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

/// Metric key used when none is configured.
pub const DEFAULT_METRIC_KEY: &str = "prediction";

/// Process-wide state shared by all requests.
///
/// Built once after model resolution and never mutated afterwards.
#[derive(Debug)]
pub struct ServingContext<T, C> {
    tracking: T,
    classifier: C,
    run_id: String,
    metric_key: String,
}

impl<T: TrackingClient, C: Classifier> ServingContext<T, C> {
    /// Context serving a resolved model.
    #[must_use]
    pub fn new(tracking: T, resolved: ResolvedModel<C>) -> Self {
        let run_id = resolved.run_id().to_string();
        Self::from_parts(tracking, resolved.classifier, run_id)
    }

    /// Context from explicit parts (e.g. a stub classifier in tests).
    #[must_use]
    pub fn from_parts(tracking: T, classifier: C, run_id: impl Into<String>) -> Self {
        Self {
            tracking,
            classifier,
            run_id: run_id.into(),
            metric_key: DEFAULT_METRIC_KEY.to_string(),
        }
    }

    /// Override the metric key logged per prediction.
    #[must_use]
    pub fn with_metric_key(mut self, key: impl Into<String>) -> Self {
        self.metric_key = key.into();
        self
    }

    /// Run that predictions are logged against.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Metric key logged per prediction.
    #[must_use]
    pub fn metric_key(&self) -> &str {
        &self.metric_key
    }

    /// Tracking client.
    #[must_use]
    pub const fn tracking(&self) -> &T {
        &self.tracking
    }

    /// Loaded model.
    #[must_use]
    pub const fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Preprocess, infer and select a class. CPU-bound and synchronous.
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` for unreadable images and `Error::Inference`
    /// for model failures or unusable scores.
    pub fn classify_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let tensor = preprocess_image(bytes)?;
        let scores = self.classifier.predict(&tensor)?;
        Prediction::from_scores(&scores)
    }
}

/// Build the application router.
pub fn router<T, C>(context: Arc<ServingContext<T, C>>, body_limit_bytes: usize) -> Router
where
    T: TrackingClient + 'static,
    C: Classifier + 'static,
{
    Router::new()
        .route("/predict", post(predict::<T, C>))
        .route("/health", get(health::<T, C>))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(context)
}

/// Bind `addr` and serve `app` until Ctrl-C.
///
/// # Errors
///
/// Returns `Error::Io` if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "prediction server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("prediction server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
}

#[instrument(skip_all)]
async fn predict<T, C>(
    State(context): State<Arc<ServingContext<T, C>>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>>
where
    T: TrackingClient + 'static,
    C: Classifier + 'static,
{
    let multipart = multipart.map_err(|rejection| Error::InvalidRequest(rejection.body_text()))?;
    let bytes = read_file_field(multipart).await?;
    debug!(size_bytes = bytes.len(), "image received");

    let worker = Arc::clone(&context);
    let prediction = tokio::task::spawn_blocking(move || worker.classify_bytes(&bytes))
        .await
        .map_err(|err| Error::Inference(format!("inference task aborted: {err}")))??;

    log_metric_in_run(
        &context.tracking,
        &context.run_id,
        &context.metric_key,
        prediction.as_metric_value(),
    )
    .await?;

    debug!(
        run_id = %context.run_id,
        predicted_class = prediction.predicted_class,
        "prediction logged"
    );
    Ok(Json(prediction))
}

/// Bytes of the first `file` field; other fields are skipped.
async fn read_file_field(mut multipart: Multipart) -> Result<Vec<u8>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(FILE_FIELD) {
            let bytes = field.bytes().await.map_err(multipart_error)?;
            return Ok(bytes.to_vec());
        }
    }
    Err(Error::MissingFile)
}

/// Body-limit overruns surface while streaming fields; keep them distinct
/// from malformed multipart.
fn multipart_error(err: MultipartError) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(err.body_text())
    } else {
        Error::InvalidRequest(err.body_text())
    }
}

async fn health<T, C>(State(context): State<Arc<ServingContext<T, C>>>) -> Json<serde_json::Value>
where
    T: TrackingClient + 'static,
    C: Classifier + 'static,
{
    Json(json!({ "status": "ok", "run_id": context.run_id }))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(kind = self.kind(), error = %self, "request failed");
        } else {
            debug!(kind = self.kind(), error = %self, "request rejected");
        }
        let body = json!({ "error": self.to_string(), "kind": self.kind() });
        (status, Json(body)).into_response()
    }
}
