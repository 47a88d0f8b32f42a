//! End-to-end tests for the prediction endpoint
//!
//! Exercises the full request path through the axum router:
//! 1. Multipart extraction of the `file` field
//! 2. Preprocessing + stubbed inference
//! 3. Metric logging against the resolved run
//! 4. JSON response / structured error rendering

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use model_serving::model::Classifier;
use model_serving::preprocess::ImageTensor;
use model_serving::server::{router, ServingContext};
use model_serving::tracking::{MemoryTracking, RunRecord, RunStatus};
use model_serving::{Error, Result};
use serde_json::Value;
use tower::ServiceExt;

const RUN_ID: &str = "resolved-run";
const BOUNDARY: &str = "model-serving-test-boundary";

/// Classifier returning a fixed score vector and counting calls.
struct StubClassifier {
    scores: Vec<f32>,
    calls: AtomicUsize,
}

impl StubClassifier {
    fn new(scores: &[f32]) -> Self {
        Self {
            scores: scores.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }
}

impl Classifier for StubClassifier {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        assert_eq!(input.shape(), [1, 28, 28]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.scores.clone())
    }
}

struct FailingClassifier;

impl Classifier for FailingClassifier {
    fn predict(&self, _input: &ImageTensor) -> Result<Vec<f32>> {
        Err(Error::Inference("graph evaluation failed".to_string()))
    }
}

fn context_with<C: Classifier>(classifier: C) -> Arc<ServingContext<MemoryTracking, C>> {
    let tracking = MemoryTracking::new();
    tracking.add_run(RunRecord::builder(RUN_ID, "1").build());
    Arc::new(ServingContext::from_parts(tracking, classifier, RUN_ID))
}

fn app<C: Classifier + 'static>(context: &Arc<ServingContext<MemoryTracking, C>>) -> Router {
    router(Arc::clone(context), 1024 * 1024)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn multipart_request(field: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"upload.png\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_predicts_argmax_class() {
    let context = context_with(StubClassifier::new(&[0.1, 0.7, 0.2]));

    let (status, body) = send(app(&context), multipart_request("file", &png_bytes(64, 48))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"predicted_class": 1}));
}

#[tokio::test]
async fn test_tie_returns_lowest_index() {
    let context = context_with(StubClassifier::new(&[0.5, 0.5]));

    let (status, body) = send(app(&context), multipart_request("file", &png_bytes(28, 28))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predicted_class"], 0);
}

#[tokio::test]
async fn test_success_logs_exactly_one_metric_on_resolved_run() {
    let context = context_with(StubClassifier::new(&[0.0, 0.1, 0.0, 0.9]));

    let (status, _) = send(app(&context), multipart_request("file", &png_bytes(10, 10))).await;
    assert_eq!(status, StatusCode::OK);

    let tracking = context.tracking();
    let metrics = tracking.get_metrics_for_run(RUN_ID, "prediction");
    assert_eq!(tracking.metric_count(), 1);
    assert_eq!(metrics.len(), 1);
    assert!((metrics[0].value() - 3.0).abs() < f64::EPSILON);
    assert_eq!(tracking.run_count(), 1);
    assert_eq!(
        tracking.get_run(RUN_ID).unwrap().status(),
        RunStatus::Finished
    );
}

#[tokio::test]
async fn test_missing_file_is_client_error_without_side_effects() {
    let context = context_with(StubClassifier::new(&[1.0]));

    let (status, body) = send(app(&context), multipart_request("image", &png_bytes(8, 8))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file provided");
    assert_eq!(body["kind"], "invalid_request");
    assert_eq!(context.tracking().metric_count(), 0);
    assert_eq!(context_calls(&context), 0);
}

#[tokio::test]
async fn test_non_multipart_body_is_client_error() {
    let context = context_with(StubClassifier::new(&[1.0]));
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let (status, body) = send(app(&context), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");
    assert_eq!(context.tracking().metric_count(), 0);
}

#[tokio::test]
async fn test_non_image_bytes_is_decode_error() {
    let context = context_with(StubClassifier::new(&[1.0]));

    let (status, body) = send(
        app(&context),
        multipart_request("file", b"this is a text file, not a picture"),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "decode_failure");
    assert_eq!(context.tracking().metric_count(), 0);
    assert_eq!(context_calls(&context), 0);
}

#[tokio::test]
async fn test_upload_over_body_limit_is_payload_too_large() {
    let context = context_with(StubClassifier::new(&[1.0]));
    let small_limit = router(Arc::clone(&context), 1024);

    let (status, body) = send(small_limit, multipart_request("file", &vec![0u8; 4096])).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["kind"], "payload_too_large");
    assert_eq!(context.tracking().metric_count(), 0);
    assert_eq!(context_calls(&context), 0);
}

#[tokio::test]
async fn test_inference_failure_is_structured_error() {
    let context = context_with(FailingClassifier);

    let (status, body) = send(app(&context), multipart_request("file", &png_bytes(28, 28))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "inference_failure");
    assert_eq!(context.tracking().metric_count(), 0);
    // Run scope is only opened once a prediction exists
    assert_eq!(
        context.tracking().get_run(RUN_ID).unwrap().status(),
        RunStatus::Finished
    );
}

#[tokio::test]
async fn test_empty_scores_is_inference_error() {
    let context = context_with(StubClassifier::new(&[]));

    let (status, body) = send(app(&context), multipart_request("file", &png_bytes(28, 28))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "inference_failure");
}

#[tokio::test]
async fn test_tracking_failure_is_bad_gateway() {
    let context = context_with(StubClassifier::new(&[0.2, 0.8]));
    context.tracking().reject_metrics(true);

    let (status, body) = send(app(&context), multipart_request("file", &png_bytes(28, 28))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "tracking_failure");
    assert_eq!(
        context.tracking().get_run(RUN_ID).unwrap().status(),
        RunStatus::Failed
    );
}

#[tokio::test]
async fn test_server_keeps_serving_after_errors() {
    let context = context_with(StubClassifier::new(&[0.3, 0.1, 0.6]));

    let (bad, _) = send(app(&context), multipart_request("file", b"garbage")).await;
    let (good, body) = send(app(&context), multipart_request("file", &png_bytes(5, 90))).await;

    assert_eq!(bad, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(good, StatusCode::OK);
    assert_eq!(body["predicted_class"], 2);
    assert_eq!(context.tracking().metric_count(), 1);
}

#[tokio::test]
async fn test_health_reports_resolved_run() {
    let context = context_with(StubClassifier::new(&[1.0]));
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(app(&context), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"status": "ok", "run_id": RUN_ID}));
}

fn context_calls(context: &ServingContext<MemoryTracking, StubClassifier>) -> usize {
    context.classifier().calls.load(Ordering::SeqCst)
}
