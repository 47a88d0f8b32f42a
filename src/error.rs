//! Error types for model-serving
//!
//! Three families: startup-fatal (tracking/model resolution), client errors
//! (bad request shape), and processing errors (decode/inference). Request-time
//! errors are rendered as JSON bodies by the server module.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// model-serving error types
#[derive(Error, Debug)]
pub enum Error {
    /// The experiment exists but holds no runs to serve from
    #[error("No runs found for experiment '{experiment}'\nTrain and log a model before starting the server.")]
    NoRuns {
        /// Experiment name that was searched
        experiment: String,
    },

    /// Tracking service request failed or returned an API error
    #[error("Tracking service error: {0}")]
    Tracking(String),

    /// Model artifact could not be deserialized into a classifier
    #[error("Model load failed for run {run_id}: {reason}")]
    ModelLoad {
        /// Run the artifact belongs to
        run_id: String,
        /// Underlying loader message
        reason: String,
    },

    /// Upload field missing from the request
    #[error("No file provided")]
    MissingFile,

    /// Malformed multipart body
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request body exceeds the configured upload limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Uploaded bytes are not a decodable image
    #[error("Image decode failed: {0}")]
    Decode(String),

    /// Model inference failed or produced unusable scores
    #[error("Inference failed: {0}")]
    Inference(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

}

impl Error {
    /// Stable machine-readable kind, reported to HTTP callers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoRuns { .. } => "no_runs",
            Self::Tracking(_) => "tracking_failure",
            Self::ModelLoad { .. } => "model_load_failure",
            Self::MissingFile | Self::InvalidRequest(_) => "invalid_request",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::Decode(_) => "decode_failure",
            Self::Inference(_) => "inference_failure",
            Self::Io(_) => "internal",
        }
    }

    /// HTTP status code for request-time rendering.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::MissingFile | Self::InvalidRequest(_) => 400,
            Self::PayloadTooLarge(_) => 413,
            Self::Decode(_) => 422,
            Self::Tracking(_) => 502,
            Self::NoRuns { .. } => 503,
            Self::ModelLoad { .. } | Self::Inference(_) | Self::Io(_) => 500,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Tracking(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::Decode(err.to_string())
    }
}
