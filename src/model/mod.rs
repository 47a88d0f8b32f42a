//! Model abstraction and startup resolution
//!
//! A [`Classifier`] maps one [`ImageTensor`] to a per-class score vector.
//! The [`ModelResolver`] finds the newest run of the configured experiment and
//! turns its model artifact into a classifier, once, before serving starts.

#[cfg(feature = "onnx")]
mod onnx;
mod resolver;

#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;
pub use resolver::{ModelResolver, ResolvedModel, DEFAULT_ARTIFACT_PATH};

use std::sync::Arc;

use crate::preprocess::ImageTensor;
use crate::Result;

/// Inference-capable model.
///
/// Implementations are read-only after construction and shared across
/// concurrent requests.
pub trait Classifier: Send + Sync {
    /// Scores for each class of the single sample in `input`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Inference` if the model cannot be evaluated.
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>>;
}

impl<C: Classifier + ?Sized> Classifier for Arc<C> {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        (**self).predict(input)
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        (**self).predict(input)
    }
}
