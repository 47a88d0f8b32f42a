//! ONNX classifier backed by tract.

use std::io::Cursor;

use tract_onnx::prelude::*;

use super::Classifier;
use crate::preprocess::{ImageTensor, IMAGE_SIDE};
use crate::tracking::ModelArtifact;
use crate::{Error, Result};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Optimized ONNX graph taking a `(1, 28, 28)` `f32` input.
///
/// The first output is read as the score vector; for a `(1, classes)` output
/// that is exactly the sample's class scores.
pub struct OnnxClassifier {
    plan: OnnxPlan,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier").finish_non_exhaustive()
    }
}

impl OnnxClassifier {
    /// Parse and optimize an ONNX model from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns the tract error if the bytes are not a loadable ONNX graph for
    /// a `(1, 28, 28)` input.
    pub fn from_bytes(bytes: &[u8]) -> TractResult<Self> {
        let side = IMAGE_SIDE;
        let plan = tract_onnx::onnx()
            .model_for_read(&mut Cursor::new(bytes))?
            .with_input_fact(0, f32::fact([1, side, side]).into())?
            .into_optimized()?
            .into_runnable()?;
        Ok(Self { plan })
    }

    /// Load the classifier from a downloaded run artifact.
    ///
    /// # Errors
    ///
    /// Returns `Error::ModelLoad` naming the artifact's run on failure.
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self> {
        Self::from_bytes(artifact.bytes()).map_err(|err| Error::ModelLoad {
            run_id: artifact.run_id().to_string(),
            reason: format!("{}: {err:#}", artifact.path()),
        })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        let array = tract_ndarray::Array3::from_shape_vec(
            (1, IMAGE_SIDE, IMAGE_SIDE),
            input.as_slice().to_vec(),
        )
        .map_err(|err| Error::Inference(err.to_string()))?;

        let outputs = self
            .plan
            .run(tvec!(array.into_tensor().into()))
            .map_err(|err| Error::Inference(format!("{err:#}")))?;

        let first = outputs
            .first()
            .ok_or_else(|| Error::Inference("model produced no outputs".to_string()))?;
        let scores = first
            .to_array_view::<f32>()
            .map_err(|err| Error::Inference(format!("{err:#}")))?;

        Ok(scores.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_artifact_rejects_non_onnx_bytes() {
        let artifact = ModelArtifact::new("run-9", "model/model.onnx", b"not a graph".to_vec());
        let err = OnnxClassifier::from_artifact(&artifact).unwrap_err();

        assert!(matches!(err, Error::ModelLoad { ref run_id, .. } if run_id == "run-9"));
        assert!(err.to_string().contains("model/model.onnx"));
    }
}
