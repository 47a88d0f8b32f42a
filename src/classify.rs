//! Class selection over model score vectors
//!
//! Argmax with the usual tie rule: the lowest index among equal maxima wins,
//! so `[0.5, 0.5]` selects class 0.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Predicted class for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    /// Index of the highest-scoring class
    pub predicted_class: usize,
}

impl Prediction {
    /// Select the class from a per-class score vector.
    ///
    /// # Errors
    ///
    /// See [`argmax`].
    pub fn from_scores(scores: &[f32]) -> Result<Self> {
        argmax(scores).map(|predicted_class| Self { predicted_class })
    }

    /// Class index as the metric value written to the tracking service.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_metric_value(self) -> f64 {
        self.predicted_class as f64
    }
}

/// Index of the maximum score, ties broken by lowest index.
///
/// Single pass; a later score only wins if it is strictly greater.
///
/// # Errors
///
/// Returns `Error::Inference` if `scores` is empty or contains a non-finite
/// value (NaN has no defined position in the ordering).
pub fn argmax(scores: &[f32]) -> Result<usize> {
    let (first, rest) = scores
        .split_first()
        .ok_or_else(|| Error::Inference("model returned an empty score vector".to_string()))?;

    if let Some(pos) = scores.iter().position(|s| !s.is_finite()) {
        return Err(Error::Inference(format!(
            "model returned non-finite score at class {pos}"
        )));
    }

    let mut best_index = 0;
    let mut best_score = *first;
    for (offset, &score) in rest.iter().enumerate() {
        if score > best_score {
            best_index = offset + 1;
            best_score = score;
        }
    }
    Ok(best_index)
}
