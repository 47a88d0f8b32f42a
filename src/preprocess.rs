//! Image preprocessing: uploaded bytes → normalized model input
//!
//! Pipeline (one request, no state):
//!
//! ```text
//! bytes ──decode──> DynamicImage ──luma8──> GrayImage ──resize 28×28──> /255 ──> (1, 28, 28)
//! ```
//!
//! The format is sniffed from the bytes, not taken from the upload's file name
//! or content type. Resizing stretches to exactly 28×28 with a `Triangle`
//! (bilinear) filter, which is deterministic for identical input.

use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::{Error, Result};

/// Side length of the square model input, in pixels.
pub const IMAGE_SIDE: usize = 28;

/// Number of values in one tensor (`1 × 28 × 28`).
pub const TENSOR_LEN: usize = IMAGE_SIDE * IMAGE_SIDE;

/// Resampling filter used for the resize step.
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Normalized single-sample grayscale batch of shape `(1, 28, 28)`.
///
/// Values are row-major and lie in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
}

impl ImageTensor {
    /// Build a tensor from an already-resized 28×28 grayscale image.
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` if the image is not exactly 28×28.
    pub fn from_gray(image: &GrayImage) -> Result<Self> {
        if image.dimensions() != (IMAGE_SIDE as u32, IMAGE_SIDE as u32) {
            let (w, h) = image.dimensions();
            return Err(Error::Decode(format!(
                "expected {IMAGE_SIDE}x{IMAGE_SIDE} image, got {w}x{h}"
            )));
        }
        let data = image
            .as_raw()
            .iter()
            .map(|&px| f32::from(px) / f32::from(u8::MAX))
            .collect();
        Ok(Self { data })
    }

    /// Build a tensor from raw values (e.g. a fixture).
    ///
    /// # Errors
    ///
    /// Returns `Error::Inference` if the length is not 784 or any value falls
    /// outside `[0, 1]`.
    pub fn from_vec(data: Vec<f32>) -> Result<Self> {
        if data.len() != TENSOR_LEN {
            return Err(Error::Inference(format!(
                "tensor needs {TENSOR_LEN} values, got {}",
                data.len()
            )));
        }
        if data.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(Error::Inference(
                "tensor values must lie in [0, 1]".to_string(),
            ));
        }
        Ok(Self { data })
    }

    /// Tensor shape: `[batch, height, width]`.
    #[must_use]
    pub const fn shape(&self) -> [usize; 3] {
        [1, IMAGE_SIDE, IMAGE_SIDE]
    }

    /// Flat row-major view of the values.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Value at `(row, col)` of the single sample.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= IMAGE_SIDE || col >= IMAGE_SIDE {
            return None;
        }
        self.data.get(row * IMAGE_SIDE + col).copied()
    }
}

/// Decode, grayscale, resize and normalize uploaded image bytes.
///
/// # Errors
///
/// Returns `Error::Decode` if the bytes are empty or not a supported image.
pub fn preprocess_image(bytes: &[u8]) -> Result<ImageTensor> {
    if bytes.is_empty() {
        return Err(Error::Decode("uploaded file is empty".to_string()));
    }
    let decoded = image::load_from_memory(bytes)?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(Error::Decode("image has zero width or height".to_string()));
    }
    let gray = decoded.to_luma8();
    let resized = imageops::resize(&gray, IMAGE_SIDE as u32, IMAGE_SIDE as u32, RESIZE_FILTER);
    ImageTensor::from_gray(&resized)
}
