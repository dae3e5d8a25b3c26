//! Face signature extraction.
//!
//! [`ArcFaceExtractor`] runs the w600k_r50 ArcFace model via ONNX Runtime on
//! aligned 112×112 crops and returns L2-normalized 512-dimensional signatures.

use std::path::Path;

use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use thiserror::Error;

use crate::alignment::{self, ALIGNED_SIZE};
use crate::types::{FaceImage, FaceRegion, FaceSignature};

// --- Named constants (different from SCRFD!) ---
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric around 127.5, unlike SCRFD
const ARCFACE_SIGNATURE_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("model file not found: {0}; download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Turns located faces into signatures.
pub trait SignatureExtractor {
    fn extract(
        &mut self,
        image: &FaceImage,
        region: &FaceRegion,
    ) -> Result<FaceSignature, ExtractionError>;

    /// One signature per region, in region order.
    fn extract_all(
        &mut self,
        image: &FaceImage,
        regions: &[FaceRegion],
    ) -> Result<Vec<FaceSignature>, ExtractionError> {
        regions
            .iter()
            .map(|region| self.extract(image, region))
            .collect()
    }
}

impl<T: SignatureExtractor + ?Sized> SignatureExtractor for Box<T> {
    fn extract(
        &mut self,
        image: &FaceImage,
        region: &FaceRegion,
    ) -> Result<FaceSignature, ExtractionError> {
        (**self).extract(image, region)
    }
}

/// ArcFace-based signature extractor.
pub struct ArcFaceExtractor {
    session: Session,
}

impl ArcFaceExtractor {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ExtractionError> {
        if !Path::new(model_path).exists() {
            return Err(ExtractionError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Aligned RGB crop → NCHW float tensor.
    fn preprocess(aligned: &RgbImage) -> Array4<f32> {
        let size = ALIGNED_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in aligned.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }
        tensor
    }
}

impl SignatureExtractor for ArcFaceExtractor {
    fn extract(
        &mut self,
        image: &FaceImage,
        region: &FaceRegion,
    ) -> Result<FaceSignature, ExtractionError> {
        let aligned = alignment::align_face(image, region);
        let input = Self::preprocess(&aligned);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractionError::InferenceFailed(format!("signature output: {e}")))?;

        if raw.len() != ARCFACE_SIGNATURE_DIM {
            return Err(ExtractionError::InferenceFailed(format!(
                "expected {ARCFACE_SIGNATURE_DIM}-dim signature, got {}",
                raw.len()
            )));
        }

        Ok(FaceSignature {
            values: l2_normalize(raw),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }
}

/// Scale to unit length. A zero vector is returned unchanged.
pub fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
