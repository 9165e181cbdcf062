//! ArcFace embedding extractor.
//!
//! Expects a face-centred image; the whole frame is resized to the model input.

use crate::{load_session, ModelError};
use facegate_core::types::DEFAULT_EMBEDDING_VERSION;
use facegate_core::{CollaboratorError, Embedding, EmbeddingExtractor, Image, EMBEDDING_DIM};
use image::imageops::{self, FilterType};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;

const ARCFACE_INPUT_SIZE: usize = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;

pub struct ArcFaceExtractor {
    session: Mutex<Session>,
}

impl ArcFaceExtractor {
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let session = load_session(model_path.as_ref(), "arcface")?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Run the model and return an L2-normalized embedding.
    pub fn extract(&self, image: &Image) -> Result<Embedding, ModelError> {
        let input = preprocess(image);
        let mut session = self.session.lock().map_err(|_| ModelError::Poisoned)?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(ModelError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(l2_normalize(raw)).with_version(DEFAULT_EMBEDDING_VERSION))
    }
}

impl EmbeddingExtractor for ArcFaceExtractor {
    fn embed(&self, image: &Image) -> Result<Option<Embedding>, CollaboratorError> {
        Ok(Some(self.extract(image)?))
    }
}

/// Resize to 112x112 RGB and normalize into a NCHW tensor in [-1, 1].
fn preprocess(image: &Image) -> Array4<f32> {
    let size = ARCFACE_INPUT_SIZE;
    let resized = imageops::resize(
        image.as_rgb(),
        size as u32,
        size as u32,
        FilterType::Triangle,
    );

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for c in 0..3 {
            tensor[[0, c, y, x]] = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
