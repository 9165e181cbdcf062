//! Replays recorded perception-model outputs as pipeline collaborators.
//!
//! Lets the pipelines run from a JSON file of detections, landmarks, a
//! liveness verdict and (optionally) an embedding, with ONNX models swapped
//! in where available.

use anyhow::{Context, Result};
use facegate_core::{
    CollaboratorError, Collaborators, Detection, Embedding, EmbeddingExtractor, FaceDetector,
    Image, LandmarkExtractor, LandmarkSet, LivenessAssessment, LivenessClassifier, MaskClassifier,
};
use facegate_models::{ArcFaceExtractor, OnnxMaskClassifier};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

const ARCFACE_MODEL_FILE: &str = "arcface.onnx";
const MASK_MODEL_FILE: &str = "mask.onnx";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Observations {
    pub detections: Vec<Detection>,
    pub landmarks: Option<LandmarkSet>,
    pub liveness: Option<LivenessAssessment>,
    pub embedding: Option<Vec<f32>>,
}

impl Observations {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading observations {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing observations {}", path.display()))
    }
}

impl FaceDetector for Observations {
    fn detect(&self, _: &Image) -> Result<Vec<Detection>, CollaboratorError> {
        Ok(self.detections.clone())
    }
}

impl LandmarkExtractor for Observations {
    fn extract(&self, _: &Image) -> Result<Option<LandmarkSet>, CollaboratorError> {
        Ok(self.landmarks.clone())
    }
}

impl LivenessClassifier for Observations {
    fn assess(&self, _: &Image) -> Result<LivenessAssessment, CollaboratorError> {
        self.liveness.ok_or_else(|| {
            CollaboratorError::Unavailable("no liveness observation recorded".to_string())
        })
    }
}

impl EmbeddingExtractor for Observations {
    fn embed(&self, _: &Image) -> Result<Option<Embedding>, CollaboratorError> {
        Ok(self.embedding.clone().map(Embedding::new))
    }
}

/// Build collaborators from recorded observations, preferring ONNX models found in `models`.
pub fn collaborators(observations: Observations, models: Option<&Path>) -> Result<Collaborators> {
    let replay = Arc::new(observations);

    let mut embedder: Arc<dyn EmbeddingExtractor> = replay.clone();
    let mut mask: Option<Arc<dyn MaskClassifier>> = None;

    if let Some(dir) = models {
        let arcface = dir.join(ARCFACE_MODEL_FILE);
        if arcface.exists() {
            embedder = Arc::new(ArcFaceExtractor::load(&arcface)?);
        } else {
            tracing::info!(path = %arcface.display(), "no ArcFace model; replaying recorded embedding");
        }

        let mask_path = dir.join(MASK_MODEL_FILE);
        if mask_path.exists() {
            mask = Some(Arc::new(OnnxMaskClassifier::load(&mask_path)?));
        } else {
            tracing::info!(path = %mask_path.display(), "no mask model; mask gate will fail open");
        }
    }

    Ok(Collaborators {
        detector: replay.clone(),
        landmarks: replay.clone(),
        mask,
        embedder,
        liveness: replay,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn image() -> Image {
        Image::from_rgb(RgbImage::new(4, 4)).unwrap()
    }

    #[test]
    fn test_parse_minimal_observations() {
        let obs: Observations = serde_json::from_str(
            r#"{"detections": [{"x": 0.2, "y": 0.2, "width": 0.5, "height": 0.5}]}"#,
        )
        .unwrap();
        assert_eq!(obs.detections.len(), 1);
        assert_eq!(obs.detections[0].confidence, 1.0);
        assert!(obs.landmarks.is_none());
        assert!(obs.extract(&image()).unwrap().is_none());
        assert!(obs.embed(&image()).unwrap().is_none());
    }

    #[test]
    fn test_missing_liveness_is_unavailable() {
        let obs = Observations::default();
        assert!(matches!(
            obs.assess(&image()),
            Err(CollaboratorError::Unavailable(_))
        ));
    }

    #[test]
    fn test_without_models_replays_everything() {
        let obs = Observations {
            embedding: Some(vec![0.5; 3]),
            ..Default::default()
        };
        let collaborators = collaborators(obs, None).unwrap();
        assert!(collaborators.mask.is_none());
        let embedding = collaborators.embedder.embed(&image()).unwrap().unwrap();
        assert_eq!(embedding.values, vec![0.5; 3]);
    }
}
