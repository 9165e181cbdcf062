//! Contracts for the external perception models the pipelines consume.
//!
//! Implementations must be safe for concurrent read-only invocation; the
//! pipelines call each collaborator at most once per request and never retry.

use crate::imaging::Image;
use crate::types::{Detection, Embedding, LandmarkSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Operational failure of an external model call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("no face found by the model's own detector")]
    NoFace,
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Two-class mask classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskProbabilities {
    pub mask: f32,
    pub no_mask: f32,
}

/// Anti-spoof classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivenessAssessment {
    pub is_real: bool,
    /// Confidence that the face is genuine, in [0, 1].
    pub antispoof_score: f32,
}

pub trait FaceDetector: Send + Sync {
    /// Detect all faces. An empty vector means no face was found.
    fn detect(&self, image: &Image) -> Result<Vec<Detection>, CollaboratorError>;
}

pub trait LandmarkExtractor: Send + Sync {
    /// Landmarks of the most prominent face, or `None` if no face was found.
    fn extract(&self, image: &Image) -> Result<Option<LandmarkSet>, CollaboratorError>;
}

pub trait MaskClassifier: Send + Sync {
    /// Classify a (center-cropped) face region.
    fn classify(&self, region: &Image) -> Result<MaskProbabilities, CollaboratorError>;
}

pub trait EmbeddingExtractor: Send + Sync {
    /// Identity embedding for the face in the image, or `None` if none could be produced.
    fn embed(&self, image: &Image) -> Result<Option<Embedding>, CollaboratorError>;
}

pub trait LivenessClassifier: Send + Sync {
    fn assess(&self, image: &Image) -> Result<LivenessAssessment, CollaboratorError>;
}

/// The set of model handles injected into the pipelines.
///
/// The mask classifier is optional: when absent the mask gate passes with a warning.
#[derive(Clone)]
pub struct Collaborators {
    pub detector: Arc<dyn FaceDetector>,
    pub landmarks: Arc<dyn LandmarkExtractor>,
    pub mask: Option<Arc<dyn MaskClassifier>>,
    pub embedder: Arc<dyn EmbeddingExtractor>,
    pub liveness: Arc<dyn LivenessClassifier>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("mask_available", &self.mask.is_some())
            .finish_non_exhaustive()
    }
}
