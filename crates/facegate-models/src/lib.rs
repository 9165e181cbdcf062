//! facegate-models: ONNX Runtime implementations of facegate collaborators.
//!
//! ArcFace for identity embeddings and a two-class ViT export for mask
//! classification. Both hold their session behind a `Mutex`, since
//! `Session::run` needs exclusive access while collaborators are shared.

pub mod arcface;
pub mod mask;

pub use arcface::ArcFaceExtractor;
pub use mask::OnnxMaskClassifier;

use facegate_core::CollaboratorError;
use ort::session::Session;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("model session lock poisoned")]
    Poisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl From<ModelError> for CollaboratorError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::ModelNotFound(_) | ModelError::Poisoned => {
                CollaboratorError::Unavailable(e.to_string())
            }
            ModelError::InferenceFailed(_) | ModelError::Ort(_) => {
                CollaboratorError::Inference(e.to_string())
            }
        }
    }
}

fn load_session(model_path: &Path, kind: &str) -> Result<Session, ModelError> {
    if !model_path.exists() {
        return Err(ModelError::ModelNotFound(model_path.display().to_string()));
    }

    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(model_path)?;

    tracing::info!(
        path = %model_path.display(),
        model = kind,
        inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded ONNX model"
    );

    Ok(session)
}
