use crate::config::EngineConfig;
use crate::imaging::Image;
use crate::pipeline::{FaceGate, ValidationResult, VerificationResult};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine is shut down")]
    Closed,
    #[error("pipeline task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Clone-safe async handle over a shared [`FaceGate`].
///
/// Each request runs on the blocking pool. At most `max_concurrent_requests`
/// run at once; the rest wait for a permit.
#[derive(Clone)]
pub struct Engine {
    gate: Arc<FaceGate>,
    permits: Arc<Semaphore>,
}

impl Engine {
    pub fn new(gate: FaceGate, config: &EngineConfig) -> Self {
        let limit = config.max_concurrent_requests.max(1);
        tracing::info!(max_concurrent_requests = limit, "engine started");
        Self {
            gate: Arc::new(gate),
            permits: Arc::new(Semaphore::new(limit)),
        }
    }

    /// Run the enrollment pipeline.
    pub async fn validate_profile(&self, image: Image) -> Result<ValidationResult, EngineError> {
        self.run(move |gate| gate.validate_profile(&image)).await
    }

    /// Run the verification pipeline against the raw JSON of a stored embedding.
    pub async fn verify_face(
        &self,
        image: Image,
        stored_embedding: Option<String>,
        check_liveness: bool,
    ) -> Result<VerificationResult, EngineError> {
        self.run(move |gate| {
            gate.verify_face_json(&image, stored_embedding.as_deref(), check_liveness)
        })
        .await
    }

    /// Stop admitting requests. In-flight requests finish normally.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn run<T, F>(&self, job: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&FaceGate) -> T + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Closed)?;
        let gate = Arc::clone(&self.gate);
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(&gate)
        })
        .await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{
        Collaborators, CollaboratorError, EmbeddingExtractor, FaceDetector, LandmarkExtractor,
        LivenessAssessment, LivenessClassifier,
    };
    use crate::config::FaceGateConfig;
    use crate::outcome::{ErrorCode, Stage};
    use crate::types::{Detection, Embedding, LandmarkSet};
    use image::RgbImage;

    struct NoFace;
    impl FaceDetector for NoFace {
        fn detect(&self, _: &Image) -> Result<Vec<Detection>, CollaboratorError> {
            Ok(vec![])
        }
    }
    impl LandmarkExtractor for NoFace {
        fn extract(&self, _: &Image) -> Result<Option<LandmarkSet>, CollaboratorError> {
            Ok(None)
        }
    }
    impl EmbeddingExtractor for NoFace {
        fn embed(&self, _: &Image) -> Result<Option<Embedding>, CollaboratorError> {
            Ok(None)
        }
    }
    impl LivenessClassifier for NoFace {
        fn assess(&self, _: &Image) -> Result<LivenessAssessment, CollaboratorError> {
            Err(CollaboratorError::Unavailable("stub".into()))
        }
    }

    fn engine(max_concurrent_requests: usize) -> Engine {
        let stub = Arc::new(NoFace);
        let collaborators = Collaborators {
            detector: stub.clone(),
            landmarks: stub.clone(),
            mask: None,
            embedder: stub.clone(),
            liveness: stub,
        };
        let mut config = FaceGateConfig::default();
        config.engine.max_concurrent_requests = max_concurrent_requests;
        Engine::new(FaceGate::new(collaborators, &config), &config.engine)
    }

    fn checkerboard() -> Image {
        let rgb = RgbImage::from_fn(64, 64, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        });
        Image::from_rgb(rgb).unwrap()
    }

    #[tokio::test]
    async fn test_validate_runs_pipeline() {
        let engine = engine(2);
        let result = engine.validate_profile(checkerboard()).await.unwrap();
        match result {
            ValidationResult::Rejected(rejection) => {
                assert_eq!(rejection.stage, Some(Stage::FaceCount));
                assert_eq!(rejection.code, ErrorCode::NoFaceDetected);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(engine.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_verify_missing_embedding() {
        let engine = engine(1);
        let result = engine.verify_face(checkerboard(), None, true).await.unwrap();
        match result {
            VerificationResult::Rejected { rejection, .. } => {
                assert_eq!(rejection.code, ErrorCode::MissingEmbedding);
                assert!(rejection.checks.is_empty());
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_engine() {
        let engine = engine(2);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.validate_profile(checkerboard()).await })
            })
            .collect();
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert!(!result.is_accepted());
        }
        assert_eq!(engine.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_closed_engine_rejects() {
        let engine = engine(1);
        engine.close();
        let err = engine.validate_profile(checkerboard()).await.unwrap_err();
        assert!(matches!(err, EngineError::Closed));
    }
}
