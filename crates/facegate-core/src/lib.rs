//! facegate-core: enrollment and verification decision pipelines.
//!
//! Turns the raw outputs of external perception models (face detector,
//! landmark extractor, mask and liveness classifiers, embedding extractor)
//! into a deterministic accept/reject verdict with a machine-readable code.

pub mod blur;
pub mod collaborators;
pub mod compare;
pub mod config;
pub mod engine;
pub mod gates;
pub mod imaging;
pub mod mouth;
pub mod outcome;
pub mod pipeline;
pub mod pose;
pub mod response;
pub mod types;

pub use collaborators::{
    CollaboratorError, Collaborators, EmbeddingExtractor, FaceDetector, LandmarkExtractor,
    LivenessAssessment, LivenessClassifier, MaskClassifier, MaskProbabilities,
};
pub use compare::{compare, Comparison, DEFAULT_SIMILARITY_THRESHOLD};
pub use config::{ConfigError, FaceGateConfig};
pub use engine::{Engine, EngineError};
pub use gates::LivenessReport;
pub use imaging::{Image, ImageError};
pub use outcome::{Checks, ErrorCode, GateFailure, GateStatus, Stage};
pub use pipeline::{
    parse_stored_embedding, FaceGate, MatchReport, Rejection, ValidationResult,
    VerificationResult,
};
pub use response::{ValidationResponse, VerificationResponse};
pub use types::{Detection, Embedding, LandmarkSet, Point, EMBEDDING_DIM};
