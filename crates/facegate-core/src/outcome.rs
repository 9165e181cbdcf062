//! Gate outcomes, stage bookkeeping and the short-circuiting stage runner.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Closed set of machine-readable rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BlurDetected,
    NoFaceDetected,
    MultipleFaces,
    FaceTooSmall,
    FaceNotFrontal,
    MouthCovered,
    MaskDetected,
    SpoofDetected,
    EmbeddingFailed,
    MissingEmbedding,
    InvalidEmbedding,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BlurDetected => "BLUR_DETECTED",
            ErrorCode::NoFaceDetected => "NO_FACE_DETECTED",
            ErrorCode::MultipleFaces => "MULTIPLE_FACES",
            ErrorCode::FaceTooSmall => "FACE_TOO_SMALL",
            ErrorCode::FaceNotFrontal => "FACE_NOT_FRONTAL",
            ErrorCode::MouthCovered => "MOUTH_COVERED",
            ErrorCode::MaskDetected => "MASK_DETECTED",
            ErrorCode::SpoofDetected => "SPOOF_DETECTED",
            ErrorCode::EmbeddingFailed => "EMBEDDING_FAILED",
            ErrorCode::MissingEmbedding => "MISSING_EMBEDDING",
            ErrorCode::InvalidEmbedding => "INVALID_EMBEDDING",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hard gate failure: code plus human-readable reason.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{code}: {reason}")]
pub struct GateFailure {
    pub code: ErrorCode,
    pub reason: String,
}

impl GateFailure {
    pub fn new(code: ErrorCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Outcome of a single gate: the gate's pass value, or the failure that stops the pipeline.
pub type GateResult<T> = Result<T, GateFailure>;

/// Named pipeline stages, in the vocabulary of the `checks` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Blur,
    FaceCount,
    FaceSize,
    FacePose,
    Mouth,
    Mask,
    Liveness,
    Embedding,
    Comparison,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Blur => "blur",
            Stage::FaceCount => "face_count",
            Stage::FaceSize => "face_size",
            Stage::FacePose => "face_pose",
            Stage::Mouth => "mouth",
            Stage::Mask => "mask",
            Stage::Liveness => "liveness",
            Stage::Embedding => "embedding",
            Stage::Comparison => "comparison",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pass,
    Fail,
    Skipped,
}

/// Ordered record of which stages ran and how they ended.
///
/// Serializes as a JSON object whose keys keep insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checks {
    entries: Vec<(Stage, GateStatus)>,
}

impl Checks {
    pub fn record(&mut self, stage: Stage, status: GateStatus) {
        match self.entries.iter_mut().find(|(s, _)| *s == stage) {
            Some(entry) => entry.1 = status,
            None => self.entries.push((stage, status)),
        }
    }

    pub fn get(&self, stage: Stage) -> Option<GateStatus> {
        self.entries
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, status)| *status)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, GateStatus)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Checks {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (stage, status) in &self.entries {
            map.serialize_entry(stage.as_str(), status)?;
        }
        map.end()
    }
}

/// A gate failure annotated with the stage that produced it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{stage} gate failed: {failure}")]
pub struct StageFailure {
    pub stage: Stage,
    pub failure: GateFailure,
}

/// Evaluates stages in order, recording each outcome in a [`Checks`] map.
///
/// `run` converts a gate failure into a [`StageFailure`] so callers can
/// short-circuit with `?`; the record survives the early return.
#[derive(Debug, Default)]
pub struct StageRunner {
    checks: Checks,
}

impl StageRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run<T>(
        &mut self,
        stage: Stage,
        gate: impl FnOnce() -> GateResult<T>,
    ) -> Result<T, StageFailure> {
        match gate() {
            Ok(value) => {
                self.checks.record(stage, GateStatus::Pass);
                Ok(value)
            }
            Err(failure) => {
                tracing::info!(%stage, code = %failure.code, reason = %failure.reason, "gate failed");
                self.checks.record(stage, GateStatus::Fail);
                Err(StageFailure { stage, failure })
            }
        }
    }

    pub fn skip(&mut self, stage: Stage) {
        tracing::debug!(%stage, "gate skipped");
        self.checks.record(stage, GateStatus::Skipped);
    }

    /// Record a status decided outside a gate (e.g. the final match decision).
    pub fn record(&mut self, stage: Stage, status: GateStatus) {
        self.checks.record(stage, status);
    }

    pub fn checks(&self) -> &Checks {
        &self.checks
    }

    pub fn into_checks(self) -> Checks {
        self.checks
    }
}
