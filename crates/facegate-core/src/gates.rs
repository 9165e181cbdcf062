//! Gates that delegate to external collaborators.
//!
//! Detector, landmark and embedding failures are hard failures. The mask
//! and liveness gates are fail-open: an unavailable or erroring classifier
//! downgrades to a pass carrying a warning.

use crate::collaborators::{
    EmbeddingExtractor, FaceDetector, LandmarkExtractor, LivenessClassifier, MaskClassifier,
};
use crate::compare::round4;
use crate::imaging::Image;
use crate::mouth::{evaluate_mouth, measure_mouth, MouthMetrics};
use crate::outcome::{ErrorCode, GateFailure, GateResult};
use crate::pose::{estimate_pose, evaluate_pose, HeadPose, PoseLimits};
use crate::types::{Detection, Embedding, LandmarkSet, DEFAULT_EMBEDDING_VERSION, EMBEDDING_DIM};
use serde::Serialize;

/// The mask classifier sees the image with 1/8 trimmed from every side.
const MASK_CROP_MARGIN_DIVISOR: u32 = 8;

/// Require exactly one face; forward its detection.
pub fn check_face_count(detector: &dyn FaceDetector, image: &Image) -> GateResult<Detection> {
    let detections = detector.detect(image).map_err(|e| {
        GateFailure::new(
            ErrorCode::NoFaceDetected,
            format!("Face detection failed: {e}"),
        )
    })?;

    match detections.as_slice() {
        [] => Err(GateFailure::new(
            ErrorCode::NoFaceDetected,
            "No face detected in image.",
        )),
        [only] => {
            tracing::debug!(confidence = only.confidence, "face count check passed");
            Ok(*only)
        }
        many => Err(GateFailure::new(
            ErrorCode::MultipleFaces,
            format!("Detected {} faces. Only 1 person allowed.", many.len()),
        )),
    }
}

/// Fraction of the image area covered by the detected face box.
pub fn face_area_fraction(image: &Image, detection: &Detection) -> f32 {
    let (face_w, face_h) = detection.pixel_size(image.width(), image.height());
    let face_area = face_w.max(0.0) * face_h.max(0.0);
    let image_area = image.width() as f32 * image.height() as f32;
    face_area / image_area
}

/// Fail with `FACE_TOO_SMALL` when the face covers less than `min_fraction` of the image.
pub fn check_face_size(image: &Image, detection: &Detection, min_fraction: f32) -> GateResult<f32> {
    let fraction = face_area_fraction(image, detection);
    if fraction.is_nan() || fraction < min_fraction {
        return Err(GateFailure::new(
            ErrorCode::FaceTooSmall,
            format!(
                "Face is too small/far ({:.1}% < {:.0}%).",
                fraction * 100.0,
                min_fraction * 100.0
            ),
        ));
    }
    tracing::debug!(fraction, "face size check passed");
    Ok(fraction)
}

/// Pose gate output: the estimate plus the landmarks the mouth gate reuses.
#[derive(Debug, Clone)]
pub struct PoseCheck {
    pub pose: HeadPose,
    pub landmarks: LandmarkSet,
}

fn no_landmarks(detail: Option<String>) -> GateFailure {
    let reason = match detail {
        Some(detail) => format!("Could not detect facial landmarks: {detail}"),
        None => "Could not detect facial landmarks.".to_string(),
    };
    GateFailure::new(ErrorCode::NoFaceDetected, reason)
}

/// Extract landmarks and reject faces that are not frontal.
pub fn check_pose(
    extractor: &dyn LandmarkExtractor,
    image: &Image,
    limits: &PoseLimits,
) -> GateResult<PoseCheck> {
    let landmarks = extractor
        .extract(image)
        .map_err(|e| no_landmarks(Some(e.to_string())))?
        .ok_or_else(|| no_landmarks(None))?;

    let pose = estimate_pose(&landmarks).map_err(|e| no_landmarks(Some(e.to_string())))?;
    tracing::debug!(yaw = pose.yaw, pitch = pose.pitch, "head pose estimated");
    let pose = evaluate_pose(pose, limits)?;

    Ok(PoseCheck { pose, landmarks })
}

/// Mouth-occlusion gate over landmarks already extracted by the pose gate.
pub fn check_mouth(landmarks: &LandmarkSet, min_width_ratio: f32) -> GateResult<MouthMetrics> {
    let metrics = measure_mouth(landmarks).map_err(|e| no_landmarks(Some(e.to_string())))?;
    evaluate_mouth(metrics, min_width_ratio)
}

/// Mask gate output. `mask_probability` is `None` when the check was unavailable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaskCheck {
    pub mask_probability: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl MaskCheck {
    fn unavailable(warning: String) -> Self {
        tracing::warn!(%warning, "mask check unavailable; passing without it");
        Self {
            mask_probability: None,
            warning: Some(warning),
        }
    }
}

/// Fail with `MASK_DETECTED` when the mask probability exceeds `threshold`.
///
/// A missing classifier, a classifier error, or a non-finite probability
/// passes with a warning.
pub fn check_mask(
    classifier: Option<&dyn MaskClassifier>,
    image: &Image,
    threshold: f32,
) -> GateResult<MaskCheck> {
    let Some(classifier) = classifier else {
        return Ok(MaskCheck::unavailable("Mask model not loaded".to_string()));
    };

    let region = image.center_crop(MASK_CROP_MARGIN_DIVISOR);
    let probs = match classifier.classify(&region) {
        Ok(probs) => probs,
        Err(e) => return Ok(MaskCheck::unavailable(e.to_string())),
    };
    if !probs.mask.is_finite() {
        return Ok(MaskCheck::unavailable(format!(
            "mask classifier returned non-finite probability {}",
            probs.mask
        )));
    }

    tracing::debug!(mask = probs.mask, no_mask = probs.no_mask, "mask classification");
    if probs.mask > threshold {
        return Err(GateFailure::new(
            ErrorCode::MaskDetected,
            format!(
                "Face mask detected ({:.0}%). Please remove your mask.",
                probs.mask * 100.0
            ),
        ));
    }

    Ok(MaskCheck {
        mask_probability: Some(probs.mask),
        warning: None,
    })
}

/// Liveness signal surfaced to callers.
///
/// `is_real == None` means the check did not produce a verdict (skipped or
/// classifier unavailable), which is distinct from a genuine live pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LivenessReport {
    pub is_real: Option<bool>,
    pub spoof_probability: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl LivenessReport {
    pub fn is_unavailable(&self) -> bool {
        self.is_real.is_none()
    }
}

/// Run the anti-spoof classifier, folding operational errors into an unavailable report.
pub fn assess_liveness(classifier: &dyn LivenessClassifier, image: &Image) -> LivenessReport {
    match classifier.assess(image) {
        Ok(assessment) => {
            let spoof_probability = round4(1.0 - assessment.antispoof_score);
            tracing::debug!(
                is_real = assessment.is_real,
                antispoof_score = assessment.antispoof_score,
                "liveness assessed"
            );
            LivenessReport {
                is_real: Some(assessment.is_real),
                spoof_probability: Some(spoof_probability),
                warning: None,
            }
        }
        Err(e) => {
            let warning = format!("Liveness check unavailable: {e}");
            tracing::warn!(%warning, "liveness check failed open");
            LivenessReport {
                is_real: None,
                spoof_probability: None,
                warning: Some(warning),
            }
        }
    }
}

/// Fail with `SPOOF_DETECTED` only on an explicit not-real verdict.
pub fn evaluate_liveness(report: &LivenessReport) -> GateResult<()> {
    if report.is_real == Some(false) {
        let pct = report.spoof_probability.unwrap_or(1.0) * 100.0;
        return Err(GateFailure::new(
            ErrorCode::SpoofDetected,
            format!(
                "Spoofing detected ({pct:.0}% probability). Please use a real camera, not a photo or screen."
            ),
        ));
    }
    Ok(())
}

/// Produce a well-formed identity embedding or fail with `EMBEDDING_FAILED`.
pub fn extract_embedding(embedder: &dyn EmbeddingExtractor, image: &Image) -> GateResult<Embedding> {
    let embedding = embedder
        .embed(image)
        .map_err(|e| {
            GateFailure::new(
                ErrorCode::EmbeddingFailed,
                format!("Embedding generation error: {e}"),
            )
        })?
        .ok_or_else(|| {
            GateFailure::new(ErrorCode::EmbeddingFailed, "Failed to generate face embedding.")
        })?;

    if !embedding.is_well_formed() {
        return Err(GateFailure::new(
            ErrorCode::EmbeddingFailed,
            format!(
                "Embedding must have {EMBEDDING_DIM} finite values, got {}.",
                embedding.len()
            ),
        ));
    }

    let embedding = match embedding.model_version {
        Some(_) => embedding,
        None => embedding.with_version(DEFAULT_EMBEDDING_VERSION),
    };
    tracing::debug!(version = ?embedding.model_version, "embedding extracted");
    Ok(embedding)
}
