//! Enrollment and verification pipelines.
//!
//! Both are linear sequences of gates driven by a [`StageRunner`]: the first
//! hard failure ends the run and the per-stage record is kept for diagnostics.

use crate::blur::check_blur;
use crate::collaborators::Collaborators;
use crate::compare::{compare, Comparison};
use crate::config::{FaceGateConfig, ValidationConfig, VerificationConfig};
use crate::gates::{
    assess_liveness, check_face_count, check_face_size, check_mask, check_mouth, check_pose,
    evaluate_liveness, extract_embedding, LivenessReport, MaskCheck, PoseCheck,
};
use crate::imaging::Image;
use crate::mouth::MouthMetrics;
use crate::outcome::{
    Checks, ErrorCode, GateFailure, GateResult, GateStatus, Stage, StageFailure, StageRunner,
};
use crate::pose::HeadPose;
use crate::types::{Embedding, EMBEDDING_DIM};
use serde::Serialize;

/// Why a request was turned away.
///
/// `stage` is `None` when the input was rejected before any gate ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub stage: Option<Stage>,
    pub code: ErrorCode,
    pub reason: String,
    pub checks: Checks,
}

impl Rejection {
    fn from_stage(failure: StageFailure, checks: Checks) -> Self {
        Self {
            stage: Some(failure.stage),
            code: failure.failure.code,
            reason: failure.failure.reason,
            checks,
        }
    }

    fn before_gates(failure: GateFailure) -> Self {
        Self {
            stage: None,
            code: failure.code,
            reason: failure.reason,
            checks: Checks::default(),
        }
    }
}

/// Diagnostics gathered by the enrollment gates that passed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentReport {
    pub blur_score: f64,
    pub face_fraction: f32,
    pub pose: HeadPose,
    pub mouth: MouthMetrics,
    pub mask: MaskCheck,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Accepted {
        embedding: Embedding,
        report: EnrollmentReport,
        checks: Checks,
    },
    Rejected(Rejection),
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationResult::Accepted { .. })
    }
}

/// Outcome of a comparison that was actually reached.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchReport {
    pub comparison: Comparison,
    pub liveness: LivenessReport,
    pub checks: Checks,
}

/// Verification outcome. `NoMatch` and `Rejected` are both "not verified".
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationResult {
    Verified(MatchReport),
    NoMatch(MatchReport),
    Rejected {
        rejection: Rejection,
        liveness: LivenessReport,
    },
}

impl VerificationResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationResult::Verified(_))
    }

    pub fn checks(&self) -> &Checks {
        match self {
            VerificationResult::Verified(report) | VerificationResult::NoMatch(report) => {
                &report.checks
            }
            VerificationResult::Rejected { rejection, .. } => &rejection.checks,
        }
    }

    fn rejected_early(failure: GateFailure) -> Self {
        tracing::info!(code = %failure.code, reason = %failure.reason, "stored embedding rejected");
        VerificationResult::Rejected {
            rejection: Rejection::before_gates(failure),
            liveness: LivenessReport::default(),
        }
    }
}

/// Parse a stored embedding from its JSON text (a flat array of numbers).
pub fn parse_stored_embedding(raw: Option<&str>) -> GateResult<Embedding> {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        _ => {
            return Err(GateFailure::new(
                ErrorCode::MissingEmbedding,
                "stored_embedding is required.",
            ))
        }
    };
    let values: Vec<f32> = serde_json::from_str(raw).map_err(|e| {
        GateFailure::new(
            ErrorCode::InvalidEmbedding,
            format!("Invalid embedding format: {e}"),
        )
    })?;
    let embedding = Embedding::new(values);
    check_stored_embedding(&embedding)?;
    Ok(embedding)
}

fn check_stored_embedding(embedding: &Embedding) -> GateResult<()> {
    if embedding.is_well_formed() {
        return Ok(());
    }
    Err(GateFailure::new(
        ErrorCode::InvalidEmbedding,
        format!(
            "Invalid embedding format: expected {EMBEDDING_DIM} finite values, got {}",
            embedding.len()
        ),
    ))
}

/// Enrollment: blur, face count, face size, pose, mouth, mask, embedding.
#[derive(Debug, Clone)]
pub struct ValidationPipeline {
    collaborators: Collaborators,
    config: ValidationConfig,
}

impl ValidationPipeline {
    pub fn new(collaborators: Collaborators, config: ValidationConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    pub fn run(&self, image: &Image) -> ValidationResult {
        let mut runner = StageRunner::new();
        match self.evaluate(image, &mut runner) {
            Ok((embedding, report)) => {
                tracing::info!(
                    blur_score = report.blur_score,
                    face_fraction = report.face_fraction,
                    yaw = report.pose.yaw,
                    pitch = report.pose.pitch,
                    "profile accepted"
                );
                ValidationResult::Accepted {
                    embedding,
                    report,
                    checks: runner.into_checks(),
                }
            }
            Err(failure) => {
                ValidationResult::Rejected(Rejection::from_stage(failure, runner.into_checks()))
            }
        }
    }

    fn evaluate(
        &self,
        image: &Image,
        runner: &mut StageRunner,
    ) -> Result<(Embedding, EnrollmentReport), StageFailure> {
        let models = &self.collaborators;
        let config = &self.config;

        let blur_score = runner.run(Stage::Blur, || check_blur(image, config.blur_threshold))?;
        let detection = runner.run(Stage::FaceCount, || {
            check_face_count(models.detector.as_ref(), image)
        })?;
        let face_fraction = runner.run(Stage::FaceSize, || {
            check_face_size(image, &detection, config.min_face_fraction)
        })?;
        let PoseCheck { pose, landmarks } = runner.run(Stage::FacePose, || {
            check_pose(models.landmarks.as_ref(), image, &config.pose)
        })?;
        let mouth = runner.run(Stage::Mouth, || {
            check_mouth(&landmarks, config.min_mouth_width_ratio)
        })?;
        let mask = runner.run(Stage::Mask, || {
            check_mask(models.mask.as_deref(), image, config.mask_threshold)
        })?;
        let embedding = runner.run(Stage::Embedding, || {
            extract_embedding(models.embedder.as_ref(), image)
        })?;

        Ok((
            embedding,
            EnrollmentReport {
                blur_score,
                face_fraction,
                pose,
                mouth,
                mask,
            },
        ))
    }
}

/// Authentication: blur, face count, pose, liveness, embedding, comparison.
#[derive(Debug, Clone)]
pub struct VerificationPipeline {
    collaborators: Collaborators,
    config: VerificationConfig,
}

impl VerificationPipeline {
    pub fn new(collaborators: Collaborators, config: VerificationConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    /// Verify `image` against an already-parsed stored embedding.
    ///
    /// A malformed stored embedding is rejected before any collaborator is called.
    pub fn run(&self, image: &Image, stored: &Embedding, check_liveness: bool) -> VerificationResult {
        if let Err(failure) = check_stored_embedding(stored) {
            return VerificationResult::rejected_early(failure);
        }

        let mut runner = StageRunner::new();
        let mut liveness = LivenessReport::default();
        match self.evaluate(image, stored, check_liveness, &mut runner, &mut liveness) {
            Ok(comparison) => {
                let status = if comparison.verified {
                    GateStatus::Pass
                } else {
                    GateStatus::Fail
                };
                runner.record(Stage::Comparison, status);
                tracing::info!(
                    confidence = comparison.confidence,
                    verified = comparison.verified,
                    liveness_checked = !liveness.is_unavailable(),
                    "verification complete"
                );
                let report = MatchReport {
                    comparison,
                    liveness,
                    checks: runner.into_checks(),
                };
                if report.comparison.verified {
                    VerificationResult::Verified(report)
                } else {
                    VerificationResult::NoMatch(report)
                }
            }
            Err(failure) => VerificationResult::Rejected {
                rejection: Rejection::from_stage(failure, runner.into_checks()),
                liveness,
            },
        }
    }

    /// Verify against the raw JSON text of a stored embedding.
    pub fn run_json(
        &self,
        image: &Image,
        stored: Option<&str>,
        check_liveness: bool,
    ) -> VerificationResult {
        match parse_stored_embedding(stored) {
            Ok(embedding) => self.run(image, &embedding, check_liveness),
            Err(failure) => VerificationResult::rejected_early(failure),
        }
    }

    fn evaluate(
        &self,
        image: &Image,
        stored: &Embedding,
        check_liveness: bool,
        runner: &mut StageRunner,
        liveness: &mut LivenessReport,
    ) -> Result<Comparison, StageFailure> {
        let models = &self.collaborators;
        let config = &self.config;

        runner.run(Stage::Blur, || check_blur(image, config.blur_threshold))?;
        runner.run(Stage::FaceCount, || {
            check_face_count(models.detector.as_ref(), image)
        })?;
        runner.run(Stage::FacePose, || {
            check_pose(models.landmarks.as_ref(), image, &config.pose)
        })?;

        if check_liveness {
            let report = assess_liveness(models.liveness.as_ref(), image);
            let outcome = runner.run(Stage::Liveness, || evaluate_liveness(&report));
            *liveness = report;
            outcome?;
        } else {
            runner.skip(Stage::Liveness);
        }

        let live = runner.run(Stage::Embedding, || {
            extract_embedding(models.embedder.as_ref(), image)
        })?;

        Ok(compare(
            &stored.values,
            &live.values,
            config.similarity_threshold,
        ))
    }
}

/// Both pipelines over one shared set of collaborators.
#[derive(Debug, Clone)]
pub struct FaceGate {
    validation: ValidationPipeline,
    verification: VerificationPipeline,
}

impl FaceGate {
    pub fn new(collaborators: Collaborators, config: &FaceGateConfig) -> Self {
        Self {
            validation: ValidationPipeline::new(collaborators.clone(), config.validation.clone()),
            verification: VerificationPipeline::new(collaborators, config.verification.clone()),
        }
    }

    pub fn validate_profile(&self, image: &Image) -> ValidationResult {
        self.validation.run(image)
    }

    pub fn verify_face(
        &self,
        image: &Image,
        stored: &Embedding,
        check_liveness: bool,
    ) -> VerificationResult {
        self.verification.run(image, stored, check_liveness)
    }

    pub fn verify_face_json(
        &self,
        image: &Image,
        stored: Option<&str>,
        check_liveness: bool,
    ) -> VerificationResult {
        self.verification.run_json(image, stored, check_liveness)
    }
}
