//! Cosine comparison of two identity embeddings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default cosine similarity at or above which two embeddings are the same person.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComparisonError {
    #[error("embedding length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("embedding is empty")]
    Empty,
    #[error("embedding has zero norm")]
    ZeroNorm,
    #[error("embedding contains non-finite values")]
    NonFinite,
}

/// Match decision between two embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Cosine similarity clamped to [0, 1], rounded to 4 decimals.
    pub confidence: f32,
    pub is_same_person: bool,
    pub verified: bool,
}

impl Comparison {
    /// Classify an already-computed similarity. The threshold is inclusive.
    pub fn from_similarity(similarity: f32, threshold: f32) -> Self {
        let similarity = similarity.clamp(0.0, 1.0);
        let is_same_person = similarity >= threshold;
        Self {
            confidence: round4(similarity),
            is_same_person,
            verified: is_same_person,
        }
    }

    /// Zero-confidence, unverified result used when the inputs are malformed.
    pub fn rejected() -> Self {
        Self {
            confidence: 0.0,
            is_same_person: false,
            verified: false,
        }
    }
}

/// Round to 4 decimal places, the precision scores are reported at.
pub(crate) fn round4(value: f32) -> f32 {
    ((value as f64 * 10_000.0).round() / 10_000.0) as f32
}

fn unit(values: &[f32]) -> Result<Vec<f64>, ComparisonError> {
    if values.is_empty() {
        return Err(ComparisonError::Empty);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ComparisonError::NonFinite);
    }
    let norm = values
        .iter()
        .map(|&v| (v as f64) * (v as f64))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(ComparisonError::ZeroNorm);
    }
    Ok(values.iter().map(|&v| v as f64 / norm).collect())
}

/// Cosine similarity of two equal-length vectors, in [-1, 1].
///
/// Each vector is normalized to unit L2 norm before the dot product.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, ComparisonError> {
    if a.len() != b.len() {
        return Err(ComparisonError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let a = unit(a)?;
    let b = unit(b)?;
    let dot: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
    Ok(dot.clamp(-1.0, 1.0) as f32)
}

/// Compare two embeddings, returning an error for malformed input.
pub fn try_compare(a: &[f32], b: &[f32], threshold: f32) -> Result<Comparison, ComparisonError> {
    let similarity = cosine_similarity(a, b)?;
    Ok(Comparison::from_similarity(similarity, threshold))
}

/// Compare two embeddings. Malformed input yields [`Comparison::rejected`], never an error.
pub fn compare(a: &[f32], b: &[f32], threshold: f32) -> Comparison {
    match try_compare(a, b, threshold) {
        Ok(comparison) => {
            tracing::debug!(
                similarity = comparison.confidence,
                threshold,
                matched = comparison.is_same_person,
                "embedding comparison"
            );
            comparison
        }
        Err(e) => {
            tracing::warn!(error = %e, "embedding comparison failed");
            Comparison::rejected()
        }
    }
}
