//! Geometric mouth-occlusion check, a cheap backup to the mask classifier.
//!
//! A mask or hand over the mouth collapses the detected mouth-corner spread
//! relative to the nose-to-chin height.

use crate::outcome::{ErrorCode, GateFailure, GateResult};
use crate::pose::{LandmarkError, DISTANCE_EPSILON};
use crate::types::{Feature, LandmarkSet};
use serde::{Deserialize, Serialize};

/// Mouth proportions relative to the nose-to-chin height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MouthMetrics {
    pub width_ratio: f32,
    pub height_ratio: f32,
}

/// Measure mouth width and lip opening against the lower face height.
///
/// Both ratios are 0.0 when the nose-to-chin height is degenerate.
pub fn measure_mouth(landmarks: &LandmarkSet) -> Result<MouthMetrics, LandmarkError> {
    let get = |f| landmarks.feature(f).ok_or(LandmarkError::NoLandmarks);
    let upper_lip = get(Feature::UpperLip)?;
    let lower_lip = get(Feature::LowerLip)?;
    let left_corner = get(Feature::LeftMouthCorner)?;
    let right_corner = get(Feature::RightMouthCorner)?;
    let nose = get(Feature::NoseTip)?;
    let chin = get(Feature::Chin)?;

    let mouth_width = (right_corner.x - left_corner.x).abs();
    let mouth_height = (lower_lip.y - upper_lip.y).abs();
    let face_height = (chin.y - nose.y).abs();

    if face_height <= DISTANCE_EPSILON {
        return Ok(MouthMetrics {
            width_ratio: 0.0,
            height_ratio: 0.0,
        });
    }

    Ok(MouthMetrics {
        width_ratio: mouth_width / face_height,
        height_ratio: mouth_height / face_height,
    })
}

/// Fail with `MOUTH_COVERED` when the width ratio is below `min_width_ratio`.
pub fn evaluate_mouth(metrics: MouthMetrics, min_width_ratio: f32) -> GateResult<MouthMetrics> {
    if metrics.width_ratio < min_width_ratio {
        return Err(GateFailure::new(
            ErrorCode::MouthCovered,
            "Mouth area appears to be covered. Please remove mask or any obstruction.",
        ));
    }
    tracing::debug!(
        width_ratio = metrics.width_ratio,
        height_ratio = metrics.height_ratio,
        "mouth check passed"
    );
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Point, MESH_LANDMARK_COUNT};

    fn mouth(width: f32, nose_y: f32, chin_y: f32) -> LandmarkSet {
        let mut points = vec![Point::new(0.5, 0.5); MESH_LANDMARK_COUNT];
        points[Feature::NoseTip.mesh_index()] = Point::new(0.5, nose_y);
        points[Feature::Chin.mesh_index()] = Point::new(0.5, chin_y);
        points[Feature::LeftMouthCorner.mesh_index()] = Point::new(0.5 - width / 2.0, 0.72);
        points[Feature::RightMouthCorner.mesh_index()] = Point::new(0.5 + width / 2.0, 0.72);
        points[Feature::UpperLip.mesh_index()] = Point::new(0.5, 0.71);
        points[Feature::LowerLip.mesh_index()] = Point::new(0.5, 0.74);
        LandmarkSet::new(points)
    }

    #[test]
    fn test_ratio_0_11_is_covered() {
        let metrics = measure_mouth(&mouth(0.033, 0.5, 0.8)).unwrap();
        assert!((metrics.width_ratio - 0.11).abs() < 1e-4, "{}", metrics.width_ratio);
        let err = evaluate_mouth(metrics, 0.12).unwrap_err();
        assert_eq!(err.code, ErrorCode::MouthCovered);
    }

    #[test]
    fn test_ratio_0_13_passes() {
        let metrics = measure_mouth(&mouth(0.039, 0.5, 0.8)).unwrap();
        assert!((metrics.width_ratio - 0.13).abs() < 1e-4, "{}", metrics.width_ratio);
        assert!(evaluate_mouth(metrics, 0.12).is_ok());
    }

    #[test]
    fn test_height_ratio_reported() {
        let metrics = measure_mouth(&mouth(0.1, 0.5, 0.8)).unwrap();
        assert!((metrics.height_ratio - 0.1).abs() < 1e-4, "{}", metrics.height_ratio);
    }

    #[test]
    fn test_degenerate_face_height_gives_zero_ratio() {
        let metrics = measure_mouth(&mouth(0.2, 0.6, 0.6)).unwrap();
        assert_eq!(metrics.width_ratio, 0.0);
        assert!(evaluate_mouth(metrics, 0.12).is_err());
    }

    #[test]
    fn test_missing_landmarks() {
        let set = LandmarkSet::new(vec![Point::new(0.5, 0.5); 100]);
        assert_eq!(measure_mouth(&set), Err(LandmarkError::NoLandmarks));
    }
}
