//! Head pose (yaw/pitch) approximated from 2D landmark distance ratios.
//!
//! No camera intrinsics or 3D solve: yaw comes from the asymmetry of
//! nose-to-cheek distances, pitch from the forehead-to-nose over
//! nose-to-chin ratio. The constants are empirical.

use crate::outcome::{ErrorCode, GateFailure, GateResult};
use crate::types::{Feature, LandmarkSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distances below this are treated as degenerate (landmarks collapsed).
pub const DISTANCE_EPSILON: f32 = 0.001;

/// Yaw reported for a fully one-sided face (ratio 0).
const YAW_FULL_SCALE_DEG: f32 = 60.0;
/// Degrees of pitch per unit of (ratio - 1).
const PITCH_SCALE_DEG: f32 = 25.0;
const PITCH_RATIO_MIN: f32 = 0.5;
const PITCH_RATIO_MAX: f32 = 1.6;
/// Pitch reported when the ratio falls outside [`PITCH_RATIO_MIN`, `PITCH_RATIO_MAX`].
const PITCH_SATURATED_DEG: f32 = 35.0;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkError {
    #[error("required facial landmarks are missing")]
    NoLandmarks,
}

/// Estimated head rotation in degrees.
///
/// Positive yaw is turned right, positive pitch is tilted down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw: f32,
    pub pitch: f32,
}

/// Maximum tolerated rotation for the pose gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseLimits {
    pub max_yaw: f32,
    pub max_pitch: f32,
}

impl Default for PoseLimits {
    fn default() -> Self {
        Self {
            max_yaw: 25.0,
            max_pitch: 25.0,
        }
    }
}

/// Yaw from horizontal nose-to-cheek distances.
pub fn yaw_from_distances(d_left: f32, d_right: f32) -> f32 {
    if d_left <= DISTANCE_EPSILON || d_right <= DISTANCE_EPSILON {
        return 0.0;
    }
    let ratio = d_left.min(d_right) / d_left.max(d_right);
    let angle = (1.0 - ratio) * YAW_FULL_SCALE_DEG;
    if d_left > d_right {
        angle
    } else {
        -angle
    }
}

/// Pitch from vertical forehead-to-nose and nose-to-chin distances.
pub fn pitch_from_distances(d_forehead: f32, d_chin: f32) -> f32 {
    if d_chin <= DISTANCE_EPSILON {
        return 0.0;
    }
    let ratio = d_forehead / d_chin;
    if ratio < PITCH_RATIO_MIN {
        -PITCH_SATURATED_DEG
    } else if ratio > PITCH_RATIO_MAX {
        PITCH_SATURATED_DEG
    } else {
        (ratio - 1.0) * PITCH_SCALE_DEG
    }
}

/// Estimate yaw and pitch from the nose tip, cheeks, forehead and chin.
pub fn estimate_pose(landmarks: &LandmarkSet) -> Result<HeadPose, LandmarkError> {
    let get = |f| landmarks.feature(f).ok_or(LandmarkError::NoLandmarks);
    let nose = get(Feature::NoseTip)?;
    let left_cheek = get(Feature::LeftCheek)?;
    let right_cheek = get(Feature::RightCheek)?;
    let forehead = get(Feature::Forehead)?;
    let chin = get(Feature::Chin)?;

    let yaw = yaw_from_distances((nose.x - left_cheek.x).abs(), (nose.x - right_cheek.x).abs());
    let pitch = pitch_from_distances((forehead.y - nose.y).abs(), (nose.y - chin.y).abs());

    Ok(HeadPose { yaw, pitch })
}

/// Reject a pose that exceeds the limits, naming the offending direction.
pub fn evaluate_pose(pose: HeadPose, limits: &PoseLimits) -> GateResult<HeadPose> {
    if pose.yaw.abs() > limits.max_yaw {
        let direction = if pose.yaw > 0.0 { "right" } else { "left" };
        return Err(GateFailure::new(
            ErrorCode::FaceNotFrontal,
            format!(
                "Face is turned too much to the {direction} ({:.0}°). Please look straight at camera.",
                pose.yaw.abs()
            ),
        ));
    }
    if pose.pitch.abs() > limits.max_pitch {
        let direction = if pose.pitch > 0.0 { "down" } else { "up" };
        return Err(GateFailure::new(
            ErrorCode::FaceNotFrontal,
            format!("Face is tilted too much {direction}. Please look straight at camera."),
        ));
    }
    Ok(pose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Point, MESH_LANDMARK_COUNT};

    fn face(nose: (f32, f32), left: f32, right: f32, forehead: f32, chin: f32) -> LandmarkSet {
        let mut points = vec![Point::new(0.5, 0.5); MESH_LANDMARK_COUNT];
        points[Feature::NoseTip.mesh_index()] = Point::new(nose.0, nose.1);
        points[Feature::LeftCheek.mesh_index()] = Point::new(left, nose.1);
        points[Feature::RightCheek.mesh_index()] = Point::new(right, nose.1);
        points[Feature::Forehead.mesh_index()] = Point::new(nose.0, forehead);
        points[Feature::Chin.mesh_index()] = Point::new(nose.0, chin);
        LandmarkSet::new(points)
    }

    #[test]
    fn test_symmetric_face_has_zero_yaw() {
        for d in [0.002f32, 0.05, 0.25, 0.5, 1.0] {
            assert_eq!(yaw_from_distances(d, d), 0.0);
        }
        for half_width in [0.05f32, 0.1, 0.2, 0.3] {
            let set = face((0.5, 0.5), 0.5 - half_width, 0.5 + half_width, 0.3, 0.7);
            let pose = estimate_pose(&set).unwrap();
            assert!(pose.yaw.abs() < 1e-4, "half_width {half_width}: yaw {}", pose.yaw);
        }
    }

    #[test]
    fn test_yaw_sign() {
        // Nose closer to the right cheek: turned right.
        assert!(yaw_from_distances(0.3, 0.1) > 0.0);
        assert!(yaw_from_distances(0.1, 0.3) < 0.0);
    }

    #[test]
    fn test_yaw_degenerate_distance_is_zero() {
        assert_eq!(yaw_from_distances(0.0005, 0.3), 0.0);
        assert_eq!(yaw_from_distances(0.3, 0.0), 0.0);
    }

    #[test]
    fn test_yaw_magnitude() {
        // ratio 0.5 -> (1 - 0.5) * 60 = 30
        assert!((yaw_from_distances(0.2, 0.1) - 30.0).abs() < 1e-4);
    }

    #[test]
    fn test_pitch_degenerate_chin_is_zero() {
        for forehead in [0.0f32, 0.1, 0.5, 2.0] {
            assert_eq!(pitch_from_distances(forehead, 0.0), 0.0);
            assert_eq!(pitch_from_distances(forehead, 0.0009), 0.0);
        }
    }

    #[test]
    fn test_pitch_saturates() {
        assert_eq!(pitch_from_distances(0.04, 0.1), -35.0);
        assert_eq!(pitch_from_distances(0.17, 0.1), 35.0);
    }

    #[test]
    fn test_pitch_linear_region() {
        // ratio 1.2 -> 0.2 * 25 = 5
        assert!((pitch_from_distances(0.12, 0.1) - 5.0).abs() < 1e-4);
        assert!(pitch_from_distances(0.1, 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_estimate_pose_missing_landmarks() {
        assert_eq!(
            estimate_pose(&LandmarkSet::default()),
            Err(LandmarkError::NoLandmarks)
        );
        let short = LandmarkSet::new(vec![Point::new(0.5, 0.5); 200]);
        assert_eq!(estimate_pose(&short), Err(LandmarkError::NoLandmarks));
    }

    #[test]
    fn test_yaw_26_rejected_24_passes() {
        let limits = PoseLimits::default();
        // (1 - 0.17/0.3) * 60 = 26
        let turned = estimate_pose(&face((0.5, 0.5), 0.2, 0.67, 0.4, 0.6)).unwrap();
        assert!((turned.yaw - 26.0).abs() < 1e-3, "yaw {}", turned.yaw);
        let err = evaluate_pose(turned, &limits).unwrap_err();
        assert_eq!(err.code, ErrorCode::FaceNotFrontal);
        assert!(err.reason.contains("right"), "{}", err.reason);

        // (1 - 0.18/0.3) * 60 = 24
        let slight = estimate_pose(&face((0.5, 0.5), 0.2, 0.68, 0.4, 0.6)).unwrap();
        assert!((slight.yaw - 24.0).abs() < 1e-3, "yaw {}", slight.yaw);
        assert!(evaluate_pose(slight, &limits).is_ok());
    }

    #[test]
    fn test_pitch_direction_in_reason() {
        let limits = PoseLimits::default();
        let up = evaluate_pose(HeadPose { yaw: 0.0, pitch: -35.0 }, &limits).unwrap_err();
        assert!(up.reason.contains("up"), "{}", up.reason);
        let down = evaluate_pose(HeadPose { yaw: 0.0, pitch: 35.0 }, &limits).unwrap_err();
        assert!(down.reason.contains("down"), "{}", down.reason);
    }

    #[test]
    fn test_left_turn_reason() {
        let err = evaluate_pose(HeadPose { yaw: -40.0, pitch: 0.0 }, &PoseLimits::default())
            .unwrap_err();
        assert!(err.reason.contains("left"), "{}", err.reason);
        assert!(err.reason.contains("40°"), "{}", err.reason);
    }
}
