//! Head pose and head angles

use crate::frame::{mesh, FaceLandmarks, FrameSize, Point};
use serde::{Deserialize, Serialize};

/// Head pose (Euler angles) as reported by the pose estimator
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Pitch (up-down tilt) in degrees
    pub pitch: f32,
    /// Yaw (left-right rotation) in degrees
    pub yaw: f32,
    /// Roll (side tilt) in degrees
    pub roll: f32,
}

impl HeadPose {
    pub fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Euclidean distance between two poses in angle space
    pub fn distance(&self, other: &HeadPose) -> f32 {
        ((self.pitch - other.pitch).powi(2)
            + (self.yaw - other.yaw).powi(2)
            + (self.roll - other.roll).powi(2))
        .sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite() && self.roll.is_finite()
    }
}

/// Maximum absolute head angles accepted for identification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseLimits {
    pub max_abs_pitch: f32,
    pub max_abs_yaw: f32,
    pub max_abs_roll: f32,
}

impl Default for PoseLimits {
    fn default() -> Self {
        Self {
            max_abs_pitch: 20.0,
            max_abs_yaw: 25.0,
            max_abs_roll: 20.0,
        }
    }
}

impl PoseLimits {
    /// Pure threshold check on every axis
    pub fn accepts(&self, pose: &HeadPose) -> bool {
        pose.is_finite()
            && pose.pitch.abs() <= self.max_abs_pitch
            && pose.yaw.abs() <= self.max_abs_yaw
            && pose.roll.abs() <= self.max_abs_roll
    }

    /// Acceptability of an optional pose; a missing pose is never acceptable
    pub fn accepts_opt(&self, pose: Option<&HeadPose>) -> bool {
        pose.map_or(false, |p| self.accepts(p))
    }
}

/// Head angles derived directly from the 2D face mesh, in degrees.
///
/// Both read about 0 for a frontal face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadAngles {
    /// Cheek-nose-cheek bend; moves when the head nods
    pub vertical: f32,
    /// Chin-nose-forehead bend; moves when the head turns
    pub horizontal: f32,
}

/// Signed angle ABC in degrees, in (-180, 180]
fn signed_angle(a: Point, b: Point, c: Point) -> f32 {
    let (bax, bay) = (a.x - b.x, a.y - b.y);
    let (bcx, bcy) = (c.x - b.x, c.y - b.y);
    let dot = bax * bcx + bay * bcy;
    let cross = bax * bcy - bay * bcx;
    cross.atan2(dot).to_degrees()
}

/// Deviation of a signed angle from a straight line, in (-180, 180]
fn bend(angle: f32) -> f32 {
    let d = angle - 180.0;
    if d <= -180.0 {
        d + 360.0
    } else {
        d
    }
}

/// Compute head angles from the face mesh. `None` when an anchor landmark
/// is missing or the geometry is degenerate.
pub fn head_angles(face: &FaceLandmarks, size: FrameSize) -> Option<HeadAngles> {
    let [right_cheek, left_cheek, nose, forehead, chin] = face.pixels(
        [
            mesh::RIGHT_CHEEK,
            mesh::LEFT_CHEEK,
            mesh::NOSE_TIP,
            mesh::FOREHEAD,
            mesh::CHIN,
        ],
        size,
    )?;

    if right_cheek.distance(&nose) < 1e-6
        || left_cheek.distance(&nose) < 1e-6
        || chin.distance(&nose) < 1e-6
        || forehead.distance(&nose) < 1e-6
    {
        return None;
    }

    let vertical = bend(signed_angle(right_cheek, nose, left_cheek));
    let horizontal = bend(signed_angle(chin, nose, forehead));
    if !vertical.is_finite() || !horizontal.is_finite() {
        return None;
    }

    Some(HeadAngles {
        vertical,
        horizontal,
    })
}
