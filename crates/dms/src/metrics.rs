//! Facial metric extraction
//!
//! Pure functions of the face mesh and frame size:
//! - EAR: eye aspect ratio, averaged over both eyes
//! - MAR: mouth opening over mouth width
//! - PUC: iris circularity, 4πA/P² with a Ramanujan ellipse perimeter
//! - MOE: MAR over EAR, calibration-normalised when a profile exists

use crate::calibration::CalibrationProfile;
use perception::{mesh, FaceLandmarks, FrameSize, HandLandmarks, Point};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

const EPSILON: f32 = 1e-6;

/// Metrics for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FacialMetrics {
    pub ear: f32,
    pub mar: f32,
    pub puc: f32,
    pub moe: f32,
}

impl FacialMetrics {
    /// Extract all metrics. `calibration` only affects MOE.
    pub fn extract(
        face: &FaceLandmarks,
        size: FrameSize,
        calibration: Option<&CalibrationProfile>,
    ) -> Self {
        let ear = eye_aspect_ratio(face, size);
        let mar = mouth_aspect_ratio(face, size);
        let puc = pupil_circularity(face, size);
        let moe = mouth_over_eye(ear, mar, calibration);
        Self { ear, mar, puc, moe }
    }
}

fn single_eye_ratio(p: &[Point; 6]) -> f32 {
    let vertical_a = p[1].distance(&p[5]);
    let vertical_b = p[2].distance(&p[4]);
    let horizontal = p[0].distance(&p[3]);
    if horizontal > EPSILON {
        (vertical_a + vertical_b) / (2.0 * horizontal)
    } else {
        0.0
    }
}

/// Average EAR over both eyes; 0 when the eye contour is missing
pub fn eye_aspect_ratio(face: &FaceLandmarks, size: FrameSize) -> f32 {
    let left = face.pixels(mesh::LEFT_EYE, size);
    let right = face.pixels(mesh::RIGHT_EYE, size);
    match (left, right) {
        (Some(l), Some(r)) => (single_eye_ratio(&l) + single_eye_ratio(&r)) / 2.0,
        _ => 0.0,
    }
}

/// Vertical lip distance over horizontal mouth width
pub fn mouth_aspect_ratio(face: &FaceLandmarks, size: FrameSize) -> f32 {
    let Some([left, right, upper, lower]) = face.pixels(mesh::MOUTH, size) else {
        return 0.0;
    };
    let width = left.distance(&right);
    if width > EPSILON {
        upper.distance(&lower) / width
    } else {
        0.0
    }
}

/// Circularity of one iris ring; 0 when degenerate or missing
fn iris_circularity(face: &FaceLandmarks, indices: [usize; 5], size: FrameSize) -> f32 {
    let Some(iris) = face.pixels(indices, size) else {
        return 0.0;
    };
    let a = iris[2].distance(&iris[4]) / 2.0;
    let b = iris[1].distance(&iris[3]) / 2.0;
    if a < EPSILON || b < EPSILON {
        return 0.0;
    }

    let area = PI * a * b;
    let perimeter = PI * (3.0 * (a + b) - ((3.0 * a + b) * (a + 3.0 * b)).sqrt());
    if perimeter < EPSILON {
        return 0.0;
    }
    ((4.0 * PI * area) / (perimeter * perimeter)).clamp(0.0, 1.0)
}

/// Iris circularity, averaged when both eyes are usable, otherwise the
/// usable eye alone, otherwise 0
pub fn pupil_circularity(face: &FaceLandmarks, size: FrameSize) -> f32 {
    let left = iris_circularity(face, mesh::LEFT_IRIS, size);
    let right = iris_circularity(face, mesh::RIGHT_IRIS, size);
    if left > 0.0 && right > 0.0 {
        (left + right) / 2.0
    } else {
        left.max(right)
    }
}

/// MAR over EAR, each normalised by its calibrated mean when available
pub fn mouth_over_eye(ear: f32, mar: f32, calibration: Option<&CalibrationProfile>) -> f32 {
    match calibration {
        Some(cal) => {
            let ear_norm = if cal.ear.mean > EPSILON { ear / cal.ear.mean } else { 1.0 };
            let mar_norm = if cal.mar.mean > EPSILON { mar / cal.mar.mean } else { 1.0 };
            if ear_norm > EPSILON {
                mar_norm / ear_norm
            } else {
                mar_norm
            }
        }
        None => {
            if ear > EPSILON {
                mar / ear
            } else {
                mar
            }
        }
    }
}

/// Which eyes a hand is touching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EyeRub {
    None,
    Left,
    Right,
    Both,
}

impl EyeRub {
    pub fn is_rubbing(&self) -> bool {
        !matches!(self, EyeRub::None)
    }
}

/// Fingertip proximity to either eye centre, within `radius_factor` times
/// the inter-eye distance
pub fn detect_eye_rub(
    face: &FaceLandmarks,
    hands: &[HandLandmarks],
    size: FrameSize,
    radius_factor: f32,
) -> EyeRub {
    if hands.is_empty() {
        return EyeRub::None;
    }
    let left_center = face
        .pixels(mesh::LEFT_EYE_CENTER, size)
        .and_then(|pts| Point::centroid(&pts));
    let right_center = face
        .pixels(mesh::RIGHT_EYE_CENTER, size)
        .and_then(|pts| Point::centroid(&pts));
    let (Some(left_center), Some(right_center)) = (left_center, right_center) else {
        return EyeRub::None;
    };

    let radius = left_center.distance(&right_center) * radius_factor;
    let mut left = false;
    let mut right = false;
    for tip in hands.iter().flat_map(|hand| hand.fingertips(size)) {
        left |= tip.distance(&left_center) < radius;
        right |= tip.distance(&right_center) < radius;
    }

    match (left, right) {
        (true, true) => EyeRub::Both,
        (true, false) => EyeRub::Left,
        (false, true) => EyeRub::Right,
        (false, false) => EyeRub::None,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use perception::{mesh, FaceLandmarks, Landmark};

    /// Synthetic mesh with open eyes, closed mouth and round irises.
    /// `eye_open` and `mouth_open` scale the vertical openings.
    pub fn face(eye_open: f32, mouth_open: f32) -> FaceLandmarks {
        let mut points = vec![Landmark::new(0.5, 0.5); 478];
        let mut eye = |idx: [usize; 6], cx: f32| {
            points[idx[0]] = Landmark::new(cx - 0.05, 0.4);
            points[idx[3]] = Landmark::new(cx + 0.05, 0.4);
            points[idx[1]] = Landmark::new(cx - 0.02, 0.4 - eye_open);
            points[idx[5]] = Landmark::new(cx - 0.02, 0.4 + eye_open);
            points[idx[2]] = Landmark::new(cx + 0.02, 0.4 - eye_open);
            points[idx[4]] = Landmark::new(cx + 0.02, 0.4 + eye_open);
        };
        eye(mesh::RIGHT_EYE, 0.35);
        eye(mesh::LEFT_EYE, 0.65);

        points[mesh::MOUTH[0]] = Landmark::new(0.4, 0.7);
        points[mesh::MOUTH[1]] = Landmark::new(0.6, 0.7);
        points[mesh::MOUTH[2]] = Landmark::new(0.5, 0.7 - mouth_open);
        points[mesh::MOUTH[3]] = Landmark::new(0.5, 0.7 + mouth_open);

        for (iris, cx) in [(mesh::RIGHT_IRIS, 0.35), (mesh::LEFT_IRIS, 0.65)] {
            points[iris[0]] = Landmark::new(cx, 0.4);
            points[iris[1]] = Landmark::new(cx + 0.01, 0.4);
            points[iris[2]] = Landmark::new(cx, 0.39);
            points[iris[3]] = Landmark::new(cx - 0.01, 0.4);
            points[iris[4]] = Landmark::new(cx, 0.41);
        }
        FaceLandmarks::new(points)
    }
}
