//! Frame and landmark types

use serde::{Deserialize, Serialize};

/// Face mesh landmark indices used by the engine (468-point mesh, 478 with
/// refined irises).
pub mod mesh {
    /// Left eye contour, ordered p1..p6 for EAR
    pub const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
    /// Right eye contour, ordered p1..p6 for EAR
    pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
    /// Mouth: left corner, right corner, upper lip, lower lip
    pub const MOUTH: [usize; 4] = [61, 291, 0, 17];
    /// Left iris: centre followed by the four ring points
    pub const LEFT_IRIS: [usize; 5] = [468, 469, 470, 471, 472];
    /// Right iris: centre followed by the four ring points
    pub const RIGHT_IRIS: [usize; 5] = [473, 474, 475, 476, 477];
    /// Points averaged into the left eye centre (eye-rub proximity)
    pub const LEFT_EYE_CENTER: [usize; 4] = [33, 160, 158, 133];
    /// Points averaged into the right eye centre (eye-rub proximity)
    pub const RIGHT_EYE_CENTER: [usize; 4] = [263, 387, 385, 362];
    pub const LEFT_CHEEK: usize = 234;
    pub const RIGHT_CHEEK: usize = 454;
    pub const NOSE_TIP: usize = 4;
    pub const FOREHEAD: usize = 10;
    pub const CHIN: usize = 152;
    /// Alignment anchors: eye corners, nose tip, mouth corners
    pub const ALIGNMENT: [usize; 5] = [33, 263, 1, 61, 291];
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// A point in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Arithmetic mean of a set of points
    pub fn centroid(points: &[Point]) -> Option<Point> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f32;
        let (sx, sy) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point::new(sx / n, sy / n))
    }
}

/// Normalised landmark (x, y in [0, 1] of the frame; z relative depth)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Convert to pixel coordinates
    pub fn to_pixel(&self, size: FrameSize) -> Point {
        Point::new(self.x * size.width as f32, self.y * size.height as f32)
    }
}

/// Face mesh for a single detected face
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub points: Vec<Landmark>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Normalised landmark at `index`, if the mesh has it
    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.points.get(index).copied()
    }

    /// Landmark at `index` in pixel coordinates
    pub fn pixel(&self, index: usize, size: FrameSize) -> Option<Point> {
        self.get(index).map(|lm| lm.to_pixel(size))
    }

    /// Gather several landmarks in pixel space; `None` if any is missing
    pub fn pixels<const N: usize>(
        &self,
        indices: [usize; N],
        size: FrameSize,
    ) -> Option<[Point; N]> {
        let mut out = [Point::default(); N];
        for (slot, index) in out.iter_mut().zip(indices) {
            *slot = self.pixel(index, size)?;
        }
        Some(out)
    }
}

/// Hand landmarks (21-point hand model)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandLandmarks {
    pub points: Vec<Landmark>,
}

impl HandLandmarks {
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_FINGER_TIP: usize = 8;
    pub const MIDDLE_FINGER_TIP: usize = 12;

    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    /// Fingertips that can touch the eyes, in pixel space
    pub fn fingertips(&self, size: FrameSize) -> impl Iterator<Item = Point> + '_ {
        [Self::THUMB_TIP, Self::INDEX_FINGER_TIP, Self::MIDDLE_FINGER_TIP]
            .into_iter()
            .filter_map(move |i| self.points.get(i).map(|lm| lm.to_pixel(size)))
    }
}

/// Everything the detectors know about one frame.
///
/// Created fresh for every frame and dropped once the frame is processed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameObservation {
    #[serde(default)]
    pub size: FrameSize,
    /// Face mesh of the first detected face
    #[serde(default)]
    pub face: Option<FaceLandmarks>,
    /// All detected hands
    #[serde(default)]
    pub hands: Vec<HandLandmarks>,
    /// Body-pose presence; `None` when no pose stream is available
    #[serde(default)]
    pub body_detected: Option<bool>,
    /// Head pose from the pose estimator, when it succeeded
    #[serde(default)]
    pub head_pose: Option<crate::HeadPose>,
}

impl FrameObservation {
    pub fn face_detected(&self) -> bool {
        self.face.is_some()
    }

    pub fn body_detected(&self) -> bool {
        self.body_detected.unwrap_or(false)
    }

    /// User counts as present when either the face or the body is seen
    pub fn user_present(&self) -> bool {
        self.face_detected() || self.body_detected()
    }
}

/// Decoded RGB video frame
#[derive(Debug, Clone, Default)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Frame without pixel data, for pipelines that only carry landmarks
    pub fn empty(size: FrameSize, sequence: u32) -> Self {
        Self {
            data: Vec::new(),
            width: size.width,
            height: size.height,
            timestamp_ns: 0,
            sequence,
        }
    }

    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn has_pixels(&self) -> bool {
        !self.data.is_empty()
            && self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }

    /// Borrow the pixels as an `image` buffer
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        if !self.has_pixels() {
            return None;
        }
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}
