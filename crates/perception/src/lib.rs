//! Perception Types for the Copiloto Engine
//!
//! Everything the engine consumes from the vision and sensor collaborators:
//! - Per-frame observations (face mesh, hands, body presence, head pose)
//! - Head pose acceptability and 2D head angles
//! - Face alignment onto the 112x112 embedding template
//! - Motion-sensor sleep/wake monitoring
//!
//! The landmark and embedding models themselves live outside this crate;
//! they are reached through [`FaceEncoder`].

pub mod align;
pub mod frame;
pub mod motion;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod pose;

pub use align::{align_face, AlignedFace, ALIGNED_FACE_SIZE};
pub use frame::{
    mesh, FaceLandmarks, FrameObservation, FrameSize, HandLandmarks, Landmark, Point, VideoFrame,
};
pub use motion::{MotionConfig, MotionMonitor, MotionSample, MotionSignal};
pub use pose::{head_angles, HeadAngles, HeadPose, PoseLimits};

use thiserror::Error;

/// Perception error types
#[derive(Error, Debug)]
pub enum PerceptionError {
    #[error("Face alignment failed")]
    AlignmentFailed,

    #[error("Embedding model not loaded")]
    ModelNotLoaded,

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Landmark {0} missing from face mesh")]
    LandmarkMissing(usize),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Maps a detected face to a unit-norm embedding vector.
///
/// Implementations own whatever model session they need. A failure of
/// either the alignment or the inference step is reported as an error and
/// never panics.
pub trait FaceEncoder {
    fn encode(
        &mut self,
        frame: &VideoFrame,
        face: &FaceLandmarks,
    ) -> Result<Vec<f32>, PerceptionError>;
}

/// L2-normalise a vector in place. Near-zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 1e-6 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
