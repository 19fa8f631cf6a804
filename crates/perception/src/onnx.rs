//! ONNX Runtime face encoder (ArcFace-style 112x112 models)

use crate::align::align_face;
use crate::frame::{FaceLandmarks, VideoFrame};
use crate::{l2_normalize, FaceEncoder, PerceptionError};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tracing::{debug, error, info};

/// Face encoder backed by an ONNX Runtime session
pub struct OnnxFaceEncoder {
    session: Session,
    model_path: String,
}

impl OnnxFaceEncoder {
    /// Load the embedding model from disk
    pub fn load(model_path: &str) -> Result<Self, PerceptionError> {
        info!("Loading face embedding model from {}", model_path);
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| {
                error!("Failed to load embedding model: {}", e);
                PerceptionError::ModelLoad(e.to_string())
            })?;

        Ok(Self {
            session,
            model_path: model_path.to_string(),
        })
    }

    pub fn model_path(&self) -> &str {
        &self.model_path
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode(
        &mut self,
        frame: &VideoFrame,
        face: &FaceLandmarks,
    ) -> Result<Vec<f32>, PerceptionError> {
        let chip = align_face(frame, face).ok_or(PerceptionError::AlignmentFailed)?;
        let input = chip.to_tensor();

        let inputs =
            ort::inputs![input].map_err(|e| PerceptionError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| PerceptionError::Inference(e.to_string()))?;
        let raw = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| PerceptionError::Inference(e.to_string()))?;

        let mut embedding: Vec<f32> = raw.iter().copied().collect();
        if embedding.is_empty() {
            return Err(PerceptionError::Inference("empty embedding".into()));
        }
        l2_normalize(&mut embedding);
        debug!("Face embedding computed ({} dims)", embedding.len());
        Ok(embedding)
    }
}
