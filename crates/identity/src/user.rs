//! User and embedding records

use chrono::{DateTime, Utc};
use dms::CalibrationProfile;
use perception::HeadPose;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Human-readable code, e.g. `USUARIO_0007`
    pub code: String,
    pub created_at: DateTime<Utc>,
    /// Set once, after the first calibration
    pub calibration: Option<CalibrationProfile>,
}

impl User {
    pub fn new(code: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            created_at,
            calibration: None,
        }
    }
}

/// A stored face embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub vector: Vec<f32>,
    /// Embedding model that produced the vector
    pub model: String,
    /// Head pose at capture time
    pub pose: Option<HeadPose>,
    pub created_at: DateTime<Utc>,
}

/// Candidate for matching: one embedding with its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledEmbedding {
    pub user_id: Uuid,
    pub user_code: String,
    pub vector: Vec<f32>,
    pub pose: Option<HeadPose>,
}
