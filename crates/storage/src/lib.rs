//! Storage Layer
//!
//! The persistence contract the engine talks to ([`BiometricStore`]) and an
//! in-memory repository implementing it, with snapshot files and event
//! analytics.

mod analytics;
mod repository;

pub use analytics::EventAnalytics;
pub use repository::{AccessOutcome, AccessRecord, BehaviorEventRecord, Repository};

use alerting::SessionSummary;
use chrono::{DateTime, Utc};
use dms::CalibrationProfile;
use identity::{EnrolledEmbedding, User};
use perception::HeadPose;
use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User not found: {0}")]
    UserNotFound(Uuid),
    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(#[from] identity::IdentityError),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence operations used by the session engine
pub trait BiometricStore {
    /// Every (user, embedding, pose) tuple produced by `model`
    fn known_embeddings(&self, model: &str) -> Result<Vec<EnrolledEmbedding>, StorageError>;

    /// Create a user with the next sequential code
    fn register_user(&self, at: DateTime<Utc>) -> Result<User, StorageError>;

    /// Store an embedding for an existing user; returns the embedding id
    fn add_embedding(
        &self,
        user_id: Uuid,
        vector: &[f32],
        model: &str,
        pose: Option<HeadPose>,
        at: DateTime<Utc>,
    ) -> Result<Uuid, StorageError>;

    fn load_calibration(&self, user_id: Uuid) -> Result<Option<CalibrationProfile>, StorageError>;

    fn save_calibration(
        &self,
        user_id: Uuid,
        profile: &CalibrationProfile,
    ) -> Result<(), StorageError>;

    fn log_behavior_event(
        &self,
        user_id: Option<Uuid>,
        event: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    fn log_access(
        &self,
        user_id: Option<Uuid>,
        outcome: AccessOutcome,
        similarity: f32,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    fn save_session_summary(&self, summary: &SessionSummary) -> Result<(), StorageError>;
}
