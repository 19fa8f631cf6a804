//! User Identity Module
//!
//! Face-embedding based identification:
//! - User and enrolled-embedding records
//! - Identity matching over every known embedding
//! - Pose novelty checks for profile enrichment

pub mod matcher;
pub mod user;

pub use matcher::{find_match, is_novel_pose, similarity, IdentityMatch};
pub use user::{EmbeddingRecord, EnrolledEmbedding, User};

use thiserror::Error;

/// Identity error types
#[derive(Error, Debug, PartialEq)]
pub enum IdentityError {
    #[error("Embedding is empty")]
    EmptyEmbedding,

    #[error("Embedding contains non-finite values")]
    NonFiniteEmbedding,

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Check that an embedding can be stored and compared
pub fn validate_embedding(vector: &[f32]) -> Result<(), IdentityError> {
    if vector.is_empty() {
        return Err(IdentityError::EmptyEmbedding);
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(IdentityError::NonFiniteEmbedding);
    }
    Ok(())
}
