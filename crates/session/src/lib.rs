//! Copiloto Session Engine
//!
//! Top-level controller that sequences identification, auto-registration,
//! calibration and fatigue monitoring for the person in front of the
//! camera, one frame at a time.

pub mod config;
pub mod engine;
pub mod enrichment;
pub mod state;

pub use config::{
    CalibrationConfig, CameraConfig, ConfigError, EngineConfig, EnrichmentConfig, LoggingConfig,
    RecognitionConfig, ReportingConfig, StateMachineConfig,
};
pub use engine::SessionEngine;
pub use enrichment::ProfileEnricher;
pub use state::{ActiveUser, FrameReport, SessionState, Transition};

use thiserror::Error;

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Face encoding failed: {0}")]
    Encoding(#[from] perception::PerceptionError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] dms::DmsError),
}
