//! Driver Monitoring System (DMS)
//!
//! Per-frame behavioural analysis of the monitored user:
//! - Facial metrics (EAR, MAR, PUC, MOE) from the face mesh
//! - Per-user calibration baseline
//! - Nod (microsleep) detection from head angle history
//! - Active-pause (periodic break) timer
//! - Debounced, rate-limited fatigue and distraction events

pub mod active_pause;
pub mod analysis;
pub mod calibration;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod metrics;
pub mod nod;
pub mod state;

pub use active_pause::{ActivePauseHandler, PauseReading};
pub use analysis::{FatigueAnalysis, FatigueEvent, OverlayData};
pub use calibration::{CalibrationManager, CalibrationProfile, CalibrationStatus, MetricStats};
pub use classifier::{ClassifierLabel, FatigueClassifier, PerclosClassifier, CLASSIFIER_WINDOW};
pub use config::{ActivePauseConfig, FatigueConfig, NodConfig};
pub use detector::FatigueDetector;
pub use metrics::{detect_eye_rub, EyeRub, FacialMetrics};
pub use nod::{NodDetector, NodReading, RiskLevel};
pub use state::FatigueState;

use thiserror::Error;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calibration already set for this session")]
    CalibrationLocked,
}
