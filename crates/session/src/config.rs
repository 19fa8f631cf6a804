//! Engine Configuration
//!
//! One typed bundle, loaded once (defaults, then an optional file, then
//! `COPILOTO__SECTION__KEY` environment overrides) and validated once.

use alerting::AlertsConfig;
use dms::FatigueConfig;
use perception::{FrameSize, MotionConfig, PoseLimits};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "COPILOTO";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        let size = FrameSize::default();
        Self {
            frame_width: size.width,
            frame_height: size.height,
        }
    }
}

impl CameraConfig {
    pub fn frame_size(&self) -> FrameSize {
        FrameSize::new(self.frame_width, self.frame_height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Only embeddings produced by this model are compared
    pub model_name: String,
    /// Minimum cosine similarity for a match
    pub threshold: f32,
    pub pose_limits: PoseLimits,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            model_name: "ArcFace Buffalo S".to_string(),
            threshold: 0.45,
            pose_limits: PoseLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateMachineConfig {
    pub stable_face_frames_to_identify: u32,
    pub face_lost_frames_to_logout: u32,
    pub auto_register_seconds: f32,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            stable_face_frames_to_identify: 90,
            face_lost_frames_to_logout: 900,
            auto_register_seconds: 15.0,
        }
    }
}

impl StateMachineConfig {
    pub fn auto_register_wait(&self) -> Duration {
        Duration::from_secs_f32(self.auto_register_seconds.max(0.0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Frames collected for a live calibration
    pub sample_target: usize,
    /// Start live collection as soon as a user without a stored profile logs in
    pub auto_start: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sample_target: 100,
            auto_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    /// Capture window after login
    pub window_secs: f32,
    pub embeddings_per_session_target: usize,
    /// Euclidean distance in degrees over (pitch, yaw, roll)
    pub min_pose_difference: f32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60.0,
            embeddings_per_session_target: 5,
            min_pose_difference: 15.0,
        }
    }
}

impl EnrichmentConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs_f32(self.window_secs.max(0.0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub save_log_on_session_end: bool,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            save_log_on_session_end: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub camera: CameraConfig,
    pub recognition: RecognitionConfig,
    pub fatigue: FatigueConfig,
    pub state_machine: StateMachineConfig,
    pub calibration: CalibrationConfig,
    pub enrichment: EnrichmentConfig,
    pub hardware: MotionConfig,
    pub reporting: ReportingConfig,
    pub alerts: AlertsConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load defaults, overlay `path` (TOML, JSON or YAML by extension) and
    /// the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&EngineConfig::default())?);
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.frame_width == 0 || self.camera.frame_height == 0 {
            return Err(invalid("camera frame size must be non-zero"));
        }

        let threshold = self.recognition.threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(invalid(format!(
                "recognition.threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if self.recognition.model_name.trim().is_empty() {
            return Err(invalid("recognition.model_name must not be empty"));
        }
        let limits = &self.recognition.pose_limits;
        for (name, value) in [
            ("max_abs_pitch", limits.max_abs_pitch),
            ("max_abs_yaw", limits.max_abs_yaw),
            ("max_abs_roll", limits.max_abs_roll),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!(
                    "recognition.pose_limits.{} must be positive, got {}",
                    name, value
                )));
            }
        }

        self.fatigue
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let sm = &self.state_machine;
        if sm.stable_face_frames_to_identify == 0 || sm.face_lost_frames_to_logout == 0 {
            return Err(invalid("state_machine frame thresholds must be positive"));
        }
        if !(sm.auto_register_seconds.is_finite() && sm.auto_register_seconds >= 0.0) {
            return Err(invalid("state_machine.auto_register_seconds must be non-negative"));
        }

        if self.calibration.sample_target < 2 {
            return Err(invalid("calibration.sample_target must be at least 2"));
        }

        let en = &self.enrichment;
        if !(en.window_secs.is_finite() && en.window_secs >= 0.0) {
            return Err(invalid("enrichment.window_secs must be non-negative"));
        }
        if !(en.min_pose_difference.is_finite() && en.min_pose_difference >= 0.0) {
            return Err(invalid("enrichment.min_pose_difference must be non-negative"));
        }

        let hw = &self.hardware;
        if hw.enabled {
            for (name, value) in [
                ("sleep_after_minutes", hw.sleep_after_minutes),
                ("accel_threshold", hw.accel_threshold),
                ("gyro_threshold", hw.gyro_threshold),
            ] {
                if !(value.is_finite() && value > 0.0) {
                    return Err(invalid(format!(
                        "hardware.{} must be positive, got {}",
                        name, value
                    )));
                }
            }
        }

        match self.logging.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(invalid(format!("unknown logging.level '{}'", other))),
        }
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
