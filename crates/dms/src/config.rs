//! DMS configuration

use crate::DmsError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Nod detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodConfig {
    /// Samples kept in the sliding window
    pub window_size: usize,
    /// Samples required before any evaluation
    pub min_frames_for_analysis: usize,
    /// Frame-to-frame angle change that counts as a dip (degrees)
    pub angle_threshold: f32,
    /// Smaller change that counts towards a recovery (degrees)
    pub recovery_threshold: f32,
    /// Slowest plausible dip (degrees/second)
    pub min_velocity_dps: f32,
    /// Fastest plausible dip (degrees/second)
    pub max_velocity_dps: f32,
    /// Risk added per detected nod
    pub recovery_weight: f32,
    /// Risk removed on every update
    pub risk_decay: f32,
    /// Minimum time between two declared nods (seconds)
    pub cooldown_secs: f32,
}

impl Default for NodConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            min_frames_for_analysis: 10,
            angle_threshold: 12.0,
            recovery_threshold: 6.0,
            min_velocity_dps: 100.0,
            max_velocity_dps: 800.0,
            recovery_weight: 1.5,
            risk_decay: 0.01,
            cooldown_secs: 5.0,
        }
    }
}

/// Active-pause configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivePauseConfig {
    /// Continuous work before a break reminder (seconds)
    pub work_duration_secs: f32,
    /// Absence that counts as a completed break (seconds)
    pub reset_threshold_secs: f32,
}

impl Default for ActivePauseConfig {
    fn default() -> Self {
        Self {
            work_duration_secs: 3600.0,
            reset_threshold_secs: 180.0,
        }
    }
}

/// Fatigue detection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueConfig {
    /// Face-absent frames before a distraction event
    pub distraction_frames_threshold: u32,
    pub distraction_cooldown_secs: f32,

    /// MAR above calibrated mean times this factor counts as yawning
    pub yawn_mar_factor: f32,
    pub yawn_frames_threshold: u32,
    pub yawn_cooldown_secs: f32,

    /// EAR below calibrated mean times this factor counts as closed eyes
    pub drowsiness_ear_factor: f32,
    /// Closed-eye frames before a drowsiness event
    pub drowsiness_eyes_closed_frames: u32,
    /// Closed-eye frames before the maximum (wake-up) alert
    pub max_alert_eyes_closed_frames: u32,
    pub wake_up_cooldown_secs: f32,

    pub eye_rubbing_frames: u32,
    pub eye_rub_cooldown_secs: f32,
    /// Proximity radius as a fraction of the inter-eye distance
    pub eye_rub_radius_factor: f32,

    /// Cooldown for drowsiness raised by the sequence classifier
    pub classifier_cooldown_secs: f32,

    pub nod: NodConfig,
    pub active_pause: ActivePauseConfig,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            distraction_frames_threshold: 60,
            distraction_cooldown_secs: 5.0,
            yawn_mar_factor: 1.8,
            yawn_frames_threshold: 22,
            yawn_cooldown_secs: 10.0,
            drowsiness_ear_factor: 0.75,
            drowsiness_eyes_closed_frames: 20,
            max_alert_eyes_closed_frames: 60,
            wake_up_cooldown_secs: 5.0,
            eye_rubbing_frames: 15,
            eye_rub_cooldown_secs: 10.0,
            eye_rub_radius_factor: 0.7,
            classifier_cooldown_secs: 30.0,
            nod: NodConfig::default(),
            active_pause: ActivePauseConfig::default(),
        }
    }
}

impl FatigueConfig {
    /// Create strict config (lower thresholds)
    pub fn strict() -> Self {
        Self {
            distraction_frames_threshold: 40,
            yawn_frames_threshold: 15,
            drowsiness_ear_factor: 0.8,
            drowsiness_eyes_closed_frames: 12,
            max_alert_eyes_closed_frames: 40,
            ..Default::default()
        }
    }

    /// Create lenient config (higher thresholds)
    pub fn lenient() -> Self {
        Self {
            distraction_frames_threshold: 100,
            yawn_frames_threshold: 30,
            drowsiness_ear_factor: 0.65,
            drowsiness_eyes_closed_frames: 30,
            max_alert_eyes_closed_frames: 90,
            ..Default::default()
        }
    }

    /// Reject configurations the detectors cannot run with
    pub fn validate(&self) -> Result<(), DmsError> {
        if self.drowsiness_eyes_closed_frames >= self.max_alert_eyes_closed_frames {
            return Err(DmsError::Config(format!(
                "drowsiness_eyes_closed_frames ({}) must be below max_alert_eyes_closed_frames ({})",
                self.drowsiness_eyes_closed_frames, self.max_alert_eyes_closed_frames
            )));
        }
        for (name, value) in [
            ("yawn_mar_factor", self.yawn_mar_factor),
            ("drowsiness_ear_factor", self.drowsiness_ear_factor),
            ("eye_rub_radius_factor", self.eye_rub_radius_factor),
            ("active_pause.work_duration_secs", self.active_pause.work_duration_secs),
            ("nod.angle_threshold", self.nod.angle_threshold),
            ("nod.recovery_threshold", self.nod.recovery_threshold),
            ("nod.min_velocity_dps", self.nod.min_velocity_dps),
            ("nod.max_velocity_dps", self.nod.max_velocity_dps),
            ("nod.recovery_weight", self.nod.recovery_weight),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(DmsError::Config(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        for (name, value) in [
            ("distraction_cooldown_secs", self.distraction_cooldown_secs),
            ("yawn_cooldown_secs", self.yawn_cooldown_secs),
            ("wake_up_cooldown_secs", self.wake_up_cooldown_secs),
            ("eye_rub_cooldown_secs", self.eye_rub_cooldown_secs),
            ("classifier_cooldown_secs", self.classifier_cooldown_secs),
            ("nod.cooldown_secs", self.nod.cooldown_secs),
            ("active_pause.reset_threshold_secs", self.active_pause.reset_threshold_secs),
            ("nod.risk_decay", self.nod.risk_decay),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(DmsError::Config(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }

        let nod = &self.nod;
        if nod.window_size < 2 || nod.min_frames_for_analysis < 2 {
            return Err(DmsError::Config("nod window needs at least two samples".into()));
        }
        if nod.min_frames_for_analysis > nod.window_size {
            return Err(DmsError::Config(format!(
                "nod.min_frames_for_analysis ({}) exceeds nod.window_size ({})",
                nod.min_frames_for_analysis, nod.window_size
            )));
        }
        if nod.min_velocity_dps > nod.max_velocity_dps {
            return Err(DmsError::Config(format!(
                "nod velocity range is empty: [{}, {}]",
                nod.min_velocity_dps, nod.max_velocity_dps
            )));
        }
        Ok(())
    }
}

/// Seconds from config to a `Duration`, clamping negatives to zero
pub(crate) fn secs(value: f32) -> Duration {
    Duration::from_secs_f32(value.max(0.0))
}
