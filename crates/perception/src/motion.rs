//! Motion-sensor (IMU) sleep/wake monitoring
//!
//! Turns raw accelerometer/gyroscope samples into the two signals the
//! session cares about: motion detected, and no motion for the configured
//! duration.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Standard gravity in g units
const GRAVITY_G: f32 = 1.0;

/// Processed IMU sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// Acceleration in X (g)
    pub accel_x: f32,
    /// Acceleration in Y (g)
    pub accel_y: f32,
    /// Acceleration in Z (g)
    pub accel_z: f32,
    /// Angular velocity X (deg/s)
    pub gyro_x: f32,
    /// Angular velocity Y (deg/s)
    pub gyro_y: f32,
    /// Angular velocity Z (deg/s)
    pub gyro_z: f32,
}

impl MotionSample {
    /// Sample of a sensor lying still (gravity on Z only)
    pub fn at_rest() -> Self {
        Self {
            accel_z: GRAVITY_G,
            ..Default::default()
        }
    }

    pub fn accel_magnitude(&self) -> f32 {
        (self.accel_x.powi(2) + self.accel_y.powi(2) + self.accel_z.powi(2)).sqrt()
    }

    pub fn gyro_magnitude(&self) -> f32 {
        (self.gyro_x.powi(2) + self.gyro_y.powi(2) + self.gyro_z.powi(2)).sqrt()
    }
}

/// Motion-sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Whether a motion sensor is attached at all
    pub enabled: bool,
    /// Stillness before sleep is signalled (minutes)
    pub sleep_after_minutes: f32,
    /// Acceleration deviation from 1g that counts as motion (g)
    pub accel_threshold: f32,
    /// Angular speed that counts as motion (deg/s)
    pub gyro_threshold: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sleep_after_minutes: 5.0,
            accel_threshold: 0.5,
            gyro_threshold: 0.5,
        }
    }
}

impl MotionConfig {
    pub fn sleep_after(&self) -> Duration {
        Duration::from_secs_f32(self.sleep_after_minutes.max(0.0) * 60.0)
    }
}

/// Signal raised by the motion monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionSignal {
    /// The sensor moved
    MotionDetected,
    /// The sensor stayed still for the configured duration
    NoMotionForDuration,
}

/// Stateful still-period tracker
#[derive(Debug)]
pub struct MotionMonitor {
    config: MotionConfig,
    still_since: Option<Instant>,
}

impl MotionMonitor {
    pub fn new(config: MotionConfig) -> Self {
        info!(
            "Motion monitor created: sleep after {:.1} min, accel {:.2} g, gyro {:.2} dps",
            config.sleep_after_minutes, config.accel_threshold, config.gyro_threshold
        );
        Self {
            config,
            still_since: None,
        }
    }

    /// Whether a single sample is above either motion threshold
    pub fn is_motion(&self, sample: &MotionSample) -> bool {
        (sample.accel_magnitude() - GRAVITY_G).abs() > self.config.accel_threshold
            || sample.gyro_magnitude() > self.config.gyro_threshold
    }

    /// Feed one sample. `NoMotionForDuration` fires once per still period.
    pub fn update(&mut self, sample: &MotionSample, now: Instant) -> Option<MotionSignal> {
        if self.is_motion(sample) {
            self.still_since = None;
            return Some(MotionSignal::MotionDetected);
        }

        let since = *self.still_since.get_or_insert(now);
        if now.duration_since(since) > self.config.sleep_after() {
            debug!("No motion for {:?}", now.duration_since(since));
            self.still_since = None;
            return Some(MotionSignal::NoMotionForDuration);
        }
        None
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }
}
