//! Nod (microsleep) detection
//!
//! Watches the vertical head angle over a short sliding window. A nod is a
//! fast dip followed by a recovery in the opposite direction. Detections
//! feed a risk score that decays slowly on every update.

use crate::config::{secs, NodConfig};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info};

const MAX_RISK: f32 = 10.0;
const MIN_DT_SECS: f32 = 1e-6;

/// Categorical view of the risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f32) -> Self {
        if score < 3.5 {
            RiskLevel::Low
        } else if score < 7.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

/// Result of one update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodReading {
    pub is_nodding: bool,
    pub risk_score: f32,
}

/// Sliding-window nod detector
#[derive(Debug)]
pub struct NodDetector {
    config: NodConfig,
    window: VecDeque<(f32, Instant)>,
    risk_score: f32,
    last_detection: Option<Instant>,
}

impl NodDetector {
    pub fn new(config: NodConfig) -> Self {
        Self {
            window: VecDeque::with_capacity(config.window_size),
            config,
            risk_score: 0.0,
            last_detection: None,
        }
    }

    pub fn risk_score(&self) -> f32 {
        self.risk_score
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.risk_score)
    }

    /// Feed the vertical head angle (degrees) observed at `now`
    pub fn update(&mut self, angle: f32, now: Instant) -> NodReading {
        self.risk_score = (self.risk_score - self.config.risk_decay).max(0.0);

        if angle.is_finite() {
            self.window.push_back((angle, now));
            while self.window.len() > self.config.window_size {
                self.window.pop_front();
            }
        }

        let is_nodding = self.window.len() >= self.config.min_frames_for_analysis
            && self.cooldown_elapsed(now)
            && self.has_dip()
            && self.has_recovery();

        if is_nodding {
            self.risk_score = (self.risk_score + self.config.recovery_weight).min(MAX_RISK);
            self.last_detection = Some(now);
            info!(
                "Nod detected (risk {:.2}, {:?})",
                self.risk_score,
                self.risk_level()
            );
        }

        NodReading {
            is_nodding,
            risk_score: self.risk_score,
        }
    }

    /// Clear the window and score, e.g. when a new user logs in
    pub fn reset(&mut self) {
        self.window.clear();
        self.risk_score = 0.0;
        self.last_detection = None;
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        let cooldown = secs(self.config.cooldown_secs);
        self.last_detection
            .map_or(true, |last| now.saturating_duration_since(last) >= cooldown)
    }

    /// Frame-to-frame deltas with their elapsed seconds
    fn deltas(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.window
            .iter()
            .zip(self.window.iter().skip(1))
            .map(|(&(a0, t0), &(a1, t1))| {
                let dt = t1.saturating_duration_since(t0).as_secs_f32().max(MIN_DT_SECS);
                (a1 - a0, dt)
            })
    }

    fn has_dip(&self) -> bool {
        let cfg = &self.config;
        self.deltas().any(|(delta, dt)| {
            let magnitude = delta.abs();
            let velocity = magnitude / dt;
            if magnitude > cfg.angle_threshold {
                debug!("Nod dip candidate: {:.1} deg at {:.0} deg/s", delta, velocity);
            }
            magnitude > cfg.angle_threshold
                && velocity >= cfg.min_velocity_dps
                && velocity <= cfg.max_velocity_dps
        })
    }

    /// Two successive significant movements in opposite directions.
    /// Still frames between them do not break the pattern.
    fn has_recovery(&self) -> bool {
        let threshold = self.config.recovery_threshold;
        let significant: Vec<f32> = self
            .deltas()
            .map(|(delta, _)| delta)
            .filter(|delta| delta.abs() > threshold)
            .collect();
        significant
            .windows(2)
            .any(|pair| pair[0].signum() != pair[1].signum())
    }
}
