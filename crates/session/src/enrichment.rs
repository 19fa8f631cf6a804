//! Profile enrichment
//!
//! For a short window after login, extra embeddings are captured whenever
//! the head pose is far enough from every pose already captured this
//! session, so that later identification works from more angles.

use crate::config::EnrichmentConfig;
use identity::is_novel_pose;
use perception::HeadPose;
use std::time::Instant;
use tracing::info;

#[derive(Debug)]
pub struct ProfileEnricher {
    config: EnrichmentConfig,
    started_at: Option<Instant>,
    captured: Vec<HeadPose>,
}

impl ProfileEnricher {
    pub fn new(config: EnrichmentConfig) -> Self {
        Self {
            config,
            started_at: None,
            captured: Vec::new(),
        }
    }

    /// Open the capture window for a new session
    pub fn start(&mut self, now: Instant) {
        self.captured.clear();
        self.started_at = self.config.enabled.then_some(now);
    }

    /// Close the window and forget captured poses
    pub fn reset(&mut self) {
        self.started_at = None;
        self.captured.clear();
    }

    pub fn captured(&self) -> usize {
        self.captured.len()
    }

    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    /// Whether an embedding should be captured at `pose` now. Closes the
    /// window once it has elapsed.
    pub fn wants(&mut self, pose: &HeadPose, now: Instant) -> bool {
        let Some(started_at) = self.started_at else {
            return false;
        };
        if now.saturating_duration_since(started_at) >= self.config.window() {
            info!(
                "Profile enrichment window closed ({} embeddings captured)",
                self.captured.len()
            );
            self.started_at = None;
            return false;
        }
        self.captured.len() < self.config.embeddings_per_session_target
            && pose.is_finite()
            && is_novel_pose(pose, &self.captured, self.config.min_pose_difference)
    }

    /// Remember a pose whose embedding was stored
    pub fn record(&mut self, pose: HeadPose) {
        self.captured.push(pose);
        info!(
            "Enrichment embedding #{} captured at pitch {:.1} yaw {:.1} roll {:.1}",
            self.captured.len(),
            pose.pitch,
            pose.yaw,
            pose.roll
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn enricher() -> ProfileEnricher {
        ProfileEnricher::new(EnrichmentConfig {
            enabled: true,
            window_secs: 60.0,
            embeddings_per_session_target: 2,
            min_pose_difference: 15.0,
        })
    }

    #[test]
    fn test_inactive_until_started() {
        let mut e = enricher();
        assert!(!e.wants(&HeadPose::default(), Instant::now()));
    }

    #[test]
    fn test_requires_novel_pose() {
        let t0 = Instant::now();
        let mut e = enricher();
        e.start(t0);
        assert!(e.wants(&HeadPose::default(), t0));
        e.record(HeadPose::default());

        assert!(!e.wants(&HeadPose::new(5.0, 5.0, 0.0), t0));
        assert!(e.wants(&HeadPose::new(0.0, 20.0, 0.0), t0));
    }

    #[test]
    fn test_target_caps_captures() {
        let t0 = Instant::now();
        let mut e = enricher();
        e.start(t0);
        e.record(HeadPose::new(0.0, 0.0, 0.0));
        e.record(HeadPose::new(0.0, 20.0, 0.0));
        assert!(!e.wants(&HeadPose::new(0.0, -20.0, 0.0), t0));
    }

    #[test]
    fn test_window_closes() {
        let t0 = Instant::now();
        let mut e = enricher();
        e.start(t0);
        assert!(!e.wants(&HeadPose::default(), t0 + Duration::from_secs(61)));
        assert!(!e.is_active());
    }

    #[test]
    fn test_disabled() {
        let mut e = ProfileEnricher::new(EnrichmentConfig {
            enabled: false,
            ..Default::default()
        });
        let t0 = Instant::now();
        e.start(t0);
        assert!(!e.is_active());
        assert!(!e.wants(&HeadPose::default(), t0));
    }
}
