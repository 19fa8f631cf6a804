//! Per-user calibration
//!
//! A profile is either loaded from storage or collected live from the first
//! monitored frames of a session. Once set it stays fixed until `reset`.

use crate::metrics::FacialMetrics;
use crate::DmsError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Mean and sample standard deviation of one metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f32,
    pub std: f32,
}

impl MetricStats {
    /// Sample (n-1) statistics; `std` is 0 for fewer than two values
    pub fn from_values(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let std = if values.len() > 1 {
            let var = values
                .iter()
                .map(|&v| (v as f64 - mean).powi(2))
                .sum::<f64>()
                / (n - 1.0);
            var.sqrt()
        } else {
            0.0
        };
        Self {
            mean: mean as f32,
            std: std as f32,
        }
    }
}

/// Per-user baseline for every facial metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub ear: MetricStats,
    pub mar: MetricStats,
    pub puc: MetricStats,
    pub moe: MetricStats,
}

impl CalibrationProfile {
    /// Build a profile from raw (uncalibrated) samples
    pub fn from_samples(samples: &[FacialMetrics]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        Some(Self {
            ear: column_stats(samples, |m| m.ear),
            mar: column_stats(samples, |m| m.mar),
            puc: column_stats(samples, |m| m.puc),
            moe: column_stats(samples, |m| m.moe),
        })
    }
}

fn column_stats(samples: &[FacialMetrics], field: impl Fn(&FacialMetrics) -> f32) -> MetricStats {
    let values: Vec<f32> = samples.iter().map(field).collect();
    MetricStats::from_values(&values)
}

/// Calibration progress for the active session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationStatus {
    NotStarted,
    Collecting,
    Ready,
}

/// Collects baseline samples and owns the session's profile
#[derive(Debug)]
pub struct CalibrationManager {
    target_samples: usize,
    samples: Vec<FacialMetrics>,
    status: CalibrationStatus,
    profile: Option<CalibrationProfile>,
}

impl CalibrationManager {
    pub fn new(target_samples: usize) -> Self {
        Self {
            target_samples: target_samples.max(1),
            samples: Vec::with_capacity(target_samples),
            status: CalibrationStatus::NotStarted,
            profile: None,
        }
    }

    pub fn status(&self) -> CalibrationStatus {
        self.status
    }

    pub fn profile(&self) -> Option<&CalibrationProfile> {
        self.profile.as_ref()
    }

    /// (collected, target)
    pub fn progress(&self) -> (usize, usize) {
        (self.samples.len(), self.target_samples)
    }

    /// Install a stored profile. Fails if the session already has one.
    pub fn set_profile(&mut self, profile: CalibrationProfile) -> Result<(), DmsError> {
        if self.profile.is_some() {
            return Err(DmsError::CalibrationLocked);
        }
        self.samples.clear();
        self.profile = Some(profile);
        self.status = CalibrationStatus::Ready;
        info!("Calibration profile loaded (EAR mean {:.3})", profile.ear.mean);
        Ok(())
    }

    /// Start live collection. No-op unless nothing has started yet.
    pub fn begin(&mut self) {
        if self.status == CalibrationStatus::NotStarted {
            info!("Calibration started: collecting {} samples", self.target_samples);
            self.status = CalibrationStatus::Collecting;
        }
    }

    /// Buffer one raw sample. Returns the finished profile on the sample
    /// that completes the collection.
    pub fn add_sample(&mut self, metrics: FacialMetrics) -> Option<CalibrationProfile> {
        if self.status != CalibrationStatus::Collecting {
            return None;
        }
        self.samples.push(metrics);
        debug!("Calibration sample {}/{}", self.samples.len(), self.target_samples);

        if self.samples.len() < self.target_samples {
            return None;
        }
        let profile = CalibrationProfile::from_samples(&self.samples)?;
        self.samples.clear();
        self.profile = Some(profile);
        self.status = CalibrationStatus::Ready;
        info!(
            "Calibration complete: EAR {:.3}±{:.3}, MAR {:.3}±{:.3}",
            profile.ear.mean, profile.ear.std, profile.mar.mean, profile.mar.std
        );
        Some(profile)
    }

    /// Drop the profile and any partial collection
    pub fn reset(&mut self) {
        self.samples.clear();
        self.profile = None;
        self.status = CalibrationStatus::NotStarted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(v: f32) -> FacialMetrics {
        FacialMetrics {
            ear: v,
            mar: v * 2.0,
            puc: 0.8,
            moe: 2.0,
        }
    }

    #[test]
    fn test_sample_std() {
        let stats = MetricStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((stats.mean - 5.0).abs() < 1e-6);
        // Sample variance 32 / 7
        assert!((stats.std - (32.0f32 / 7.0).sqrt()).abs() < 1e-5);
        assert_eq!(MetricStats::from_values(&[3.0]).std, 0.0);
    }

    #[test]
    fn test_collection_completes_at_target() {
        let mut manager = CalibrationManager::new(3);
        assert!(manager.add_sample(sample(0.3)).is_none());
        assert_eq!(manager.status(), CalibrationStatus::NotStarted);

        manager.begin();
        assert!(manager.add_sample(sample(0.3)).is_none());
        assert!(manager.add_sample(sample(0.3)).is_none());
        let profile = manager.add_sample(sample(0.3)).unwrap();
        assert_eq!(manager.status(), CalibrationStatus::Ready);
        assert!((profile.ear.mean - 0.3).abs() < 1e-6);
        assert!((profile.mar.mean - 0.6).abs() < 1e-6);

        // Profile is fixed for the session
        assert!(manager.add_sample(sample(0.1)).is_none());
        assert!(matches!(
            manager.set_profile(CalibrationProfile::default()),
            Err(DmsError::CalibrationLocked)
        ));
    }

    #[test]
    fn test_reset_discards_partial_collection() {
        let mut manager = CalibrationManager::new(5);
        manager.begin();
        manager.add_sample(sample(0.3));
        manager.add_sample(sample(0.3));
        manager.reset();
        assert_eq!(manager.progress(), (0, 5));
        assert_eq!(manager.status(), CalibrationStatus::NotStarted);
        assert!(manager.profile().is_none());
    }

    proptest! {
        #[test]
        fn prop_identical_samples_have_zero_std(value in 0.0f32..1.0, n in 1usize..200) {
            let samples = vec![sample(value); n];
            let profile = CalibrationProfile::from_samples(&samples).unwrap();
            prop_assert!(profile.ear.std.abs() < 1e-5);
            prop_assert!((profile.ear.mean - value).abs() < 1e-5);
            prop_assert!(profile.mar.std.abs() < 1e-5);
            prop_assert!((profile.moe.mean - 2.0).abs() < 1e-5);
        }
    }
}
