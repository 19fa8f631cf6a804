//! Sequence-based fatigue classification
//!
//! The detector keeps a rolling window of metrics and asks a classifier for
//! a verdict once the window is full. Any sequence model can sit behind
//! [`FatigueClassifier`]; [`PerclosClassifier`] is the rule-based fallback.

use crate::calibration::CalibrationProfile;
use crate::metrics::FacialMetrics;
use serde::{Deserialize, Serialize};

/// Samples per classification window
pub const CLASSIFIER_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierLabel {
    Alert,
    Drowsy,
}

/// Classifies a full window of metric samples, oldest first.
///
/// Returning `None` means "no opinion" (e.g. missing baseline).
pub trait FatigueClassifier: Send {
    fn classify(
        &self,
        window: &[FacialMetrics],
        calibration: Option<&CalibrationProfile>,
    ) -> Option<ClassifierLabel>;
}

/// PERCLOS: share of the window spent with the eyes mostly closed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerclosClassifier {
    /// EAR below this fraction of the calibrated mean counts as closed
    pub closed_ratio: f32,
    /// Closed share of the window that reads as drowsy
    pub drowsy_fraction: f32,
}

impl Default for PerclosClassifier {
    fn default() -> Self {
        Self {
            closed_ratio: 0.75,
            drowsy_fraction: 0.8,
        }
    }
}

impl FatigueClassifier for PerclosClassifier {
    fn classify(
        &self,
        window: &[FacialMetrics],
        calibration: Option<&CalibrationProfile>,
    ) -> Option<ClassifierLabel> {
        let baseline = calibration?.ear.mean;
        if window.is_empty() || baseline <= 1e-6 {
            return None;
        }
        let threshold = baseline * self.closed_ratio;
        let closed = window.iter().filter(|m| m.ear < threshold).count();
        let perclos = closed as f32 / window.len() as f32;
        Some(if perclos >= self.drowsy_fraction {
            ClassifierLabel::Drowsy
        } else {
            ClassifierLabel::Alert
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::MetricStats;

    fn calibration() -> CalibrationProfile {
        CalibrationProfile {
            ear: MetricStats { mean: 0.3, std: 0.02 },
            ..Default::default()
        }
    }

    fn window(closed: usize) -> Vec<FacialMetrics> {
        (0..CLASSIFIER_WINDOW)
            .map(|i| FacialMetrics {
                ear: if i < closed { 0.1 } else { 0.3 },
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_perclos_labels() {
        let classifier = PerclosClassifier::default();
        let cal = calibration();
        assert_eq!(classifier.classify(&window(18), Some(&cal)), Some(ClassifierLabel::Drowsy));
        assert_eq!(classifier.classify(&window(5), Some(&cal)), Some(ClassifierLabel::Alert));
    }

    #[test]
    fn test_no_opinion_without_baseline() {
        let classifier = PerclosClassifier::default();
        assert_eq!(classifier.classify(&window(20), None), None);
        assert_eq!(classifier.classify(&[], Some(&calibration())), None);
    }
}
