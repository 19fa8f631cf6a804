//! Fatigue events and per-frame analysis results

use crate::classifier::ClassifierLabel;
use crate::metrics::FacialMetrics;
use perception::HeadAngles;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Behavioural events, declared in banner priority order (highest first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatigueEvent {
    /// Eyes closed long enough for the maximum alert
    WakeUp,
    /// Microsleep head nod
    Nod,
    Drowsiness,
    Yawn,
    EyeRub,
    /// Face absent for too long
    Distraction,
    /// Break reminder
    ActivePause,
    /// Monitoring without a calibration profile yet
    AwaitingCalibration,
}

impl FatigueEvent {
    pub const ALL: [FatigueEvent; 8] = [
        FatigueEvent::WakeUp,
        FatigueEvent::Nod,
        FatigueEvent::Drowsiness,
        FatigueEvent::Yawn,
        FatigueEvent::EyeRub,
        FatigueEvent::Distraction,
        FatigueEvent::ActivePause,
        FatigueEvent::AwaitingCalibration,
    ];

    /// Name used in event logs and reports
    pub fn label(&self) -> &'static str {
        match self {
            FatigueEvent::WakeUp => "Despierta",
            FatigueEvent::Nod => "Cabeceo",
            FatigueEvent::Drowsiness => "Somnolencia",
            FatigueEvent::Yawn => "Bostezar",
            FatigueEvent::EyeRub => "Frotar Ojos",
            FatigueEvent::Distraction => "Distraccion",
            FatigueEvent::ActivePause => "Pausa Activa",
            FatigueEvent::AwaitingCalibration => "AWAITING_CALIBRATION",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.label() == label)
    }

    /// Status marker rather than a behaviour; never logged or announced
    pub fn is_status(&self) -> bool {
        matches!(self, FatigueEvent::AwaitingCalibration)
    }

    /// Banner text, and whether it is a maximum-level alert
    pub fn banner(&self) -> Option<(&'static str, bool)> {
        match self {
            FatigueEvent::WakeUp => Some(("¡DESPIERTA!", true)),
            FatigueEvent::Nod => Some(("NO TE DUERMAS", true)),
            FatigueEvent::Drowsiness => Some(("SOMNOLENCIA DETECTADA", false)),
            FatigueEvent::Yawn => Some(("BOSTEZO DETECTADO", false)),
            FatigueEvent::EyeRub => Some(("DESCANSA LA VISTA", false)),
            FatigueEvent::Distraction => Some(("ATENCION AL FRENTE", false)),
            FatigueEvent::ActivePause => Some(("PAUSA ACTIVA RECOMENDADA", false)),
            FatigueEvent::AwaitingCalibration => None,
        }
    }
}

impl fmt::Display for FatigueEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Banner shown when the face is missing and no event claims the banner
pub const FACE_NOT_DETECTED_TEXT: &str = "ROSTRO NO DETECTADO";

/// Values for the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlayData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<FacialMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angles: Option<HeadAngles>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_text: Option<String>,
    pub is_max_alert: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pause_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifier: Option<ClassifierLabel>,
    pub nod_risk: f32,
}

/// Detector output for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FatigueAnalysis {
    /// Distinct events, highest priority first
    pub events: Vec<FatigueEvent>,
    pub overlay: OverlayData,
}

impl FatigueAnalysis {
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn contains(&self, event: FatigueEvent) -> bool {
        self.events.contains(&event)
    }

    /// Event that owns the banner
    pub fn highest_priority(&self) -> Option<FatigueEvent> {
        self.events.iter().copied().find(|e| e.banner().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let analysis = FatigueAnalysis {
            events: vec![FatigueEvent::Nod, FatigueEvent::Yawn, FatigueEvent::ActivePause],
            ..Default::default()
        };
        assert_eq!(analysis.highest_priority(), Some(FatigueEvent::Nod));
        assert!(FatigueEvent::WakeUp < FatigueEvent::Nod);
        assert!(FatigueEvent::Distraction < FatigueEvent::ActivePause);
    }

    #[test]
    fn test_labels_round_trip() {
        for event in FatigueEvent::ALL {
            assert_eq!(FatigueEvent::from_label(event.label()), Some(event));
        }
        assert_eq!(FatigueEvent::from_label("Unknown"), None);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&FatigueEvent::EyeRub).unwrap();
        assert_eq!(json, "\"eye_rub\"");
    }
}
