//! Session states and per-frame reports

use alerting::VoicePrompt;
use dms::{FatigueEvent, OverlayData};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Top-level session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Waiting for a stable, frontal face
    Listening,
    /// Matching the face against enrolled embeddings
    Identifying,
    /// Unknown face held still; registers once the wait elapses
    AutoRegistering,
    /// A user is bound; fatigue detection runs
    Monitoring,
    /// Sleep: no vision processing until motion resumes
    Reposo,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Listening => "LISTENING",
            SessionState::Identifying => "IDENTIFYING",
            SessionState::AutoRegistering => "AUTO_REGISTERING",
            SessionState::Monitoring => "MONITORING",
            SessionState::Reposo => "REPOSO",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
}

/// The user bound to the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUser {
    pub id: Uuid,
    pub code: String,
}

/// Everything the presentation layer needs about one processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    /// State after the frame was processed
    pub state: SessionState,
    pub transition: Option<Transition>,
    pub user: Option<ActiveUser>,
    pub status_text: String,
    /// Every event detected this frame, highest priority first
    pub events: Vec<FatigueEvent>,
    /// Enabled events that were persisted
    pub logged: Vec<FatigueEvent>,
    /// Voice prompts to play, most urgent first
    pub prompts: Vec<VoicePrompt>,
    pub overlay: Option<OverlayData>,
    /// Best similarity of an identification attempt made this frame
    pub similarity: Option<f32>,
    /// (collected, target) while a live calibration runs
    pub calibration_progress: Option<(usize, usize)>,
}

impl FrameReport {
    pub(crate) fn new(state: SessionState) -> Self {
        Self {
            state,
            transition: None,
            user: None,
            status_text: String::new(),
            events: Vec::new(),
            logged: Vec::new(),
            prompts: Vec::new(),
            overlay: None,
            similarity: None,
            calibration_progress: None,
        }
    }

    pub fn transitioned_to(&self, state: SessionState) -> bool {
        self.transition.map_or(false, |t| t.to == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names_serialize() {
        assert_eq!(
            serde_json::to_string(&SessionState::AutoRegistering).unwrap(),
            "\"AUTO_REGISTERING\""
        );
        assert_eq!(SessionState::Reposo.to_string(), "REPOSO");
    }
}
