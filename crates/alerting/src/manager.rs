//! Alert Dispatcher Implementation

use crate::log::SessionLog;
use chrono::{DateTime, Utc};
use dms::FatigueEvent;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which events are logged and announced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventToggles {
    pub wake_up: bool,
    pub nod: bool,
    pub drowsiness: bool,
    pub yawn: bool,
    pub eye_rub: bool,
    pub distraction: bool,
    pub active_pause: bool,
}

impl Default for EventToggles {
    fn default() -> Self {
        Self {
            wake_up: true,
            nod: true,
            drowsiness: true,
            yawn: true,
            eye_rub: true,
            distraction: true,
            active_pause: true,
        }
    }
}

impl EventToggles {
    /// Status markers are never enabled
    pub fn is_enabled(&self, event: FatigueEvent) -> bool {
        match event {
            FatigueEvent::WakeUp => self.wake_up,
            FatigueEvent::Nod => self.nod,
            FatigueEvent::Drowsiness => self.drowsiness,
            FatigueEvent::Yawn => self.yawn,
            FatigueEvent::EyeRub => self.eye_rub,
            FatigueEvent::Distraction => self.distraction,
            FatigueEvent::ActivePause => self.active_pause,
            FatigueEvent::AwaitingCalibration => false,
        }
    }
}

/// A spoken alert; priority 0 is the most urgent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicePrompt {
    pub enabled: bool,
    pub text: String,
    pub priority: u8,
}

impl Default for VoicePrompt {
    fn default() -> Self {
        Self {
            enabled: true,
            text: String::new(),
            priority: 3,
        }
    }
}

impl VoicePrompt {
    fn new(text: &str, priority: u8) -> Self {
        Self {
            enabled: true,
            text: text.to_string(),
            priority,
        }
    }
}

/// Voice prompt per event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicePrompts {
    pub wake_up: VoicePrompt,
    pub nod: VoicePrompt,
    pub drowsiness: VoicePrompt,
    pub yawn: VoicePrompt,
    pub eye_rub: VoicePrompt,
    pub distraction: VoicePrompt,
    pub active_pause: VoicePrompt,
}

impl Default for VoicePrompts {
    fn default() -> Self {
        Self {
            wake_up: VoicePrompt::new("Despierta. Mantente alerta.", 0),
            nod: VoicePrompt::new("Peligro de microsueño detectado.", 0),
            drowsiness: VoicePrompt::new("Se detecta somnolencia.", 1),
            distraction: VoicePrompt::new("Atención a la carretera.", 1),
            yawn: VoicePrompt::new("Parece que estás cansado.", 2),
            eye_rub: VoicePrompt::new("Descansa la vista.", 2),
            active_pause: VoicePrompt::new("Es momento de una pausa activa.", 3),
        }
    }
}

impl VoicePrompts {
    pub fn get(&self, event: FatigueEvent) -> Option<&VoicePrompt> {
        match event {
            FatigueEvent::WakeUp => Some(&self.wake_up),
            FatigueEvent::Nod => Some(&self.nod),
            FatigueEvent::Drowsiness => Some(&self.drowsiness),
            FatigueEvent::Yawn => Some(&self.yawn),
            FatigueEvent::EyeRub => Some(&self.eye_rub),
            FatigueEvent::Distraction => Some(&self.distraction),
            FatigueEvent::ActivePause => Some(&self.active_pause),
            FatigueEvent::AwaitingCalibration => None,
        }
    }
}

/// Alert configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub toggles: EventToggles,
    pub voice: VoicePrompts,
}

/// What to do with one frame's events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    /// Enabled events, to be persisted
    pub logged: Vec<FatigueEvent>,
    /// Prompts to speak, most urgent first
    pub prompts: Vec<VoicePrompt>,
}

/// Filters events through the toggles, records them in the session log and
/// selects voice prompts
pub struct AlertDispatcher {
    config: AlertsConfig,
    log: SessionLog,
}

impl AlertDispatcher {
    pub fn new(config: AlertsConfig) -> Self {
        info!("Creating alert dispatcher");
        Self {
            config,
            log: SessionLog::default(),
        }
    }

    pub fn config(&self) -> &AlertsConfig {
        &self.config
    }

    pub fn session_log(&self) -> &SessionLog {
        &self.log
    }

    pub fn session_log_mut(&mut self) -> &mut SessionLog {
        &mut self.log
    }

    pub fn dispatch(&mut self, events: &[FatigueEvent], at: DateTime<Utc>) -> Dispatch {
        let mut out = Dispatch::default();
        for &event in events {
            if !self.config.toggles.is_enabled(event) {
                if !event.is_status() {
                    debug!("Event {} disabled, not dispatched", event);
                }
                continue;
            }
            self.log.record(event, at);
            out.logged.push(event);

            let prompt = self.config.voice.get(event);
            if let Some(prompt) = prompt.filter(|p| p.enabled && !p.text.is_empty()) {
                out.prompts.push(prompt.clone());
            }
        }
        // Stable: equal priorities keep event priority order
        out.prompts.sort_by_key(|p| p.priority);
        out
    }
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new(AlertsConfig::default())
    }
}
