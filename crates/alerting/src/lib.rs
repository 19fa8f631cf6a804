//! Alerting System
//!
//! Turns detected fatigue events into user-facing output:
//! - Per-event enable toggles
//! - Voice prompts ordered by priority
//! - Per-session event log and summary

mod log;
mod manager;

pub use log::{SessionEvent, SessionLog, SessionSummary};
pub use manager::{AlertDispatcher, AlertsConfig, Dispatch, EventToggles, VoicePrompt, VoicePrompts};
