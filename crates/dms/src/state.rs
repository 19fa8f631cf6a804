//! Per-session fatigue tracking state

use std::time::{Duration, Instant};

/// Consecutive-frame counters and last-emission times for every debounced
/// behaviour. Reset whenever a user logs in.
#[derive(Debug, Clone, Default)]
pub struct FatigueState {
    pub distraction_frames: u32,
    pub yawn_frames: u32,
    pub closed_eyes_frames: u32,
    pub eye_rub_frames: u32,

    pub last_distraction: Option<Instant>,
    pub last_yawn: Option<Instant>,
    pub last_wake_up: Option<Instant>,
    pub last_eye_rub: Option<Instant>,
    pub last_classifier_alert: Option<Instant>,
}

impl FatigueState {
    /// Reset state (on user change)
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// True when nothing was emitted yet or `cooldown` has passed since `last`
pub fn cooldown_elapsed(last: Option<Instant>, now: Instant, cooldown: Duration) -> bool {
    last.map_or(true, |t| now.saturating_duration_since(t) >= cooldown)
}
