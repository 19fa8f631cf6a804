//! Active-pause (break reminder) timer

use crate::config::ActivePauseConfig;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of one update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseReading {
    pub should_alert: bool,
    /// Whole seconds of work left in the current cycle
    pub seconds_remaining: u64,
}

impl PauseReading {
    /// Countdown text for the overlay, e.g. "Pausa en: 59:30"
    pub fn countdown_text(&self) -> String {
        format!(
            "Pausa en: {:02}:{:02}",
            self.seconds_remaining / 60,
            self.seconds_remaining % 60
        )
    }
}

/// Accumulates work time while the user is present and recommends a break
/// once a full work cycle has passed. A long enough absence counts as a
/// break and starts a fresh cycle.
#[derive(Debug)]
pub struct ActivePauseHandler {
    config: ActivePauseConfig,
    elapsed_work_secs: f32,
    paused: bool,
    pause_start: Option<Instant>,
    last_update: Option<Instant>,
    last_reminder: Option<Instant>,
}

impl ActivePauseHandler {
    pub fn new(config: ActivePauseConfig) -> Self {
        Self {
            config,
            elapsed_work_secs: 0.0,
            paused: true,
            pause_start: None,
            last_update: None,
            last_reminder: None,
        }
    }

    pub fn elapsed_work_secs(&self) -> f32 {
        self.elapsed_work_secs
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Start a new work cycle at `now`
    pub fn reset(&mut self, now: Instant) {
        self.elapsed_work_secs = 0.0;
        self.paused = true;
        self.pause_start = None;
        self.last_update = Some(now);
        self.last_reminder = Some(now);
        debug!("Active pause cycle reset");
    }

    pub fn update(
        &mut self,
        face_detected: bool,
        body_detected: bool,
        now: Instant,
    ) -> PauseReading {
        let delta = self
            .last_update
            .map_or(0.0, |last| now.saturating_duration_since(last).as_secs_f32());
        self.last_update = Some(now);

        let mut should_alert = false;

        if face_detected || body_detected {
            if self.paused {
                debug!("User present, active pause timer running");
                self.paused = false;
                self.pause_start = None;
            }
            self.elapsed_work_secs += delta;

            let work = self.config.work_duration_secs;
            if self.elapsed_work_secs >= work {
                let reminder_due = self.last_reminder.map_or(true, |last| {
                    now.saturating_duration_since(last).as_secs_f32() >= work * 0.95
                });
                if reminder_due {
                    warn!("Active pause recommended after {:.0}s of work", self.elapsed_work_secs);
                    should_alert = true;
                    self.reset(now);
                }
            }
        } else {
            if !self.paused {
                self.paused = true;
                self.pause_start = Some(now);
                debug!("User absent, active pause timer paused");
            }
            if let Some(start) = self.pause_start {
                let away = now.saturating_duration_since(start).as_secs_f32();
                if away > self.config.reset_threshold_secs {
                    info!(
                        "Absent for more than {}s, counting it as a break",
                        self.config.reset_threshold_secs
                    );
                    self.reset(now);
                }
            }
        }

        let remaining = (self.config.work_duration_secs - self.elapsed_work_secs).max(0.0);
        PauseReading {
            should_alert,
            seconds_remaining: remaining as u64,
        }
    }
}
