//! Fatigue event detector
//!
//! Composes facial metrics, calibration, the nod detector, the active-pause
//! handler and the optional sequence classifier into a de-duplicated list of
//! events per frame. Every behaviour follows the same debounce-then-cooldown
//! pattern: a counter grows while the raw condition holds, resets as soon as
//! it does not, and an event fires only once the counter passes its frame
//! threshold and the behaviour's cooldown has elapsed.

use crate::active_pause::ActivePauseHandler;
use crate::analysis::{FatigueAnalysis, FatigueEvent, OverlayData, FACE_NOT_DETECTED_TEXT};
use crate::calibration::CalibrationProfile;
use crate::classifier::{ClassifierLabel, FatigueClassifier, PerclosClassifier, CLASSIFIER_WINDOW};
use crate::config::{secs, FatigueConfig};
use crate::metrics::{detect_eye_rub, FacialMetrics};
use crate::nod::NodDetector;
use crate::state::{cooldown_elapsed, FatigueState};
use perception::{head_angles, FrameObservation};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info};

pub struct FatigueDetector {
    config: FatigueConfig,
    state: FatigueState,
    nod: NodDetector,
    pause: ActivePauseHandler,
    classifier: Option<Box<dyn FatigueClassifier>>,
    window: VecDeque<FacialMetrics>,
}

impl FatigueDetector {
    /// Detector with the rule-based PERCLOS classifier
    pub fn new(config: FatigueConfig) -> Self {
        Self {
            nod: NodDetector::new(config.nod.clone()),
            pause: ActivePauseHandler::new(config.active_pause.clone()),
            config,
            state: FatigueState::default(),
            classifier: Some(Box::new(PerclosClassifier::default())),
            window: VecDeque::with_capacity(CLASSIFIER_WINDOW),
        }
    }

    /// Replace the sequence classifier
    pub fn with_classifier(mut self, classifier: Box<dyn FatigueClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn without_classifier(mut self) -> Self {
        self.classifier = None;
        self
    }

    pub fn config(&self) -> &FatigueConfig {
        &self.config
    }

    pub fn state(&self) -> &FatigueState {
        &self.state
    }

    pub fn nod_detector(&self) -> &NodDetector {
        &self.nod
    }

    /// Reset all counters, timers and windows for a new monitoring session
    pub fn reset(&mut self, now: Instant) {
        self.state.reset();
        self.nod.reset();
        self.pause.reset(now);
        self.window.clear();
        info!("Fatigue detector state reset");
    }

    /// Analyse one frame. Without a calibration profile only distraction,
    /// active pause and the classifier run, and `AwaitingCalibration` is
    /// reported.
    pub fn process(
        &mut self,
        obs: &FrameObservation,
        calibration: Option<&CalibrationProfile>,
        now: Instant,
    ) -> FatigueAnalysis {
        let mut events = Vec::new();
        let mut overlay = OverlayData::default();

        let pause = self
            .pause
            .update(obs.face_detected(), obs.body_detected(), now);
        if pause.should_alert {
            events.push(FatigueEvent::ActivePause);
        }
        overlay.pause_text = Some(pause.countdown_text());

        let Some(face) = obs.face.as_ref() else {
            self.state.distraction_frames += 1;
            if self.state.distraction_frames > self.config.distraction_frames_threshold
                && cooldown_elapsed(
                    self.state.last_distraction,
                    now,
                    secs(self.config.distraction_cooldown_secs),
                )
            {
                events.push(FatigueEvent::Distraction);
                self.state.last_distraction = Some(now);
            }
            let mut analysis = finish(events, overlay, self.nod.risk_score());
            if analysis.overlay.alert_text.is_none() {
                analysis.overlay.alert_text = Some(FACE_NOT_DETECTED_TEXT.to_string());
            }
            return analysis;
        };
        self.state.distraction_frames = 0;

        let metrics = FacialMetrics::extract(face, obs.size, calibration);
        overlay.metrics = Some(metrics);
        debug!(
            "Metrics: EAR {:.3} MAR {:.3} PUC {:.3} MOE {:.3}",
            metrics.ear, metrics.mar, metrics.puc, metrics.moe
        );

        if let Some(label) = self.classify(metrics, calibration) {
            overlay.classifier = Some(label);
            if label == ClassifierLabel::Drowsy
                && cooldown_elapsed(
                    self.state.last_classifier_alert,
                    now,
                    secs(self.config.classifier_cooldown_secs),
                )
            {
                info!("Drowsiness raised by sequence classifier");
                events.push(FatigueEvent::Drowsiness);
                self.state.last_classifier_alert = Some(now);
            }
        }

        let Some(cal) = calibration else {
            events.push(FatigueEvent::AwaitingCalibration);
            return finish(events, overlay, self.nod.risk_score());
        };

        let angles = head_angles(face, obs.size);
        overlay.angles = angles;

        self.check_yawn(&metrics, cal, now, &mut events);
        self.check_eyes_closed(&metrics, cal, now, &mut events);

        // Missing angles still decay the nod risk
        let vertical = angles.map_or(f32::NAN, |a| a.vertical);
        if self.nod.update(vertical, now).is_nodding {
            events.push(FatigueEvent::Nod);
        }

        let rub = detect_eye_rub(face, &obs.hands, obs.size, self.config.eye_rub_radius_factor);
        if rub.is_rubbing() {
            self.state.eye_rub_frames += 1;
            if self.state.eye_rub_frames > self.config.eye_rubbing_frames
                && cooldown_elapsed(
                    self.state.last_eye_rub,
                    now,
                    secs(self.config.eye_rub_cooldown_secs),
                )
            {
                events.push(FatigueEvent::EyeRub);
                self.state.last_eye_rub = Some(now);
            }
        } else {
            self.state.eye_rub_frames = 0;
        }

        finish(events, overlay, self.nod.risk_score())
    }

    fn classify(
        &mut self,
        metrics: FacialMetrics,
        calibration: Option<&CalibrationProfile>,
    ) -> Option<ClassifierLabel> {
        let classifier = self.classifier.as_ref()?;
        self.window.push_back(metrics);
        while self.window.len() > CLASSIFIER_WINDOW {
            self.window.pop_front();
        }
        if self.window.len() < CLASSIFIER_WINDOW {
            return None;
        }
        let samples: Vec<FacialMetrics> = self.window.iter().copied().collect();
        classifier.classify(&samples, calibration)
    }

    fn check_yawn(
        &mut self,
        metrics: &FacialMetrics,
        cal: &CalibrationProfile,
        now: Instant,
        events: &mut Vec<FatigueEvent>,
    ) {
        if metrics.mar > cal.mar.mean * self.config.yawn_mar_factor {
            self.state.yawn_frames += 1;
            if self.state.yawn_frames > self.config.yawn_frames_threshold
                && cooldown_elapsed(self.state.last_yawn, now, secs(self.config.yawn_cooldown_secs))
            {
                events.push(FatigueEvent::Yawn);
                self.state.last_yawn = Some(now);
                self.state.yawn_frames = 0;
            }
        } else {
            self.state.yawn_frames = 0;
        }
    }

    /// One counter, two thresholds: drowsiness every frame past the lower
    /// one, the rate-limited wake-up alert past the upper one
    fn check_eyes_closed(
        &mut self,
        metrics: &FacialMetrics,
        cal: &CalibrationProfile,
        now: Instant,
        events: &mut Vec<FatigueEvent>,
    ) {
        if metrics.ear < cal.ear.mean * self.config.drowsiness_ear_factor {
            self.state.closed_eyes_frames += 1;
            let frames = self.state.closed_eyes_frames;
            if frames > self.config.max_alert_eyes_closed_frames {
                if cooldown_elapsed(
                    self.state.last_wake_up,
                    now,
                    secs(self.config.wake_up_cooldown_secs),
                ) {
                    events.push(FatigueEvent::WakeUp);
                    self.state.last_wake_up = Some(now);
                }
            } else if frames > self.config.drowsiness_eyes_closed_frames {
                events.push(FatigueEvent::Drowsiness);
            }
        } else {
            self.state.closed_eyes_frames = 0;
        }
    }
}

/// De-duplicate, order by priority and pick the banner
fn finish(
    mut events: Vec<FatigueEvent>,
    mut overlay: OverlayData,
    nod_risk: f32,
) -> FatigueAnalysis {
    events.sort();
    events.dedup();

    if let Some((text, is_max)) = events.iter().find_map(|e| e.banner()) {
        overlay.alert_text = Some(text.to_string());
        overlay.is_max_alert = is_max;
    }
    overlay.nod_risk = nod_risk;

    for event in events.iter().filter(|e| !e.is_status()) {
        info!("Event detected: {}", event);
    }

    FatigueAnalysis { events, overlay }
}
