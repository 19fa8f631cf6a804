//! Session State Machine
//!
//! Drives LISTENING → IDENTIFYING → (AUTO_REGISTERING | MONITORING) →
//! LISTENING once per frame, with REPOSO entered and left on motion-sensor
//! signals. Each state has one handler; a handler error is logged and
//! sends the session back to LISTENING, so a bad frame never stops the
//! loop.

use crate::config::EngineConfig;
use crate::enrichment::ProfileEnricher;
use crate::state::{ActiveUser, FrameReport, SessionState, Transition};
use crate::SessionError;
use alerting::{AlertDispatcher, SessionLog};
use chrono::{DateTime, Utc};
use dms::{
    CalibrationManager, CalibrationStatus, FacialMetrics, FatigueClassifier, FatigueDetector,
};
use identity::find_match;
use perception::{
    FaceEncoder, FrameObservation, MotionMonitor, MotionSample, MotionSignal, VideoFrame,
};
use std::time::Instant;
use storage::{AccessOutcome, BiometricStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct StateTimers {
    stable_face_frames: u32,
    face_lost_frames: u32,
    auto_register_started: Option<Instant>,
}

pub struct SessionEngine<S: BiometricStore, E: FaceEncoder> {
    config: EngineConfig,
    store: S,
    encoder: E,
    state: SessionState,
    user: Option<ActiveUser>,
    timers: StateTimers,
    detector: FatigueDetector,
    calibration: CalibrationManager,
    enricher: ProfileEnricher,
    dispatcher: AlertDispatcher,
    motion: MotionMonitor,
    /// Frame instant paired with the wall time it corresponds to
    clock: Option<(Instant, DateTime<Utc>)>,
}

impl<S: BiometricStore, E: FaceEncoder> SessionEngine<S, E> {
    pub fn new(config: EngineConfig, store: S, encoder: E) -> Result<Self, SessionError> {
        config.validate()?;
        info!(
            "Session engine created (model {}, threshold {:.2})",
            config.recognition.model_name, config.recognition.threshold
        );
        Ok(Self {
            detector: FatigueDetector::new(config.fatigue.clone()),
            calibration: CalibrationManager::new(config.calibration.sample_target),
            enricher: ProfileEnricher::new(config.enrichment.clone()),
            dispatcher: AlertDispatcher::new(config.alerts.clone()),
            motion: MotionMonitor::new(config.hardware.clone()),
            config,
            store,
            encoder,
            state: SessionState::Listening,
            user: None,
            timers: StateTimers::default(),
            clock: None,
        })
    }

    /// Replace the fatigue sequence classifier
    pub fn with_classifier(mut self, classifier: Box<dyn FatigueClassifier>) -> Self {
        self.detector = self.detector.with_classifier(classifier);
        self
    }

    /// Run fatigue detection without any sequence classifier
    pub fn without_classifier(mut self) -> Self {
        self.detector = self.detector.without_classifier();
        self
    }

    /// Pin the wall time of a frame instant; later instants are offset
    /// from it. Without an anchor the first frame is paired with `Utc::now()`.
    pub fn set_clock_anchor(&mut self, now: Instant, at: DateTime<Utc>) {
        self.clock = Some((now, at));
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn active_user(&self) -> Option<&ActiveUser> {
        self.user.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn encoder_mut(&mut self) -> &mut E {
        &mut self.encoder
    }

    pub fn calibration_status(&self) -> CalibrationStatus {
        self.calibration.status()
    }

    pub fn detector(&self) -> &FatigueDetector {
        &self.detector
    }

    pub fn session_log(&self) -> &SessionLog {
        self.dispatcher.session_log()
    }

    /// Advance the state machine by one frame
    pub fn process_frame(
        &mut self,
        frame: &VideoFrame,
        obs: &FrameObservation,
        now: Instant,
    ) -> FrameReport {
        let from = self.state;
        let mut report = FrameReport::new(from);

        let result = match from {
            SessionState::Listening => {
                self.handle_listening(obs);
                Ok(())
            }
            SessionState::Identifying => self.handle_identifying(frame, obs, now, &mut report),
            SessionState::AutoRegistering => {
                self.handle_auto_registering(frame, obs, now, &mut report)
            }
            SessionState::Monitoring => self.handle_monitoring(frame, obs, now, &mut report),
            SessionState::Reposo => Ok(()),
        };

        if let Err(e) = result {
            warn!("{} handler failed: {}. Returning to LISTENING", from, e);
            self.fail_safe(now);
        }

        report.state = self.state;
        report.user = self.user.clone();
        report.status_text = self.status_text(now);
        if from != self.state {
            report.transition = Some(Transition {
                from,
                to: self.state,
            });
        }
        report
    }

    /// Enter REPOSO. A running session is closed first.
    pub fn enter_sleep(&mut self, now: Instant) -> Option<Transition> {
        let from = self.state;
        if from == SessionState::Reposo {
            return None;
        }
        if from == SessionState::Monitoring {
            if let Err(e) = self.end_session(now) {
                warn!("Failed to close session before sleep: {}", e);
            }
        }
        self.timers = StateTimers::default();
        self.transition(SessionState::Reposo);
        Some(Transition {
            from,
            to: SessionState::Reposo,
        })
    }

    /// Leave REPOSO for LISTENING
    pub fn wake(&mut self) -> Option<Transition> {
        if self.state != SessionState::Reposo {
            return None;
        }
        self.transition(SessionState::Listening);
        Some(Transition {
            from: SessionState::Reposo,
            to: SessionState::Listening,
        })
    }

    /// Feed one motion-sensor sample; returns the transition it caused
    pub fn handle_motion(&mut self, sample: &MotionSample, now: Instant) -> Option<Transition> {
        if !self.config.hardware.enabled {
            debug!("Motion sample ignored: motion sensor disabled");
            return None;
        }
        match self.motion.update(sample, now)? {
            MotionSignal::NoMotionForDuration => self.enter_sleep(now),
            MotionSignal::MotionDetected => self.wake(),
        }
    }

    fn handle_listening(&mut self, obs: &FrameObservation) {
        let limits = &self.config.recognition.pose_limits;
        if obs.face_detected() && limits.accepts_opt(obs.head_pose.as_ref()) {
            self.timers.stable_face_frames += 1;
            let needed = self.config.state_machine.stable_face_frames_to_identify;
            if self.timers.stable_face_frames >= needed {
                info!("Stable face detected, starting identification");
                self.timers.stable_face_frames = 0;
                self.transition(SessionState::Identifying);
            }
        } else {
            self.timers.stable_face_frames = 0;
        }
    }

    fn handle_identifying(
        &mut self,
        frame: &VideoFrame,
        obs: &FrameObservation,
        now: Instant,
        report: &mut FrameReport,
    ) -> Result<(), SessionError> {
        let Some(face) = obs.face.as_ref() else {
            warn!("Face landmarks lost during identification");
            self.transition(SessionState::Listening);
            return Ok(());
        };
        if !self.config.recognition.pose_limits.accepts_opt(obs.head_pose.as_ref()) {
            warn!("Unacceptable head pose during identification");
            self.transition(SessionState::Listening);
            return Ok(());
        }

        let query = self.encoder.encode(frame, face)?;
        let known = self.store.known_embeddings(&self.config.recognition.model_name)?;
        let (matched, best) = find_match(
            Some(query.as_slice()),
            &known,
            self.config.recognition.threshold,
        );
        report.similarity = Some(best);

        match matched {
            Some(m) => self.login(m.user_id, m.user_code, m.similarity, now),
            None => {
                info!(
                    "Unknown face (best similarity {:.2}), starting auto-registration",
                    best
                );
                let at = self.wall_time(now);
                self.store.log_access(None, AccessOutcome::Unknown, best, at)?;
                self.timers.auto_register_started = Some(now);
                self.transition(SessionState::AutoRegistering);
                Ok(())
            }
        }
    }

    fn handle_auto_registering(
        &mut self,
        frame: &VideoFrame,
        obs: &FrameObservation,
        now: Instant,
        report: &mut FrameReport,
    ) -> Result<(), SessionError> {
        let started = *self.timers.auto_register_started.get_or_insert(now);

        let limits = &self.config.recognition.pose_limits;
        let face = match obs.face.as_ref() {
            Some(face) if limits.accepts_opt(obs.head_pose.as_ref()) => face,
            _ => {
                info!("Registration candidate lost, returning to LISTENING");
                self.timers.auto_register_started = None;
                self.transition(SessionState::Listening);
                return Ok(());
            }
        };
        if now.saturating_duration_since(started) < self.config.state_machine.auto_register_wait() {
            return Ok(());
        }

        info!("Registration wait elapsed, registering new user");
        let embedding = self.encoder.encode(frame, face)?;
        let at = self.wall_time(now);
        let user = self.store.register_user(at)?;
        self.store.add_embedding(
            user.id,
            &embedding,
            &self.config.recognition.model_name,
            obs.head_pose,
            at,
        )?;
        info!("New user {} registered automatically", user.code);
        report.similarity = Some(1.0);
        self.login(user.id, user.code, 1.0, now)
    }

    fn handle_monitoring(
        &mut self,
        frame: &VideoFrame,
        obs: &FrameObservation,
        now: Instant,
        report: &mut FrameReport,
    ) -> Result<(), SessionError> {
        let Some(user) = self.user.clone() else {
            warn!("MONITORING without an active user");
            self.transition(SessionState::Listening);
            return Ok(());
        };

        if obs.user_present() {
            self.timers.face_lost_frames = 0;
            if self.calibration.status() == CalibrationStatus::NotStarted {
                match self.store.load_calibration(user.id)? {
                    Some(profile) => self.calibration.set_profile(profile)?,
                    None if self.config.calibration.auto_start => {
                        info!("No stored calibration for {}, collecting live", user.code);
                        self.calibration.begin();
                    }
                    None => {}
                }
            }
        } else {
            self.timers.face_lost_frames += 1;
            if self.timers.face_lost_frames > self.config.state_machine.face_lost_frames_to_logout {
                info!("User {} absent, ending monitoring session", user.code);
                return self.end_session(now);
            }
        }

        if self.calibration.status() == CalibrationStatus::Collecting {
            if let Some(face) = obs.face.as_ref() {
                let metrics = FacialMetrics::extract(face, obs.size, None);
                if let Some(profile) = self.calibration.add_sample(metrics) {
                    self.store.save_calibration(user.id, &profile)?;
                    info!("Live calibration stored for {}", user.code);
                }
            }
            if self.calibration.status() == CalibrationStatus::Collecting {
                report.calibration_progress = Some(self.calibration.progress());
                return Ok(());
            }
        }

        self.enrich(frame, obs, &user, now)?;

        let analysis = self.detector.process(obs, self.calibration.profile(), now);
        let at = self.wall_time(now);
        let dispatch = self.dispatcher.dispatch(&analysis.events, at);
        for event in &dispatch.logged {
            self.store.log_behavior_event(Some(user.id), event.label(), at)?;
        }

        report.events = analysis.events;
        report.overlay = Some(analysis.overlay);
        report.logged = dispatch.logged;
        report.prompts = dispatch.prompts;
        Ok(())
    }

    /// Store an extra embedding when the pose is new for this session
    fn enrich(
        &mut self,
        frame: &VideoFrame,
        obs: &FrameObservation,
        user: &ActiveUser,
        now: Instant,
    ) -> Result<(), SessionError> {
        let (Some(face), Some(pose)) = (obs.face.as_ref(), obs.head_pose) else {
            return Ok(());
        };
        if !self.config.recognition.pose_limits.accepts(&pose) || !self.enricher.wants(&pose, now) {
            return Ok(());
        }
        match self.encoder.encode(frame, face) {
            Ok(embedding) => {
                let at = self.wall_time(now);
                self.store.add_embedding(
                    user.id,
                    &embedding,
                    &self.config.recognition.model_name,
                    Some(pose),
                    at,
                )?;
                self.enricher.record(pose);
            }
            Err(e) => warn!("Enrichment capture skipped: {}", e),
        }
        Ok(())
    }

    fn login(
        &mut self,
        user_id: Uuid,
        user_code: String,
        similarity: f32,
        now: Instant,
    ) -> Result<(), SessionError> {
        let at = self.wall_time(now);
        self.store
            .log_access(Some(user_id), AccessOutcome::Success, similarity, at)?;
        info!(
            "User {} authenticated with similarity {:.2}",
            user_code, similarity
        );

        self.detector.reset(now);
        self.calibration.reset();
        self.enricher.start(now);
        self.dispatcher
            .session_log_mut()
            .start(user_id, &user_code, at);
        self.timers = StateTimers::default();
        self.user = Some(ActiveUser {
            id: user_id,
            code: user_code,
        });
        self.transition(SessionState::Monitoring);
        Ok(())
    }

    /// Unbind the user, discard per-session state and persist the summary
    fn end_session(&mut self, now: Instant) -> Result<(), SessionError> {
        let at = self.wall_time(now);
        let summary = self.dispatcher.session_log_mut().finish(at);
        let user = self.user.take();

        self.detector.reset(now);
        self.calibration.reset();
        self.enricher.reset();
        self.timers = StateTimers::default();
        self.transition(SessionState::Listening);

        if let Some(user) = &user {
            info!("Monitoring session for {} ended", user.code);
        }
        if let Some(summary) = summary {
            if self.config.reporting.save_log_on_session_end {
                self.store.save_session_summary(&summary)?;
            }
        }
        Ok(())
    }

    fn fail_safe(&mut self, now: Instant) {
        if self.user.is_some() {
            if let Err(e) = self.end_session(now) {
                warn!("Failed to close session: {}", e);
            }
        }
        self.timers = StateTimers::default();
        self.transition(SessionState::Listening);
    }

    fn transition(&mut self, to: SessionState) {
        if self.state == to {
            return;
        }
        info!("State {} -> {}", self.state, to);
        if to == SessionState::Listening {
            self.timers.stable_face_frames = 0;
        }
        self.state = to;
    }

    fn wall_time(&mut self, now: Instant) -> DateTime<Utc> {
        let (anchor, anchor_wall) = *self.clock.get_or_insert_with(|| (now, Utc::now()));
        let elapsed = now.saturating_duration_since(anchor);
        anchor_wall
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }

    fn status_text(&self, now: Instant) -> String {
        match self.state {
            SessionState::Listening => "Buscando usuario...".to_string(),
            SessionState::Identifying => "Identificando usuario...".to_string(),
            SessionState::AutoRegistering => {
                let elapsed = self
                    .timers
                    .auto_register_started
                    .map_or(0.0, |t| now.saturating_duration_since(t).as_secs_f32());
                let left = (self.config.state_machine.auto_register_seconds - elapsed).max(0.0);
                format!(
                    "Rostro nuevo detectado. Mantenga la posición. Registrando en {} segundos...",
                    left as u32
                )
            }
            SessionState::Monitoring => {
                let code = self.user.as_ref().map_or("N/A", |u| u.code.as_str());
                if self.calibration.status() == CalibrationStatus::Collecting {
                    let (collected, target) = self.calibration.progress();
                    format!("CALIBRANDO para {} ({}/{})", code, collected, target)
                } else {
                    format!("Monitoreando: {}", code)
                }
            }
            SessionState::Reposo => "MODO REPOSO (esperando movimiento)".to_string(),
        }
    }
}
