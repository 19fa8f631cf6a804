use chrono::Utc;
use dms::{CalibrationProfile, CalibrationStatus, FacialMetrics, FatigueEvent};
use perception::{
    mesh, FaceEncoder, FaceLandmarks, FrameObservation, HeadPose, Landmark, MotionSample,
    PerceptionError, VideoFrame,
};
use session::{EngineConfig, SessionEngine, SessionState};
use std::time::{Duration, Instant};
use storage::{AccessOutcome, BiometricStore, Repository};

/// Returns a fixed embedding, or fails when none is set
struct StubEncoder {
    next: Option<Vec<f32>>,
}

impl FaceEncoder for StubEncoder {
    fn encode(&mut self, _: &VideoFrame, _: &FaceLandmarks) -> Result<Vec<f32>, PerceptionError> {
        self.next.clone().ok_or(PerceptionError::ModelNotLoaded)
    }
}

const MODEL: &str = "ArcFace Buffalo S";

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.state_machine.stable_face_frames_to_identify = 3;
    config.state_machine.face_lost_frames_to_logout = 5;
    config.state_machine.auto_register_seconds = 2.0;
    config.calibration.sample_target = 10;
    config.enrichment.enabled = false;
    config
}

fn engine_with(
    config: EngineConfig,
    repo: Repository,
    embedding: Option<Vec<f32>>,
) -> SessionEngine<Repository, StubEncoder> {
    SessionEngine::new(config, repo, StubEncoder { next: embedding })
        .unwrap()
        .without_classifier()
}

/// Synthetic mesh: open eyes, `mouth_open` controls the lip gap
fn face(mouth_open: f32) -> FaceLandmarks {
    let mut points = vec![Landmark::new(0.5, 0.5); 478];
    for (idx, cx) in [(mesh::RIGHT_EYE, 0.35), (mesh::LEFT_EYE, 0.65)] {
        points[idx[0]] = Landmark::new(cx - 0.05, 0.4);
        points[idx[3]] = Landmark::new(cx + 0.05, 0.4);
        points[idx[1]] = Landmark::new(cx - 0.02, 0.38);
        points[idx[5]] = Landmark::new(cx - 0.02, 0.42);
        points[idx[2]] = Landmark::new(cx + 0.02, 0.38);
        points[idx[4]] = Landmark::new(cx + 0.02, 0.42);
    }
    points[mesh::MOUTH[0]] = Landmark::new(0.4, 0.7);
    points[mesh::MOUTH[1]] = Landmark::new(0.6, 0.7);
    points[mesh::MOUTH[2]] = Landmark::new(0.5, 0.7 - mouth_open);
    points[mesh::MOUTH[3]] = Landmark::new(0.5, 0.7 + mouth_open);
    for (iris, cx) in [(mesh::RIGHT_IRIS, 0.35), (mesh::LEFT_IRIS, 0.65)] {
        points[iris[0]] = Landmark::new(cx, 0.4);
        points[iris[1]] = Landmark::new(cx + 0.01, 0.4);
        points[iris[2]] = Landmark::new(cx, 0.39);
        points[iris[3]] = Landmark::new(cx - 0.01, 0.4);
        points[iris[4]] = Landmark::new(cx, 0.41);
    }
    FaceLandmarks::new(points)
}

fn frontal() -> FrameObservation {
    posed(HeadPose::default())
}

fn posed(pose: HeadPose) -> FrameObservation {
    FrameObservation {
        face: Some(face(0.01)),
        head_pose: Some(pose),
        ..Default::default()
    }
}

fn yawning() -> FrameObservation {
    FrameObservation {
        face: Some(face(0.05)),
        head_pose: Some(HeadPose::default()),
        ..Default::default()
    }
}

fn absent() -> FrameObservation {
    FrameObservation::default()
}

fn at(t0: Instant, frame: u64) -> Instant {
    t0 + Duration::from_millis(50 * frame)
}

/// Baseline of the frontal face
fn baseline() -> CalibrationProfile {
    let samples: Vec<FacialMetrics> = (0..10)
        .map(|_| FacialMetrics::extract(&face(0.01), Default::default(), None))
        .collect();
    CalibrationProfile::from_samples(&samples).unwrap()
}

/// Repository with one enrolled user whose embedding is `[1, 0]`
fn enrolled_repo(calibrated: bool) -> (Repository, uuid::Uuid) {
    let repo = Repository::new();
    let user = repo.register_user(Utc::now()).unwrap();
    repo.add_embedding(user.id, &[1.0, 0.0], MODEL, Some(HeadPose::default()), Utc::now())
        .unwrap();
    if calibrated {
        repo.save_calibration(user.id, &baseline()).unwrap();
    }
    (repo, user.id)
}

/// Feed stable frames until the engine has identified someone
fn drive_to_identifying(engine: &mut SessionEngine<Repository, StubEncoder>, t0: Instant) -> u64 {
    let frame = VideoFrame::default();
    for i in 0..3 {
        engine.process_frame(&frame, &frontal(), at(t0, i));
    }
    assert_eq!(engine.state(), SessionState::Identifying);
    3
}

#[test]
fn test_unstable_face_does_not_identify() {
    let mut engine = engine_with(test_config(), Repository::new(), None);
    let frame = VideoFrame::default();
    let t0 = Instant::now();

    engine.process_frame(&frame, &frontal(), at(t0, 0));
    engine.process_frame(&frame, &frontal(), at(t0, 1));
    let report = engine.process_frame(&frame, &posed(HeadPose::new(0.0, 40.0, 0.0)), at(t0, 2));
    assert_eq!(report.state, SessionState::Listening);
    assert!(report.transition.is_none());

    engine.process_frame(&frame, &frontal(), at(t0, 3));
    engine.process_frame(&frame, &frontal(), at(t0, 4));
    let report = engine.process_frame(&frame, &frontal(), at(t0, 5));
    assert!(report.transitioned_to(SessionState::Identifying));
}

#[test]
fn test_missing_pose_is_unacceptable() {
    let mut engine = engine_with(test_config(), Repository::new(), None);
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let no_pose = FrameObservation {
        face: Some(face(0.01)),
        ..Default::default()
    };
    for i in 0..10 {
        engine.process_frame(&frame, &no_pose, at(t0, i));
    }
    assert_eq!(engine.state(), SessionState::Listening);
}

#[test]
fn test_known_user_logs_in() {
    let (repo, user_id) = enrolled_repo(true);
    let mut engine = engine_with(test_config(), repo, Some(vec![0.6, 0.8]));
    let t0 = Instant::now();
    let n = drive_to_identifying(&mut engine, t0);

    let report = engine.process_frame(&VideoFrame::default(), &frontal(), at(t0, n));
    assert!(report.transitioned_to(SessionState::Monitoring));
    assert!((report.similarity.unwrap() - 0.6).abs() < 1e-6);
    assert_eq!(report.user.as_ref().map(|u| u.id), Some(user_id));

    let access = engine.store().access_log(Some(user_id)).unwrap();
    assert_eq!(access.len(), 1);
    assert_eq!(access[0].outcome, AccessOutcome::Success);
}

#[test]
fn test_unknown_face_auto_registers() {
    let (repo, _) = enrolled_repo(false);
    let mut engine = engine_with(test_config(), repo, Some(vec![0.0, 1.0]));
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let n = drive_to_identifying(&mut engine, t0);

    let report = engine.process_frame(&frame, &frontal(), at(t0, n));
    assert!(report.transitioned_to(SessionState::AutoRegistering));
    assert_eq!(report.similarity, Some(0.0));
    let unknown = engine.store().access_log(None).unwrap();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].outcome, AccessOutcome::Unknown);
    assert_eq!(unknown[0].user_id, None);

    // Still waiting one second in
    let report = engine.process_frame(&frame, &frontal(), at(t0, n + 20));
    assert_eq!(report.state, SessionState::AutoRegistering);
    assert!(report.status_text.contains("Registrando en"));

    let report = engine.process_frame(&frame, &frontal(), at(t0, n + 40));
    assert!(report.transitioned_to(SessionState::Monitoring));
    let user = report.user.unwrap();
    assert_eq!(user.code, "USUARIO_0002");

    let stored = engine.store().embeddings_for(user.id).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].vector, vec![0.0, 1.0]);
    assert_eq!(stored[0].model, MODEL);
    let access = engine.store().access_log(Some(user.id)).unwrap();
    assert_eq!(access[0].outcome, AccessOutcome::Success);
    assert_eq!(access[0].similarity, 1.0);
}

#[test]
fn test_lost_candidate_abandons_registration() {
    let mut engine = engine_with(test_config(), Repository::new(), Some(vec![1.0, 0.0]));
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let n = drive_to_identifying(&mut engine, t0);
    engine.process_frame(&frame, &frontal(), at(t0, n));
    assert_eq!(engine.state(), SessionState::AutoRegistering);

    let report = engine.process_frame(&frame, &absent(), at(t0, n + 1));
    assert!(report.transitioned_to(SessionState::Listening));
    assert_eq!(engine.store().user_count(), 0);
}

#[test]
fn test_encoder_failure_falls_back_to_listening() {
    let mut engine = engine_with(test_config(), Repository::new(), None);
    let t0 = Instant::now();
    let n = drive_to_identifying(&mut engine, t0);

    let report = engine.process_frame(&VideoFrame::default(), &frontal(), at(t0, n));
    assert!(report.transitioned_to(SessionState::Listening));
    assert!(report.user.is_none());
}

#[test]
fn test_face_lost_during_identification() {
    let mut engine = engine_with(test_config(), Repository::new(), Some(vec![1.0, 0.0]));
    let t0 = Instant::now();
    let n = drive_to_identifying(&mut engine, t0);
    let report = engine.process_frame(&VideoFrame::default(), &absent(), at(t0, n));
    assert!(report.transitioned_to(SessionState::Listening));
}

#[test]
fn test_live_calibration_precedes_detection() {
    let (repo, user_id) = enrolled_repo(false);
    let mut engine = engine_with(test_config(), repo, Some(vec![1.0, 0.0]));
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let mut n = drive_to_identifying(&mut engine, t0);
    engine.process_frame(&frame, &frontal(), at(t0, n));
    n += 1;
    assert_eq!(engine.state(), SessionState::Monitoring);

    for i in 0..9 {
        let report = engine.process_frame(&frame, &frontal(), at(t0, n + i));
        assert_eq!(report.calibration_progress, Some((i as usize + 1, 10)));
        assert!(report.overlay.is_none());
        assert!(report.events.is_empty());
        assert!(report.status_text.starts_with("CALIBRANDO"));
    }
    let report = engine.process_frame(&frame, &frontal(), at(t0, n + 9));
    assert!(report.calibration_progress.is_none());
    assert!(report.overlay.is_some());
    assert_eq!(engine.calibration_status(), CalibrationStatus::Ready);

    let stored = engine.store().load_calibration(user_id).unwrap().unwrap();
    assert!(stored.ear.std.abs() < 1e-6);
    assert!((stored.ear.mean - baseline().ear.mean).abs() < 1e-6);
}

#[test]
fn test_disabled_auto_calibration_awaits() {
    let (repo, _) = enrolled_repo(false);
    let mut config = test_config();
    config.calibration.auto_start = false;
    let mut engine = engine_with(config, repo, Some(vec![1.0, 0.0]));
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let n = drive_to_identifying(&mut engine, t0);
    engine.process_frame(&frame, &frontal(), at(t0, n));

    let report = engine.process_frame(&frame, &frontal(), at(t0, n + 1));
    assert_eq!(report.events, vec![FatigueEvent::AwaitingCalibration]);
    assert!(report.logged.is_empty());
    assert!(engine.store().events(None).unwrap().is_empty());
}

#[test]
fn test_stored_calibration_loads_without_auto_start() {
    let (repo, user_id) = enrolled_repo(true);
    let mut config = test_config();
    config.calibration.auto_start = false;
    let mut engine = engine_with(config, repo, Some(vec![1.0, 0.0]));
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let mut n = drive_to_identifying(&mut engine, t0);
    engine.process_frame(&frame, &frontal(), at(t0, n));
    n += 1;

    let mut logged = Vec::new();
    for i in 0..25 {
        let report = engine.process_frame(&frame, &yawning(), at(t0, n + i));
        assert!(!report.events.contains(&FatigueEvent::AwaitingCalibration));
        logged.extend(report.logged);
    }
    assert_eq!(engine.calibration_status(), CalibrationStatus::Ready);
    assert_eq!(logged, vec![FatigueEvent::Yawn]);
    assert_eq!(engine.store().events(Some(user_id)).unwrap().len(), 1);
}

#[test]
fn test_logout_cancels_live_calibration() {
    let (repo, user_id) = enrolled_repo(false);
    let mut engine = engine_with(test_config(), repo, Some(vec![1.0, 0.0]));
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let mut n = drive_to_identifying(&mut engine, t0);
    engine.process_frame(&frame, &frontal(), at(t0, n));
    n += 1;

    for i in 0..4 {
        engine.process_frame(&frame, &frontal(), at(t0, n + i));
    }
    n += 4;
    assert_eq!(engine.calibration_status(), CalibrationStatus::Collecting);

    for i in 0..6 {
        engine.process_frame(&frame, &absent(), at(t0, n + i));
    }
    assert_eq!(engine.state(), SessionState::Listening);
    assert_eq!(engine.calibration_status(), CalibrationStatus::NotStarted);

    // Second session starts collecting from scratch
    let t1 = at(t0, n + 20);
    let m = drive_to_identifying(&mut engine, t1);
    engine.process_frame(&frame, &frontal(), at(t1, m));
    assert_eq!(engine.state(), SessionState::Monitoring);
    let report = engine.process_frame(&frame, &frontal(), at(t1, m + 1));
    assert_eq!(report.calibration_progress, Some((1, 10)));
    assert!(engine.store().load_calibration(user_id).unwrap().is_none());
}

#[test]
fn test_store_failure_while_monitoring_ends_session() {
    let (repo, user_id) = enrolled_repo(true);
    let mut engine = engine_with(test_config(), repo, Some(vec![1.0, 0.0]));
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let n = drive_to_identifying(&mut engine, t0);
    engine.process_frame(&frame, &frontal(), at(t0, n));
    assert_eq!(engine.state(), SessionState::Monitoring);

    // The profile lookup on the next frame now fails
    engine.store().delete_user(user_id).unwrap();
    let report = engine.process_frame(&frame, &frontal(), at(t0, n + 1));
    assert!(report.transitioned_to(SessionState::Listening));
    assert!(report.user.is_none());
    assert!(engine.active_user().is_none());

    let summaries = engine.store().session_summaries().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].user_id, Some(user_id));
}

#[test]
fn test_yawn_logged_for_user() {
    let (repo, user_id) = enrolled_repo(true);
    let mut engine = engine_with(test_config(), repo, Some(vec![1.0, 0.0]));
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let mut n = drive_to_identifying(&mut engine, t0);
    engine.process_frame(&frame, &frontal(), at(t0, n));
    n += 1;

    let mut yawns = 0;
    let mut prompts = Vec::new();
    for i in 0..25 {
        let report = engine.process_frame(&frame, &yawning(), at(t0, n + i));
        if report.logged.contains(&FatigueEvent::Yawn) {
            yawns += 1;
            prompts.extend(report.prompts);
        }
    }
    assert_eq!(yawns, 1);
    assert_eq!(prompts[0].text, "Parece que estás cansado.");

    let events = engine.store().events(Some(user_id)).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "Bostezar");
    assert_eq!(engine.session_log().count(FatigueEvent::Yawn), 1);
}

#[test]
fn test_absence_ends_session_and_saves_summary() {
    let (repo, user_id) = enrolled_repo(true);
    let mut engine = engine_with(test_config(), repo, Some(vec![1.0, 0.0]));
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let mut n = drive_to_identifying(&mut engine, t0);
    engine.process_frame(&frame, &frontal(), at(t0, n));
    n += 1;

    for i in 0..5 {
        let report = engine.process_frame(&frame, &absent(), at(t0, n + i));
        assert_eq!(report.state, SessionState::Monitoring);
    }
    let report = engine.process_frame(&frame, &absent(), at(t0, n + 5));
    assert!(report.transitioned_to(SessionState::Listening));
    assert!(engine.active_user().is_none());

    let summaries = engine.store().session_summaries().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].user_id, Some(user_id));
    assert!(summaries[0].started_at <= summaries[0].ended_at);
}

#[test]
fn test_body_presence_keeps_session() {
    let (repo, _) = enrolled_repo(true);
    let mut engine = engine_with(test_config(), repo, Some(vec![1.0, 0.0]));
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let mut n = drive_to_identifying(&mut engine, t0);
    engine.process_frame(&frame, &frontal(), at(t0, n));
    n += 1;

    let body_only = FrameObservation {
        body_detected: Some(true),
        ..Default::default()
    };
    for i in 0..20 {
        engine.process_frame(&frame, &body_only, at(t0, n + i));
    }
    assert_eq!(engine.state(), SessionState::Monitoring);
}

#[test]
fn test_sleep_and_wake() {
    let (repo, _) = enrolled_repo(true);
    let mut config = test_config();
    config.hardware.enabled = true;
    config.hardware.sleep_after_minutes = 0.01;
    let mut engine = engine_with(config, repo, Some(vec![1.0, 0.0]));
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let n = drive_to_identifying(&mut engine, t0);
    engine.process_frame(&frame, &frontal(), at(t0, n));
    assert_eq!(engine.state(), SessionState::Monitoring);

    let still = MotionSample::at_rest();
    assert!(engine.handle_motion(&still, at(t0, n)).is_none());
    let transition = engine.handle_motion(&still, at(t0, n + 20)).unwrap();
    assert_eq!(transition.from, SessionState::Monitoring);
    assert_eq!(transition.to, SessionState::Reposo);
    assert!(engine.active_user().is_none());
    assert_eq!(engine.store().session_summaries().unwrap().len(), 1);

    let report = engine.process_frame(&frame, &frontal(), at(t0, n + 21));
    assert_eq!(report.state, SessionState::Reposo);
    assert!(report.overlay.is_none());

    let moving = MotionSample {
        gyro_x: 20.0,
        ..MotionSample::at_rest()
    };
    let transition = engine.handle_motion(&moving, at(t0, n + 22)).unwrap();
    assert_eq!(transition.to, SessionState::Listening);
}

#[test]
fn test_enrichment_captures_novel_poses() {
    let (repo, user_id) = enrolled_repo(true);
    let mut config = test_config();
    config.enrichment.enabled = true;
    config.enrichment.embeddings_per_session_target = 2;
    let mut engine = engine_with(config, repo, Some(vec![1.0, 0.0]));
    let frame = VideoFrame::default();
    let t0 = Instant::now();
    let mut n = drive_to_identifying(&mut engine, t0);
    engine.process_frame(&frame, &frontal(), at(t0, n));
    n += 1;

    for (i, pose) in [
        HeadPose::new(0.0, 0.0, 0.0),
        HeadPose::new(2.0, 3.0, 0.0),
        HeadPose::new(0.0, 20.0, 0.0),
        HeadPose::new(0.0, -20.0, 0.0),
    ]
    .into_iter()
    .enumerate()
    {
        engine.process_frame(&frame, &posed(pose), at(t0, n + i as u64));
    }

    // The enrolled embedding plus two captures
    let stored = engine.store().embeddings_for(user_id).unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[2].pose, Some(HeadPose::new(0.0, 20.0, 0.0)));
}
