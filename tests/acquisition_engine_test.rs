//! State machine, camera settings and averaging against the simulated rig.

mod common;

use common::{request, Rig};
use scope_daq::acquisition::EngineState;
use scope_daq::core::{CaptureOutcome, Frame};
use scope_daq::error::ScopeError;
use scope_daq::hardware::mock::CameraCall;

#[tokio::test]
async fn test_out_of_range_settings_reach_camera_clamped() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    engine.connect_camera("").await.unwrap();
    rig.camera.clear_calls();

    assert_eq!(engine.set_exposure(1e9).await.unwrap(), 30_000.0);
    assert_eq!(engine.set_exposure(0.5).await.unwrap(), 10.0);
    assert_eq!(engine.set_gain(100.0).await.unwrap(), 47.0);
    assert_eq!(engine.set_gain(-5.0).await.unwrap(), 0.0);
    assert_eq!(engine.set_frame_rate(500.0).await.unwrap(), 60.0);

    let calls = rig.camera.calls();
    assert!(calls.contains(&CameraCall::SetExposure(30_000.0)));
    assert!(calls.contains(&CameraCall::SetExposure(10.0)));
    assert!(calls.contains(&CameraCall::SetGain(47.0)));
    assert!(calls.contains(&CameraCall::SetGain(0.0)));
    assert!(calls.contains(&CameraCall::SetFrameRate(60.0)));
    assert_eq!(engine.camera_config().frame_rate_fps(), 60.0);
}

#[tokio::test]
async fn test_double_start_is_idempotent() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    engine.connect_camera("").await.unwrap();

    engine.start_stream().await.unwrap();
    engine.start_stream().await.unwrap();

    assert_eq!(engine.state(), EngineState::Streaming);
    assert_eq!(rig.camera.count(&CameraCall::StartAcquisition), 1);
}

#[tokio::test]
async fn test_stop_while_idle_touches_nothing() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    engine.connect_camera("").await.unwrap();
    rig.camera.clear_calls();

    engine.stop_stream().await.unwrap();

    assert_eq!(engine.state(), EngineState::Idle);
    assert!(rig.camera.calls().is_empty());
}

#[tokio::test]
async fn test_stop_then_capture_fails_fast() {
    let rig = Rig::new();
    let mut engine = rig.streaming_engine().await;
    engine.stop_stream().await.unwrap();
    rig.camera.clear_calls();

    let err = engine.run_single_shot(&request(1)).await.unwrap_err();
    assert!(matches!(err, ScopeError::StreamNotActive));
    assert_eq!(rig.camera.count(&CameraCall::CaptureFrame), 0);
    assert!(rig.sink.writes().is_empty());
}

#[tokio::test]
async fn test_connect_unknown_camera() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    let err = engine.connect_camera("18255191").await.unwrap_err();
    assert!(matches!(err, ScopeError::DeviceNotFound(id) if id == "18255191"));
    assert!(rig.leds.commands().is_empty());
}

#[tokio::test]
async fn test_interval_overrides_average_count() {
    let rig = Rig::new();
    let mut engine = rig.streaming_engine().await;

    let mut req = request(1);
    req.num_to_average = 5;
    req.interval_secs = 2.0;
    let summary = engine.run_single_shot(&req).await.unwrap();

    // Simulated camera runs at 30 fps.
    assert_eq!(summary.frames_saved, 1);
    assert_eq!(rig.camera.count(&CameraCall::CaptureFrame), 60);
}

#[tokio::test]
async fn test_incomplete_frames_do_not_count_toward_average() {
    let rig = Rig::new();
    let mut engine = rig.streaming_engine().await;

    let frame = |v: u16| CaptureOutcome::Complete(Frame::new(4, 3, vec![v; 12], 12));
    rig.camera.push_outcome(frame(3));
    rig.camera.push_incomplete(1);
    rig.camera.push_outcome(frame(6));
    rig.camera.push_outcome(CaptureOutcome::Complete(Frame::new(4, 3, vec![0; 7], 12)));
    rig.camera.push_outcome(frame(10));

    let mut req = request(1);
    req.num_to_average = 3;
    let summary = engine.run_single_shot(&req).await.unwrap();

    assert_eq!(summary.frames_saved, 1);
    assert_eq!(rig.camera.count(&CameraCall::CaptureFrame), 5);
    let writes = rig.sink.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].frame.pixels, vec![6; 12]);
}

#[tokio::test]
async fn test_camera_fault_aborts_run_and_restores_streaming() {
    let rig = Rig::new();
    let mut engine = rig.streaming_engine().await;
    rig.camera.fail_after(2);

    let err = engine.run_single_shot(&request(5)).await.unwrap_err();

    assert!(matches!(err, ScopeError::Instrument(_)));
    assert_eq!(rig.sink.writes().len(), 2);
    assert_eq!(engine.state(), EngineState::Streaming);

    // The engine accepts the next run.
    let summary = engine.run_single_shot(&request(1)).await.unwrap();
    assert_eq!(summary.frames_saved, 1);
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_hardware() {
    let rig = Rig::new();
    let mut engine = rig.streaming_engine().await;

    let mut req = request(1);
    req.interval_secs = -1.0;
    let err = engine.run_single_shot(&req).await.unwrap_err();

    assert!(matches!(err, ScopeError::InvalidRequest(_)));
    assert!(rig.camera.calls().is_empty());
    assert_eq!(engine.state(), EngineState::Streaming);
}

#[tokio::test]
async fn test_stage_initialization_homes_then_moves_home() {
    use scope_daq::core::Axis;
    use scope_daq::hardware::mock::StageMove;

    let rig = Rig::new();
    let mut engine = rig.engine();
    engine.initialize_stage().await.unwrap();

    assert_eq!(
        rig.stage.moves(),
        vec![
            StageMove::Home(Axis::X),
            StageMove::Home(Axis::Y),
            StageMove::Home(Axis::Z),
            StageMove::Absolute(Axis::X, 5.0),
            StageMove::Absolute(Axis::Y, 5.0),
            StageMove::Absolute(Axis::Z, 5.0),
        ]
    );
    let position = engine.current_position().await.unwrap();
    assert_eq!((position.x, position.y, position.z), (5.0, 5.0, 5.0));
}
