//! Defocus and four-color sequences: stage motion, LED ordering and file naming.

mod common;

use common::{request, Rig};
use scope_daq::acquisition::sequence::{DefocusRequest, FourColorRequest};
use scope_daq::acquisition::EngineState;
use scope_daq::core::Axis;
use scope_daq::data::WriteKind;
use scope_daq::error::ScopeError;
use scope_daq::hardware::mock::{MockStage, StageMove};
use std::path::PathBuf;
use std::time::Duration;

fn out(name: &str) -> PathBuf {
    PathBuf::from("out").join(name)
}

#[tokio::test]
async fn test_defocus_sweeps_every_position_and_returns_to_focus() {
    let rig = Rig::new();
    let mut engine = rig.streaming_engine().await;
    let req = DefocusRequest {
        capture: request(2),
        z_step_um: 2.0,
        radius: 1,
    };

    let summary = engine.run_defocus(&req).await.unwrap();

    assert_eq!(summary.frames_saved, 6);
    assert_eq!(summary.next_counter, None);
    let written: Vec<PathBuf> = rig.sink.writes().into_iter().map(|w| w.path).collect();
    assert_eq!(
        written,
        vec![
            out("test_2024-01-05_time_00000_z_001.tiff"),
            out("test_2024-01-05_time_00000_z_002.tiff"),
            out("test_2024-01-05_time_00000_z_003.tiff"),
            out("test_2024-01-05_time_00001_z_001.tiff"),
            out("test_2024-01-05_time_00001_z_002.tiff"),
            out("test_2024-01-05_time_00001_z_003.tiff"),
        ]
    );
    assert!(rig.sink.writes().iter().all(|w| w.kind == WriteKind::Write));

    let z_moves: Vec<StageMove> = rig.stage.moves();
    let one_time_point = [
        StageMove::Relative(Axis::Z, -4.0),
        StageMove::Relative(Axis::Z, 2.0),
        StageMove::Relative(Axis::Z, 2.0),
        StageMove::Relative(Axis::Z, 2.0),
        StageMove::Relative(Axis::Z, -2.0),
    ];
    assert_eq!(z_moves[..5], one_time_point);
    assert_eq!(z_moves[5..], one_time_point);
    assert_eq!(rig.stage.net_relative(Axis::Z), 0.0);
    assert_eq!(rig.stage.snapshot().z, 0.0);
    assert_eq!(engine.state(), EngineState::Streaming);
}

#[tokio::test]
async fn test_defocus_zero_radius_takes_single_image() {
    let rig = Rig::new();
    let mut engine = rig.streaming_engine().await;
    let req = DefocusRequest {
        capture: request(1),
        z_step_um: 3.0,
        radius: 0,
    };

    let summary = engine.run_defocus(&req).await.unwrap();

    assert_eq!(summary.paths, vec![out("test_2024-01-05_time_00000_z_001.tiff")]);
    assert_eq!(rig.stage.net_relative(Axis::Z), 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_defocus_motion_timeout_aborts_run() {
    let stage = MockStage::new().with_timing(Duration::from_millis(10), Duration::from_millis(200));
    let rig = Rig::with_stage(stage);
    let mut engine = rig.streaming_engine().await;
    // Approach and first step are acknowledged, the second step never is.
    rig.stage.stall_after(2);

    let req = DefocusRequest {
        capture: request(1),
        z_step_um: 1.0,
        radius: 2,
    };
    let err = engine.run_defocus(&req).await.unwrap_err();

    assert!(matches!(err, ScopeError::MotionTimeout { .. }));
    assert_eq!(rig.sink.writes().len(), 1);
    assert_eq!(engine.state(), EngineState::Streaming);
}

#[tokio::test]
async fn test_defocus_rejects_oversized_step() {
    let rig = Rig::new();
    let mut engine = rig.streaming_engine().await;
    let req = DefocusRequest {
        capture: request(1),
        z_step_um: 6000.0,
        radius: 1,
    };

    assert!(matches!(
        engine.run_defocus(&req).await,
        Err(ScopeError::InvalidRequest(_))
    ));
    assert!(rig.stage.moves().is_empty());
}

#[tokio::test]
async fn test_four_color_cycles_leds_and_rolls_counter_once() {
    let rig = Rig::new();
    let mut engine = rig.streaming_engine().await;
    let req = FourColorRequest {
        capture: request(12),
    };

    let summary = engine.run_four_color(&req).await.unwrap();

    assert_eq!(rig.leds.commands(), b"rygbrygbrygb".to_vec());
    assert_eq!(summary.frames_saved, 12);
    assert_eq!(summary.next_counter, Some(2));

    let expected: Vec<PathBuf> = (0..12u32)
        .map(|i| {
            let stem = ["r", "y", "g", "b"][(i % 4) as usize];
            let counter = if i < 10 { 0 } else { 1 };
            out(&format!("test_2024-01-05_{stem}_{counter}.tiff"))
        })
        .collect();
    let writes = rig.sink.writes();
    let written: Vec<PathBuf> = writes.iter().map(|w| w.path.clone()).collect();
    assert_eq!(written, expected);
    assert!(writes.iter().all(|w| w.kind == WriteKind::Append));

    assert_eq!(rig.sink.pages(&out("test_2024-01-05_r_0.tiff")), 3);
    assert_eq!(rig.sink.pages(&out("test_2024-01-05_g_0.tiff")), 2);
    assert_eq!(rig.sink.pages(&out("test_2024-01-05_g_1.tiff")), 1);
}

#[tokio::test]
async fn test_single_shot_rolls_over_every_ten_frames() {
    let rig = Rig::new();
    let mut engine = rig.streaming_engine().await;
    let mut req = request(21);
    req.starting_counter = 7;

    let summary = engine.run_single_shot(&req).await.unwrap();

    assert_eq!(
        summary.paths,
        vec![
            out("test_2024-01-05_7.tiff"),
            out("test_2024-01-05_8.tiff"),
            out("test_2024-01-05_9.tiff"),
        ]
    );
    assert_eq!(rig.sink.pages(&out("test_2024-01-05_7.tiff")), 10);
    assert_eq!(rig.sink.pages(&out("test_2024-01-05_9.tiff")), 1);
    assert_eq!(summary.next_counter, Some(10));
}

#[tokio::test]
async fn test_four_color_requires_stream() {
    let rig = Rig::new();
    let mut engine = rig.engine();
    engine.connect_camera("").await.unwrap();
    assert!(rig.leds.is_connected());

    let err = engine
        .run_four_color(&FourColorRequest { capture: request(4) })
        .await;

    assert!(matches!(err, Err(ScopeError::StreamNotActive)));
    assert!(rig.leds.commands().is_empty());
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn test_defocus_rejects_radius_beyond_limit() {
    let rig = Rig::new();
    let mut engine = rig.streaming_engine().await;
    let req = DefocusRequest {
        capture: request(1),
        z_step_um: 1.0,
        radius: 3_000_000_000,
    };

    assert!(matches!(
        engine.run_defocus(&req).await,
        Err(ScopeError::InvalidRequest(_))
    ));
    assert!(rig.stage.moves().is_empty());
    assert!(rig.sink.writes().is_empty());
    assert_eq!(engine.state(), EngineState::Streaming);
}

#[tokio::test]
async fn test_counter_at_max_is_rejected_before_capture() {
    let rig = Rig::new();
    let mut engine = rig.streaming_engine().await;
    let mut req = request(1);
    req.starting_counter = u32::MAX;

    assert!(matches!(
        engine.run_single_shot(&req).await,
        Err(ScopeError::InvalidRequest(_))
    ));
    assert!(matches!(
        engine
            .run_four_color(&FourColorRequest { capture: req.clone() })
            .await,
        Err(ScopeError::InvalidRequest(_))
    ));
    assert!(rig.sink.writes().is_empty());
    assert!(rig.leds.commands().is_empty());
    assert_eq!(engine.state(), EngineState::Streaming);

    // One file of room left is enough for ten frames.
    let mut req = request(10);
    req.starting_counter = u32::MAX - 1;
    let summary = engine.run_single_shot(&req).await.unwrap();
    assert_eq!(summary.next_counter, Some(u32::MAX));
}
